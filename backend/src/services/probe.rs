use log::debug;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Lightweight existence check against a URL.
#[rocket::async_trait]
pub trait HttpProbe: Send + Sync {
    /// Issues a `HEAD` request and returns the status code.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

pub struct ReqwestProbe {
    client: Client,
}

impl ReqwestProbe {
    pub fn with_client(client: Client) -> Self {
        ReqwestProbe { client }
    }
}

#[rocket::async_trait]
impl HttpProbe for ReqwestProbe {
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProbeError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        debug!("HEAD {url} -> {status}");
        Ok(status)
    }
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
