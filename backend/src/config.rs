use crate::services::audio_service::TransformPipeline;
use crate::services::extractor::YtDlpExtractor;
use crate::services::probe::ReqwestProbe;
use crate::services::retrieval_service::{RetrievalConfig, RetrievalOrchestrator};
use crate::AppState;
use anyhow::Result;
use env_logger::Builder;
use lazy_static::lazy_static;
use log::{info, LevelFilter};
use rocket::data::{Limits, ToByteUnit};
use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

lazy_static! {
    pub static ref WORKER_POOL_SIZE: usize = env_or("WORKER_POOL_SIZE", 4);
    pub static ref SEARCH_TIMEOUT_SECS: u64 = env_or("SEARCH_TIMEOUT_SECS", 15);
    pub static ref SEARCH_CACHE_CAPACITY: usize = env_or("SEARCH_CACHE_CAPACITY", 100);
    pub static ref AUTOCOMPLETE_CACHE_CAPACITY: usize = env_or("AUTOCOMPLETE_CACHE_CAPACITY", 100);
    pub static ref THUMBNAIL_PROBE_TIMEOUT_SECS: u64 = env_or("THUMBNAIL_PROBE_TIMEOUT_SECS", 2);
    pub static ref AVAILABILITY_PROBE_TIMEOUT_SECS: u64 =
        env_or("AVAILABILITY_PROBE_TIMEOUT_SECS", 10);
    pub static ref YT_DLP_PATH: String =
        env::var("YT_DLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    pub static ref FFMPEG_PATH: String =
        env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
    pub static ref CORS_ALLOWED_ORIGIN: String =
        env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "http://localhost:4200".to_string());
    pub static ref MAX_UPLOAD_MIB: u64 = env_or("MAX_UPLOAD_MIB", 64);
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        RetrievalConfig {
            worker_pool_size: *WORKER_POOL_SIZE,
            search_timeout: Duration::from_secs(*SEARCH_TIMEOUT_SECS),
            search_cache_capacity: *SEARCH_CACHE_CAPACITY,
            autocomplete_cache_capacity: *AUTOCOMPLETE_CACHE_CAPACITY,
            thumbnail_probe_timeout: Duration::from_secs(*THUMBNAIL_PROBE_TIMEOUT_SECS),
            availability_probe_timeout: Duration::from_secs(*AVAILABILITY_PROBE_TIMEOUT_SECS),
            download_root: None,
        }
    }
}

pub fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
    info!("Starting Rocket backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

/// Upload limits for the multipart transformation endpoint.
pub fn upload_limits() -> Limits {
    let max = (*MAX_UPLOAD_MIB).mebibytes();
    Limits::default()
        .limit("file", max)
        .limit("data-form", max + 1.mebibytes())
}

pub fn create_app_state() -> Result<AppState> {
    let config = RetrievalConfig::from_env();
    info!(
        "Using {} with {} worker(s), search timeout {:?}",
        *YT_DLP_PATH, config.worker_pool_size, config.search_timeout
    );

    let extractor = YtDlpExtractor::new(YT_DLP_PATH.as_str(), FFMPEG_PATH.as_str());
    let client = reqwest::Client::builder()
        .user_agent(concat!("utone-backend/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let probe = ReqwestProbe::with_client(client);

    let retrieval = RetrievalOrchestrator::new(Arc::new(extractor), Arc::new(probe), config);

    Ok(AppState {
        retrieval: Arc::new(retrieval),
        pipeline: Arc::new(TransformPipeline::default()),
    })
}

pub fn create_cors() -> Result<rocket_cors::Cors> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&[CORS_ALLOWED_ORIGIN.as_str()]))
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&[
            "Authorization",
            "Accept",
            "Content-Type",
        ]))
        .allow_credentials(true)
        .to_cors()
        .map_err(|e| anyhow::anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}
