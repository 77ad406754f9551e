use crate::models::ErrorResponse;
use log::error;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;
use thiserror::Error;

/// Failures of the pitch/tempo transformation.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid audio file format: {0}")]
    UnsupportedFormat(String),

    #[error("Error during {stage}: {message}")]
    Processing { stage: &'static str, message: String },
}

impl AudioError {
    pub fn processing(stage: &'static str, message: impl ToString) -> Self {
        AudioError::Processing {
            stage,
            message: message.to_string(),
        }
    }
}

/// Failures of search, availability and download.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Invalid video ID: {0}")]
    InvalidIdentifier(String),

    #[error("Video not found or unavailable: {0}")]
    NotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Download failed")]
    DownloadFailed,
}

/// An error ready to be rendered as a JSON body with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: Status, error: &str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, "Bad request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, "Internal error", message)
    }
}

impl From<AudioError> for ApiError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::InvalidParameter(_) => {
                ApiError::new(Status::BadRequest, "Invalid parameter", e.to_string())
            }
            AudioError::UnsupportedFormat(_) | AudioError::Processing { .. } => ApiError::new(
                Status::InternalServerError,
                "Error processing audio",
                e.to_string(),
            ),
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::InvalidIdentifier(_) => {
                ApiError::new(Status::BadRequest, "Invalid video ID", e.to_string())
            }
            RetrievalError::NotFound(_) => ApiError::new(
                Status::NotFound,
                "Video not found",
                "Video not found or unavailable",
            ),
            RetrievalError::ExtractionFailed(_) | RetrievalError::DownloadFailed => {
                error!("Download surfaced to client as generic failure: {e}");
                ApiError::new(
                    Status::InternalServerError,
                    "Download failed",
                    "Could not download the audio. Please try again or choose another video.",
                )
            }
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let json = serde_json::to_string(&self.body).map_err(|e| {
            error!("Failed to serialize error response: {e}");
            Status::InternalServerError
        })?;
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}
