//! Error types for sncast-hls
//!
//! One enum covers the caches, the decoder/encoder adapters and the HTTP
//! layer. Handlers return it directly; [`IntoResponse`] maps each variant to
//! a status code and a JSON body:
//!
//! ```json
//! {"error": {"code": "OUT_OF_RANGE", "message": "..."}}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for sncast-hls
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown episode key or missing resource (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Segment index beyond the episode's duration (404)
    #[error("Segment out of range: {0}")]
    OutOfRange(String),

    /// Source file unreadable, corrupt or unsupported (500)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Network or I/O failure while fetching a source file (503, retriable)
    #[error("Download error: {0}")]
    Download(String),

    /// Malformed request parameters (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// sncast-common error
    #[error(transparent)]
    Common(#[from] sncast_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::OutOfRange(_) => "OUT_OF_RANGE",
            Error::Decode(_) => "DECODE_ERROR",
            Error::Download(_) => "DOWNLOAD_ERROR",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::Common(sncast_common::Error::InvalidInput(_)) => "BAD_REQUEST",
            Error::Database(_) | Error::Common(sncast_common::Error::Database(_)) => {
                "DATABASE_ERROR"
            }
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "NOT_FOUND" | "OUT_OF_RANGE" => StatusCode::NOT_FOUND,
            "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "DOWNLOAD_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience Result type using sncast-hls Error
pub type Result<T> = std::result::Result<T, Error>;
