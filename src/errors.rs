use crate::models::TrackResponse;
use axum::{Json, http::StatusCode};

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err)
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(TrackResponse::failed(self.message))).into_response()
    }
}

/// Failure of a single delivery transport. Never escapes the delivery engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0} transport unavailable: {1}")]
    Unavailable(&'static str, String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint answered {0}")]
    Status(reqwest::StatusCode),

    #[error("direct write failed: {0}")]
    Store(String),
}
