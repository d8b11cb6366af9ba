//! Error types for MindPause

use thiserror::Error;

/// Errors that can occur anywhere in the wellbeing pipeline
#[derive(Debug, Error)]
pub enum PauseError {
    #[error("Capability not supported on this platform: {0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend responded with HTTP {status} for {endpoint}")]
    Http { status: u16, endpoint: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Date parse error: {0}")]
    InvalidDate(String),
}

impl From<reqwest::Error> for PauseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PauseError::Network(format!("request timed out: {err}"))
        } else {
            PauseError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PauseError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        PauseError::Socket(err.to_string())
    }
}

impl PauseError {
    /// Stable label for structured logging
    pub fn label(&self) -> &'static str {
        match self {
            PauseError::Unsupported(_) => "unsupported",
            PauseError::Network(_) => "network",
            PauseError::Http { .. } => "http",
            PauseError::PermissionDenied(_) => "permission_denied",
            PauseError::InvalidPayload(_) => "invalid_payload",
            PauseError::JsonError(_) => "json",
            PauseError::Config(_) => "config",
            PauseError::Socket(_) => "socket",
            PauseError::InvalidDate(_) => "invalid_date",
        }
    }
}
