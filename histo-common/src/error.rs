use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HistoError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Invalid version key '{0}': expected <category>/<folder>")]
    InvalidVersionKey(String),

    /// Every start payload encoding was rejected (or the transport failed on each).
    #[error("Failed to start install of '{key}' after {attempts} attempt(s): {last_error}")]
    StartRejected {
        key: String,
        attempts: usize,
        last_error: String,
    },

    /// Network or parse failure while polling; absorbed by the poller.
    #[error("Transient poll failure: {0}")]
    TransientPoll(String),

    #[error("Install of '{key}' failed: {message}")]
    RemoteFailure { key: String, message: String },

    #[error("Install of '{0}' was cancelled")]
    RemoteCancelled(String),
}

impl HistoError {
    /// True for failures the poller retries instead of surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HistoError::Http(_)
                | HistoError::Json(_)
                | HistoError::HttpError(_)
                | HistoError::Api(_)
                | HistoError::TransientPoll(_)
        )
    }
}

impl From<std::io::Error> for HistoError {
    fn from(err: std::io::Error) -> Self {
        HistoError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for HistoError {
    fn from(err: reqwest::Error) -> Self {
        HistoError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for HistoError {
    fn from(err: serde_json::Error) -> Self {
        HistoError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, HistoError>;
