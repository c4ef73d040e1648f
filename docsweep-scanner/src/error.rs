use crate::result::FetchState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Timed out fetching {url} after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Out of scope: {0}")]
    ScopeRejected(String),

    #[error("Illegal state transition {from:?} -> {to:?}")]
    IllegalTransition { from: FetchState, to: FetchState },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Page processor failed: {0}")]
    Processor(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Whether the fetch that produced this error is worth another attempt.
    pub fn is_timeout(&self) -> bool {
        match self {
            ScanError::HttpError(e) => e.is_timeout(),
            ScanError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
