//! Error types for client operations.

use thiserror::Error;

use crate::states::ResolveState;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("polling cancelled; last aggregate state was {last_state}")]
    Cancelled { last_state: ResolveState },

    #[error("gave up polling {cluster} after {errors} consecutive HTTP errors: {last_error}")]
    TooManyHttpErrors {
        cluster: String,
        errors: u32,
        last_error: String,
    },
}

impl ClientError {
    /// Whether retrying the operation could help.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Cancelled { .. } => false,
            ClientError::TooManyHttpErrors { .. } => false,
            ClientError::InvalidUrl { .. } => false,
        }
    }
}
