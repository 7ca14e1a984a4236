//! Error types for the admin adapter
//!
//! Every variant is flattened to its `Display` text at the gateway boundary,
//! so the messages here are what callers ultimately see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    /// Connection refused, DNS failure, timeout
    #[error("{0}")]
    Transport(String),

    /// Non-2xx answer from the admin API
    #[error("Caddy responded {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx answer whose body is not valid JSON
    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid route index: {0}")]
    InvalidRouteIndex(String),

    #[error("No HTTP servers configured")]
    NoServers,

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        AdminError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
