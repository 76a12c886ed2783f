use thiserror::Error;

use crate::auth::SignError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Validation(String),

    #[error("request failed with HTTP status {status}")]
    Remote {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Transport Error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Protocol Error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Signing Error: {0}")]
    Sign(#[from] SignError),
}

impl CliError {
    /// Argument-level failures get the usage text appended to the diagnostic.
    pub fn needs_help(&self) -> bool {
        matches!(self, CliError::Usage(_) | CliError::Validation(_))
    }
}
