//! Repository client error types.

use thiserror::Error;

/// Errors surfaced by the Repository client.
#[derive(Error, Debug)]
pub enum QrsError {
    #[error("Transport error: {0}")]
    Transport(#[from] ctrlq_session::SessionError),

    #[error("Repository rejected {what} with status {status}: {body}")]
    Api {
        what: String,
        status: u16,
        body: String,
    },

    #[error("JSON error for {what}: {source}")]
    Json {
        what: String,
        source: serde_json::Error,
    },

    #[error("{kind} '{name}' not found in repository")]
    NotFound { kind: &'static str, name: String },
}

/// Result type for Repository operations.
pub type QrsResult<T> = Result<T, QrsError>;
