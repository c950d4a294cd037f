//! Transport error types.

use thiserror::Error;

/// Errors surfaced by the REST and engine transports.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unreadable credential file '{path}': {source}")]
    CredentialFile {
        path: String,
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Retries exhausted after {attempts} attempts: last status {status}")]
    RetriesExhausted { attempts: u32, status: u16 },

    #[error("Websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Engine returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Engine session closed before a response arrived")]
    EngineClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for transport operations.
pub type SessionResult<T> = Result<T, SessionError>;
