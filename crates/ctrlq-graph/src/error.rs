//! Graph error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by graph queries.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Task {0} is not part of the graph")]
    UnknownTask(Uuid),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
