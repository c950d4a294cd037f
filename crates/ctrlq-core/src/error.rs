//! Centralized error types for the core data model.

use thiserror::Error;

/// Errors raised while building or validating model objects.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid object reference '{0}': expected a GUID or a positive integer")]
    InvalidRef(String),

    #[error("Invalid app reference '{0}': expected a GUID or 'newapp-<n>'")]
    InvalidAppRef(String),

    #[error("Invalid {what} '{value}'")]
    InvalidEnum { what: &'static str, value: String },

    #[error("Invalid increment description '{0}': expected four integers (minutes hours days weeks)")]
    InvalidIncrement(String),

    #[error("Schedule trigger '{name}' expires before it starts")]
    ExpirationBeforeStart { name: String },

    #[error("Composite event '{name}' has no rules")]
    EmptyRuleList { name: String },
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
