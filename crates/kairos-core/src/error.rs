//! Error types for kairos-core

use crate::identity::CellId;
use thiserror::Error;

/// Core error type
///
/// Mission-model code (task steps, condition predicates, resource samplers)
/// reports failures through this type; the engine attaches the identity of
/// the failing task, condition or resource.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cell not found: {0}")]
    CellNotFound(CellId),

    #[error("State type mismatch for {cell}: expected {expected}")]
    StateTypeMismatch { cell: CellId, expected: &'static str },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Model error: {0}")]
    Model(String),
}

impl Error {
    /// A failure raised by mission-model code
    pub fn model(message: impl Into<String>) -> Self {
        Error::Model(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
