//! Error types for the tensor bridge

use thiserror::Error;

/// Result type for tensor bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tensor bridge operations
#[derive(Error, Debug)]
pub enum Error {
    /// A declared shape cannot be reconciled with observed data
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// No converter factory applies to a tensor given the current table schema
    #[error("{message}")]
    NoConverterAvailable {
        /// Short message suitable for direct display
        message: String,
        /// Long, actionable message suitable for logs or detail views
        long_message: String,
    },

    /// Data violates a tensor input contract (e.g. a missing cell)
    #[error("Invalid network input: {0}")]
    InvalidNetworkInput(String),

    /// A backend produced output that does not match its specification
    #[error("Invalid network output: {0}")]
    InvalidNetworkOutput(String),

    /// A conversion attempted to write past a tensor's declared capacity
    #[error("Buffer overflow: capacity is {capacity} elements, write would require {attempted}")]
    BufferOverflow {
        /// Declared element capacity of the buffer
        capacity: usize,
        /// Element count the write would have needed
        attempted: usize,
    },

    /// A read was attempted past the end of a tensor's filled region
    #[error("Buffer underflow: no more elements to read")]
    BufferUnderflow,

    /// Element or cell type mismatch
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A persisted converter or tensor identifier cannot be resolved
    #[error("Missing extension: no registered entry for identifier '{identifier}'")]
    MissingExtension {
        /// The identifier that failed to resolve
        identifier: String,
    },

    /// A required runtime dependency cannot supply what was asked of it
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Cooperative cancellation was observed between batches
    #[error("Execution cancelled")]
    Cancelled,

    /// Operation is not supported (documented limitation)
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl Error {
    /// Returns the long message for errors that carry one, the display
    /// message otherwise.
    pub fn long_message(&self) -> String {
        match self {
            Error::NoConverterAvailable { long_message, .. } => long_message.clone(),
            other => other.to_string(),
        }
    }
}
