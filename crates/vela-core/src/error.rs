//! Error types and result aliases for Vela.
//!
//! This module defines the shared error types used across all Vela
//! components. Errors are structured for programmatic handling and include
//! context for debugging.

/// The result type used throughout Vela.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Vela core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid asset key was provided.
    #[error("invalid asset key: {message}")]
    InvalidKey {
        /// Description of what made the key invalid.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid-key error with the given message.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
