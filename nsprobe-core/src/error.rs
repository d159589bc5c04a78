//! Error types for nsprobe

use thiserror::Error;

/// nsprobe error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Child mode was asked for a namespace that is not registered
    #[error("Unknown namespace to test: {selector}")]
    UnknownSelector {
        /// The rejected selector
        selector: String,
    },

    /// A child process could not be created or waited on
    #[error("Failed to launch '{namespace}' subprocess: {message}")]
    Launch {
        /// Namespace identifier of the child
        namespace: String,
        /// Error message
        message: String,
    },

    /// An OS call made by a probe failed
    #[error("{operation} failed: {message}")]
    Probe {
        /// Operation that failed
        operation: String,
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Build a probe error from any displayable OS error
    pub fn probe(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Probe {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for nsprobe operations
pub type Result<T> = std::result::Result<T, Error>;
