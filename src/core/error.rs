//! Error taxonomy for discovery and status queries.
//!
//! Malformed *data* (foreign keys, bad identifiers) is filtered out and never
//! becomes an error. Only infrastructure and configuration problems do.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the catalog, scanner and status aggregator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpiflowError {
    /// A storage, job or workflow API could not be reached or rejected the call
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A user-supplied glob could not be compiled
    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },
}

impl EpiflowError {
    pub fn backend(backend: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout(backend: impl Into<String>, after: Duration) -> Self {
        Self::backend(backend, format!("call timed out after {:?}", after))
    }

    /// Process exit code for this error class
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::BackendUnavailable { .. } => 1,
            Self::Configuration(_) | Self::InvalidFilter { .. } => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, EpiflowError>;
