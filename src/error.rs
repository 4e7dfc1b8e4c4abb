//! Error handling for Baler
//!
//! This module provides error types and result aliases for baler operations.

use std::io;
use thiserror::Error;

/// Errors that can occur in baler operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors related to the durable store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to frame layout and framing contracts
    #[error("Frame error: {0}")]
    Frame(String),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to data corruption
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Errors related to shard mapping
    #[error("Shard error: {0}")]
    Shard(String),

    /// Errors related to shard routing
    #[error("Routing error: {0}")]
    Routing(String),

    /// Operation attempted on a closed registry
    #[error("Frame registry is closed")]
    Closed,

    /// Generic error type for other cases
    #[error("{0}")]
    Other(String),
}

/// Result type for baler operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption(message.into())
    }

    /// Create a new shard error
    pub fn shard(message: impl Into<String>) -> Self {
        Self::Shard(message.into())
    }

    /// Create a new routing error
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a corruption error
    pub fn is_corruption_error(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }

    /// Check if this is a shard mapping error
    pub fn is_shard_error(&self) -> bool {
        matches!(self, Self::Shard(_))
    }

    /// Check if this is a routing error
    pub fn is_routing_error(&self) -> bool {
        matches!(self, Self::Routing(_))
    }

    /// Check if the registry was closed
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Storage(_) => Some("Check if the durable directory exists and is writable".to_string()),
            Self::Io(err) if err.kind() == io::ErrorKind::NotFound => {
                Some("The specified file or directory does not exist".to_string())
            }
            Self::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("You don't have permission to access this file or directory".to_string())
            }
            Self::Config(_) => Some("Review the capacity rules and pattern configuration".to_string()),
            Self::Corruption(_) => {
                Some("A persisted frame failed verification. Remove the damaged file and reload".to_string())
            }
            Self::Shard(_) => {
                Some("Check the shard pattern against the file paths being logged".to_string())
            }
            Self::Routing(_) => {
                Some("Check that the shard ranges cover every shard the mapper can produce".to_string())
            }
            Self::Closed => Some("Open a new registry before writing".to_string()),
            _ => None,
        }
    }
}
