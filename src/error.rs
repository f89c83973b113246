//! Error types for the chat relay
//!
//! One error enum covers process-level failures (bind, runtime, config) and
//! session-level failures (banner, handshake, socket I/O).

use std::path::PathBuf;

/// Main error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    // === Process Errors ===

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to build Tokio runtime: {0}")]
    Runtime(std::io::Error),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    // === Session Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to send banner {path}: {source}")]
    Banner {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Connection closed before a name was sent")]
    HandshakeAborted,
}

/// Result type alias using ChatError
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
