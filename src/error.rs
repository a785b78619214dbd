//! Error types for the codelite-remote client

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Session is not running")]
    SessionNotRunning,

    #[error("Failed to resolve target: {0}")]
    TargetResolution(String),

    #[error("Executable not found: {0}")]
    ExecutorNotFound(String),

    #[error("Failed to stage remote script: {0}")]
    Staging(String),

    #[error("Failed to spawn remote process: {0}")]
    Spawn(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Synchronous exec failed: {0}")]
    SyncBridge(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
