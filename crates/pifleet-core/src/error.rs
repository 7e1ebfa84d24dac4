//! Error types for the fleet core library.

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by the fleet crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Device identifier does not match the identifier grammar.
    #[error("Invalid device id '{0}': use letters, digits and hyphens, starting with a letter or digit")]
    InvalidDeviceId(String),

    /// Unknown VNC account value.
    #[error("Invalid vnc_account '{0}'")]
    InvalidVncAccount(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
