//! Error types for the setpace_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for setpace_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Block definition could not be used
    #[error("Plan error: {0}")]
    Plan(String),

    /// A user action was rejected in the current session state.
    /// The session is left untouched.
    #[error("Action rejected: {0}")]
    Action(String),

    /// History collaborator failure
    #[error("History error: {0}")]
    History(String),
}
