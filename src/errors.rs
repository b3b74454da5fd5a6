//! Error types shared across the agent subsystem.

use thiserror::Error;

/// Startup/configuration failures. These are fatal and surfaced before any
/// run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnv { var: &'static str },

    #[error("Invalid value for {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },
}

/// Failure to locate JSON in a model response.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No JSON found in model response")]
    NoJson,
}

/// Failures of the generate-code step. All variants fail the owning run and
/// route through the single failure handler.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Model call exceeded timeout ({secs}s)")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("Model output did not match the expected project shape")]
    InvalidShape,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
