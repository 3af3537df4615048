//! Error types for the runner binary.

use prospector_core::{ApiError, ConfigError};

/// Errors that stop the runner before or during startup.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configuration file could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),

    /// The game server failed its startup health check.
    #[error("game server unavailable: {0}")]
    Unavailable(#[from] ApiError),
}
