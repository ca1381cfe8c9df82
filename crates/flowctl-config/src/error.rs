//! Error types for configuration resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required keys were absent or empty.
    #[error("missing required configuration: {}", .keys.join(", "))]
    Missing {
        /// Every key that must be provided, in a stable order.
        keys: Vec<&'static str>,
    },
    /// A value was present but could not be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Key that failed validation.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The `.env` file exists but could not be parsed.
    #[error("failed to load {}", .path.display())]
    EnvFile {
        /// File that failed to load.
        path: PathBuf,
        /// Source parser error.
        source: dotenvy::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
