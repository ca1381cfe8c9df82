//! Error types for credential acquisition.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for credential acquisition and caching.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Tenant, client id or scopes are missing or malformed.
    #[error("invalid credential configuration: {field} {reason}")]
    Config {
        /// Offending input.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// The device code expired before the operator finished signing in.
    #[error("the sign-in code expired before authentication completed; run the command again")]
    Expired,
    /// The operator (or directory policy) declined the sign-in.
    #[error("sign-in was declined: {description}")]
    Denied {
        /// Provider supplied explanation.
        description: String,
    },
    /// The identity provider rejected the request with an OAuth error.
    #[error("identity provider rejected {operation} ({code}): {description}")]
    Provider {
        /// Operation identifier.
        operation: &'static str,
        /// OAuth error code, e.g. `invalid_grant`.
        code: String,
        /// Provider supplied explanation.
        description: String,
    },
    /// The identity provider answered with a server error.
    #[error("identity provider unavailable during {operation} (status {status})")]
    Unavailable {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status returned.
        status: u16,
    },
    /// The request never produced a response.
    #[error("identity provider request failed during {operation}")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source transport error.
        source: reqwest::Error,
    },
    /// The provider answered with a payload that could not be understood.
    #[error("unexpected identity provider response during {operation}: {detail}")]
    Protocol {
        /// Operation identifier.
        operation: &'static str,
        /// What was wrong with the payload.
        detail: String,
    },
    /// Reading or writing the token cache failed.
    #[error("token cache {operation} failed for {}", .path.display())]
    CacheIo {
        /// Operation identifier.
        operation: &'static str,
        /// Cache file involved.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The token cache file exists but is not readable as a cache.
    #[error("token cache at {} is corrupt", .path.display())]
    CacheFormat {
        /// Cache file involved.
        path: PathBuf,
        /// Source decoding error.
        source: serde_json::Error,
    },
    /// No platform cache directory exists and no explicit path was given.
    #[error("no cache directory available; set FLOWCTL_TOKEN_CACHE to a writable path")]
    CacheLocation,
}

impl AuthError {
    /// Whether polling may continue after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Unavailable { .. })
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
