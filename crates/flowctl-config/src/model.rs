//! Resolved settings and command-line overrides.

use std::path::PathBuf;

use url::Url;

use crate::defaults::{
    CLIENT_ID_KEY, ENVIRONMENT_ID_FALLBACK_KEY, ENVIRONMENT_ID_KEY, TENANT_ID_KEY,
};
use crate::error::{ConfigError, ConfigResult};

/// Values supplied on the command line; each one wins over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Tenant override.
    pub tenant_id: Option<String>,
    /// Client id override.
    pub client_id: Option<String>,
    /// Environment id override.
    pub environment_id: Option<String>,
    /// Flow management API host override.
    pub flow_api_url: Option<String>,
    /// Connector API host override.
    pub powerapps_api_url: Option<String>,
    /// Token cache location override.
    pub token_cache_path: Option<PathBuf>,
    /// Backup directory override.
    pub backup_dir: Option<PathBuf>,
}

/// Base URLs of the services the CLI talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Flow management API (flows, runs, connections).
    pub flow_api: Url,
    /// Connector API.
    pub powerapps_api: Url,
    /// Identity provider authority (tenant is appended per request).
    pub authority: Url,
}

/// Fully resolved configuration for one invocation.
///
/// Identity and environment fields stay optional here; commands call
/// [`Settings::require_identity`] or [`Settings::require_api`] so that
/// offline commands (`auth status`) work without them.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory tenant.
    pub tenant_id: Option<String>,
    /// Public client id.
    pub client_id: Option<String>,
    /// Target environment.
    pub environment_id: Option<String>,
    /// Service base URLs.
    pub endpoints: ServiceEndpoints,
    /// OAuth scope requested for management API tokens.
    pub scope: String,
    /// Explicit token cache path; `None` selects the platform default.
    pub token_cache_path: Option<PathBuf>,
    /// Directory receiving pre-mutation backups.
    pub backup_dir: PathBuf,
    /// Command used to open documents for interactive editing.
    pub editor: String,
}

impl Settings {
    /// Tenant and client id, or an error naming whichever is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when either identity key is absent.
    pub fn require_identity(&self) -> ConfigResult<(&str, &str)> {
        let missing = self.missing_keys(false);
        if !missing.is_empty() {
            return Err(ConfigError::Missing { keys: missing });
        }
        match (self.tenant_id.as_deref(), self.client_id.as_deref()) {
            (Some(tenant), Some(client)) => Ok((tenant, client)),
            _ => Err(ConfigError::Missing {
                keys: vec![TENANT_ID_KEY, CLIENT_ID_KEY],
            }),
        }
    }

    /// Environment id after checking every key an API call needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] listing all absent keys at once.
    pub fn require_api(&self) -> ConfigResult<&str> {
        let missing = self.missing_keys(true);
        if !missing.is_empty() {
            return Err(ConfigError::Missing { keys: missing });
        }
        self.environment_id
            .as_deref()
            .ok_or(ConfigError::Missing {
                keys: vec![ENVIRONMENT_ID_KEY],
            })
    }

    /// Keys that must still be provided, in a stable order.
    #[must_use]
    pub fn missing_keys(&self, include_environment: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push(CLIENT_ID_KEY);
        }
        if self.tenant_id.is_none() {
            missing.push(TENANT_ID_KEY);
        }
        if include_environment && self.environment_id.is_none() {
            missing.push(ENVIRONMENT_ID_KEY);
            missing.push(ENVIRONMENT_ID_FALLBACK_KEY);
        }
        missing
    }
}
