//! Layered configuration loading: overrides, then environment, then defaults.
//!
//! # Design
//! - Lookups go through an injectable function so tests never touch the
//!   process environment.
//! - Empty values count as absent; a blank `DATAVERSE_CLIENT_ID=` line in a
//!   `.env` file is reported as missing rather than sent to the provider.

use std::path::PathBuf;

use url::Url;

use crate::defaults::{
    AUTHORITY_URL_KEY, BACKUP_DIR_KEY, CLIENT_ID_KEY, DEFAULT_AUTHORITY_URL, DEFAULT_BACKUP_DIR,
    DEFAULT_EDITOR, DEFAULT_FLOW_API_URL, DEFAULT_POWERAPPS_API_URL, DEFAULT_SCOPE,
    ENVIRONMENT_ID_FALLBACK_KEY, ENVIRONMENT_ID_KEY, FLOW_API_URL_KEY, POWERAPPS_API_URL_KEY,
    SCOPE_KEY, TENANT_ID_KEY, TOKEN_CACHE_KEY,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConfigOverrides, ServiceEndpoints, Settings};

/// Resolves [`Settings`] from overrides and a key lookup.
pub struct ConfigLoader<F> {
    lookup: F,
}

impl ConfigLoader<fn(&str) -> Option<String>> {
    /// Loader backed by the process environment.
    ///
    /// Call [`load_dotenv`] first to fold a local `.env` file into the
    /// environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self {
            lookup: |key| std::env::var(key).ok(),
        }
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Loader backed by an arbitrary lookup function.
    pub const fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Resolve settings, applying `overrides` ahead of looked-up values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a service URL cannot be parsed.
    /// Missing identity values are not an error here; see
    /// [`Settings::require_api`].
    pub fn load(&self, overrides: &ConfigOverrides) -> ConfigResult<Settings> {
        let tenant_id = pick(overrides.tenant_id.as_deref(), self.get(TENANT_ID_KEY));
        let client_id = pick(overrides.client_id.as_deref(), self.get(CLIENT_ID_KEY));
        let environment_id = pick(
            overrides.environment_id.as_deref(),
            self.get(ENVIRONMENT_ID_KEY)
                .or_else(|| self.get(ENVIRONMENT_ID_FALLBACK_KEY)),
        );

        let flow_api = parse_service_url(
            FLOW_API_URL_KEY,
            &pick(overrides.flow_api_url.as_deref(), self.get(FLOW_API_URL_KEY))
                .unwrap_or_else(|| DEFAULT_FLOW_API_URL.to_string()),
        )?;
        let powerapps_api = parse_service_url(
            POWERAPPS_API_URL_KEY,
            &pick(
                overrides.powerapps_api_url.as_deref(),
                self.get(POWERAPPS_API_URL_KEY),
            )
            .unwrap_or_else(|| DEFAULT_POWERAPPS_API_URL.to_string()),
        )?;
        let authority = parse_service_url(
            AUTHORITY_URL_KEY,
            &self
                .get(AUTHORITY_URL_KEY)
                .unwrap_or_else(|| DEFAULT_AUTHORITY_URL.to_string()),
        )?;

        let token_cache_path = overrides
            .token_cache_path
            .clone()
            .or_else(|| self.get(TOKEN_CACHE_KEY).map(PathBuf::from));
        let backup_dir = overrides
            .backup_dir
            .clone()
            .or_else(|| self.get(BACKUP_DIR_KEY).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        let editor = self
            .get("VISUAL")
            .or_else(|| self.get("EDITOR"))
            .unwrap_or_else(|| DEFAULT_EDITOR.to_string());

        Ok(Settings {
            tenant_id,
            client_id,
            environment_id,
            endpoints: ServiceEndpoints {
                flow_api,
                powerapps_api,
                authority,
            },
            scope: self
                .get(SCOPE_KEY)
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            token_cache_path,
            backup_dir,
            editor,
        })
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Fold a `.env` file from the working directory (or its ancestors) into
/// the process environment. Existing variables are not overwritten.
///
/// # Errors
///
/// Returns [`ConfigError::EnvFile`] when a `.env` file exists but is
/// malformed. A missing file is not an error.
pub fn load_dotenv() -> ConfigResult<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env file");
            Ok(Some(path))
        }
        Err(err) if err.not_found() => Ok(None),
        Err(source) => Err(ConfigError::EnvFile {
            path: PathBuf::from(".env"),
            source,
        }),
    }
}

fn pick(preferred: Option<&str>, fallback: Option<String>) -> Option<String> {
    preferred
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or(fallback)
}

fn parse_service_url(key: &'static str, raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "URL scheme must be http or https".to_string(),
        });
    }
    Ok(url)
}
