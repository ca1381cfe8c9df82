//! `auth` commands and token acquisition for API commands.

use chrono::Utc;
use flowctl_auth::{
    AccessToken, ClientIdentity, CredentialManager, HttpIdentityProvider, ScopeSet, TokenCache,
};
use flowctl_config::Settings;

use crate::cli::{AuthLogoutArgs, OutputFormat};
use crate::client::{CliError, CliResult};
use crate::output::{TokenStatusRow, render_token_status};
use crate::workflow::interrupt::Interrupt;

/// Token for the management API: cached, silently renewed, or obtained
/// through an interactive device-code sign-in.
pub(crate) async fn acquire_api_token(settings: &Settings) -> CliResult<AccessToken> {
    let (tenant, client_id) = settings.require_identity()?;
    let manager = credential_manager(settings)?;
    let token = manager
        .acquire_token(tenant, client_id, &[settings.scope.as_str()])
        .await?;
    tracing::debug!(source = ?token.source(), expires_at = %token.expires_at(), "access token ready");
    Ok(token)
}

pub(crate) async fn handle_auth_login(settings: &Settings, interrupt: &Interrupt) -> CliResult<()> {
    let (identity, scopes) = resolve_identity(settings)?;
    let manager = credential_manager(settings)?;
    let token = tokio::select! {
        token = manager.sign_in(&identity, &scopes) => token?,
        () = interrupt.wait() => return Err(CliError::Interrupted { outcome_unknown: false }),
    };
    println!(
        "Signed in (tenant: {}, client: {}); token valid until {}",
        identity.tenant(),
        identity.client_id(),
        token.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

/// Report cached credentials. Works offline and without identity settings.
pub(crate) fn handle_auth_status(settings: &Settings, format: OutputFormat) -> CliResult<()> {
    let cache = token_cache(settings)?;
    let entries = cache.entries()?;
    let now = Utc::now();
    let rows: Vec<TokenStatusRow<'_>> = entries
        .iter()
        .map(|(_, token)| TokenStatusRow::new(token, now))
        .collect();
    render_token_status(&rows, format)?;
    if format == OutputFormat::Table {
        eprintln!("cache: {}", cache.path().display());
    }
    Ok(())
}

pub(crate) fn handle_auth_logout(settings: &Settings, args: &AuthLogoutArgs) -> CliResult<()> {
    if args.all {
        let cache = token_cache(settings)?;
        if cache.clear()? {
            println!("Removed all cached credentials");
        } else {
            println!("No cached credentials");
        }
        return Ok(());
    }

    let (identity, scopes) = resolve_identity(settings)?;
    let manager = credential_manager(settings)?;
    if manager.sign_out(&identity, &scopes)? {
        println!(
            "Signed out (tenant: {}, client: {})",
            identity.tenant(),
            identity.client_id()
        );
    } else {
        println!("No cached credential for this tenant and client");
    }
    Ok(())
}

fn resolve_identity(settings: &Settings) -> CliResult<(ClientIdentity, ScopeSet)> {
    let (tenant, client_id) = settings.require_identity()?;
    let identity = ClientIdentity::new(tenant, client_id)?;
    let scopes = ScopeSet::new([settings.scope.as_str()])?;
    Ok((identity, scopes))
}

fn token_cache(settings: &Settings) -> CliResult<TokenCache> {
    match &settings.token_cache_path {
        Some(path) => Ok(TokenCache::new(path.clone())),
        None => Ok(TokenCache::at_default_location()?),
    }
}

fn credential_manager(settings: &Settings) -> CliResult<CredentialManager<HttpIdentityProvider>> {
    let provider = HttpIdentityProvider::new(settings.endpoints.authority.clone())?;
    Ok(CredentialManager::new(provider, token_cache(settings)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flowctl_auth::CachedToken;
    use flowctl_config::ServiceEndpoints;
    use httpmock::prelude::*;
    use reqwest::Url;
    use serde_json::json;
    use std::path::{Path, PathBuf};

    const TENANT: &str = "contoso.onmicrosoft.com";
    const CLIENT_ID: &str = "1b730954-1685-4b74-9bfd-dac224a7b894";
    const SCOPE: &str = "https://service.flow.microsoft.com/.default";

    fn settings(authority: &str, cache: &Path, identity: bool) -> Settings {
        let url = |raw: &str| Url::parse(raw).expect("valid URL");
        Settings {
            tenant_id: identity.then(|| TENANT.to_string()),
            client_id: identity.then(|| CLIENT_ID.to_string()),
            environment_id: None,
            endpoints: ServiceEndpoints {
                flow_api: url("https://api.flow.example"),
                powerapps_api: url("https://api.powerapps.example"),
                authority: url(authority),
            },
            scope: SCOPE.to_string(),
            token_cache_path: Some(cache.to_path_buf()),
            backup_dir: PathBuf::from("."),
            editor: "vi".into(),
        }
    }

    fn cached(expires_in: Duration) -> CachedToken {
        CachedToken {
            access_token: "cached-token".into(),
            refresh_token: None,
            expires_at: Utc::now() + expires_in,
            tenant: TENANT.into(),
            client_id: CLIENT_ID.into(),
            scope: SCOPE.into(),
        }
    }

    fn cache_key() -> String {
        let identity = ClientIdentity::new(TENANT, CLIENT_ID).expect("identity");
        let scopes = ScopeSet::new([SCOPE]).expect("scopes");
        identity.cache_key(&scopes)
    }

    #[tokio::test]
    async fn fresh_cached_token_needs_no_provider() {
        let server = MockServer::start_async().await;
        let any = server.mock(|when, then| {
            when.any_request();
            then.status(500);
        });
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_path = dir.path().join("cache.json");
        TokenCache::new(&cache_path)
            .store(&cache_key(), cached(Duration::hours(1)))
            .expect("seed cache");

        let token = acquire_api_token(&settings(&server.base_url(), &cache_path, true))
            .await
            .expect("token");
        assert_eq!(token.secret(), "cached-token");
        any.assert_calls(0);
    }

    #[tokio::test]
    async fn missing_identity_fails_before_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = acquire_api_token(&settings(
            "https://login.example",
            &dir.path().join("cache.json"),
            false,
        ))
        .await
        .expect_err("identity required");
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("DATAVERSE_CLIENT_ID"));
    }

    #[tokio::test]
    async fn login_runs_device_code_flow_and_caches_result() {
        let server = MockServer::start_async().await;
        let device = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/{TENANT}/oauth2/v2.0/devicecode"))
                .form_urlencoded_tuple("client_id", CLIENT_ID);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "device_code": "device-123",
                    "user_code": "ABCD-EFGH",
                    "verification_uri": "https://microsoft.com/devicelogin",
                    "expires_in": 60,
                    "interval": 1
                }));
        });
        let token = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/{TENANT}/oauth2/v2.0/token"))
                .form_urlencoded_tuple("device_code", "device-123");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "token_type": "Bearer",
                    "access_token": "fresh-token",
                    "refresh_token": "refresh-123",
                    "expires_in": 3600
                }));
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let cache_path = dir.path().join("cache.json");
        handle_auth_login(
            &settings(&server.base_url(), &cache_path, true),
            &Interrupt::new(),
        )
        .await
        .expect("login");

        device.assert_calls(1);
        token.assert_calls(1);
        let stored = TokenCache::new(&cache_path)
            .get(&cache_key())
            .expect("read cache")
            .expect("entry stored");
        assert_eq!(stored.access_token, "fresh-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-123"));
    }

    #[test]
    fn status_reads_cache_without_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_path = dir.path().join("cache.json");
        TokenCache::new(&cache_path)
            .store(&cache_key(), cached(Duration::minutes(-5)))
            .expect("seed cache");

        handle_auth_status(
            &settings("https://login.example", &cache_path, false),
            OutputFormat::Json,
        )
        .expect("status");
    }

    #[test]
    fn logout_removes_only_the_configured_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_path = dir.path().join("cache.json");
        let cache = TokenCache::new(&cache_path);
        cache
            .store(&cache_key(), cached(Duration::hours(1)))
            .expect("seed cache");
        cache
            .store("other|tenant|scope", cached(Duration::hours(1)))
            .expect("seed cache");

        let config = settings("https://login.example", &cache_path, true);
        handle_auth_logout(&config, &AuthLogoutArgs { all: false }).expect("logout");
        let remaining: Vec<String> = cache
            .entries()
            .expect("entries")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(remaining, vec!["other|tenant|scope".to_string()]);

        handle_auth_logout(&config, &AuthLogoutArgs { all: true }).expect("logout all");
        assert!(cache.entries().expect("entries").is_empty());
    }
}
