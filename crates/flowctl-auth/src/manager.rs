//! Credential acquisition: cache first, then silent refresh, then device code.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::cache::TokenCache;
use crate::error::{AuthError, AuthResult};
use crate::identity::{ClientIdentity, ScopeSet};
use crate::provider::{DeviceCodeChallenge, IdentityProvider, PollOutcome, TokenGrant};
use crate::token::{AccessToken, CachedToken, TokenSource};

/// Seconds added to the polling interval each time the provider answers
/// `slow_down`.
pub const SLOW_DOWN_STEP_SECS: u64 = 5;

const MAX_CHALLENGE_SECS: u64 = 24 * 60 * 60;
const MAX_TOKEN_LIFETIME_SECS: i64 = 366 * 24 * 60 * 60;

type ChallengePresenter = Arc<dyn Fn(&DeviceCodeChallenge) + Send + Sync>;

/// Obtains access tokens on behalf of the operator.
pub struct CredentialManager<P> {
    provider: P,
    cache: TokenCache,
    presenter: ChallengePresenter,
}

impl<P: IdentityProvider> CredentialManager<P> {
    /// Manager that presents device-code instructions on stderr.
    pub fn new(provider: P, cache: TokenCache) -> Self {
        Self {
            provider,
            cache,
            presenter: Arc::new(present_on_stderr),
        }
    }

    /// Replace how device-code instructions are shown to the operator.
    #[must_use]
    pub fn with_presenter(
        mut self,
        presenter: impl Fn(&DeviceCodeChallenge) + Send + Sync + 'static,
    ) -> Self {
        self.presenter = Arc::new(presenter);
        self
    }

    /// Backing cache.
    #[must_use]
    pub const fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a usable token for `tenant`/`client_id`/`scopes`.
    ///
    /// A fresh cached token is returned without contacting the provider. An
    /// expired one is renewed silently when a refresh token is cached;
    /// otherwise an interactive device-code sign-in runs and its result is
    /// cached.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] for missing or malformed inputs.
    /// - [`AuthError::Expired`] when the device code lapses before sign-in.
    /// - [`AuthError::Denied`] when sign-in is declined.
    /// - Provider or transport errors that are not retryable.
    pub async fn acquire_token<S: AsRef<str>>(
        &self,
        tenant: &str,
        client_id: &str,
        scopes: &[S],
    ) -> AuthResult<AccessToken> {
        let identity = ClientIdentity::new(tenant, client_id)?;
        let scopes = ScopeSet::new(scopes)?;
        self.acquire(&identity, &scopes).await
    }

    /// Like [`Self::acquire_token`] for an already validated identity.
    ///
    /// # Errors
    ///
    /// See [`Self::acquire_token`].
    pub async fn acquire(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
    ) -> AuthResult<AccessToken> {
        let key = identity.cache_key(scopes);
        let cached = match self.cache.get(&key) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "token cache unreadable; continuing without it");
                None
            }
        };

        if let Some(entry) = cached {
            if entry.is_fresh_at(Utc::now()) {
                debug!(expires_at = %entry.expires_at, "using cached access token");
                return Ok(entry.to_access_token(TokenSource::Cache));
            }
            if let Some(refresh_token) = entry.refresh_token.as_deref() {
                match self.provider.refresh(identity, scopes, refresh_token).await {
                    Ok(grant) => {
                        info!("renewed access token silently");
                        let token =
                            self.remember(&key, identity, scopes, grant, TokenSource::Refresh);
                        return Ok(token);
                    }
                    Err(err) => {
                        warn!(error = %err, "silent renewal failed; falling back to device code");
                    }
                }
            }
        }

        self.sign_in(identity, scopes).await
    }

    /// Run the device-code sign-in regardless of cache state.
    ///
    /// # Errors
    ///
    /// See [`Self::acquire_token`].
    pub async fn sign_in(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
    ) -> AuthResult<AccessToken> {
        let challenge = self.provider.request_device_code(identity, scopes).await?;
        (self.presenter)(&challenge);
        let grant = self.poll_until_complete(identity, &challenge).await?;
        info!("device code sign-in completed");
        Ok(self.remember(
            &identity.cache_key(scopes),
            identity,
            scopes,
            grant,
            TokenSource::DeviceCode,
        ))
    }

    /// Drop the cached token for one identity. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] when the cache cannot be rewritten.
    pub fn sign_out(&self, identity: &ClientIdentity, scopes: &ScopeSet) -> AuthResult<bool> {
        self.cache.remove(&identity.cache_key(scopes))
    }

    async fn poll_until_complete(
        &self,
        identity: &ClientIdentity,
        challenge: &DeviceCodeChallenge,
    ) -> AuthResult<TokenGrant> {
        let deadline =
            Instant::now() + Duration::from_secs(challenge.expires_in.min(MAX_CHALLENGE_SECS));
        let mut interval = challenge.interval.max(1);
        let mut attempts = 0_u32;

        loop {
            let wait = Duration::from_secs(interval);
            if Instant::now() + wait > deadline {
                return Err(AuthError::Expired);
            }
            sleep(wait).await;
            attempts += 1;

            match self
                .provider
                .poll_device_code(identity, &challenge.device_code)
                .await
            {
                Ok(PollOutcome::Granted(grant)) => {
                    debug!(attempts, "device code granted");
                    return Ok(grant);
                }
                Ok(PollOutcome::Pending) => {}
                Ok(PollOutcome::SlowDown) => {
                    interval += SLOW_DOWN_STEP_SECS;
                    debug!(interval, "provider requested slower polling");
                }
                Ok(PollOutcome::Declined(description)) => {
                    return Err(AuthError::Denied { description });
                }
                Ok(PollOutcome::Expired) => return Err(AuthError::Expired),
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, attempts, "device code poll failed; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn remember(
        &self,
        key: &str,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
        grant: TokenGrant,
        source: TokenSource,
    ) -> AccessToken {
        let lifetime = i64::try_from(grant.expires_in)
            .unwrap_or(MAX_TOKEN_LIFETIME_SECS)
            .min(MAX_TOKEN_LIFETIME_SECS);
        let entry = CachedToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
            tenant: identity.tenant().to_string(),
            client_id: identity.client_id().to_string(),
            scope: scopes.to_string(),
        };
        let token = entry.to_access_token(source);
        if let Err(err) = self.cache.store(key, entry) {
            warn!(error = %err, "could not persist token cache");
        }
        token
    }
}

fn present_on_stderr(challenge: &DeviceCodeChallenge) {
    match &challenge.message {
        Some(message) => eprintln!("{message}"),
        None => eprintln!(
            "To sign in, open {} and enter the code {}",
            challenge.verification_uri, challenge.user_code
        ),
    }
}
