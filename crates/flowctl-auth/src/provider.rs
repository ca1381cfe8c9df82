//! Identity provider seam and the OAuth 2.0 device authorization client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::identity::{ClientIdentity, ScopeSet};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Instructions the operator follows to complete a device-code sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeChallenge {
    /// Opaque code exchanged while polling.
    pub device_code: String,
    /// Short code the operator types into the verification page.
    pub user_code: String,
    /// Page where the operator signs in.
    pub verification_uri: String,
    /// Lifetime of the challenge, in seconds.
    pub expires_in: u64,
    /// Minimum delay between polls, in seconds.
    pub interval: u64,
    /// Human readable instructions supplied by the provider.
    pub message: Option<String>,
}

/// Credentials issued by a successful grant.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer value.
    pub access_token: String,
    /// Refresh token, present when `offline_access` was granted.
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token`, in seconds.
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of one device-code poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The operator completed sign-in.
    Granted(TokenGrant),
    /// The operator has not finished yet.
    Pending,
    /// The provider asked for a longer polling interval.
    SlowDown,
    /// Sign-in was declined.
    Declined(String),
    /// The device code is no longer valid.
    Expired,
}

/// Operations the credential manager needs from an OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a device authorization request.
    async fn request_device_code(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
    ) -> AuthResult<DeviceCodeChallenge>;

    /// Poll once for the outcome of a device authorization request.
    async fn poll_device_code(
        &self,
        identity: &ClientIdentity,
        device_code: &str,
    ) -> AuthResult<PollOutcome>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
        refresh_token: &str,
    ) -> AuthResult<TokenGrant>;
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_url")]
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        }
    }
}

enum Reply<T> {
    Success(T),
    OAuthError(ErrorResponse),
}

/// Microsoft identity platform client speaking the v2.0 endpoints under
/// `{authority}/{tenant}/oauth2/v2.0/`.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    authority: Url,
}

impl HttpIdentityProvider {
    /// Build a provider for the given authority host.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] when the HTTP client cannot be built.
    pub fn new(authority: Url) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|source| AuthError::Transport {
                operation: "build client",
                source,
            })?;
        Ok(Self::with_client(client, authority))
    }

    /// Build a provider around an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: Client, authority: Url) -> Self {
        Self { client, authority }
    }

    fn endpoint(
        &self,
        operation: &'static str,
        identity: &ClientIdentity,
        leaf: &str,
    ) -> AuthResult<Url> {
        let mut url = self.authority.clone();
        url.path_segments_mut()
            .map_err(|()| AuthError::Protocol {
                operation,
                detail: format!("authority '{}' cannot carry a path", self.authority),
            })?
            .pop_if_empty()
            .extend([identity.tenant(), "oauth2", "v2.0", leaf]);
        Ok(url)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        form: &[(&str, &str)],
    ) -> AuthResult<Reply<T>> {
        debug!(operation, %url, "identity provider request");
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|source| AuthError::Transport { operation, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| AuthError::Transport { operation, source })?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map(Reply::Success)
                .map_err(|err| AuthError::Protocol {
                    operation,
                    detail: err.to_string(),
                });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AuthError::Unavailable {
                operation,
                status: status.as_u16(),
            });
        }
        serde_json::from_str::<ErrorResponse>(&body)
            .map(Reply::OAuthError)
            .map_err(|_| AuthError::Protocol {
                operation,
                detail: format!("status {status} without an OAuth error payload"),
            })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn request_device_code(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
    ) -> AuthResult<DeviceCodeChallenge> {
        const OPERATION: &str = "device code request";
        let url = self.endpoint(OPERATION, identity, "devicecode")?;
        let scope = scopes.request_string();
        let form = [("client_id", identity.client_id()), ("scope", scope.as_str())];

        match self.post_form::<DeviceCodeResponse>(OPERATION, url, &form).await? {
            Reply::Success(response) => Ok(DeviceCodeChallenge {
                device_code: response.device_code,
                user_code: response.user_code,
                verification_uri: response.verification_uri,
                expires_in: response.expires_in,
                interval: response.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                message: response.message,
            }),
            Reply::OAuthError(error) => Err(provider_error(OPERATION, error)),
        }
    }

    async fn poll_device_code(
        &self,
        identity: &ClientIdentity,
        device_code: &str,
    ) -> AuthResult<PollOutcome> {
        const OPERATION: &str = "device code poll";
        let url = self.endpoint(OPERATION, identity, "token")?;
        let form = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", identity.client_id()),
            ("device_code", device_code),
        ];

        match self.post_form::<TokenResponse>(OPERATION, url, &form).await? {
            Reply::Success(response) => Ok(PollOutcome::Granted(response.into())),
            Reply::OAuthError(error) => match error.error.as_str() {
                "authorization_pending" => Ok(PollOutcome::Pending),
                "slow_down" => Ok(PollOutcome::SlowDown),
                "authorization_declined" | "access_denied" => Ok(PollOutcome::Declined(
                    error
                        .error_description
                        .unwrap_or_else(|| "the sign-in request was declined".to_string()),
                )),
                "expired_token" | "code_expired" => Ok(PollOutcome::Expired),
                _ => Err(provider_error(OPERATION, error)),
            },
        }
    }

    async fn refresh(
        &self,
        identity: &ClientIdentity,
        scopes: &ScopeSet,
        refresh_token: &str,
    ) -> AuthResult<TokenGrant> {
        const OPERATION: &str = "token refresh";
        let url = self.endpoint(OPERATION, identity, "token")?;
        let scope = scopes.request_string();
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", identity.client_id()),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];

        match self.post_form::<TokenResponse>(OPERATION, url, &form).await? {
            Reply::Success(response) => Ok(response.into()),
            Reply::OAuthError(error) => Err(provider_error(OPERATION, error)),
        }
    }
}

fn provider_error(operation: &'static str, error: ErrorResponse) -> AuthError {
    AuthError::Provider {
        operation,
        description: error
            .error_description
            .unwrap_or_else(|| "no description supplied".to_string()),
        code: error.error,
    }
}
