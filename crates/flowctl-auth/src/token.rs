//! Access tokens handed to callers and the records persisted in the cache.

use std::fmt::{self, Debug, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens expiring within this window are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Where an [`AccessToken`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Served from the persistent cache without contacting the provider.
    Cache,
    /// Obtained silently with a cached refresh token.
    Refresh,
    /// Obtained through an interactive device-code sign-in.
    DeviceCode,
}

/// Bearer credential accepted by the management API.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
    source: TokenSource,
}

impl AccessToken {
    pub(crate) const fn new(value: String, expires_at: DateTime<Utc>, source: TokenSource) -> Self {
        Self {
            value,
            expires_at,
            source,
        }
    }

    /// Raw bearer value. Never log this.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Instant after which the token is no longer accepted.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// How this token was obtained.
    #[must_use]
    pub const fn source(&self) -> TokenSource {
        self.source
    }
}

impl Debug for AccessToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

/// Credential record persisted in the token cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// Bearer value.
    pub access_token: String,
    /// Long-lived token used for silent renewal, if the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`.
    pub expires_at: DateTime<Utc>,
    /// Tenant the token was issued for.
    pub tenant: String,
    /// Public client that requested it.
    pub client_id: String,
    /// Space separated scopes the token covers.
    pub scope: String,
}

impl CachedToken {
    /// Whether the access token is still usable at `now`, allowing for clock skew.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }

    pub(crate) fn to_access_token(&self, source: TokenSource) -> AccessToken {
        AccessToken::new(self.access_token.clone(), self.expires_at, source)
    }
}

impl Debug for CachedToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish()
    }
}
