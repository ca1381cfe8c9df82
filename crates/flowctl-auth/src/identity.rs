//! Validated tenant/client identity and normalized scope sets.

use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

const TENANT_ALIASES: [&str; 3] = ["common", "organizations", "consumers"];

/// Public client identity within a directory tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    tenant: String,
    client_id: String,
}

impl ClientIdentity {
    /// Validate a tenant and client id pair.
    ///
    /// The tenant may be a GUID, a domain name, or one of the multi-tenant
    /// aliases; the client id must be a GUID.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when either value is empty or malformed.
    pub fn new(tenant: &str, client_id: &str) -> AuthResult<Self> {
        let tenant = tenant.trim();
        let client_id = client_id.trim();

        if tenant.is_empty() {
            return Err(AuthError::config("tenant", "is required"));
        }
        if !is_valid_tenant(tenant) {
            return Err(AuthError::config(
                "tenant",
                format!("'{tenant}' is neither a GUID nor a domain name"),
            ));
        }
        if client_id.is_empty() {
            return Err(AuthError::config("client id", "is required"));
        }
        let client_uuid = Uuid::parse_str(client_id).map_err(|_| {
            AuthError::config("client id", format!("'{client_id}' is not a GUID"))
        })?;

        Ok(Self {
            tenant: tenant.to_ascii_lowercase(),
            client_id: client_uuid.hyphenated().to_string(),
        })
    }

    /// Normalized tenant.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Normalized client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Key under which tokens for this identity and `scopes` are cached.
    #[must_use]
    pub fn cache_key(&self, scopes: &ScopeSet) -> String {
        format!("{}|{}|{}", self.client_id, self.tenant, scopes)
    }
}

fn is_valid_tenant(tenant: &str) -> bool {
    if Uuid::parse_str(tenant).is_ok() || TENANT_ALIASES.contains(&tenant) {
        return true;
    }
    tenant.contains('.')
        && !tenant.starts_with('.')
        && !tenant.ends_with('.')
        && !tenant.contains("..")
        && tenant
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.')
}

/// Sorted, de-duplicated set of OAuth scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Normalize a list of scopes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when no non-empty scope remains.
    pub fn new<I, S>(scopes: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = scopes
            .into_iter()
            .flat_map(|scope| {
                scope
                    .as_ref()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        normalized.sort();
        normalized.dedup();
        if normalized.is_empty() {
            return Err(AuthError::config("scopes", "must name at least one scope"));
        }
        Ok(Self(normalized))
    }

    /// Scopes plus `offline_access`, as sent to the provider so that a
    /// refresh token is issued.
    #[must_use]
    pub fn request_string(&self) -> String {
        let mut scopes = self.0.clone();
        if !scopes.iter().any(|scope| scope == "offline_access") {
            scopes.push("offline_access".to_string());
        }
        scopes.join(" ")
    }
}

impl Display for ScopeSet {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0.join(" "))
    }
}
