#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub)]

//! Delegated authentication for the flowctl CLI.
//!
//! Layout:
//! - `identity.rs`: validated tenant/client identity and scope sets
//! - `token.rs`: access tokens and cached credential records
//! - `cache.rs`: the on-disk token cache (atomic rename on save)
//! - `provider.rs`: the `IdentityProvider` seam and its HTTP implementation
//! - `manager.rs`: `CredentialManager` (cache lookup, refresh, device-code flow)

pub mod cache;
pub mod error;
pub mod identity;
pub mod manager;
pub mod provider;
pub mod token;

pub use cache::TokenCache;
pub use error::{AuthError, AuthResult};
pub use identity::{ClientIdentity, ScopeSet};
pub use manager::CredentialManager;
pub use provider::{
    DeviceCodeChallenge, HttpIdentityProvider, IdentityProvider, PollOutcome, TokenGrant,
};
pub use token::{AccessToken, CachedToken, TokenSource};
