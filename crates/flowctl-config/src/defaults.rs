//! Environment keys and default endpoints.
//!
//! # Design
//! - Identity keys share names with the companion Dataverse tooling so one
//!   `.env` file serves both.
//! - Service hosts are overridable to point the CLI at sovereign clouds or
//!   test servers.

/// Directory tenant (GUID or verified domain).
pub const TENANT_ID_KEY: &str = "DATAVERSE_TENANT_ID";
/// Public client application id registered in the directory.
pub const CLIENT_ID_KEY: &str = "DATAVERSE_CLIENT_ID";
/// Environment identifier used in management API paths.
pub const ENVIRONMENT_ID_KEY: &str = "DATAVERSE_ENVIRONMENT_ID";
/// Secondary key consulted when [`ENVIRONMENT_ID_KEY`] is unset.
pub const ENVIRONMENT_ID_FALLBACK_KEY: &str = "POWERAUTOMATE_ENVIRONMENT_ID";
/// Override for the flow management API host.
pub const FLOW_API_URL_KEY: &str = "FLOWCTL_FLOW_API_URL";
/// Override for the connector (`PowerApps`) API host.
pub const POWERAPPS_API_URL_KEY: &str = "FLOWCTL_POWERAPPS_API_URL";
/// Override for the identity provider authority.
pub const AUTHORITY_URL_KEY: &str = "FLOWCTL_AUTHORITY_URL";
/// Override for the OAuth scope requested for the management API.
pub const SCOPE_KEY: &str = "FLOWCTL_SCOPE";
/// Override for the token cache file location.
pub const TOKEN_CACHE_KEY: &str = "FLOWCTL_TOKEN_CACHE";
/// Directory receiving pre-mutation backups.
pub const BACKUP_DIR_KEY: &str = "FLOWCTL_BACKUP_DIR";

pub(crate) const DEFAULT_FLOW_API_URL: &str = "https://api.flow.microsoft.com";
pub(crate) const DEFAULT_POWERAPPS_API_URL: &str = "https://api.powerapps.com";
pub(crate) const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub(crate) const DEFAULT_SCOPE: &str = "https://service.flow.microsoft.com/.default";
pub(crate) const DEFAULT_BACKUP_DIR: &str = ".";
pub(crate) const DEFAULT_EDITOR: &str = "vi";
