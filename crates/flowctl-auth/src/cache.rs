//! Persistent token cache.
//!
//! # Design
//! - One JSON file holds every cached credential, keyed by
//!   [`ClientIdentity::cache_key`](crate::ClientIdentity::cache_key).
//! - Saves re-read the file and merge before writing so concurrent CLI
//!   invocations do not drop each other's entries.
//! - Writes go to a sibling temp file that is renamed over the cache; a
//!   crash mid-save leaves the previous cache intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{AuthError, AuthResult};
use crate::token::CachedToken;

const CACHE_FORMAT_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "token_cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CachedToken>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Token cache stored in a single JSON file.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Cache stored at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache stored in the platform cache directory for flowctl.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheLocation`] when the platform exposes no home
    /// directory.
    pub fn at_default_location() -> AuthResult<Self> {
        let dirs = ProjectDirs::from("", "", "flowctl").ok_or(AuthError::CacheLocation)?;
        Ok(Self::new(dirs.cache_dir().join(CACHE_FILE_NAME)))
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a cached credential.
    ///
    /// A corrupt cache is reported as a miss so that sign-in can replace it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] when the file exists but cannot be read.
    pub fn get(&self, key: &str) -> AuthResult<Option<CachedToken>> {
        Ok(self.read_lenient()?.entries.remove(key))
    }

    /// All cached credentials, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] or [`AuthError::CacheFormat`] when the
    /// file cannot be read or decoded.
    pub fn entries(&self) -> AuthResult<Vec<(String, CachedToken)>> {
        Ok(self.read()?.entries.into_iter().collect())
    }

    /// Insert or replace a credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] when the cache cannot be written.
    pub fn store(&self, key: &str, token: CachedToken) -> AuthResult<()> {
        let mut file = self.read_lenient()?;
        file.entries.insert(key.to_string(), token);
        self.write(&file)
    }

    /// Remove one credential. Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] when the cache cannot be rewritten.
    pub fn remove(&self, key: &str) -> AuthResult<bool> {
        let mut file = self.read_lenient()?;
        if file.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }

    /// Delete the cache file. Returns whether a file existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CacheIo`] when the file cannot be removed.
    pub fn clear(&self) -> AuthResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error("remove", source)),
        }
    }

    fn read(&self) -> AuthResult<CacheFile> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(CacheFile::default()),
            Err(source) => return Err(self.io_error("read", source)),
        };
        serde_json::from_slice(&raw).map_err(|source| AuthError::CacheFormat {
            path: self.path.clone(),
            source,
        })
    }

    fn read_lenient(&self) -> AuthResult<CacheFile> {
        match self.read() {
            Err(AuthError::CacheFormat { path, source }) => {
                warn!(path = %path.display(), error = %source, "ignoring corrupt token cache");
                Ok(CacheFile::default())
            }
            other => other,
        }
    }

    fn write(&self, file: &CacheFile) -> AuthResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|source| self.io_error("create directory", source))?;

        let payload = serde_json::to_vec_pretty(file).map_err(|source| AuthError::CacheFormat {
            path: self.path.clone(),
            source,
        })?;

        let mut temp =
            NamedTempFile::new_in(&parent).map_err(|source| self.io_error("create", source))?;
        restrict_permissions(temp.as_file()).map_err(|source| self.io_error("chmod", source))?;
        temp.write_all(&payload)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| self.io_error("write", source))?;
        temp.persist(&self.path)
            .map_err(|err| self.io_error("rename", err.error))?;
        Ok(())
    }

    fn io_error(&self, operation: &'static str, source: io::Error) -> AuthError {
        AuthError::CacheIo {
            operation,
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
