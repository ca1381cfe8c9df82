//! Pre-mutation snapshots written to the backup directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::document::ResourceDocument;
use crate::client::{CliError, CliResult, ResourceKind};

/// Write `document` as `<dir>/<kind>-<id>-<UTC timestamp>.json`.
///
/// Existing files are never overwritten; a numeric suffix is appended when
/// two snapshots land in the same second.
pub(crate) fn write_backup(
    dir: &Path,
    kind: ResourceKind,
    id: &str,
    document: &ResourceDocument,
    taken_at: DateTime<Utc>,
) -> CliResult<PathBuf> {
    let stem = format!(
        "{kind}-{}-{}",
        sanitize(id),
        taken_at.format("%Y%m%dT%H%M%SZ")
    );
    let contents = document.to_pretty_string()?;

    fs::create_dir_all(dir).map_err(|source| CliError::BackupWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut attempt = 0_u32;
    loop {
        let file_name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}-{attempt}.json")
        };
        let path = dir.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())
                    .and_then(|()| file.sync_all())
                    .map_err(|source| CliError::BackupWrite {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!(path = %path.display(), "backup written");
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => {
                attempt += 1;
            }
            Err(source) => return Err(CliError::BackupWrite { path, source }),
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
