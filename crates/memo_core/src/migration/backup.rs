//! Timestamped backup renames for migrated sources.
//!
//! # Invariants
//! - Sources are renamed in place, never copied or deleted.
//! - Names follow `<name>_backup_<yyyyMMddHHmmss><ext>`; a collision inside
//!   the same second appends `_<n>` after the timestamp.

use chrono::{DateTime, Local};
use log::info;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const BACKUP_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Builds the backup path for `source` at `at`, with an optional collision
/// counter.
pub fn backup_path(source: &Path, at: DateTime<Local>, attempt: u32) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|value| format!(".{}", value.to_string_lossy()))
        .unwrap_or_default();
    let stamp = at.format(BACKUP_STAMP_FORMAT);
    let name = if attempt == 0 {
        format!("{stem}_backup_{stamp}{extension}")
    } else {
        format!("{stem}_backup_{stamp}_{attempt}{extension}")
    };
    source.with_file_name(name)
}

/// Renames `source` (file or directory) to a fresh backup name and returns it.
pub async fn rename_to_backup(source: &Path) -> io::Result<PathBuf> {
    let at = Local::now();
    let mut attempt = 0;
    loop {
        let candidate = backup_path(source, at, attempt);
        if !fs::try_exists(&candidate).await? {
            fs::rename(source, &candidate).await?;
            info!(
                "event=migration_backup module=migration status=ok source={} backup={}",
                source.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
        attempt += 1;
    }
}
