//! Readers and writers for generations 1 to 3.
//!
//! # Responsibility
//! - Decode legacy records into generation-agnostic `Memo` snapshots.
//! - Encode snapshots back into the generation 2 and 3 layouts.
//!
//! # Invariants
//! - A record that fails to decode is skipped with a `warn`, never fatal.
//! - `null` fields read as absent ones.
//! - Ids that are not UUIDs, or repeat an earlier id, get a fresh UUID so no
//!   record is merged away.
//! - Memo bodies and titles never reach the log.

use super::MigrationError;
use crate::config::StorageLayout;
use crate::content::write_atomically;
use crate::model::memo::{
    format_timestamp, now_utc, parse_timestamp, Memo, MemoFields, MemoId, SyncStatus,
};
use chrono::{DateTime, SubsecRound, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Title used for a flat note with no non-blank line.
pub const FLAT_NOTE_FALLBACK_TITLE: &str = "Memo";
/// Upper bound on a title derived from a flat note.
pub const FLAT_NOTE_TITLE_MAX_CHARS: usize = 50;

/// Shared shape of generation 2 array items and generation 3 metadata files.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyRecord {
    #[serde(deserialize_with = "null_as_default")]
    id: String,
    #[serde(deserialize_with = "null_as_default")]
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(deserialize_with = "tag_list")]
    tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    is_pinned: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Accepts `null` for the list and for single entries.
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(tags.into_iter().flatten().flatten().collect())
}

impl LegacyRecord {
    fn from_memo(memo: &Memo, with_content: bool) -> Self {
        Self {
            id: memo.id().to_string(),
            title: memo.title().to_string(),
            content: with_content.then(|| memo.content().to_string()),
            created_at: Some(format_timestamp(memo.created_at())),
            updated_at: Some(format_timestamp(memo.updated_at())),
            tags: memo.tags().to_vec(),
            is_pinned: memo.is_pinned(),
        }
    }

    fn into_memo(self, ids: &mut IdRegistry, body: Option<String>, fallback: DateTime<Utc>) -> Memo {
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback);
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at)
            .max(created_at);
        Memo::from_fields(MemoFields {
            id: ids.claim(&self.id),
            title: self.title,
            content: body.or(self.content).unwrap_or_default(),
            created_at,
            updated_at,
            tags: self.tags,
            is_pinned: self.is_pinned,
            version: 1,
            sync_status: SyncStatus::Synced,
            deleted_at: None,
        })
    }
}

/// Hands out unique ids while reading one legacy source.
#[derive(Default)]
struct IdRegistry {
    seen: HashSet<MemoId>,
}

impl IdRegistry {
    fn claim(&mut self, raw: &str) -> MemoId {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) if self.seen.insert(id) => id,
            Ok(_) => self.fresh("duplicate_id"),
            Err(_) => self.fresh("invalid_id"),
        }
    }

    fn fresh(&mut self, reason: &str) -> MemoId {
        let id = Uuid::new_v4();
        warn!("event=migration_read module=migration status=reassign reason={reason} id={id}");
        self.seen.insert(id);
        id
    }
}

/// Title for a generation 1 note: first non-blank line, trimmed and capped.
pub fn flat_note_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(FLAT_NOTE_TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| FLAT_NOTE_FALLBACK_TITLE.to_string())
}

/// Reads `<root>/memo.txt` as zero or one memo. Blank text is zero memos.
pub(super) async fn read_flat_note(layout: &StorageLayout) -> Result<Vec<Memo>, MigrationError> {
    let path = layout.flat_note_file();
    let bytes = fs::read(&path).await?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let stamp = modified_at(&path).await.unwrap_or_else(now_utc);
    let memo = Memo::from_fields(MemoFields {
        id: Uuid::new_v4(),
        title: flat_note_title(&text),
        content: text,
        created_at: stamp,
        updated_at: stamp,
        tags: Vec::new(),
        is_pinned: false,
        version: 1,
        sync_status: SyncStatus::Synced,
        deleted_at: None,
    });
    Ok(vec![memo])
}

/// Reads `<root>/memos.json`. A file that is not a JSON array fails the
/// read; individual bad items are skipped.
pub(super) async fn read_json_array(layout: &StorageLayout) -> Result<Vec<Memo>, MigrationError> {
    let text = fs::read_to_string(layout.json_array_file()).await?;
    let items: Vec<serde_json::Value> = serde_json::from_str(&text)?;
    let fallback = now_utc();
    let mut ids = IdRegistry::default();
    let mut memos = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<LegacyRecord>(item) {
            Ok(record) => memos.push(record.into_memo(&mut ids, None, fallback)),
            Err(err) => warn!(
                "event=migration_read module=migration generation=2 status=skip position={position} error={err}"
            ),
        }
    }
    Ok(memos)
}

/// Number of items in `<root>/memos.json`; zero when the file is absent.
pub(super) async fn json_array_count(layout: &StorageLayout) -> Result<usize, MigrationError> {
    let path = layout.json_array_file();
    if !fs::try_exists(&path).await? {
        return Ok(0);
    }
    let text = fs::read_to_string(&path).await?;
    let items: Vec<serde_json::Value> = serde_json::from_str(&text)?;
    Ok(items.len())
}

pub(super) async fn write_json_array(
    layout: &StorageLayout,
    memos: &[Memo],
) -> Result<(), MigrationError> {
    let records: Vec<LegacyRecord> = memos
        .iter()
        .map(|memo| LegacyRecord::from_memo(memo, true))
        .collect();
    let json = serde_json::to_string_pretty(&records)?;
    fs::create_dir_all(layout.root()).await?;
    write_atomically(&layout.json_array_file(), json.as_bytes()).await?;
    Ok(())
}

/// Reads `<root>/metadata/*.json` joined with `<root>/notes/<id>.txt`.
/// A missing body reads as empty content.
pub(super) async fn read_split_files(layout: &StorageLayout) -> Result<Vec<Memo>, MigrationError> {
    let fallback = now_utc();
    let mut ids = IdRegistry::default();
    let mut memos = Vec::new();

    let mut entries = fs::read_dir(layout.split_metadata_dir()).await?;
    let mut metadata_files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            metadata_files.push(path);
        }
    }
    metadata_files.sort();

    for path in metadata_files {
        let record = match read_metadata_record(&path).await {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "event=migration_read module=migration generation=3 status=skip path={} error={}",
                    path.display(),
                    err
                );
                continue;
            }
        };

        let key = if record.id.trim().is_empty() {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            record.id.trim().to_string()
        };
        let body_path = layout.split_body_file(&key);
        let body = match fs::read(&body_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "event=migration_read module=migration generation=3 status=degraded reason=missing_body path={}",
                    body_path.display()
                );
                String::new()
            }
            Err(err) => return Err(err.into()),
        };
        memos.push(record.into_memo(&mut ids, Some(body), fallback));
    }
    Ok(memos)
}

async fn read_metadata_record(path: &Path) -> Result<LegacyRecord, MigrationError> {
    let text = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Number of metadata files under `<root>/metadata`; zero when absent.
pub(super) async fn split_files_count(layout: &StorageLayout) -> Result<usize, MigrationError> {
    let dir = layout.split_metadata_dir();
    if !fs::try_exists(&dir).await? {
        return Ok(0);
    }
    let mut entries = fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

pub(super) async fn write_split_files(
    layout: &StorageLayout,
    memos: &[Memo],
) -> Result<(), MigrationError> {
    fs::create_dir_all(layout.split_metadata_dir()).await?;
    fs::create_dir_all(layout.split_body_dir()).await?;
    for memo in memos {
        let key = memo.id().to_string();
        write_atomically(&layout.split_body_file(&key), memo.content().as_bytes()).await?;
        let json = serde_json::to_string_pretty(&LegacyRecord::from_memo(memo, false))?;
        write_atomically(&layout.split_metadata_file(&key), json.as_bytes()).await?;
    }
    Ok(())
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).trunc_subsecs(6))
}
