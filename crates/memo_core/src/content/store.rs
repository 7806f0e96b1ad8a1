//! Async file store for memo content files.

use super::front_matter::{parse_memo_file, render_memo_file};
use super::{ContentError, ContentResult};
use crate::config::StorageLayout;
use crate::model::memo::{Memo, MemoId};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use uuid::Uuid;

const TEMP_SUFFIX: &str = "tmp";

/// Reads and writes `<root>/content/<id>.md` files.
#[derive(Debug, Clone)]
pub struct ContentStore {
    layout: StorageLayout,
}

impl ContentStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn path_for(&self, id: MemoId) -> PathBuf {
        self.layout.content_file(id)
    }

    /// Loads one content file from an explicit path.
    ///
    /// # Errors
    /// - `ContentError::Io` when the file cannot be read.
    /// - `ContentError::Parse` when the header is missing or malformed.
    pub async fn load(&self, path: &Path) -> ContentResult<Memo> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|err| ContentError::io(path, err))?;
        parse_memo_file(&text).map_err(|message| ContentError::parse(path, message))
    }

    /// Loads the content file for `id`, rejecting files whose header names a
    /// different memo.
    pub async fn load_by_id(&self, id: MemoId) -> ContentResult<Memo> {
        let path = self.path_for(id);
        let memo = self.load(&path).await?;
        if memo.id() != id {
            return Err(ContentError::parse(
                path,
                format!("header id {} does not match file id {id}", memo.id()),
            ));
        }
        Ok(memo)
    }

    /// Best-effort variant of [`Self::load_by_id`].
    ///
    /// Missing files resolve to `None` silently (orphans); malformed files are
    /// logged and also resolve to `None`.
    pub async fn try_load(&self, id: MemoId) -> Option<Memo> {
        match self.load_by_id(id).await {
            Ok(memo) => Some(memo),
            Err(err) if err.is_not_found() => {
                debug!("event=content_load module=content status=skip reason=orphan memo_id={id}");
                None
            }
            Err(err) => {
                warn!(
                    "event=content_load module=content status=skip reason=unreadable memo_id={id} error={err}"
                );
                None
            }
        }
    }

    /// Writes the memo to its canonical path.
    pub async fn save(&self, memo: &Memo) -> ContentResult<PathBuf> {
        let path = self.path_for(memo.id());
        self.save_to(&path, memo).await?;
        Ok(path)
    }

    /// Writes the memo to `path`.
    ///
    /// The whole file is written to a sibling temp file in one call and then
    /// renamed over the target.
    pub async fn save_to(&self, path: &Path, memo: &Memo) -> ContentResult<()> {
        let started_at = Instant::now();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| ContentError::io(parent, err))?;
        }

        let rendered = render_memo_file(memo);
        let result = write_atomically(path, rendered.as_bytes())
            .await
            .map_err(|err| ContentError::io(path, err));

        match result {
            Ok(()) => {
                info!(
                    "event=content_save module=content status=ok memo_id={} bytes={} duration_ms={}",
                    memo.id(),
                    rendered.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=content_save module=content status=error memo_id={} error={}",
                    memo.id(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Removes the content file for `id`.
    ///
    /// Returns `false` when the file was already absent.
    pub async fn delete(&self, id: MemoId) -> ContentResult<bool> {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ContentError::io(path, err)),
        }
    }

    pub async fn exists(&self, id: MemoId) -> bool {
        fs::try_exists(self.path_for(id)).await.unwrap_or(false)
    }

    /// Lists ids of every `<uuid>.md` file in the content directory.
    ///
    /// A missing directory yields an empty list.
    pub async fn list_ids(&self) -> ContentResult<Vec<MemoId>> {
        let dir = self.layout.content_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ContentError::io(dir, err)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ContentError::io(&dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Writes `bytes` to a sibling temp file in one call, then renames it over
/// `path`. The temp file is removed when either step fails.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);
    let result = match fs::write(&temp_path, bytes).await {
        Ok(()) => fs::rename(&temp_path, path).await,
        Err(err) => Err(err),
    };
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}
