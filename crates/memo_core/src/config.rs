//! Storage root layout.
//!
//! # Responsibility
//! - Derive every on-disk path used by core from a single storage root.
//! - Keep file naming for all five storage generations in one place.
//!
//! # Invariants
//! - The storage root is supplied by the host application and never chosen
//!   by core.
//! - Content files are always `<root>/content/<id>.md`.

use crate::model::memo::MemoId;
use std::path::{Path, PathBuf};

/// Environment variable consulted by [`StorageLayout::from_env`].
pub const STORAGE_ROOT_ENV: &str = "MEMO_STORAGE_ROOT";

const CONTENT_DIR_NAME: &str = "content";
const ORDERED_INDEX_FILE_NAME: &str = "index.json";
const DATABASE_FILE_NAME: &str = "memos.db";
const FLAT_NOTE_FILE_NAME: &str = "memo.txt";
const JSON_ARRAY_FILE_NAME: &str = "memos.json";
const SPLIT_METADATA_DIR_NAME: &str = "metadata";
const SPLIT_BODY_DIR_NAME: &str = "notes";
const CONTENT_FILE_EXTENSION: &str = "md";

/// Index backend selection for [`crate::repo::open_repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// `content/index.json` ordered id list.
    OrderedList,
    /// SQLite catalog in `memos.db`.
    Relational,
}

/// Paths derived from one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads the storage root from `MEMO_STORAGE_ROOT`.
    ///
    /// Returns `None` when the variable is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var(STORAGE_ROOT_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one `<id>.md` file per memo.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join(CONTENT_DIR_NAME)
    }

    pub fn content_file(&self, id: MemoId) -> PathBuf {
        self.content_dir().join(content_file_name(id))
    }

    /// Root-relative content path persisted in `memos.file_path`.
    pub fn relative_content_file(&self, id: MemoId) -> String {
        format!("{CONTENT_DIR_NAME}/{}", content_file_name(id))
    }

    /// Generation 4 ordered id list.
    pub fn ordered_index_file(&self) -> PathBuf {
        self.content_dir().join(ORDERED_INDEX_FILE_NAME)
    }

    /// Generation 5 relational catalog.
    pub fn database_file(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }

    /// Generation 1 single flat note.
    pub fn flat_note_file(&self) -> PathBuf {
        self.root.join(FLAT_NOTE_FILE_NAME)
    }

    /// Generation 2 JSON array of memo records.
    pub fn json_array_file(&self) -> PathBuf {
        self.root.join(JSON_ARRAY_FILE_NAME)
    }

    /// Generation 3 per-memo JSON metadata directory.
    pub fn split_metadata_dir(&self) -> PathBuf {
        self.root.join(SPLIT_METADATA_DIR_NAME)
    }

    pub fn split_metadata_file(&self, id: &str) -> PathBuf {
        self.split_metadata_dir().join(format!("{id}.json"))
    }

    /// Generation 3 per-memo body directory.
    pub fn split_body_dir(&self) -> PathBuf {
        self.root.join(SPLIT_BODY_DIR_NAME)
    }

    pub fn split_body_file(&self, id: &str) -> PathBuf {
        self.split_body_dir().join(format!("{id}.txt"))
    }
}

fn content_file_name(id: MemoId) -> String {
    format!("{id}.{CONTENT_FILE_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::StorageLayout;
    use uuid::Uuid;

    #[test]
    fn layout_derives_paths_under_root() {
        let layout = StorageLayout::new("/data/memos");
        let id = Uuid::nil();
        assert_eq!(
            layout.content_file(id).to_string_lossy(),
            format!("/data/memos/content/{id}.md")
        );
        assert_eq!(
            layout.ordered_index_file().to_string_lossy(),
            "/data/memos/content/index.json"
        );
        assert_eq!(layout.database_file().to_string_lossy(), "/data/memos/memos.db");
        assert_eq!(layout.relative_content_file(id), format!("content/{id}.md"));
    }
}
