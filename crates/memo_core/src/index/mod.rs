//! Memo catalog backends.
//!
//! # Responsibility
//! - Define the `IndexStore` contract shared by both catalog backends.
//! - Keep identity, ordering and searchable metadata apart from memo bodies.
//!
//! # Invariants
//! - Backends share only this contract, never an internal representation.
//! - `get_all` never fails on a single bad record; the record is skipped.
//!
//! # See also
//! - `ordered_list` for the generation 4 `index.json` list.
//! - `sqlite` for the generation 5 relational catalog.

use crate::config::StorageLayout;
use crate::content::ContentStore;
use crate::model::memo::{Memo, MemoId, SyncStatus};
use crate::repo::RepoResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod ordered_list;
pub mod sqlite;

pub use ordered_list::OrderedListIndex;
pub use sqlite::SqliteIndex;

/// Catalog metadata for one memo (no body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoSummary {
    pub id: MemoId,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub sync_status: SyncStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Content file path relative to the storage root.
    pub file_path: String,
}

impl MemoSummary {
    pub fn from_memo(memo: &Memo, layout: &StorageLayout) -> Self {
        Self {
            id: memo.id(),
            title: memo.title().to_string(),
            preview: memo.preview().to_string(),
            tags: memo.tags().to_vec(),
            is_pinned: memo.is_pinned(),
            created_at: memo.created_at(),
            updated_at: memo.updated_at(),
            version: memo.version(),
            sync_status: memo.sync_status(),
            deleted_at: memo.deleted_at(),
            file_path: layout.relative_content_file(memo.id()),
        }
    }

    /// Loads the body and overlays the catalog bookkeeping. `None` for orphans.
    pub(crate) async fn resolve(&self, content: &ContentStore) -> Option<Memo> {
        content
            .try_load(self.id)
            .await
            .map(|memo| memo.with_bookkeeping(self.version, self.sync_status, self.deleted_at))
    }
}

/// Async catalog contract.
#[async_trait]
pub trait IndexStore: Send + Sync + 'static {
    /// Short backend name used in log events.
    fn backend_name(&self) -> &'static str;

    /// Returns catalog entries in backend order.
    async fn get_all(&self) -> RepoResult<Vec<MemoSummary>>;

    async fn get(&self, id: MemoId) -> RepoResult<Option<MemoSummary>>;

    /// Registers a new memo. Existing ids are left in place.
    async fn insert(&self, memo: &Memo) -> RepoResult<()>;

    /// Refreshes metadata for an existing memo; `NotFound` when absent.
    async fn update(&self, memo: &Memo) -> RepoResult<()>;

    /// Returns whether an entry was removed.
    async fn remove(&self, id: MemoId) -> RepoResult<bool>;

    async fn contains(&self, id: MemoId) -> RepoResult<bool>;

    /// Raw entry count, orphans included.
    async fn count(&self) -> RepoResult<usize>;

    /// Full snapshots in backend order, orphans skipped.
    async fn load_all(&self, content: &ContentStore) -> RepoResult<Vec<Memo>> {
        let summaries = self.get_all().await?;
        let mut memos = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            if let Some(memo) = summary.resolve(content).await {
                memos.push(memo);
            }
        }
        Ok(memos)
    }

    /// Full snapshot for one entry; `None` when unindexed or orphaned.
    async fn load(&self, content: &ContentStore, id: MemoId) -> RepoResult<Option<Memo>> {
        match self.get(id).await? {
            Some(summary) => Ok(summary.resolve(content).await),
            None => Ok(None),
        }
    }
}
