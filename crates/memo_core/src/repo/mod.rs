//! Repository layer: the CRUD contract consumed by the application.
//!
//! # Responsibility
//! - Define the async `MemoRepository` contract over immutable snapshots.
//! - Compose a `ContentStore` with one `IndexStore` backend.
//!
//! # Invariants
//! - Reads never surface orphans (index entries without a content file).
//! - `update` on a missing memo is `RepoError::NotFound`, never a silent no-op.
//! - `update` from a stale snapshot is `RepoError::Conflict`.
//! - `delete` is idempotent.
//! - Mutating calls on one repository instance never interleave.

use crate::config::{IndexBackend, StorageLayout};
use crate::content::ContentError;
use crate::db::DbError;
use crate::index::{MemoSummary, OrderedListIndex, SqliteIndex};
use crate::model::memo::{Memo, MemoId};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod memo_repo;

pub use memo_repo::IndexedMemoRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for content, index and catalog operations.
#[derive(Debug)]
pub enum RepoError {
    Content(ContentError),
    Db(DbError),
    /// Index file could not be written.
    Io(std::io::Error),
    NotFound(MemoId),
    AlreadyExists(MemoId),
    /// Update built from a snapshot other than the stored one.
    Conflict {
        id: MemoId,
        stored_version: i64,
        attempted_version: i64,
    },
    InvalidData(String),
    /// Background task failed or a connection lock was poisoned.
    Task(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "index io error: {err}"),
            Self::NotFound(id) => write!(f, "memo not found: {id}"),
            Self::AlreadyExists(id) => write!(f, "memo already exists: {id}"),
            Self::Conflict {
                id,
                stored_version,
                attempted_version,
            } => write!(
                f,
                "stale memo snapshot {id}: stored version {stored_version}, attempted {attempted_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted memo data: {message}"),
            Self::Task(message) => write!(f, "storage task failed: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Content(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::NotFound(_)
            | Self::AlreadyExists(_)
            | Self::Conflict { .. }
            | Self::InvalidData(_)
            | Self::Task(_) => None,
        }
    }
}

impl From<ContentError> for RepoError {
    fn from(value: ContentError) -> Self {
        Self::Content(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<tokio::task::JoinError> for RepoError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(value.to_string())
    }
}

/// CRUD contract over immutable memo snapshots.
#[async_trait]
pub trait MemoRepository: Send + Sync {
    /// Returns every resolvable memo in backend order.
    async fn get_all(&self) -> RepoResult<Vec<Memo>>;
    /// Returns catalog metadata only, orphans filtered.
    async fn list(&self) -> RepoResult<Vec<MemoSummary>>;
    async fn get_by_id(&self, id: MemoId) -> RepoResult<Option<Memo>>;
    /// Persists a new memo; `AlreadyExists` when the id is taken.
    async fn add(&self, memo: &Memo) -> RepoResult<()>;
    /// Replaces a stored memo; `NotFound` when it no longer exists, `Conflict`
    /// unless `memo` is the next version of the stored snapshot.
    async fn update(&self, memo: &Memo) -> RepoResult<()>;
    /// Removes a memo. Returns whether anything was removed.
    async fn delete(&self, id: MemoId) -> RepoResult<bool>;

    async fn count(&self) -> RepoResult<usize> {
        Ok(self.list().await?.len())
    }
}

#[async_trait]
impl<T: MemoRepository + ?Sized> MemoRepository for Arc<T> {
    async fn get_all(&self) -> RepoResult<Vec<Memo>> {
        (**self).get_all().await
    }

    async fn list(&self) -> RepoResult<Vec<MemoSummary>> {
        (**self).list().await
    }

    async fn get_by_id(&self, id: MemoId) -> RepoResult<Option<Memo>> {
        (**self).get_by_id(id).await
    }

    async fn add(&self, memo: &Memo) -> RepoResult<()> {
        (**self).add(memo).await
    }

    async fn update(&self, memo: &Memo) -> RepoResult<()> {
        (**self).update(memo).await
    }

    async fn delete(&self, id: MemoId) -> RepoResult<bool> {
        (**self).delete(id).await
    }

    async fn count(&self) -> RepoResult<usize> {
        (**self).count().await
    }
}

/// Opens a repository over `layout` with the selected index backend.
pub async fn open_repository(
    layout: StorageLayout,
    backend: IndexBackend,
) -> RepoResult<Arc<dyn MemoRepository>> {
    match backend {
        IndexBackend::OrderedList => Ok(Arc::new(IndexedMemoRepository::new(
            layout.clone(),
            OrderedListIndex::new(layout),
        ))),
        IndexBackend::Relational => {
            let index = SqliteIndex::open(layout.clone()).await?;
            Ok(Arc::new(IndexedMemoRepository::new(layout, index)))
        }
    }
}
