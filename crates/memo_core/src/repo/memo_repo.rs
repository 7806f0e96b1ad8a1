//! `MemoRepository` adapter composing a content store with one index backend.
//!
//! # Responsibility
//! - Route CRUD calls to `ContentStore` + `IndexStore`.
//! - Filter orphans out of every read.
//! - Serialize mutating calls behind an instance-owned gate.
//!
//! # Invariants
//! - The gate is acquired before any side effect; dropping the caller's
//!   future while waiting for it leaves storage untouched.
//! - Once the gate is held, the mutation runs to completion on its own task
//!   even if the caller stops polling.
//! - Reads never take the gate.
//! - `update` only accepts the direct successor of the stored snapshot:
//!   version + 1 and a non-decreasing `updated_at`.
//! - A failed index write rolls the content file back to its previous state.

use super::{MemoRepository, RepoError, RepoResult};
use crate::config::StorageLayout;
use crate::content::ContentStore;
use crate::index::{IndexStore, MemoSummary, OrderedListIndex, SqliteIndex};
use crate::model::memo::{Memo, MemoId};
use async_trait::async_trait;
use log::{error, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

struct Shared<I> {
    content: ContentStore,
    index: I,
}

/// Repository over `<root>/content/*.md` plus an index backend `I`.
pub struct IndexedMemoRepository<I: IndexStore> {
    shared: Arc<Shared<I>>,
    write_gate: Arc<Mutex<()>>,
}

impl<I: IndexStore> IndexedMemoRepository<I> {
    pub fn new(layout: StorageLayout, index: I) -> Self {
        Self {
            shared: Arc::new(Shared {
                content: ContentStore::new(layout),
                index,
            }),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.shared.content
    }

    pub fn index(&self) -> &I {
        &self.shared.index
    }

    /// Runs one mutation under the write gate on a detached task.
    async fn mutate<T, F, Fut>(&self, operation: &'static str, work: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Shared<I>>) -> Fut + Send + 'static,
        Fut: Future<Output = RepoResult<T>> + Send + 'static,
    {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;
        let shared = Arc::clone(&self.shared);
        let backend = shared.index.backend_name();
        let handle = tokio::spawn(async move {
            let started_at = Instant::now();
            let result = work(shared).await;
            match &result {
                Ok(_) => info!(
                    "event={} module=repo backend={} status=ok duration_ms={}",
                    operation,
                    backend,
                    started_at.elapsed().as_millis()
                ),
                Err(err) => error!(
                    "event={} module=repo backend={} status=error duration_ms={} error={}",
                    operation,
                    backend,
                    started_at.elapsed().as_millis(),
                    err
                ),
            }
            drop(gate);
            result
        });
        handle.await?
    }
}

impl IndexedMemoRepository<OrderedListIndex> {
    /// Generation 4 repository: content files + `content/index.json`.
    pub fn ordered_list(layout: StorageLayout) -> Self {
        let index = OrderedListIndex::new(layout.clone());
        Self::new(layout, index)
    }
}

impl IndexedMemoRepository<SqliteIndex> {
    /// Generation 5 repository: content files + `memos.db`.
    pub async fn relational(layout: StorageLayout) -> RepoResult<Self> {
        let index = SqliteIndex::open(layout.clone()).await?;
        Ok(Self::new(layout, index))
    }
}

#[async_trait]
impl<I: IndexStore> MemoRepository for IndexedMemoRepository<I> {
    async fn get_all(&self) -> RepoResult<Vec<Memo>> {
        self.shared.index.load_all(&self.shared.content).await
    }

    async fn list(&self) -> RepoResult<Vec<MemoSummary>> {
        let summaries = self.shared.index.get_all().await?;
        let mut visible = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if self.shared.content.exists(summary.id).await {
                visible.push(summary);
            }
        }
        Ok(visible)
    }

    async fn get_by_id(&self, id: MemoId) -> RepoResult<Option<Memo>> {
        self.shared.index.load(&self.shared.content, id).await
    }

    async fn add(&self, memo: &Memo) -> RepoResult<()> {
        let memo = memo.clone();
        self.mutate("memo_add", move |shared| async move {
            if shared.index.contains(memo.id()).await? {
                return Err(RepoError::AlreadyExists(memo.id()));
            }
            shared.content.save(&memo).await?;
            if let Err(err) = shared.index.insert(&memo).await {
                let _ = shared.content.delete(memo.id()).await;
                return Err(err);
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, memo: &Memo) -> RepoResult<()> {
        let memo = memo.clone();
        self.mutate("memo_update", move |shared| async move {
            let stored = shared
                .index
                .load(&shared.content, memo.id())
                .await?
                .ok_or(RepoError::NotFound(memo.id()))?;
            if memo.version() != stored.version() + 1 || memo.updated_at() < stored.updated_at() {
                return Err(RepoError::Conflict {
                    id: memo.id(),
                    stored_version: stored.version(),
                    attempted_version: memo.version(),
                });
            }

            shared.content.save(&memo).await?;
            if let Err(err) = shared.index.update(&memo).await {
                if let Err(restore_err) = shared.content.save(&stored).await {
                    error!(
                        "event=memo_update module=repo status=error error_code=restore_failed id={} error={}",
                        memo.id(),
                        restore_err
                    );
                }
                return Err(err);
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: MemoId) -> RepoResult<bool> {
        self.mutate("memo_delete", move |shared| async move {
            let removed_file = shared.content.delete(id).await?;
            let removed_entry = shared.index.remove(id).await?;
            Ok(removed_file || removed_entry)
        })
        .await
    }
}
