//! Ordered id list stored in `content/index.json`.
//!
//! # Responsibility
//! - Keep memo ordering as an explicit most-recent-insert-first id list.
//! - Resolve catalog metadata by reading each memo's content file.
//!
//! # Invariants
//! - At runtime a missing or corrupt index file reads as an empty list.
//!   `try_read_order` is the strict variant used by storage upgrades.
//! - New ids go to the head; re-inserting an existing id keeps its position.
//! - The index file is rewritten in one call followed by a rename.
//! - Reads are not synchronized with writes; a reader may see the previous
//!   list, never a torn one.

use super::{IndexStore, MemoSummary};
use crate::config::StorageLayout;
use crate::content::{write_atomically, ContentStore};
use crate::model::memo::{Memo, MemoId};
use crate::repo::{RepoError, RepoResult};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// On-disk shape: `{ "order": ["<id>", ...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    order: Vec<String>,
}

/// Generation 4 catalog backend.
#[derive(Debug, Clone)]
pub struct OrderedListIndex {
    content: ContentStore,
    path: PathBuf,
}

impl OrderedListIndex {
    pub fn new(layout: StorageLayout) -> Self {
        let path = layout.ordered_index_file();
        Self {
            content: ContentStore::new(layout),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the id list, degrading to an empty list on any failure.
    pub async fn read_order(&self) -> Vec<MemoId> {
        match self.try_read_order().await {
            Ok(order) => order,
            Err(err) => {
                warn!(
                    "event=index_read module=index backend=ordered_list status=degraded path={} error={}",
                    self.path.display(),
                    err
                );
                Vec::new()
            }
        }
    }

    /// Reads the id list, failing on an unreadable or unparseable file.
    ///
    /// A missing file is an empty list. Invalid and duplicate ids are
    /// skipped.
    pub async fn try_read_order(&self) -> RepoResult<Vec<MemoId>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let file: IndexFile = serde_json::from_str(&text).map_err(|err| {
            RepoError::InvalidData(format!("corrupt index {}: {err}", self.path.display()))
        })?;

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(file.order.len());
        for raw in &file.order {
            match Uuid::parse_str(raw) {
                Ok(id) if seen.insert(id) => order.push(id),
                Ok(_) => {}
                Err(_) => warn!(
                    "event=index_read module=index backend=ordered_list status=skip reason=invalid_id"
                ),
            }
        }
        Ok(order)
    }

    /// Replaces the whole id list.
    pub async fn write_order(&self, order: &[MemoId]) -> RepoResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = IndexFile {
            order: order.iter().map(Uuid::to_string).collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|err| RepoError::InvalidData(format!("index serialization failed: {err}")))?;
        write_atomically(&self.path, json.as_bytes()).await?;
        info!(
            "event=index_write module=index backend=ordered_list status=ok entries={}",
            order.len()
        );
        Ok(())
    }
}

#[async_trait]
impl IndexStore for OrderedListIndex {
    fn backend_name(&self) -> &'static str {
        "ordered_list"
    }

    async fn get_all(&self) -> RepoResult<Vec<MemoSummary>> {
        let memos = self.load_all(&self.content).await?;
        Ok(memos
            .iter()
            .map(|memo| MemoSummary::from_memo(memo, self.content.layout()))
            .collect())
    }

    async fn get(&self, id: MemoId) -> RepoResult<Option<MemoSummary>> {
        Ok(self
            .load(&self.content, id)
            .await?
            .map(|memo| MemoSummary::from_memo(&memo, self.content.layout())))
    }

    async fn insert(&self, memo: &Memo) -> RepoResult<()> {
        let mut order = self.read_order().await;
        if order.contains(&memo.id()) {
            return Ok(());
        }
        order.insert(0, memo.id());
        self.write_order(&order).await
    }

    async fn update(&self, memo: &Memo) -> RepoResult<()> {
        if self.read_order().await.contains(&memo.id()) {
            Ok(())
        } else {
            Err(RepoError::NotFound(memo.id()))
        }
    }

    async fn remove(&self, id: MemoId) -> RepoResult<bool> {
        let mut order = self.read_order().await;
        let before = order.len();
        order.retain(|value| *value != id);
        if order.len() == before {
            return Ok(false);
        }
        self.write_order(&order).await?;
        Ok(true)
    }

    async fn contains(&self, id: MemoId) -> RepoResult<bool> {
        Ok(self.read_order().await.contains(&id))
    }

    async fn count(&self) -> RepoResult<usize> {
        Ok(self.read_order().await.len())
    }

    // Metadata lives in the content header, so each file is parsed once.
    async fn load_all(&self, content: &ContentStore) -> RepoResult<Vec<Memo>> {
        let order = self.read_order().await;
        let mut memos = Vec::with_capacity(order.len());
        for id in order {
            if let Some(memo) = content.try_load(id).await {
                memos.push(memo);
            }
        }
        Ok(memos)
    }

    async fn load(&self, content: &ContentStore, id: MemoId) -> RepoResult<Option<Memo>> {
        if !self.read_order().await.contains(&id) {
            return Ok(None);
        }
        Ok(content.try_load(id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderedListIndex;
    use crate::config::StorageLayout;
    use crate::repo::RepoError;
    use crate::content::ContentStore;
    use crate::index::IndexStore;
    use crate::model::memo::Memo;

    #[tokio::test]
    async fn missing_and_corrupt_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = OrderedListIndex::new(StorageLayout::new(dir.path()));
        assert!(index.read_order().await.is_empty());

        std::fs::create_dir_all(index.path().parent().unwrap()).unwrap();
        std::fs::write(index.path(), "{ not json").unwrap();
        assert!(index.read_order().await.is_empty());
        assert!(index.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn strict_read_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = OrderedListIndex::new(StorageLayout::new(dir.path()));
        assert!(index.try_read_order().await.unwrap().is_empty());

        std::fs::create_dir_all(index.path().parent().unwrap()).unwrap();
        std::fs::write(index.path(), "{ truncated").unwrap();
        let err = index.try_read_order().await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)), "{err}");
    }

    #[tokio::test]
    async fn insert_places_new_ids_at_head_once() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let index = OrderedListIndex::new(layout.clone());
        let content = ContentStore::new(layout);
        let first = Memo::create_new("one", "1");
        let second = Memo::create_new("two", "2");
        content.save(&first).await.unwrap();
        content.save(&second).await.unwrap();

        index.insert(&first).await.unwrap();
        index.insert(&second).await.unwrap();
        index.insert(&first).await.unwrap();

        assert_eq!(index.read_order().await, vec![second.id(), first.id()]);
        let titles: Vec<String> = index
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.title)
            .collect();
        assert_eq!(titles, ["two", "one"]);
    }

    #[tokio::test]
    async fn load_all_returns_full_snapshots_in_list_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let index = OrderedListIndex::new(layout.clone());
        let content = ContentStore::new(layout.clone());
        let kept = Memo::create_new("kept", "kept body");
        let orphan = Memo::create_new("orphan", "gone");
        let newest = Memo::create_new("newest", "newest body");
        for memo in [&kept, &orphan, &newest] {
            content.save(memo).await.unwrap();
            index.insert(memo).await.unwrap();
        }
        std::fs::remove_file(layout.content_file(orphan.id())).unwrap();

        let memos = index.load_all(&content).await.unwrap();
        assert_eq!(memos, vec![newest.clone(), kept.clone()]);
        assert_eq!(index.load(&content, kept.id()).await.unwrap(), Some(kept));
        assert_eq!(index.load(&content, orphan.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_and_duplicate_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let index = OrderedListIndex::new(StorageLayout::new(dir.path()));
        let memo = Memo::create_new("a", "a");
        let id = memo.id().to_string();
        std::fs::create_dir_all(index.path().parent().unwrap()).unwrap();
        std::fs::write(
            index.path(),
            format!(r#"{{"order": ["{id}", "bogus", "{id}"]}}"#),
        )
        .unwrap();

        assert_eq!(index.read_order().await, vec![memo.id()]);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.remove(memo.id()).await.unwrap());
        assert!(!index.remove(memo.id()).await.unwrap());
    }
}
