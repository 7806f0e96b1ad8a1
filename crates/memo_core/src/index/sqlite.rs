//! Relational memo catalog backed by SQLite.
//!
//! # Responsibility
//! - Persist memo metadata rows and tag rows in `memos.db`.
//! - Serve catalog scans ordered by `is_pinned DESC, updated_at DESC`.
//!
//! # Invariants
//! - Bodies are never stored; `file_path` references the content file.
//! - A metadata row and its tag rows are written in one transaction.
//! - Writes use the writer connection; reads use a separate reader
//!   connection and rely on SQLite isolation.
//! - A row that fails to decode is skipped by scans, not surfaced.

use super::{IndexStore, MemoSummary};
use crate::config::StorageLayout;
use crate::db::open_db;
use crate::model::memo::{format_timestamp, parse_timestamp, Memo, MemoId, SyncStatus};
use crate::repo::{RepoError, RepoResult};
use async_trait::async_trait;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SUMMARY_SELECT_SQL: &str = "SELECT
    m.id,
    m.title,
    m.preview,
    m.is_pinned,
    m.created_at,
    m.updated_at,
    m.file_path,
    m.version,
    m.sync_status,
    m.deleted_at,
    json_group_array(t.tag ORDER BY t.rowid) AS tags
FROM memos m
LEFT JOIN memo_tags t ON t.memo_id = m.id";

/// Generation 5 catalog backend.
#[derive(Clone)]
pub struct SqliteIndex {
    layout: StorageLayout,
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Opens (creating when absent) `<root>/memos.db` with the schema applied.
    pub async fn open(layout: StorageLayout) -> RepoResult<Self> {
        tokio::fs::create_dir_all(layout.root()).await?;
        let path = layout.database_file();
        let (writer, reader) = tokio::task::spawn_blocking(move || -> RepoResult<_> {
            let writer = open_db(&path)?;
            let reader = open_db(&path)?;
            Ok((writer, reader))
        })
        .await??;

        Ok(Self {
            layout,
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    async fn with_writer<T, F>(&self, work: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.writer), work).await
    }

    async fn with_reader<T, F>(&self, work: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.reader), work).await
    }
}

async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, work: F) -> RepoResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn
            .lock()
            .map_err(|_| RepoError::Task("catalog connection lock poisoned".to_string()))?;
        work(&mut *guard)
    })
    .await?
}

#[async_trait]
impl IndexStore for SqliteIndex {
    fn backend_name(&self) -> &'static str {
        "relational"
    }

    async fn get_all(&self) -> RepoResult<Vec<MemoSummary>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SUMMARY_SELECT_SQL}
                 GROUP BY m.id
                 ORDER BY m.is_pinned DESC, m.updated_at DESC, m.rowid DESC;"
            ))?;
            let mut rows = stmt.query([])?;
            let mut summaries = Vec::new();
            while let Some(row) = rows.next()? {
                match parse_summary_row(row) {
                    Ok(summary) => summaries.push(summary),
                    Err(err) => warn!(
                        "event=index_read module=index backend=relational status=skip error={err}"
                    ),
                }
            }
            Ok(summaries)
        })
        .await
    }

    async fn get(&self, id: MemoId) -> RepoResult<Option<MemoSummary>> {
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SUMMARY_SELECT_SQL}
                 WHERE m.id = ?1
                 GROUP BY m.id;"
            ))?;
            let mut rows = stmt.query([id.to_string()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            match parse_summary_row(row) {
                Ok(summary) => Ok(Some(summary)),
                Err(err) => {
                    warn!(
                        "event=index_read module=index backend=relational status=skip memo_id={id} error={err}"
                    );
                    Ok(None)
                }
            }
        })
        .await
    }

    async fn insert(&self, memo: &Memo) -> RepoResult<()> {
        let row = MemoRow::from_memo(memo, &self.layout);
        self.with_writer(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = tx.execute(
                "INSERT INTO memos (
                    id,
                    title,
                    preview,
                    is_pinned,
                    created_at,
                    updated_at,
                    file_path,
                    version,
                    sync_status,
                    deleted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO NOTHING;",
                params![
                    row.id,
                    row.title,
                    row.preview,
                    bool_to_int(row.is_pinned),
                    row.created_at,
                    row.updated_at,
                    row.file_path,
                    row.version,
                    row.sync_status,
                    row.deleted_at,
                ],
            )?;
            if inserted == 1 {
                replace_tags_in_tx(&tx, &row.id, &row.tags)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update(&self, memo: &Memo) -> RepoResult<()> {
        let row = MemoRow::from_memo(memo, &self.layout);
        let id = memo.id();
        self.with_writer(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE memos
                 SET
                    title = ?2,
                    preview = ?3,
                    is_pinned = ?4,
                    created_at = ?5,
                    updated_at = ?6,
                    file_path = ?7,
                    version = ?8,
                    sync_status = ?9,
                    deleted_at = ?10
                 WHERE id = ?1;",
                params![
                    row.id,
                    row.title,
                    row.preview,
                    bool_to_int(row.is_pinned),
                    row.created_at,
                    row.updated_at,
                    row.file_path,
                    row.version,
                    row.sync_status,
                    row.deleted_at,
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(id));
            }
            replace_tags_in_tx(&tx, &row.id, &row.tags)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, id: MemoId) -> RepoResult<bool> {
        self.with_writer(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // memo_tags rows cascade.
            let removed = tx.execute("DELETE FROM memos WHERE id = ?1;", [id.to_string()])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn contains(&self, id: MemoId) -> RepoResult<bool> {
        self.with_reader(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM memos WHERE id = ?1;",
                    [id.to_string()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn count(&self) -> RepoResult<usize> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memos;", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

/// Column values for one `memos` row plus its tags.
struct MemoRow {
    id: String,
    title: String,
    preview: String,
    is_pinned: bool,
    created_at: String,
    updated_at: String,
    file_path: String,
    version: i64,
    sync_status: i64,
    deleted_at: Option<String>,
    tags: Vec<String>,
}

impl MemoRow {
    fn from_memo(memo: &Memo, layout: &StorageLayout) -> Self {
        Self {
            id: memo.id().to_string(),
            title: memo.title().to_string(),
            preview: memo.preview().to_string(),
            is_pinned: memo.is_pinned(),
            created_at: format_timestamp(memo.created_at()),
            updated_at: format_timestamp(memo.updated_at()),
            file_path: layout.relative_content_file(memo.id()),
            version: memo.version(),
            sync_status: memo.sync_status().as_code(),
            deleted_at: memo.deleted_at().map(format_timestamp),
            tags: memo.tags().to_vec(),
        }
    }
}

fn replace_tags_in_tx(tx: &Transaction<'_>, memo_id: &str, tags: &[String]) -> RepoResult<()> {
    tx.execute("DELETE FROM memo_tags WHERE memo_id = ?1;", [memo_id])?;
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO memo_tags (memo_id, tag) VALUES (?1, ?2);",
            params![memo_id, tag],
        )?;
    }
    Ok(())
}

fn parse_summary_row(row: &Row<'_>) -> RepoResult<MemoSummary> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| RepoError::InvalidData(format!("invalid id `{id_text}` in memos.id")))?;

    let is_pinned = match row.get::<_, i64>("is_pinned")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_pinned value `{other}` for memo {id}"
            )));
        }
    };

    let sync_code: i64 = row.get("sync_status")?;
    let sync_status = SyncStatus::from_code(sync_code).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid sync_status `{sync_code}` for memo {id}"))
    })?;

    let deleted_at = match row.get::<_, Option<String>>("deleted_at")? {
        Some(value) => Some(parse_column_timestamp(&value, "deleted_at", id)?),
        None => None,
    };

    // A memo without tags aggregates to `[null]`.
    let tags_json: String = row.get("tags")?;
    let tags = serde_json::from_str::<Vec<Option<String>>>(&tags_json)
        .map_err(|err| RepoError::InvalidData(format!("invalid tag list for memo {id}: {err}")))?
        .into_iter()
        .flatten()
        .collect();

    Ok(MemoSummary {
        id,
        title: row.get("title")?,
        preview: row.get("preview")?,
        tags,
        is_pinned,
        created_at: parse_column_timestamp(&row.get::<_, String>("created_at")?, "created_at", id)?,
        updated_at: parse_column_timestamp(&row.get::<_, String>("updated_at")?, "updated_at", id)?,
        version: row.get("version")?,
        sync_status,
        deleted_at,
        file_path: row.get("file_path")?,
    })
}

fn parse_column_timestamp(
    value: &str,
    column: &str,
    id: MemoId,
) -> RepoResult<chrono::DateTime<chrono::Utc>> {
    parse_timestamp(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid {column} `{value}` for memo {id}"))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteIndex;
    use crate::config::StorageLayout;
    use crate::index::IndexStore;
    use crate::model::memo::Memo;
    use crate::repo::RepoError;

    #[tokio::test]
    async fn insert_update_remove_round_trip_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(StorageLayout::new(dir.path())).await.unwrap();
        let memo = Memo::create_new("Title", "Body")
            .with_tags(&["Work".to_string(), "home".to_string()]);

        index.insert(&memo).await.unwrap();
        let stored = index.get(memo.id()).await.unwrap().unwrap();
        assert_eq!(stored.title, "Title");
        assert_eq!(stored.tags, ["Work", "home"]);
        assert_eq!(stored.file_path, format!("content/{}.md", memo.id()));

        let edited = memo.with_title("Renamed").with_tags(&["solo".to_string()]);
        index.update(&edited).await.unwrap();
        let stored = index.get(memo.id()).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.tags, ["solo"]);
        assert_eq!(stored.version, edited.version());

        assert!(index.remove(memo.id()).await.unwrap());
        assert!(!index.contains(memo.id()).await.unwrap());
        assert!(!index.remove(memo.id()).await.unwrap());
    }

    #[tokio::test]
    async fn tags_with_control_and_quote_characters_survive() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(StorageLayout::new(dir.path())).await.unwrap();
        let tags = ["a\u{1f}b".to_string(), "say \"hi\"".to_string(), "x,y".to_string()];
        let memo = Memo::create_new("odd tags", "").with_tags(&tags);
        let bare = Memo::create_new("no tags", "");

        index.insert(&memo).await.unwrap();
        index.insert(&bare).await.unwrap();
        let stored = index.get(memo.id()).await.unwrap().unwrap();
        assert_eq!(stored.tags, tags);
        let stored = index.get(bare.id()).await.unwrap().unwrap();
        assert!(stored.tags.is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(StorageLayout::new(dir.path())).await.unwrap();
        let memo = Memo::create_new("ghost", "");

        let err = index.update(&memo).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(id) if id == memo.id()));
    }

    #[tokio::test]
    async fn get_all_orders_pinned_first_then_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(StorageLayout::new(dir.path())).await.unwrap();
        let pinned = Memo::create_new("pinned", "").with_pinned(true);
        let older = Memo::create_new("older", "");
        let newer = Memo::create_new("newer", "");

        index.insert(&pinned).await.unwrap();
        index.insert(&older).await.unwrap();
        index.insert(&newer).await.unwrap();
        index.insert(&newer).await.unwrap();

        let titles: Vec<String> = index
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.title)
            .collect();
        assert_eq!(titles, ["pinned", "newer", "older"]);
        assert_eq!(index.count().await.unwrap(), 3);
    }
}
