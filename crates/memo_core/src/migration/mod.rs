//! Storage generation upgrades.
//!
//! # Responsibility
//! - Detect which on-disk generations exist under a storage root.
//! - Upgrade legacy data one generation at a time, oldest first, up to a
//!   target generation.
//! - Report every step as a structured `MigrationReport`; nothing is thrown
//!   past `MigrationCoordinator::run`.
//!
//! # Invariants
//! - A step whose source is absent is skipped.
//! - A step is skipped while any newer generation up to the target already
//!   holds records; its source stays in place and re-running the chain never
//!   duplicates records.
//! - Generation 4 is read strictly: an unreadable `index.json` fails the
//!   step instead of reading as empty.
//! - A successful run leaves the target store in place, even with no legacy
//!   data to carry.
//! - Sources are renamed to a timestamped backup only after the destination
//!   has been fully written.
//! - A failed step leaves its source in place and stops the chain.
//! - Must run before any repository traffic on the same root.

use crate::config::StorageLayout;
use crate::content::{ContentError, ContentStore};
use crate::db::{open_db, DbError};
use crate::index::{IndexStore, OrderedListIndex, SqliteIndex};
use crate::model::memo::Memo;
use crate::repo::RepoError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;

pub mod backup;
pub mod legacy;

pub use backup::{backup_path, rename_to_backup};

/// On-disk storage generations, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generation {
    /// `<root>/memo.txt`.
    FlatNote = 1,
    /// `<root>/memos.json`.
    JsonArray = 2,
    /// `<root>/metadata/<id>.json` + `<root>/notes/<id>.txt`.
    SplitFiles = 3,
    /// `<root>/content/*.md` + `content/index.json`.
    OrderedList = 4,
    /// `<root>/content/*.md` + `<root>/memos.db`.
    Relational = 5,
}

impl Generation {
    pub const ALL: [Generation; 5] = [
        Self::FlatNote,
        Self::JsonArray,
        Self::SplitFiles,
        Self::OrderedList,
        Self::Relational,
    ];

    pub const CURRENT: Generation = Self::Relational;

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|generation| generation.number() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FlatNote => "flat_note",
            Self::JsonArray => "json_array",
            Self::SplitFiles => "split_files",
            Self::OrderedList => "ordered_list",
            Self::Relational => "relational",
        }
    }

    fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "generation {} ({})", self.number(), self.label())
    }
}

/// Outcome of one step, or of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// `"<from>-><to>"` for a step, `"all"` for the overall report.
    pub step: String,
    pub success: bool,
    pub migrated_count: usize,
    pub message: String,
}

/// Per-step reports plus the overall result of one `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub steps: Vec<MigrationReport>,
    pub overall: MigrationReport,
}

impl MigrationSummary {
    pub fn success(&self) -> bool {
        self.overall.success
    }

    pub fn migrated_count(&self) -> usize {
        self.overall.migrated_count
    }
}

/// Failure inside a single step. Converted to a report at the coordinator
/// boundary.
#[derive(Debug)]
pub enum MigrationError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Content(ContentError),
    Repo(RepoError),
    Db(DbError),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "migration io error: {err}"),
            Self::Json(err) => write!(f, "legacy json error: {err}"),
            Self::Content(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Content(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ContentError> for MigrationError {
    fn from(value: ContentError) -> Self {
        Self::Content(value)
    }
}

impl From<RepoError> for MigrationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for MigrationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

enum StepOutcome {
    SourceAbsent,
    AlreadyMigrated {
        generation: Generation,
        existing: usize,
    },
    Migrated { count: usize, backup: PathBuf },
}

/// Runs the generation upgrade chain over one storage root.
#[derive(Debug, Clone)]
pub struct MigrationCoordinator {
    layout: StorageLayout,
    target: Generation,
}

impl MigrationCoordinator {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            target: Generation::CURRENT,
        }
    }

    /// Stops the chain once `target` has been produced.
    pub fn with_target(mut self, target: Generation) -> Self {
        self.target = target;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn target(&self) -> Generation {
        self.target
    }

    /// Generations whose marker file or directory exists, oldest first.
    pub async fn detect(&self) -> Vec<Generation> {
        let mut present = Vec::new();
        for generation in Generation::ALL {
            let marker = self.marker(generation);
            if fs::try_exists(&marker).await.unwrap_or(false) {
                present.push(generation);
            }
        }
        present
    }

    /// Runs every step up to the target generation. Never fails; the outcome
    /// is in the returned summary.
    pub async fn run(&self) -> MigrationSummary {
        let started_at = Instant::now();
        info!(
            "event=migration_run module=migration status=start target={}",
            self.target.number()
        );

        let mut steps = Vec::new();
        // Records carried into the newest generation written by this run.
        let mut total = 0;
        let mut failure = None;
        let mut from = Generation::FlatNote;
        while let Some(to) = from.next().filter(|to| *to <= self.target) {
            let report = self.run_step(from, to).await;
            if report.migrated_count > 0 {
                total = report.migrated_count;
            }
            let failed = !report.success;
            if failed {
                failure = Some(format!("step {} failed: {}", report.step, report.message));
            }
            steps.push(report);
            if failed {
                break;
            }
            from = to;
        }

        if failure.is_none() {
            if let Err(err) = self.initialize_target().await {
                error!(
                    "event=migration_init module=migration status=error target={} error={}",
                    self.target.number(),
                    err
                );
                failure = Some(format!("initializing {} failed: {err}", self.target));
            }
        }

        let duration_ms = started_at.elapsed().as_millis();
        let overall = match failure {
            None => {
                info!(
                    "event=migration_run module=migration status=ok migrated={total} duration_ms={duration_ms}"
                );
                MigrationReport {
                    step: "all".to_string(),
                    success: true,
                    migrated_count: total,
                    message: format!("migrated {total} memos up to {}", self.target),
                }
            }
            Some(message) => {
                error!(
                    "event=migration_run module=migration status=error migrated={total} duration_ms={duration_ms}"
                );
                MigrationReport {
                    step: "all".to_string(),
                    success: false,
                    migrated_count: total,
                    message,
                }
            }
        };
        MigrationSummary { steps, overall }
    }

    async fn run_step(&self, from: Generation, to: Generation) -> MigrationReport {
        let step = format!("{}->{}", from.number(), to.number());
        let started_at = Instant::now();
        let outcome = self.execute(from, to).await;
        let duration_ms = started_at.elapsed().as_millis();

        let (success, migrated_count, message) = match outcome {
            Ok(StepOutcome::SourceAbsent) => {
                info!(
                    "event=migration_step module=migration step={step} status=skip reason=no_source duration_ms={duration_ms}"
                );
                (true, 0, format!("no {from} data found"))
            }
            Ok(StepOutcome::AlreadyMigrated {
                generation,
                existing,
            }) => {
                info!(
                    "event=migration_step module=migration step={step} status=skip reason=newer_generation_populated generation={} existing={existing} duration_ms={duration_ms}",
                    generation.number()
                );
                (
                    true,
                    0,
                    format!("{generation} already holds {existing} memos; {from} data left in place"),
                )
            }
            Ok(StepOutcome::Migrated { count, backup }) => {
                info!(
                    "event=migration_step module=migration step={step} status=ok migrated={count} duration_ms={duration_ms}"
                );
                (
                    true,
                    count,
                    format!(
                        "migrated {count} memos from {from} to {to}; source kept as {}",
                        backup.display()
                    ),
                )
            }
            Err(err) => {
                error!(
                    "event=migration_step module=migration step={step} status=error duration_ms={duration_ms} error={err}"
                );
                (false, 0, err.to_string())
            }
        };

        MigrationReport {
            step,
            success,
            migrated_count,
            message,
        }
    }

    async fn execute(&self, from: Generation, to: Generation) -> Result<StepOutcome, MigrationError> {
        let source = self.marker(from);
        if !fs::try_exists(&source).await? {
            return Ok(StepOutcome::SourceAbsent);
        }

        if let Some((generation, existing)) = self.newest_populated_after(from).await? {
            return Ok(StepOutcome::AlreadyMigrated {
                generation,
                existing,
            });
        }

        let memos = self.read_generation(from).await?;
        self.write_generation(to, &memos).await?;
        let backup = rename_to_backup(&source).await?;
        Ok(StepOutcome::Migrated {
            count: memos.len(),
            backup,
        })
    }

    /// Newest generation after `from`, up to the target, that holds records.
    async fn newest_populated_after(
        &self,
        from: Generation,
    ) -> Result<Option<(Generation, usize)>, MigrationError> {
        for generation in Generation::ALL.into_iter().rev() {
            if generation <= from || generation > self.target {
                continue;
            }
            let existing = self.destination_count(generation).await?;
            if existing > 0 {
                return Ok(Some((generation, existing)));
            }
        }
        Ok(None)
    }

    /// Creates an empty target store when none exists yet.
    async fn initialize_target(&self) -> Result<(), MigrationError> {
        if self.target == Generation::FlatNote || fs::try_exists(self.marker(self.target)).await? {
            return Ok(());
        }
        self.write_generation(self.target, &[]).await?;
        info!(
            "event=migration_init module=migration status=ok target={}",
            self.target.number()
        );
        Ok(())
    }

    /// Path renamed to a backup once its generation has been migrated.
    fn marker(&self, generation: Generation) -> PathBuf {
        match generation {
            Generation::FlatNote => self.layout.flat_note_file(),
            Generation::JsonArray => self.layout.json_array_file(),
            Generation::SplitFiles => self.layout.split_metadata_dir(),
            Generation::OrderedList => self.layout.ordered_index_file(),
            Generation::Relational => self.layout.database_file(),
        }
    }

    async fn destination_count(&self, generation: Generation) -> Result<usize, MigrationError> {
        match generation {
            Generation::FlatNote => Ok(0),
            Generation::JsonArray => legacy::json_array_count(&self.layout).await,
            Generation::SplitFiles => legacy::split_files_count(&self.layout).await,
            Generation::OrderedList => Ok(OrderedListIndex::new(self.layout.clone())
                .try_read_order()
                .await?
                .len()),
            Generation::Relational => {
                let path = self.layout.database_file();
                if !fs::try_exists(&path).await? {
                    return Ok(0);
                }
                tokio::task::spawn_blocking(move || -> Result<usize, MigrationError> {
                    let conn = open_db(&path)?;
                    let count: i64 = conn.query_row("SELECT COUNT(*) FROM memos;", [], |row| row.get(0))?;
                    Ok(usize::try_from(count).unwrap_or(0))
                })
                .await
                .map_err(RepoError::from)?
            }
        }
    }

    async fn read_generation(&self, generation: Generation) -> Result<Vec<Memo>, MigrationError> {
        match generation {
            Generation::FlatNote => legacy::read_flat_note(&self.layout).await,
            Generation::JsonArray => legacy::read_json_array(&self.layout).await,
            Generation::SplitFiles => legacy::read_split_files(&self.layout).await,
            Generation::OrderedList => {
                let index = OrderedListIndex::new(self.layout.clone());
                let content = ContentStore::new(self.layout.clone());
                let mut memos = Vec::new();
                for id in index.try_read_order().await? {
                    if let Some(memo) = content.try_load(id).await {
                        memos.push(memo);
                    }
                }
                Ok(memos)
            }
            Generation::Relational => Ok(Vec::new()),
        }
    }

    async fn write_generation(&self, generation: Generation, memos: &[Memo]) -> Result<(), MigrationError> {
        match generation {
            Generation::FlatNote => Ok(()),
            Generation::JsonArray => legacy::write_json_array(&self.layout, memos).await,
            Generation::SplitFiles => legacy::write_split_files(&self.layout, memos).await,
            Generation::OrderedList => {
                let content = ContentStore::new(self.layout.clone());
                let index = OrderedListIndex::new(self.layout.clone());
                index.write_order(&[]).await?;
                let mut oldest_first: Vec<&Memo> = memos.iter().collect();
                oldest_first.sort_by_key(|memo| memo.updated_at());
                for memo in oldest_first {
                    content.save(memo).await?;
                    index.insert(memo).await?;
                }
                Ok(())
            }
            Generation::Relational => {
                let index = SqliteIndex::open(self.layout.clone()).await?;
                // Content files are already in place; only the catalog moves.
                for memo in memos.iter().rev() {
                    index.insert(memo).await?;
                }
                Ok(())
            }
        }
    }
}
