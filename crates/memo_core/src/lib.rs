//! Memo persistence core: content files, catalog indexes, storage
//! generation upgrades and in-memo find/replace.
//! Callers reach storage only through `MemoRepository`.

pub mod config;
pub mod content;
pub mod db;
pub mod index;
pub mod logging;
pub mod migration;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{IndexBackend, StorageLayout, STORAGE_ROOT_ENV};
pub use content::{ContentError, ContentStore};
pub use index::{IndexStore, MemoSummary, OrderedListIndex, SqliteIndex};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use migration::{Generation, MigrationCoordinator, MigrationReport, MigrationSummary};
pub use model::memo::{Memo, MemoFields, MemoId, SyncStatus};
pub use repo::{open_repository, IndexedMemoRepository, MemoRepository, RepoError, RepoResult};
pub use search::{
    find_matches, replace_all, MatchNavigator, SearchError, SearchOptions, SearchPattern,
    TextMatch,
};
pub use service::memo_service::{MemoService, MemoServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
