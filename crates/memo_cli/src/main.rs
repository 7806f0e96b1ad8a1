//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a storage root, upgrade it once and print the memo catalog.
//! - Exercise core wiring without any UI runtime.
//!
//! Usage: `memo_cli [storage_root]`; falls back to `MEMO_STORAGE_ROOT`.

use log::info;
use memo_core::{
    core_version, default_log_level, init_logging, open_repository, IndexBackend,
    MemoRepository, MigrationCoordinator, StorageLayout, STORAGE_ROOT_ENV,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let layout = match std::env::args().nth(1) {
        Some(root) => StorageLayout::new(root),
        None => match StorageLayout::from_env() {
            Some(layout) => layout,
            None => {
                eprintln!("usage: memo_cli <storage_root> (or set {STORAGE_ROOT_ENV})");
                return ExitCode::from(2);
            }
        },
    };

    let root = match std::path::absolute(layout.root()) {
        Ok(root) => root,
        Err(err) => {
            eprintln!("cannot resolve storage root: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(default_log_level(), root.join("logs")) {
        eprintln!("logging disabled: {err}");
    }
    info!("event=cli_start module=cli status=ok version={}", core_version());

    let summary = MigrationCoordinator::new(layout.clone()).run().await;
    for step in &summary.steps {
        println!(
            "migration {} success={} migrated={} {}",
            step.step, step.success, step.migrated_count, step.message
        );
    }
    if !summary.success() {
        eprintln!("migration failed: {}", summary.overall.message);
        return ExitCode::FAILURE;
    }

    let repo = match open_repository(layout, IndexBackend::Relational).await {
        Ok(repo) => repo,
        Err(err) => {
            eprintln!("cannot open repository: {err}");
            return ExitCode::FAILURE;
        }
    };
    match repo.list().await {
        Ok(summaries) => {
            println!("memo_core version={} memos={}", core_version(), summaries.len());
            for summary in summaries {
                let pin = if summary.is_pinned { "*" } else { " " };
                println!("{pin} {} {} {}", summary.id, summary.updated_at, summary.title);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("cannot list memos: {err}");
            ExitCode::FAILURE
        }
    }
}
