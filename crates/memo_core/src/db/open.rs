//! Connection bootstrap for the memo catalog.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` so tag rows cascade.
//! - File connections use WAL so readers do not block the writer.
//! - Returned connections are at `schema::latest_version()`.

use super::schema::{ensure_schema, SchemaState};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the catalog file and brings its schema up to date.
///
/// # Side effects
/// - Creates the file when absent.
/// - Emits a `db_open` event with the schema state and duration.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    let result = Connection::open(path)
        .map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|conn| configure(conn, true));
    log_open("file", started_at, result)
}

/// Opens a private in-memory catalog with the schema applied.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = Connection::open_in_memory()
        .map_err(DbError::from)
        .and_then(|conn| configure(conn, false));
    log_open("memory", started_at, result)
}

fn configure(mut conn: Connection, use_wal: bool) -> DbResult<(Connection, SchemaState)> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if use_wal {
        // journal_mode answers with the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    let state = ensure_schema(&mut conn)?;
    Ok((conn, state))
}

fn log_open(
    mode: &str,
    started_at: Instant,
    result: DbResult<(Connection, SchemaState)>,
) -> DbResult<Connection> {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok((conn, SchemaState::Current(version))) => {
            info!(
                "event=db_open module=db status=ok mode={mode} schema={version} duration_ms={duration_ms}"
            );
            Ok(conn)
        }
        Ok((conn, SchemaState::Upgraded { from, to })) => {
            info!(
                "event=db_open module=db status=ok mode={mode} schema_from={from} schema_to={to} duration_ms={duration_ms}"
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={duration_ms} error={err}"
            );
            Err(err)
        }
    }
}
