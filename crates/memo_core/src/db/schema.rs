//! Catalog DDL and `PRAGMA user_version` upgrades.
//!
//! # Invariants
//! - Revision numbers are strictly increasing; the last one is the latest.
//! - Each revision commits together with its `user_version` bump, so an
//!   interrupted upgrade resumes at the first missing revision.

use super::{DbError, DbResult};
use rusqlite::Connection;

struct Revision {
    number: u32,
    ddl: &'static str,
}

const REVISIONS: &[Revision] = &[Revision {
    number: 1,
    ddl: include_str!("sql/0001_memos.sql"),
}];

/// Schema state reported by `ensure_schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// Nothing to apply.
    Current(u32),
    Upgraded { from: u32, to: u32 },
}

/// Newest catalog revision this build can write.
pub fn latest_version() -> u32 {
    REVISIONS.last().map_or(0, |revision| revision.number)
}

/// Reads `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings the catalog up to `latest_version`, refusing newer databases.
pub fn ensure_schema(conn: &mut Connection) -> DbResult<SchemaState> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let mut applied = from;
    for revision in REVISIONS.iter().filter(|revision| revision.number > from) {
        let tx = conn.transaction()?;
        tx.execute_batch(revision.ddl)?;
        tx.pragma_update(None, "user_version", revision.number)?;
        tx.commit()?;
        applied = revision.number;
    }

    if applied == from {
        Ok(SchemaState::Current(from))
    } else {
        Ok(SchemaState::Upgraded { from, to: applied })
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_schema, latest_version, schema_version, SchemaState};
    use rusqlite::Connection;

    #[test]
    fn second_pass_reports_current_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(
            ensure_schema(&mut conn).unwrap(),
            SchemaState::Upgraded {
                from: 0,
                to: latest_version()
            }
        );
        assert_eq!(
            ensure_schema(&mut conn).unwrap(),
            SchemaState::Current(latest_version())
        );
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
    }
}
