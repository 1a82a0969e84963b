//! Unified-store schema history.
//!
//! | version | file | adds |
//! |---|---|---|
//! | 1 | `0001_unified_schema.sql` | employee/project/expense/task tables, cents columns, FKs |
//! | 2 | `0002_load_meta.sql` | single-row `unified_load_meta` written by every full refresh |
//!
//! The store's version lives in `PRAGMA user_version`. The ETL writer
//! upgrades a store in one transaction; report readers only check it.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema step: the version it leaves the store at, and its DDL.
type SchemaStep = (u32, &'static str);

const SCHEMA_STEPS: &[SchemaStep] = &[
    (1, include_str!("0001_unified_schema.sql")),
    (2, include_str!("0002_load_meta.sql")),
];

/// Schema version this binary reads and writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |(version, _)| *version)
}

/// Brings the store up to `latest_version()`.
///
/// Steps already recorded in `user_version` are skipped; the remaining ones
/// run in a single transaction, so a failed upgrade leaves the old version.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }
    if stored == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, ddl) in SCHEMA_STEPS.iter().filter(|(version, _)| *version > stored) {
        tx.execute_batch(ddl)?;
        tx.pragma_update(None, "user_version", version)?;
    }
    tx.commit()?;
    Ok(())
}

/// Accepts only a store already at `latest_version()`; never writes.
pub fn ensure_latest_schema(conn: &Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }
    if stored < latest {
        return Err(DbError::OutdatedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}
