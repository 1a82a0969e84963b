//! Opening the unified store: ETL writers and report readers.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by load/report behavior.
//! - Trigger schema migrations before returning a writable connection.
//!
//! # Invariants
//! - Writable connections have `foreign_keys=ON` and migrations applied.
//! - Writable file connections run in WAL mode so readers keep the last
//!   committed snapshot while a full refresh is in flight.
//! - Read-only connections never create, migrate or reconfigure a store;
//!   they only accept a schema already at the latest version.

use super::migrations::{apply_migrations, ensure_latest_schema};
use super::DbResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(
        "file",
        || Connection::open(path.as_ref()),
        Bootstrap::Migrate { wal: true },
    )
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(
        "memory",
        Connection::open_in_memory,
        Bootstrap::Migrate { wal: false },
    )
}

/// Opens an existing store for reading only.
///
/// # Errors
/// - The file does not exist (it is never created here).
/// - The schema is older or newer than this binary's latest migration.
pub fn open_db_read_only(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(
        "read_only",
        || {
            Connection::open_with_flags(
                path.as_ref(),
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        },
        Bootstrap::ReadOnly,
    )
}

#[derive(Debug, Clone, Copy)]
enum Bootstrap {
    Migrate { wal: bool },
    ReadOnly,
}

fn open_with(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
    bootstrap: Bootstrap,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, bootstrap) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, bootstrap: Bootstrap) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    match bootstrap {
        Bootstrap::ReadOnly => ensure_latest_schema(conn),
        Bootstrap::Migrate { wal } => {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if wal {
                // journal_mode returns the resulting mode as a row.
                let _mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            }
            apply_migrations(conn)
        }
    }
}
