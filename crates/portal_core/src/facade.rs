//! Report/query façade for external callers.
//!
//! # Responsibility
//! - Serve the blocked-task report and natural-language answers as plain
//!   response envelopes.
//! - Convert store and collaborator failures into degraded responses.
//!
//! # Invariants
//! - Façade calls never panic and never return `Err`; unavailability is
//!   signalled in the envelope.
//! - Dependencies (store location, reasoning client) are passed in
//!   explicitly; there is no process-wide state.
//! - Each call opens its own read-only connection, so a call in flight
//!   during a load sees either the old or the new snapshot.
//! - Reads never create, migrate or write the store. A store that has no
//!   completed load is reported as unavailable, not as empty.

use crate::db::{open_db_read_only, DbResult};
use crate::reasoning::ReasoningClient;
use crate::repo::report_repo::{ReportRepository, SqliteReportRepository};
use crate::repo::unified_repo::LoadMeta;
use crate::service::blocker_service::{BlockedTaskRow, BlockerResolver};
use crate::service::query_service::QueryService;
use log::{error, info};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

const SERVICE_BANNER: &str = "Unified department portal is running";
const NOT_LOADED_MESSAGE: &str = "unified store has not been loaded yet";
const AGENT_UNCONFIGURED_ANSWER: &str =
    "Error: AI agent is not configured. Check the API key and database settings.";

/// Location of the unified store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedStore {
    path: PathBuf,
}

impl UnifiedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a read-only connection; a missing or outdated store is an error.
    pub fn open(&self) -> DbResult<Connection> {
        open_db_read_only(&self.path)
    }
}

/// Envelope for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub store_available: bool,
    pub last_load: Option<LoadMeta>,
}

/// Envelope for the blocked-task report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportResponse {
    /// `false` when the store could not be read or was never loaded; `rows`
    /// is then empty.
    pub available: bool,
    pub rows: Vec<BlockedTaskRow>,
    pub message: String,
}

/// Envelope for natural-language questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
}

/// Report/query façade.
pub struct PortalFacade<C: ReasoningClient> {
    store: UnifiedStore,
    reasoning: Option<C>,
}

impl<C: ReasoningClient> PortalFacade<C> {
    /// Creates a façade; `reasoning = None` disables `ask`.
    pub fn new(store: UnifiedStore, reasoning: Option<C>) -> Self {
        Self { store, reasoning }
    }

    pub fn status(&self) -> StatusResponse {
        let last_load = self
            .store
            .open()
            .map_err(|err| err.to_string())
            .and_then(|conn| {
                let repo = SqliteReportRepository::try_new(&conn).map_err(|err| err.to_string())?;
                repo.load_meta().map_err(|err| err.to_string())
            });

        match last_load {
            Ok(last_load) => StatusResponse {
                status: SERVICE_BANNER.to_string(),
                store_available: true,
                last_load,
            },
            Err(err) => {
                error!("event=facade_status module=facade status=error error={err}");
                StatusResponse {
                    status: SERVICE_BANNER.to_string(),
                    store_available: false,
                    last_load: None,
                }
            }
        }
    }

    /// Returns the full blocked-task report or an explicit unavailability.
    pub fn blocked_task_report(&self) -> ReportResponse {
        let result = self.with_loaded_store(|repo| {
            BlockerResolver::new(repo)
                .blocked_task_report()
                .map_err(|err| err.to_string())
        });

        match result {
            Ok(rows) => {
                info!(
                    "event=facade_report module=facade status=ok rows={}",
                    rows.len()
                );
                let message = if rows.is_empty() {
                    "No blocked tasks.".to_string()
                } else {
                    format!("Found {} blocked task(s).", rows.len())
                };
                ReportResponse {
                    available: true,
                    rows,
                    message,
                }
            }
            Err(err) => {
                error!("event=facade_report module=facade status=error error={err}");
                ReportResponse {
                    available: false,
                    rows: Vec::new(),
                    message: format!("blocked task report unavailable: {err}"),
                }
            }
        }
    }

    /// Answers a natural-language question through the allow-listed queries.
    pub fn ask(&self, question: &str) -> AskResponse {
        let question = question.trim().to_string();
        let Some(client) = self.reasoning.as_ref() else {
            return AskResponse {
                question,
                answer: AGENT_UNCONFIGURED_ANSWER.to_string(),
            };
        };

        let result = self.with_loaded_store(|repo| {
            QueryService::new(repo, client)
                .answer(&question)
                .map_err(|err| err.to_string())
        });

        let answer = match result {
            Ok(answer) => answer,
            Err(err) => {
                error!("event=facade_ask module=facade status=error error={err}");
                format!("An error occurred: {err}")
            }
        };
        AskResponse { question, answer }
    }

    fn with_loaded_store<T>(
        &self,
        run: impl FnOnce(SqliteReportRepository<'_>) -> Result<T, String>,
    ) -> Result<T, String> {
        let conn = self.store.open().map_err(|err| err.to_string())?;
        let repo = SqliteReportRepository::try_new(&conn).map_err(|err| err.to_string())?;
        if repo.load_meta().map_err(|err| err.to_string())?.is_none() {
            return Err(NOT_LOADED_MESSAGE.to_string());
        }
        run(repo)
    }
}
