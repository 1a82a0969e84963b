//! Core of the unified department portal.
//! Extracts HR, Finance and Project Management feeds into one store and
//! answers reports and questions over it.

pub mod config;
pub mod db;
pub mod facade;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod reasoning;
pub mod repo;
pub mod service;
pub mod source;

pub use config::{ConfigError, PortalConfig};
pub use db::{open_db, open_db_in_memory, open_db_read_only, DbError};
pub use facade::{AskResponse, PortalFacade, ReportResponse, StatusResponse, UnifiedStore};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entities::{Employee, EntityKind, Expense, Project, Provenance, Task, UnifiedBatch};
pub use model::money::Money;
pub use repo::unified_repo::{RepoError, RepoResult};
pub use service::blocker_service::BlockedTaskRow;
pub use service::etl_service::{run_etl, EtlError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
