//! ETL run orchestration: extract, normalize, load.
//!
//! # Responsibility
//! - Fetch all four domain feeds, concurrently and read-only.
//! - Abort before touching the store when any feed fails or is empty.
//! - Normalize the feeds and hand the batch to the unification loader.
//!
//! # Invariants
//! - Every failure before `UnificationLoader::load` leaves the unified
//!   store exactly as it was.
//! - No retries; failures surface to the operator.

use crate::normalize::{normalize_batch, RawBatch, RawRecord, ValidationError};
use crate::repo::unified_repo::{RepoError, UnifiedRepository};
use crate::service::load_service::{IntegrityError, LoadError, LoadSummary, UnificationLoader};
use crate::source::{DomainSources, RecordSource, SourceError, SourceResult};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::Instant;

/// Why a load was aborted before any write.
#[derive(Debug)]
pub enum AbortReason {
    Source(SourceError),
    EmptyFeed,
    FetchPanicked,
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "{err}"),
            Self::EmptyFeed => write!(f, "feed returned no records"),
            Self::FetchPanicked => write!(f, "fetch worker panicked"),
        }
    }
}

/// ETL run failure taxonomy.
#[derive(Debug)]
pub enum EtlError {
    /// Upstream fetch failed or came back empty; store untouched.
    LoadAborted {
        feed: &'static str,
        reason: AbortReason,
    },
    /// A source record failed normalization; store untouched.
    Validation(ValidationError),
    /// The batch is not referentially consistent; store untouched.
    Integrity(IntegrityError),
    /// Writing the batch failed; the transaction was rolled back.
    Store(RepoError),
}

impl EtlError {
    /// Stable short code for logs and CLI exit reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LoadAborted { .. } => "load_aborted",
            Self::Validation(_) => "validation_error",
            Self::Integrity(_) => "integrity_error",
            Self::Store(_) => "store_error",
        }
    }
}

impl Display for EtlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadAborted { feed, reason } => {
                write!(f, "load aborted: {feed} feed: {reason}")
            }
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Integrity(err) => write!(f, "integrity violation: {err}"),
            Self::Store(err) => write!(f, "unified store write failed: {err}"),
        }
    }
}

impl Error for EtlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LoadAborted {
                reason: AbortReason::Source(err),
                ..
            } => Some(err),
            Self::LoadAborted { .. } => None,
            Self::Validation(err) => Some(err),
            Self::Integrity(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ValidationError> for EtlError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<LoadError> for EtlError {
    fn from(value: LoadError) -> Self {
        match value {
            LoadError::Integrity(err) => Self::Integrity(err),
            LoadError::Repo(err) => Self::Store(err),
        }
    }
}

/// Runs one full-refresh ETL pass.
///
/// # Side effects
/// - Network/file reads through `sources`.
/// - Replaces the unified store on success.
/// - Emits `etl_run`, `etl_extract` and `etl_normalize` logging events.
pub fn run_etl<R: UnifiedRepository>(
    sources: &DomainSources,
    loader: &mut UnificationLoader<R>,
) -> Result<LoadSummary, EtlError> {
    let started_at = Instant::now();
    info!("event=etl_run module=etl status=start");

    let result = extract(sources)
        .and_then(|raw| {
            normalize_batch(&raw).map_err(|err| {
                warn!("event=etl_normalize module=etl status=error error={err}");
                EtlError::from(err)
            })
        })
        .and_then(|batch| loader.load(&batch).map_err(EtlError::from));

    match &result {
        Ok(summary) => info!(
            "event=etl_run module=etl status=ok run_id={} duration_ms={}",
            summary.run_id,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=etl_run module=etl status=error error_code={} duration_ms={} error={}",
            err.code(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// Fetches the four feeds on scoped threads and assembles them.
pub fn extract(sources: &DomainSources) -> Result<RawBatch, EtlError> {
    let (employees, projects, expenses, tasks) = thread::scope(|scope| {
        let employees = scope.spawn(|| sources.employees.fetch_all());
        let projects = scope.spawn(|| sources.projects.fetch_all());
        let expenses = scope.spawn(|| sources.expenses.fetch_all());
        let tasks = scope.spawn(|| sources.tasks.fetch_all());
        (
            employees.join(),
            projects.join(),
            expenses.join(),
            tasks.join(),
        )
    });

    Ok(RawBatch {
        employees: require_feed("employees", sources.employees.as_ref(), employees)?,
        projects: require_feed("projects", sources.projects.as_ref(), projects)?,
        expenses: require_feed("expenses", sources.expenses.as_ref(), expenses)?,
        tasks: require_feed("tasks", sources.tasks.as_ref(), tasks)?,
    })
}

fn require_feed(
    feed: &'static str,
    source: &dyn RecordSource,
    joined: thread::Result<SourceResult<Vec<RawRecord>>>,
) -> Result<Vec<RawRecord>, EtlError> {
    let reason = match joined {
        Ok(Ok(records)) if !records.is_empty() => {
            info!(
                "event=etl_extract module=etl status=ok feed={feed} records={}",
                records.len()
            );
            return Ok(records);
        }
        Ok(Ok(_)) => AbortReason::EmptyFeed,
        Ok(Err(err)) => AbortReason::Source(err),
        Err(_) => AbortReason::FetchPanicked,
    };

    error!(
        "event=etl_extract module=etl status=error feed={feed} location={} error={}",
        source.location(),
        reason
    );
    Err(EtlError::LoadAborted { feed, reason })
}
