//! Unification loader use-case.
//!
//! # Responsibility
//! - Verify referential integrity of a normalized batch before any write.
//! - Rebuild the unified store from the batch as one full refresh.
//! - Log per-entity insert counts.
//!
//! # Invariants
//! - Strict mode: one dangling reference or duplicate id fails the whole
//!   load and nothing is written.
//! - The provenance tag of every row comes from the normalized entity,
//!   which the normalizer stamped; the loader never accepts it from input.

use crate::model::entities::{EntityCounts, EntityKind, UnifiedBatch};
use crate::repo::unified_repo::{LoadMeta, RepoError, UnifiedRepository};
use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Batch-level consistency violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// A foreign key points outside the batch being loaded.
    DanglingReference {
        entity: EntityKind,
        record_id: i64,
        field: &'static str,
        missing_id: i64,
    },
    /// Two records of one entity share an id.
    DuplicateId { entity: EntityKind, id: i64 },
}

impl Display for IntegrityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference {
                entity,
                record_id,
                field,
                missing_id,
            } => write!(
                f,
                "{} {record_id}: `{field}` references missing id {missing_id}",
                entity.as_str()
            ),
            Self::DuplicateId { entity, id } => {
                write!(f, "duplicate {} id {id} in load batch", entity.as_str())
            }
        }
    }
}

impl Error for IntegrityError {}

/// Loader failure.
#[derive(Debug)]
pub enum LoadError {
    Integrity(IntegrityError),
    Repo(RepoError),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integrity(err) => write!(f, "integrity violation: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Integrity(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<IntegrityError> for LoadError {
    fn from(value: IntegrityError) -> Self {
        Self::Integrity(value)
    }
}

impl From<RepoError> for LoadError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Outcome of one committed load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub counts: EntityCounts,
    #[serde(skip)]
    pub duration: Duration,
}

/// Full-refresh loader over a unified repository.
pub struct UnificationLoader<R: UnifiedRepository> {
    repo: R,
}

impl<R: UnifiedRepository> UnificationLoader<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Replaces the unified store with `batch`.
    ///
    /// # Errors
    /// - `LoadError::Integrity` when a reference does not resolve inside the
    ///   batch or an id repeats; the store is not touched.
    /// - `LoadError::Repo` when persistence fails; the transaction is rolled
    ///   back and the previous rows stay visible.
    pub fn load(&mut self, batch: &UnifiedBatch) -> Result<LoadSummary, LoadError> {
        let started_at = Instant::now();
        let run_id = Uuid::new_v4();
        info!("event=unified_load module=loader status=start run_id={run_id}");

        if let Err(err) = check_integrity(batch) {
            error!(
                "event=unified_load module=loader status=error run_id={run_id} error_code=integrity error={err}"
            );
            return Err(err.into());
        }

        let counts = batch.counts();
        let meta = LoadMeta {
            run_id,
            loaded_at: Utc::now(),
            counts,
        };
        if let Err(err) = self.repo.replace_all(batch, &meta) {
            error!(
                "event=unified_load module=loader status=error run_id={run_id} error_code=store_write error={err}"
            );
            return Err(err.into());
        }

        for (entity, count) in [
            (EntityKind::Employee, counts.employees),
            (EntityKind::Project, counts.projects),
            (EntityKind::Expense, counts.expenses),
            (EntityKind::Task, counts.tasks),
        ] {
            info!(
                "event=unified_insert module=loader status=ok run_id={run_id} entity={} rows={count}",
                entity.as_str()
            );
        }

        let duration = started_at.elapsed();
        info!(
            "event=unified_load module=loader status=ok run_id={run_id} duration_ms={}",
            duration.as_millis()
        );
        Ok(LoadSummary {
            run_id,
            counts,
            duration,
        })
    }

    /// Gives read access to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }
}

/// Checks id uniqueness and that every reference resolves inside `batch`.
pub fn check_integrity(batch: &UnifiedBatch) -> Result<(), IntegrityError> {
    let employee_ids = unique_ids(EntityKind::Employee, batch.employees.iter().map(|e| e.id))?;
    let project_ids = unique_ids(EntityKind::Project, batch.projects.iter().map(|p| p.id))?;
    unique_ids(EntityKind::Expense, batch.expenses.iter().map(|e| e.id))?;
    unique_ids(EntityKind::Task, batch.tasks.iter().map(|t| t.id))?;

    for expense in &batch.expenses {
        require_reference(
            &project_ids,
            EntityKind::Expense,
            expense.id,
            "project_id",
            expense.project_id,
        )?;
    }

    for task in &batch.tasks {
        require_reference(
            &project_ids,
            EntityKind::Task,
            task.id,
            "project_id",
            task.project_id,
        )?;
        require_reference(
            &employee_ids,
            EntityKind::Task,
            task.id,
            "assignee_id",
            task.assignee_id,
        )?;
    }

    Ok(())
}

fn unique_ids(
    entity: EntityKind,
    ids: impl Iterator<Item = i64>,
) -> Result<HashSet<i64>, IntegrityError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(IntegrityError::DuplicateId { entity, id });
        }
    }
    Ok(seen)
}

fn require_reference(
    known: &HashSet<i64>,
    entity: EntityKind,
    record_id: i64,
    field: &'static str,
    target: i64,
) -> Result<(), IntegrityError> {
    if known.contains(&target) {
        return Ok(());
    }
    Err(IntegrityError::DanglingReference {
        entity,
        record_id,
        field,
        missing_id: target,
    })
}

#[cfg(test)]
mod tests {
    use super::{check_integrity, IntegrityError};
    use crate::model::entities::{
        Employee, EntityKind, Expense, Project, Provenance, Task, UnifiedBatch,
    };
    use crate::model::money::Money;
    use chrono::NaiveDate;

    fn batch() -> UnifiedBatch {
        UnifiedBatch {
            employees: vec![Employee {
                id: 10,
                name: "Ada".to_string(),
                role: "Engineer".to_string(),
                department: "R&D".to_string(),
                provenance: Provenance::HrApi,
            }],
            projects: vec![Project {
                id: 1,
                name: "Portal".to_string(),
                total_budget: Money::from_cents(100_000),
                provenance: Provenance::FinanceApi,
            }],
            expenses: vec![Expense {
                id: 42,
                project_id: 1,
                vendor: Some("Acme".to_string()),
                description: None,
                amount: Money::from_cents(5_000),
                status: "Pending".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                provenance: Provenance::FinanceApi,
            }],
            tasks: vec![Task {
                id: 5,
                project_id: 1,
                assignee_id: 10,
                task_name: "Integrate".to_string(),
                status: "Blocked".to_string(),
                blocker_notes: Some("Waiting for Expense ID 42".to_string()),
                provenance: Provenance::PmApi,
            }],
        }
    }

    #[test]
    fn consistent_batch_passes() {
        assert_eq!(check_integrity(&batch()), Ok(()));
    }

    #[test]
    fn expense_with_unknown_project_is_rejected() {
        let mut batch = batch();
        batch.expenses[0].project_id = 9;
        let err = check_integrity(&batch).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::DanglingReference {
                entity: EntityKind::Expense,
                record_id: 42,
                field: "project_id",
                missing_id: 9,
            }
        );
    }

    #[test]
    fn task_with_unknown_assignee_is_rejected() {
        let mut batch = batch();
        batch.tasks[0].assignee_id = 77;
        let err = check_integrity(&batch).unwrap_err();
        assert!(matches!(
            err,
            IntegrityError::DanglingReference {
                field: "assignee_id",
                missing_id: 77,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_project_id_is_rejected() {
        let mut batch = batch();
        let copy = batch.projects[0].clone();
        batch.projects.push(copy);
        let err = check_integrity(&batch).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::DuplicateId {
                entity: EntityKind::Project,
                id: 1,
            }
        );
    }
}
