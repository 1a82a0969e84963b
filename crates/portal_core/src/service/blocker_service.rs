//! Blocked-task report: joins each blocked task to the expense its note cites.
//!
//! # Responsibility
//! - Read blocked tasks with their project and assignee.
//! - Parse the blocker token from the free-text note.
//! - Resolve the token to an expense of the same project.
//!
//! # Invariants
//! - The token is anchored at the start of the note and the id is the whole
//!   digit run, so `Expense ID 42` never resolves to expense 4.
//! - Only expenses of the task's own project are candidates.
//! - Rows with a missing relation or an unresolved token are omitted, never
//!   turned into an error.
//! - Row order is unspecified.

use crate::model::entities::{ExpenseId, TaskId};
use crate::repo::report_repo::{BlockedTaskCandidate, ReportRepository};
use crate::repo::unified_repo::RepoResult;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static BLOCKER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*Waiting for Expense ID (\d+)\b").expect("valid blocker token regex")
});

/// One line of the blocked-task report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTaskRow {
    pub task_id: TaskId,
    pub task_name: String,
    pub project_name: String,
    pub employee_name: String,
    pub employee_role: String,
    pub status: String,
    pub blocker_notes: String,
    pub blocked_expense_id: ExpenseId,
    pub blocked_expense_vendor: Option<String>,
    pub blocked_expense_status: String,
}

/// Why a blocked task was left out of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingProject,
    MissingAssignee,
    NoBlockerToken,
    ExpenseNotFound,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::MissingProject => "missing_project",
            Self::MissingAssignee => "missing_assignee",
            Self::NoBlockerToken => "no_blocker_token",
            Self::ExpenseNotFound => "expense_not_found",
        }
    }
}

/// Extracts the expense id from a `Waiting for Expense ID <N>` note.
///
/// Returns `None` when the note does not start with the token or the id
/// does not fit an `i64`.
pub fn parse_blocker_token(notes: &str) -> Option<ExpenseId> {
    BLOCKER_TOKEN_RE
        .captures(notes)
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse::<ExpenseId>().ok())
}

/// Report service over a read-side repository.
pub struct BlockerResolver<R: ReportRepository> {
    repo: R,
}

impl<R: ReportRepository> BlockerResolver<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds the blocked-task report.
    ///
    /// Store failures propagate; row-level gaps only shrink the report.
    pub fn blocked_task_report(&self) -> RepoResult<Vec<BlockedTaskRow>> {
        let candidates = self.repo.blocked_task_candidates()?;
        let total = candidates.len();
        let mut rows = Vec::with_capacity(total);

        for candidate in candidates {
            let task_id = candidate.task.id;
            match self.resolve(candidate)? {
                Ok(row) => rows.push(row),
                Err(reason) => debug!(
                    "event=report_row_skipped module=blocker task_id={task_id} reason={}",
                    reason.as_str()
                ),
            }
        }

        info!(
            "event=blocked_report module=blocker status=ok blocked={total} reported={}",
            rows.len()
        );
        Ok(rows)
    }

    fn resolve(
        &self,
        candidate: BlockedTaskCandidate,
    ) -> RepoResult<Result<BlockedTaskRow, SkipReason>> {
        let BlockedTaskCandidate {
            task,
            project_name,
            employee_name,
            employee_role,
        } = candidate;

        let Some(project_name) = project_name else {
            return Ok(Err(SkipReason::MissingProject));
        };
        let (Some(employee_name), Some(employee_role)) = (employee_name, employee_role) else {
            return Ok(Err(SkipReason::MissingAssignee));
        };
        let Some(notes) = task.blocker_notes else {
            return Ok(Err(SkipReason::NoBlockerToken));
        };
        let Some(expense_id) = parse_blocker_token(&notes) else {
            return Ok(Err(SkipReason::NoBlockerToken));
        };
        let Some(expense) = self.repo.find_expense_in_project(task.project_id, expense_id)? else {
            return Ok(Err(SkipReason::ExpenseNotFound));
        };

        Ok(Ok(BlockedTaskRow {
            task_id: task.id,
            task_name: task.task_name,
            project_name,
            employee_name,
            employee_role,
            status: task.status,
            blocker_notes: notes,
            blocked_expense_id: expense.id,
            blocked_expense_vendor: expense.vendor,
            blocked_expense_status: expense.status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::parse_blocker_token;

    #[test]
    fn token_at_start_yields_full_id() {
        assert_eq!(
            parse_blocker_token("Waiting for Expense ID 42 - pending approval"),
            Some(42)
        );
        assert_eq!(parse_blocker_token("  Waiting for Expense ID 7."), Some(7));
        assert_eq!(parse_blocker_token("Waiting for Expense ID 108"), Some(108));
    }

    #[test]
    fn token_must_be_anchored_and_well_formed() {
        assert_eq!(parse_blocker_token("Note: Waiting for Expense ID 42"), None);
        assert_eq!(parse_blocker_token("Waiting for Expense ID"), None);
        assert_eq!(parse_blocker_token("Waiting for Expense ID 42abc"), None);
        assert_eq!(parse_blocker_token("waiting for expense id 42"), None);
    }

    #[test]
    fn oversized_id_is_not_a_token() {
        assert_eq!(
            parse_blocker_token("Waiting for Expense ID 99999999999999999999999"),
            None
        );
    }
}
