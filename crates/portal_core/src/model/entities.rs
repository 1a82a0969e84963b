//! Unified entity records.
//!
//! # Invariants
//! - `Expense.project_id` and `Task.project_id` reference a `Project` of the
//!   same load; `Task.assignee_id` references an `Employee` of the same load.
//! - `Project.total_budget` and `Expense.amount` are never negative.

use crate::model::money::Money;
use chrono::NaiveDate;
use serde::Serialize;

pub type EmployeeId = i64;
pub type ProjectId = i64;
pub type ExpenseId = i64;
pub type TaskId = i64;

/// Task status value that marks a task as blocked.
pub const BLOCKED_STATUS: &str = "Blocked";

/// Domain store a unified record was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Employees/Timesheets store.
    HrApi,
    /// Projects/Expenses store.
    FinanceApi,
    /// Tasks store.
    PmApi,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HrApi => "hr_api",
            Self::FinanceApi => "finance_api",
            Self::PmApi => "pm_api",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hr_api" => Some(Self::HrApi),
            "finance_api" => Some(Self::FinanceApi),
            "pm_api" => Some(Self::PmApi),
            _ => None,
        }
    }
}

/// Entity kinds handled by normalization and loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Employee,
    Project,
    Expense,
    Task,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Project => "project",
            Self::Expense => "expense",
            Self::Task => "task",
        }
    }

    /// Provenance stamped on records of this kind.
    pub fn provenance(self) -> Provenance {
        match self {
            Self::Employee => Provenance::HrApi,
            Self::Project | Self::Expense => Provenance::FinanceApi,
            Self::Task => Provenance::PmApi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub role: String,
    pub department: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub total_budget: Money,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub project_id: ProjectId,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub amount: Money,
    /// Usually `Pending`, `Approved` or `Rejected`; kept as free text.
    pub status: String,
    pub date: NaiveDate,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub assignee_id: EmployeeId,
    pub task_name: String,
    pub status: String,
    pub blocker_notes: Option<String>,
    pub provenance: Provenance,
}

impl Task {
    pub fn is_blocked(&self) -> bool {
        self.status == BLOCKED_STATUS
    }
}

/// One complete set of normalized records, ready for a full refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedBatch {
    pub employees: Vec<Employee>,
    pub projects: Vec<Project>,
    pub expenses: Vec<Expense>,
    pub tasks: Vec<Task>,
}

/// Per-entity row counts of one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub employees: usize,
    pub projects: usize,
    pub expenses: usize,
    pub tasks: usize,
}

impl UnifiedBatch {
    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            employees: self.employees.len(),
            projects: self.projects.len(),
            expenses: self.expenses.len(),
            tasks: self.tasks.len(),
        }
    }
}
