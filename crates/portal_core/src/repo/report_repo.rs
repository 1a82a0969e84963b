//! Read-only report queries over the unified store.
//!
//! # Responsibility
//! - Provide the fixed, parameterized queries used by the blocker resolver
//!   and the canned-query allow-list.
//!
//! # Invariants
//! - Every query binds user-provided values as parameters; no SQL text is
//!   ever assembled from caller input.
//! - Name lookups are case-insensitive exact matches.

use crate::model::entities::{
    Expense, ExpenseId, Project, ProjectId, Task, BLOCKED_STATUS,
};
use crate::repo::unified_repo::{
    ensure_unified_connection_ready, parse_expense_row, parse_project_row, parse_task_row,
    read_load_meta, LoadMeta, RepoResult, EXPENSE_SELECT_SQL, PROJECT_SELECT_SQL,
};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

/// Blocked task together with its optional joined relations.
///
/// Missing relations are kept as `None` so the resolver can decide to skip
/// the row instead of the query silently dropping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedTaskCandidate {
    pub task: Task,
    pub project_name: Option<String>,
    pub employee_name: Option<String>,
    pub employee_role: Option<String>,
}

/// Task row as seen from one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeTaskRow {
    pub employee_name: String,
    pub employee_role: String,
    pub task_id: i64,
    pub task_name: String,
    pub project_name: String,
    pub status: String,
    pub blocker_notes: Option<String>,
}

/// Read-side repository interface for reports and canned queries.
pub trait ReportRepository {
    fn blocked_task_candidates(&self) -> RepoResult<Vec<BlockedTaskCandidate>>;
    fn find_expense_in_project(
        &self,
        project_id: ProjectId,
        expense_id: ExpenseId,
    ) -> RepoResult<Option<Expense>>;
    fn find_project_by_name(&self, name: &str) -> RepoResult<Option<Project>>;
    fn expenses_in_project(&self, project_id: ProjectId) -> RepoResult<Vec<Expense>>;
    fn tasks_for_employee(&self, employee_name: &str) -> RepoResult<Vec<EmployeeTaskRow>>;
    fn tasks_by_status(&self, status: &str) -> RepoResult<Vec<Task>>;
    fn load_meta(&self) -> RepoResult<Option<LoadMeta>>;
}

impl<T: ReportRepository + ?Sized> ReportRepository for &T {
    fn blocked_task_candidates(&self) -> RepoResult<Vec<BlockedTaskCandidate>> {
        (**self).blocked_task_candidates()
    }

    fn find_expense_in_project(
        &self,
        project_id: ProjectId,
        expense_id: ExpenseId,
    ) -> RepoResult<Option<Expense>> {
        (**self).find_expense_in_project(project_id, expense_id)
    }

    fn find_project_by_name(&self, name: &str) -> RepoResult<Option<Project>> {
        (**self).find_project_by_name(name)
    }

    fn expenses_in_project(&self, project_id: ProjectId) -> RepoResult<Vec<Expense>> {
        (**self).expenses_in_project(project_id)
    }

    fn tasks_for_employee(&self, employee_name: &str) -> RepoResult<Vec<EmployeeTaskRow>> {
        (**self).tasks_for_employee(employee_name)
    }

    fn tasks_by_status(&self, status: &str) -> RepoResult<Vec<Task>> {
        (**self).tasks_by_status(status)
    }

    fn load_meta(&self) -> RepoResult<Option<LoadMeta>> {
        (**self).load_meta()
    }
}

/// SQLite-backed report repository.
pub struct SqliteReportRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReportRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_unified_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ReportRepository for SqliteReportRepository<'_> {
    fn blocked_task_candidates(&self) -> RepoResult<Vec<BlockedTaskCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                t.id AS id,
                t.project_id AS project_id,
                t.assignee_id AS assignee_id,
                t.task_name AS task_name,
                t.status AS status,
                t.blocker_notes AS blocker_notes,
                t.source_api AS source_api,
                p.name AS project_name,
                e.name AS employee_name,
                e.role AS employee_role
             FROM unified_tasks t
             LEFT JOIN unified_projects p ON p.id = t.project_id
             LEFT JOIN unified_employees e ON e.id = t.assignee_id
             WHERE t.status = ?1;",
        )?;
        let mut rows = stmt.query([BLOCKED_STATUS])?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(BlockedTaskCandidate {
                task: parse_task_row(row)?,
                project_name: row.get("project_name")?,
                employee_name: row.get("employee_name")?,
                employee_role: row.get("employee_role")?,
            });
        }
        Ok(candidates)
    }

    fn find_expense_in_project(
        &self,
        project_id: ProjectId,
        expense_id: ExpenseId,
    ) -> RepoResult<Option<Expense>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXPENSE_SELECT_SQL} WHERE id = ?1 AND project_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![expense_id, project_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_expense_row(row)?));
        }
        Ok(None)
    }

    fn find_project_by_name(&self, name: &str) -> RepoResult<Option<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL} WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1;"
        ))?;
        let mut rows = stmt.query([name.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn expenses_in_project(&self, project_id: ProjectId) -> RepoResult<Vec<Expense>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXPENSE_SELECT_SQL} WHERE project_id = ?1 ORDER BY date, id;"
        ))?;
        let mut rows = stmt.query([project_id])?;
        let mut expenses = Vec::new();
        while let Some(row) = rows.next()? {
            expenses.push(parse_expense_row(row)?);
        }
        Ok(expenses)
    }

    fn tasks_for_employee(&self, employee_name: &str) -> RepoResult<Vec<EmployeeTaskRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                e.name AS employee_name,
                e.role AS employee_role,
                t.id AS task_id,
                t.task_name AS task_name,
                p.name AS project_name,
                t.status AS status,
                t.blocker_notes AS blocker_notes
             FROM unified_tasks t
             INNER JOIN unified_employees e ON e.id = t.assignee_id
             INNER JOIN unified_projects p ON p.id = t.project_id
             WHERE e.name = ?1 COLLATE NOCASE
             ORDER BY t.id;",
        )?;
        let mut rows = stmt.query([employee_name.trim()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_employee_task_row(row)?);
        }
        Ok(items)
    }

    fn tasks_by_status(&self, status: &str) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, assignee_id, task_name, status, blocker_notes, source_api
             FROM unified_tasks
             WHERE status = ?1 COLLATE NOCASE
             ORDER BY id;",
        )?;
        let mut rows = stmt.query([status.trim()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn load_meta(&self) -> RepoResult<Option<LoadMeta>> {
        read_load_meta(self.conn)
    }
}

fn parse_employee_task_row(row: &Row<'_>) -> RepoResult<EmployeeTaskRow> {
    Ok(EmployeeTaskRow {
        employee_name: row.get("employee_name")?,
        employee_role: row.get("employee_role")?,
        task_id: row.get("task_id")?,
        task_name: row.get("task_name")?,
        project_name: row.get("project_name")?,
        status: row.get("status")?,
        blocker_notes: row.get("blocker_notes")?,
    })
}
