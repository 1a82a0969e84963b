//! Unified store repository: full-refresh writes and entity reads.
//!
//! # Responsibility
//! - Replace every unified entity table with one batch, atomically.
//! - Record load metadata alongside the batch.
//! - Read entities back for reporting, queries and verification.
//!
//! # Invariants
//! - `replace_all` deletes children before parents and inserts parents
//!   before children, so foreign keys hold at every statement.
//! - Either the whole batch commits or the previous rows stay visible.

use crate::db::DbError;
use crate::model::entities::{
    Employee, EntityCounts, Expense, Project, Provenance, Task, UnifiedBatch,
};
use crate::model::money::Money;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub(crate) const EMPLOYEE_SELECT_SQL: &str =
    "SELECT id, name, role, department, source_api FROM unified_employees";
pub(crate) const PROJECT_SELECT_SQL: &str =
    "SELECT id, name, total_budget_cents, source_api FROM unified_projects";
pub(crate) const EXPENSE_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    vendor,
    description,
    amount_cents,
    status,
    date,
    source_api
FROM unified_expenses";
pub(crate) const TASK_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    assignee_id,
    task_name,
    status,
    blocker_notes,
    source_api
FROM unified_tasks";

const UNIFIED_TABLES: [&str; 5] = [
    "unified_employees",
    "unified_projects",
    "unified_expenses",
    "unified_tasks",
    "unified_load_meta",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for unified store persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid unified store data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "unified store is missing required table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Metadata of the last committed load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadMeta {
    pub run_id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub counts: EntityCounts,
}

/// Repository interface for the unified store.
pub trait UnifiedRepository {
    /// Replaces every unified row with `batch` and records `meta`.
    fn replace_all(&mut self, batch: &UnifiedBatch, meta: &LoadMeta) -> RepoResult<()>;
    fn load_meta(&self) -> RepoResult<Option<LoadMeta>>;
    fn list_employees(&self) -> RepoResult<Vec<Employee>>;
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    fn list_expenses(&self) -> RepoResult<Vec<Expense>>;
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
}

/// SQLite-backed unified repository.
pub struct SqliteUnifiedRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteUnifiedRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_unified_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl UnifiedRepository for SqliteUnifiedRepository<'_> {
    fn replace_all(&mut self, batch: &UnifiedBatch, meta: &LoadMeta) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute_batch(
            "DELETE FROM unified_tasks;
             DELETE FROM unified_expenses;
             DELETE FROM unified_projects;
             DELETE FROM unified_employees;",
        )?;

        insert_employees(&tx, &batch.employees)?;
        insert_projects(&tx, &batch.projects)?;
        insert_expenses(&tx, &batch.expenses)?;
        insert_tasks(&tx, &batch.tasks)?;
        write_load_meta(&tx, meta)?;

        // Dropping an uncommitted transaction rolls it back, so any early
        // return above leaves the previous rows in place.
        tx.commit()?;
        Ok(())
    }

    fn load_meta(&self) -> RepoResult<Option<LoadMeta>> {
        read_load_meta(self.conn)
    }

    fn list_employees(&self) -> RepoResult<Vec<Employee>> {
        query_all(self.conn, &format!("{EMPLOYEE_SELECT_SQL} ORDER BY id"), parse_employee_row)
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        query_all(self.conn, &format!("{PROJECT_SELECT_SQL} ORDER BY id"), parse_project_row)
    }

    fn list_expenses(&self) -> RepoResult<Vec<Expense>> {
        query_all(self.conn, &format!("{EXPENSE_SELECT_SQL} ORDER BY id"), parse_expense_row)
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        query_all(self.conn, &format!("{TASK_SELECT_SQL} ORDER BY id"), parse_task_row)
    }
}

fn insert_employees(tx: &Transaction<'_>, employees: &[Employee]) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO unified_employees (id, name, role, department, source_api)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    for employee in employees {
        stmt.execute(params![
            employee.id,
            employee.name.as_str(),
            employee.role.as_str(),
            employee.department.as_str(),
            employee.provenance.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_projects(tx: &Transaction<'_>, projects: &[Project]) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO unified_projects (id, name, total_budget_cents, source_api)
         VALUES (?1, ?2, ?3, ?4);",
    )?;
    for project in projects {
        stmt.execute(params![
            project.id,
            project.name.as_str(),
            project.total_budget.cents(),
            project.provenance.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_expenses(tx: &Transaction<'_>, expenses: &[Expense]) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO unified_expenses (
            id,
            project_id,
            vendor,
            description,
            amount_cents,
            status,
            date,
            source_api
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
    )?;
    for expense in expenses {
        stmt.execute(params![
            expense.id,
            expense.project_id,
            expense.vendor.as_deref(),
            expense.description.as_deref(),
            expense.amount.cents(),
            expense.status.as_str(),
            expense.date.to_string(),
            expense.provenance.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_tasks(tx: &Transaction<'_>, tasks: &[Task]) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO unified_tasks (
            id,
            project_id,
            assignee_id,
            task_name,
            status,
            blocker_notes,
            source_api
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
    )?;
    for task in tasks {
        stmt.execute(params![
            task.id,
            task.project_id,
            task.assignee_id,
            task.task_name.as_str(),
            task.status.as_str(),
            task.blocker_notes.as_deref(),
            task.provenance.as_str(),
        ])?;
    }
    Ok(())
}

fn write_load_meta(tx: &Transaction<'_>, meta: &LoadMeta) -> RepoResult<()> {
    tx.execute(
        "INSERT OR REPLACE INTO unified_load_meta (
            singleton,
            run_id,
            loaded_at,
            employees,
            projects,
            expenses,
            tasks
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            meta.run_id.to_string(),
            meta.loaded_at.timestamp_millis(),
            count_to_db(meta.counts.employees)?,
            count_to_db(meta.counts.projects)?,
            count_to_db(meta.counts.expenses)?,
            count_to_db(meta.counts.tasks)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn read_load_meta(conn: &Connection) -> RepoResult<Option<LoadMeta>> {
    let row = conn
        .query_row(
            "SELECT run_id, loaded_at, employees, projects, expenses, tasks
             FROM unified_load_meta
             WHERE singleton = 1;",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, loaded_at, employees, projects, expenses, tasks)) = row else {
        return Ok(None);
    };

    let run_id = Uuid::parse_str(&run_id).map_err(|_| {
        RepoError::InvalidData(format!("invalid run id `{run_id}` in unified_load_meta"))
    })?;
    let loaded_at = Utc
        .timestamp_millis_opt(loaded_at)
        .single()
        .ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid loaded_at `{loaded_at}` in unified_load_meta"
            ))
        })?;

    Ok(Some(LoadMeta {
        run_id,
        loaded_at,
        counts: EntityCounts {
            employees: count_from_db(employees)?,
            projects: count_from_db(projects)?,
            expenses: count_from_db(expenses)?,
            tasks: count_from_db(tasks)?,
        },
    }))
}

pub(crate) fn query_all<T>(
    conn: &Connection,
    sql: &str,
    parse: fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

pub(crate) fn parse_employee_row(row: &Row<'_>) -> RepoResult<Employee> {
    Ok(Employee {
        id: row.get("id")?,
        name: row.get("name")?,
        role: row.get("role")?,
        department: row.get("department")?,
        provenance: parse_provenance(row, "unified_employees")?,
    })
}

pub(crate) fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        total_budget: Money::from_cents(row.get("total_budget_cents")?),
        provenance: parse_provenance(row, "unified_projects")?,
    })
}

pub(crate) fn parse_expense_row(row: &Row<'_>) -> RepoResult<Expense> {
    let date_text: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d").map_err(|_| {
        RepoError::InvalidData(format!("invalid date `{date_text}` in unified_expenses.date"))
    })?;

    Ok(Expense {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        vendor: row.get("vendor")?,
        description: row.get("description")?,
        amount: Money::from_cents(row.get("amount_cents")?),
        status: row.get("status")?,
        date,
        provenance: parse_provenance(row, "unified_expenses")?,
    })
}

pub(crate) fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        assignee_id: row.get("assignee_id")?,
        task_name: row.get("task_name")?,
        status: row.get("status")?,
        blocker_notes: row.get("blocker_notes")?,
        provenance: parse_provenance(row, "unified_tasks")?,
    })
}

fn parse_provenance(row: &Row<'_>, table: &str) -> RepoResult<Provenance> {
    let value: String = row.get("source_api")?;
    Provenance::parse(&value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid source_api `{value}` in {table}.source_api"))
    })
}

fn count_to_db(count: usize) -> RepoResult<i64> {
    i64::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("row count {count} exceeds storage range")))
}

fn count_from_db(count: i64) -> RepoResult<usize> {
    usize::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("invalid row count `{count}` in unified_load_meta")))
}

pub(crate) fn ensure_unified_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in UNIFIED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
