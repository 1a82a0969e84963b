use chrono::NaiveDate;
use portal_core::db::{open_db, open_db_in_memory};
use portal_core::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
use portal_core::repo::report_repo::SqliteReportRepository;
use portal_core::repo::unified_repo::SqliteUnifiedRepository;
use portal_core::service::blocker_service::{BlockedTaskRow, BlockerResolver};
use portal_core::service::load_service::UnificationLoader;
use portal_core::{
    Employee, Expense, Money, PortalFacade, Project, Provenance, Task, UnifiedBatch, UnifiedStore,
};
use rusqlite::Connection;

fn employee(id: i64, name: &str, role: &str) -> Employee {
    Employee {
        id,
        name: name.to_string(),
        role: role.to_string(),
        department: "Operations".to_string(),
        provenance: Provenance::HrApi,
    }
}

fn project(id: i64, name: &str) -> Project {
    Project {
        id,
        name: name.to_string(),
        total_budget: Money::from_cents(1_000_000),
        provenance: Provenance::FinanceApi,
    }
}

fn expense(id: i64, project_id: i64, vendor: &str, status: &str) -> Expense {
    Expense {
        id,
        project_id,
        vendor: Some(vendor.to_string()),
        description: None,
        amount: Money::from_cents(25_000),
        status: status.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        provenance: Provenance::FinanceApi,
    }
}

fn blocked_task(id: i64, project_id: i64, assignee_id: i64, notes: Option<&str>) -> Task {
    Task {
        id,
        project_id,
        assignee_id,
        task_name: format!("Task {id}"),
        status: "Blocked".to_string(),
        blocker_notes: notes.map(str::to_string),
        provenance: Provenance::PmApi,
    }
}

fn base_batch() -> UnifiedBatch {
    UnifiedBatch {
        employees: vec![
            employee(1, "Ada Park", "Engineer"),
            employee(2, "Ben Ortiz", "Analyst"),
        ],
        projects: vec![project(1, "Apollo"), project(2, "Hermes")],
        expenses: vec![
            expense(42, 1, "Acme", "Pending"),
            expense(4, 1, "Globex", "Approved"),
            expense(77, 2, "Initech", "Pending"),
        ],
        tasks: vec![blocked_task(
            5,
            1,
            1,
            Some("Waiting for Expense ID 42 - pending approval"),
        )],
    }
}

fn load(conn: &mut Connection, batch: &UnifiedBatch) {
    let repo = SqliteUnifiedRepository::try_new(conn).unwrap();
    UnificationLoader::new(repo).load(batch).unwrap();
}

fn report(conn: &Connection) -> Vec<BlockedTaskRow> {
    let repo = SqliteReportRepository::try_new(conn).unwrap();
    let mut rows = BlockerResolver::new(repo).blocked_task_report().unwrap();
    rows.sort_by_key(|row| row.task_id);
    rows
}

#[test]
fn blocked_task_joins_to_cited_expense() {
    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &base_batch());

    let rows = report(&conn);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.task_id, 5);
    assert_eq!(row.project_name, "Apollo");
    assert_eq!(row.employee_name, "Ada Park");
    assert_eq!(row.employee_role, "Engineer");
    assert_eq!(row.status, "Blocked");
    assert_eq!(row.blocked_expense_id, 42);
    assert_eq!(row.blocked_expense_vendor.as_deref(), Some("Acme"));
    assert_eq!(row.blocked_expense_status, "Pending");
}

#[test]
fn notes_without_token_are_omitted() {
    let mut batch = base_batch();
    batch.tasks.push(blocked_task(6, 1, 2, Some("Waiting on legal review")));
    batch.tasks.push(blocked_task(7, 1, 2, None));
    batch
        .tasks
        .push(blocked_task(8, 1, 2, Some("FYI: Waiting for Expense ID 42")));

    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &batch);

    let ids: Vec<i64> = report(&conn).iter().map(|row| row.task_id).collect();
    assert_eq!(ids, vec![5]);
}

#[test]
fn expense_id_match_is_exact() {
    let mut batch = base_batch();
    batch.tasks = vec![
        blocked_task(10, 1, 1, Some("Waiting for Expense ID 4 - receipts missing")),
        blocked_task(11, 1, 2, Some("Waiting for Expense ID 420")),
    ];

    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &batch);

    let rows = report(&conn);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].task_id, 10);
    assert_eq!(rows[0].blocked_expense_id, 4);
    assert_eq!(rows[0].blocked_expense_vendor.as_deref(), Some("Globex"));
}

#[test]
fn expense_of_another_project_does_not_resolve() {
    let mut batch = base_batch();
    batch.tasks = vec![blocked_task(12, 1, 1, Some("Waiting for Expense ID 77"))];

    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &batch);

    assert!(report(&conn).is_empty());
}

#[test]
fn non_blocked_tasks_are_ignored() {
    let mut batch = base_batch();
    let mut in_progress = blocked_task(13, 1, 1, Some("Waiting for Expense ID 42"));
    in_progress.status = "In Progress".to_string();
    batch.tasks.push(in_progress);

    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &batch);

    let ids: Vec<i64> = report(&conn).iter().map(|row| row.task_id).collect();
    assert_eq!(ids, vec![5]);
}

#[test]
fn unresolved_assignee_row_is_skipped() {
    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &base_batch());

    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         INSERT INTO unified_tasks
            (id, project_id, assignee_id, task_name, status, blocker_notes, source_api)
         VALUES (99, 1, 404, 'Orphan', 'Blocked', 'Waiting for Expense ID 42', 'pm_api');
         PRAGMA foreign_keys = ON;",
    )
    .unwrap();

    let ids: Vec<i64> = report(&conn).iter().map(|row| row.task_id).collect();
    assert_eq!(ids, vec![5]);
}

#[test]
fn unresolved_project_row_is_skipped() {
    let mut conn = open_db_in_memory().unwrap();
    load(&mut conn, &base_batch());

    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         INSERT INTO unified_tasks
            (id, project_id, assignee_id, task_name, status, blocker_notes, source_api)
         VALUES (98, 404, 1, 'Stray', 'Blocked', 'Waiting for Expense ID 42', 'pm_api');
         PRAGMA foreign_keys = ON;",
    )
    .unwrap();

    let ids: Vec<i64> = report(&conn).iter().map(|row| row.task_id).collect();
    assert_eq!(ids, vec![5]);
}

struct NoReasoning;

impl ReasoningClient for NoReasoning {
    fn complete(&self, _request: &ReasoningRequest) -> Result<String, ReasoningError> {
        Err(ReasoningError::Unconfigured("test".to_string()))
    }
}

#[test]
fn facade_serves_report_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unified.db");
    let mut conn = open_db(&path).unwrap();
    load(&mut conn, &base_batch());
    drop(conn);

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(&path), None);
    let response = facade.blocked_task_report();
    assert!(response.available);
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0].blocked_expense_id, 42);

    let status = facade.status();
    assert!(status.store_available);
    assert_eq!(status.last_load.unwrap().counts.tasks, 1);
}

#[test]
fn facade_reports_unavailable_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("unified.db");

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(path), None);
    let response = facade.blocked_task_report();
    assert!(!response.available);
    assert!(response.rows.is_empty());
    assert!(response.message.contains("unavailable"));
    assert!(!facade.status().store_available);
}

#[test]
fn facade_reports_unavailable_when_schema_is_too_new() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(&path), None);
    assert!(!facade.blocked_task_report().available);
}

#[test]
fn facade_never_creates_missing_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unified.db");

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(&path), None);
    assert!(!facade.blocked_task_report().available);
    assert!(!facade.status().store_available);
    assert!(!path.exists());
}

#[test]
fn facade_treats_migrated_but_unloaded_store_as_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unified.db");
    drop(open_db(&path).unwrap());

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(&path), None);
    let response = facade.blocked_task_report();
    assert!(!response.available);
    assert!(response.message.contains("not been loaded"));

    let status = facade.status();
    assert!(status.store_available);
    assert!(status.last_load.is_none());
}

#[test]
fn facade_rejects_store_the_etl_never_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    drop(Connection::open(&path).unwrap());

    let facade: PortalFacade<NoReasoning> = PortalFacade::new(UnifiedStore::new(&path), None);
    assert!(!facade.blocked_task_report().available);

    let conn = Connection::open(&path).unwrap();
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, 0);
}
