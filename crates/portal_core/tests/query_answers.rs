use chrono::NaiveDate;
use portal_core::db::open_db_in_memory;
use portal_core::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
use portal_core::repo::report_repo::SqliteReportRepository;
use portal_core::repo::unified_repo::SqliteUnifiedRepository;
use portal_core::service::load_service::UnificationLoader;
use portal_core::service::query_service::{execute_query, CannedQuery, QueryError, QueryService};
use portal_core::{Employee, Expense, Money, Project, Provenance, Task, UnifiedBatch};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Replays canned replies and records every request it receives.
struct ScriptedClient {
    replies: RefCell<VecDeque<Result<String, ReasoningError>>>,
    seen: RefCell<Vec<ReasoningRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, ReasoningError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl ReasoningClient for ScriptedClient {
    fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        self.seen.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ReasoningError::Response("script exhausted".to_string())))
    }
}

fn seeded_store() -> Connection {
    let batch = UnifiedBatch {
        employees: vec![Employee {
            id: 1,
            name: "Ada Park".to_string(),
            role: "Engineer".to_string(),
            department: "R&D".to_string(),
            provenance: Provenance::HrApi,
        }],
        projects: vec![Project {
            id: 1,
            name: "Apollo".to_string(),
            total_budget: Money::from_cents(5_000_000),
            provenance: Provenance::FinanceApi,
        }],
        expenses: vec![Expense {
            id: 42,
            project_id: 1,
            vendor: Some("Acme".to_string()),
            description: Some("Servers".to_string()),
            amount: Money::from_cents(150_050),
            status: "Pending".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            provenance: Provenance::FinanceApi,
        }],
        tasks: vec![Task {
            id: 5,
            project_id: 1,
            assignee_id: 1,
            task_name: "Rack servers".to_string(),
            status: "Blocked".to_string(),
            blocker_notes: Some("Waiting for Expense ID 42 - pending approval".to_string()),
            provenance: Provenance::PmApi,
        }],
    };

    let mut conn = open_db_in_memory().unwrap();
    {
        let repo = SqliteUnifiedRepository::try_new(&mut conn).unwrap();
        UnificationLoader::new(repo).load(&batch).unwrap();
    }
    conn
}

#[test]
fn question_runs_one_allow_listed_query_then_phrases_answer() {
    let conn = seeded_store();
    let repo = SqliteReportRepository::try_new(&conn).unwrap();
    let client = ScriptedClient::new(vec![
        Ok(r#"{"query": "blocked_tasks", "params": {}}"#.to_string()),
        Ok("  Ada Park is blocked on the Acme expense.  ".to_string()),
    ]);

    let answer = QueryService::new(repo, &client)
        .answer("Who is blocked and why?")
        .unwrap();
    assert_eq!(answer, "Ada Park is blocked on the Acme expense.");

    let seen = client.seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].user, "Who is blocked and why?");
    assert!(seen[1].user.contains("blocked_tasks"));
    assert!(seen[1].user.contains("\"blocked_expense_vendor\":\"Acme\""));
}

#[test]
fn query_outside_allow_list_never_reaches_store() {
    let conn = seeded_store();
    let repo = SqliteReportRepository::try_new(&conn).unwrap();
    let client = ScriptedClient::new(vec![Ok(
        r#"{"query": "raw_sql", "params": {"sql": "DELETE FROM unified_tasks"}}"#.to_string(),
    )]);

    let err = QueryService::new(repo, &client)
        .answer("Delete everything")
        .unwrap_err();
    assert!(matches!(err, QueryError::NotAllowed(name) if name == "raw_sql"));
    assert_eq!(client.seen.borrow().len(), 1);

    let tasks: i64 = conn
        .query_row("SELECT COUNT(*) FROM unified_tasks;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(tasks, 1);
}

#[test]
fn declined_question_returns_collaborator_text() {
    let conn = seeded_store();
    let repo = SqliteReportRepository::try_new(&conn).unwrap();
    let client = ScriptedClient::new(vec![Ok(
        r#"{"query": "none", "answer": "Payroll is not in the unified data."}"#.to_string(),
    )]);

    let answer = QueryService::new(repo, &client)
        .answer("What is Ada's salary?")
        .unwrap();
    assert_eq!(answer, "Payroll is not in the unified data.");
    assert_eq!(client.seen.borrow().len(), 1);
}

#[test]
fn collaborator_failure_propagates() {
    let conn = seeded_store();
    let repo = SqliteReportRepository::try_new(&conn).unwrap();
    let client = ScriptedClient::new(vec![Err(ReasoningError::Http("timeout".to_string()))]);

    let err = QueryService::new(repo, &client).answer("Budget?").unwrap_err();
    assert!(matches!(err, QueryError::Reasoning(ReasoningError::Http(_))));
}

#[test]
fn canned_queries_bind_names_case_insensitively() {
    let conn = seeded_store();
    let repo = SqliteReportRepository::try_new(&conn).unwrap();

    let budget = execute_query(
        &repo,
        &CannedQuery::ProjectBudget {
            project: "apollo".to_string(),
        },
    )
    .unwrap();
    assert_eq!(budget[0]["total_budget"], "50000.00");

    let expenses = execute_query(
        &repo,
        &CannedQuery::ProjectExpenses {
            project: "APOLLO".to_string(),
        },
    )
    .unwrap();
    assert_eq!(expenses.as_array().unwrap().len(), 1);
    assert_eq!(expenses[0]["amount"], "1500.50");

    let tasks = execute_query(
        &repo,
        &CannedQuery::EmployeeTasks {
            employee: "ada park".to_string(),
        },
    )
    .unwrap();
    assert_eq!(tasks[0]["project_name"], "Apollo");

    let blocked = execute_query(
        &repo,
        &CannedQuery::TasksByStatus {
            status: "blocked".to_string(),
        },
    )
    .unwrap();
    assert_eq!(blocked.as_array().unwrap().len(), 1);

    let unknown = execute_query(
        &repo,
        &CannedQuery::ProjectBudget {
            project: "'; DROP TABLE unified_projects; --".to_string(),
        },
    )
    .unwrap();
    assert_eq!(unknown, serde_json::json!([]));
}
