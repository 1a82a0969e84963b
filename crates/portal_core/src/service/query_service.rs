//! Natural-language questions answered through allow-listed queries.
//!
//! # Responsibility
//! - Ask the reasoning collaborator to pick one canned query for a question.
//! - Validate the pick against the allow-list and run it with bound params.
//! - Ask the collaborator to phrase the answer from the returned rows.
//!
//! # Invariants
//! - The collaborator never authors SQL; only `CannedQuery` variants run.
//! - Unknown query names are rejected before touching the store.

use crate::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
use crate::repo::report_repo::ReportRepository;
use crate::repo::unified_repo::RepoError;
use crate::service::blocker_service::BlockerResolver;
use log::{info, warn};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_ROWS_PROMPT_CHARS: usize = 12_000;

const PLANNER_SYSTEM_PROMPT: &str = r#"You answer questions about a unified HR, Finance and Project Management dataset.
You cannot write SQL. Pick exactly one of these read-only queries:
- blocked_tasks: every task with status 'Blocked', joined to its project, its assignee (name, role) and the expense its note waits on. No params.
- project_budget: one project's total budget. Params: {"project": "<project name>"}
- project_expenses: every expense of one project (vendor, description, amount, status, date). Params: {"project": "<project name>"}
- employee_tasks: every task assigned to one employee, with project name and status. Params: {"employee": "<employee name>"}
- tasks_by_status: every task with the given status. Params: {"status": "<status>"}
Reply with a single JSON object and nothing else:
{"query": "<query name>", "params": {...}}
If none of the queries can answer the question, reply:
{"query": "none", "answer": "<short explanation>"}"#;

const ANSWER_SYSTEM_PROMPT: &str = "You are a concise business analyst. Answer the user's question using only the JSON rows provided. If the rows are empty, say that no matching records were found. Do not invent data.";

/// Allow-listed, parameterized read queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedQuery {
    BlockedTasks,
    ProjectBudget { project: String },
    ProjectExpenses { project: String },
    EmployeeTasks { employee: String },
    TasksByStatus { status: String },
}

impl CannedQuery {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlockedTasks => "blocked_tasks",
            Self::ProjectBudget { .. } => "project_budget",
            Self::ProjectExpenses { .. } => "project_expenses",
            Self::EmployeeTasks { .. } => "employee_tasks",
            Self::TasksByStatus { .. } => "tasks_by_status",
        }
    }
}

/// What the collaborator decided to do with a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Run(CannedQuery),
    /// No query fits; the collaborator answered directly.
    Decline(String),
}

/// Question-answering failure.
#[derive(Debug)]
pub enum QueryError {
    Reasoning(ReasoningError),
    /// The collaborator's reply is not a usable plan.
    InvalidPlan(String),
    /// The collaborator asked for a query outside the allow-list.
    NotAllowed(String),
    Repo(RepoError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reasoning(err) => write!(f, "{err}"),
            Self::InvalidPlan(message) => write!(f, "invalid query plan: {message}"),
            Self::NotAllowed(name) => write!(f, "query `{name}` is not allowed"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reasoning(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvalidPlan(_) | Self::NotAllowed(_) => None,
        }
    }
}

impl From<ReasoningError> for QueryError {
    fn from(value: ReasoningError) -> Self {
        Self::Reasoning(value)
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Parses the collaborator's plan reply.
///
/// Tolerates prose around the JSON object; the first `{` through the last
/// `}` is taken as the payload.
pub fn parse_plan(reply: &str) -> Result<QueryPlan, QueryError> {
    let payload = extract_json(reply)
        .ok_or_else(|| QueryError::InvalidPlan("reply holds no JSON object".to_string()))?;
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| QueryError::InvalidPlan(format!("reply is not valid JSON: {err}")))?;

    let name = value
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| QueryError::InvalidPlan("missing `query` field".to_string()))?;
    let params = value.get("params");
    let param = |key: &'static str| -> Result<String, QueryError> {
        params
            .and_then(|params| params.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or_else(|| QueryError::InvalidPlan(format!("`{name}` needs param `{key}`")))
    };

    let query = match name {
        "none" => {
            let answer = value
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or("I can't answer that from the available reports.")
                .to_string();
            return Ok(QueryPlan::Decline(answer));
        }
        "blocked_tasks" => CannedQuery::BlockedTasks,
        "project_budget" => CannedQuery::ProjectBudget {
            project: param("project")?,
        },
        "project_expenses" => CannedQuery::ProjectExpenses {
            project: param("project")?,
        },
        "employee_tasks" => CannedQuery::EmployeeTasks {
            employee: param("employee")?,
        },
        "tasks_by_status" => CannedQuery::TasksByStatus {
            status: param("status")?,
        },
        other => return Err(QueryError::NotAllowed(other.to_string())),
    };
    Ok(QueryPlan::Run(query))
}

/// Runs one canned query and returns its rows as JSON.
pub fn execute_query<R: ReportRepository>(repo: &R, query: &CannedQuery) -> Result<Value, RepoError> {
    let rows = match query {
        CannedQuery::BlockedTasks => json!(BlockerResolver::new(repo).blocked_task_report()?),
        CannedQuery::ProjectBudget { project } => match repo.find_project_by_name(project)? {
            Some(found) => json!([{
                "project_id": found.id,
                "project_name": found.name,
                "total_budget": found.total_budget,
            }]),
            None => json!([]),
        },
        CannedQuery::ProjectExpenses { project } => match repo.find_project_by_name(project)? {
            Some(found) => json!(repo.expenses_in_project(found.id)?),
            None => json!([]),
        },
        CannedQuery::EmployeeTasks { employee } => json!(repo.tasks_for_employee(employee)?),
        CannedQuery::TasksByStatus { status } => json!(repo.tasks_by_status(status)?),
    };
    Ok(rows)
}

/// Question-answering service.
pub struct QueryService<R: ReportRepository, C: ReasoningClient> {
    repo: R,
    client: C,
}

impl<R: ReportRepository, C: ReasoningClient> QueryService<R, C> {
    pub fn new(repo: R, client: C) -> Self {
        Self { repo, client }
    }

    /// Answers `question` using at most one canned query.
    pub fn answer(&self, question: &str) -> Result<String, QueryError> {
        let reply = self.client.complete(&ReasoningRequest {
            system: PLANNER_SYSTEM_PROMPT.to_string(),
            user: question.to_string(),
        })?;

        let query = match parse_plan(&reply) {
            Ok(QueryPlan::Run(query)) => query,
            Ok(QueryPlan::Decline(answer)) => {
                info!("event=query_plan module=query status=ok query=none");
                return Ok(answer);
            }
            Err(err) => {
                warn!("event=query_plan module=query status=error error={err}");
                return Err(err);
            }
        };

        let rows = execute_query(&self.repo, &query)?;
        info!(
            "event=query_plan module=query status=ok query={} rows={}",
            query.name(),
            rows.as_array().map_or(0, Vec::len)
        );

        let rows_text = truncate_chars(&rows.to_string(), MAX_ROWS_PROMPT_CHARS);
        let answer = self.client.complete(&ReasoningRequest {
            system: ANSWER_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Question: {question}\nQuery: {}\nRows (JSON): {rows_text}",
                query.name()
            ),
        })?;
        Ok(answer.trim().to_string())
    }
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
