//! Synchronous HTTP front for the portal façade.
//!
//! # Responsibility
//! - Serve `GET /`, `GET /reports/blocked-tasks` and `POST /ask-ai`.
//! - Answer with JSON bodies and permissive CORS headers.
//!
//! # Invariants
//! - Requests are handled one at a time.
//! - Routing is a pure function of method, path and body.

use log::{error, info, warn};
use portal_core::reasoning::ReasoningClient;
use portal_core::PortalFacade;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use std::time::Instant;
use tiny_http::{Header, Response, Server};

const MAX_BODY_BYTES: u64 = 64 * 1024;

const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "*"),
];

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

/// Runs the request loop until the listener fails.
pub fn serve<C: ReasoningClient>(bind: &str, facade: &PortalFacade<C>) -> Result<(), String> {
    let server = Server::http(bind).map_err(|err| format!("cannot bind `{bind}`: {err}"))?;
    info!("event=server_start module=server status=ok bind={bind}");

    for mut request in server.incoming_requests() {
        let started_at = Instant::now();
        let method = request.method().to_string();
        let path = request
            .url()
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        let mut body = String::new();
        let (status, payload) = match request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_string(&mut body)
        {
            Ok(_) => route(&method, &path, &body, facade),
            Err(err) => (400, json!({ "error": format!("unreadable body: {err}") })),
        };

        let mut response = Response::from_string(payload.to_string()).with_status_code(status);
        for (name, value) in RESPONSE_HEADERS {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }
        if let Err(err) = request.respond(response) {
            warn!("event=server_respond module=server status=error path={path} error={err}");
            continue;
        }
        info!(
            "event=server_request module=server status=ok method={method} path={path} code={status} duration_ms={}",
            started_at.elapsed().as_millis()
        );
    }

    error!("event=server_stop module=server status=error bind={bind}");
    Err("HTTP listener stopped".to_string())
}

/// Maps one request to a status code and JSON body.
pub fn route<C: ReasoningClient>(
    method: &str,
    path: &str,
    body: &str,
    facade: &PortalFacade<C>,
) -> (u16, Value) {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match (method, path) {
        ("OPTIONS", _) => (204, Value::Null),
        ("GET", "/") => to_json(200, &facade.status()),
        ("GET", "/reports/blocked-tasks") => {
            let report = facade.blocked_task_report();
            let status = if report.available { 200 } else { 503 };
            to_json(status, &report)
        }
        ("POST", "/ask-ai") => match serde_json::from_str::<AskRequest>(body) {
            Ok(request) if !request.question.trim().is_empty() => {
                to_json(200, &facade.ask(&request.question))
            }
            Ok(_) => (400, json!({ "error": "question cannot be empty" })),
            Err(err) => (400, json!({ "error": format!("invalid request body: {err}") })),
        },
        (_, "/" | "/reports/blocked-tasks" | "/ask-ai") => {
            (405, json!({ "error": format!("method {method} not allowed") }))
        }
        _ => (404, json!({ "error": format!("no route for {path}") })),
    }
}

fn to_json<T: serde::Serialize>(status: u16, value: &T) -> (u16, Value) {
    match serde_json::to_value(value) {
        Ok(value) => (status, value),
        Err(err) => (500, json!({ "error": err.to_string() })),
    }
}

#[cfg(test)]
mod tests {
    use super::route;
    use portal_core::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
    use portal_core::repo::unified_repo::SqliteUnifiedRepository;
    use portal_core::service::load_service::UnificationLoader;
    use portal_core::{open_db, PortalFacade, UnifiedBatch, UnifiedStore};
    use serde_json::json;
    use std::path::{Path, PathBuf};

    struct Silent;

    impl ReasoningClient for Silent {
        fn complete(&self, _request: &ReasoningRequest) -> Result<String, ReasoningError> {
            Err(ReasoningError::Http("offline".to_string()))
        }
    }

    fn facade_at(path: PathBuf, client: Option<Silent>) -> PortalFacade<Silent> {
        PortalFacade::new(UnifiedStore::new(path), client)
    }

    /// Records one completed full refresh that carried no rows.
    fn load_empty_store(path: &Path) {
        let mut conn = open_db(path).unwrap();
        let repo = SqliteUnifiedRepository::try_new(&mut conn).unwrap();
        UnificationLoader::new(repo)
            .load(&UnifiedBatch::default())
            .unwrap();
    }

    #[test]
    fn root_reports_service_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unified.db");

        let facade = facade_at(path.clone(), None);
        let (status, body) = route("GET", "/", "", &facade);
        assert_eq!(status, 200);
        assert_eq!(body["store_available"], json!(false));
        assert!(body["status"].as_str().unwrap().contains("running"));
        assert!(!path.exists());

        load_empty_store(&path);
        let (status, body) = route("GET", "/", "", &facade);
        assert_eq!(status, 200);
        assert_eq!(body["store_available"], json!(true));
        assert!(body["last_load"]["run_id"].is_string());
    }

    #[test]
    fn report_on_never_loaded_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unified.db");
        let facade = facade_at(path.clone(), None);

        let (status, body) = route("GET", "/reports/blocked-tasks/", "", &facade);
        assert_eq!(status, 503);
        assert_eq!(body["available"], json!(false));
        assert_eq!(body["rows"], json!([]));
        assert!(!path.exists());
    }

    #[test]
    fn report_on_loaded_empty_store_is_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unified.db");
        load_empty_store(&path);
        let facade = facade_at(path, None);

        let (status, body) = route("GET", "/reports/blocked-tasks", "", &facade);
        assert_eq!(status, 200);
        assert_eq!(body["available"], json!(true));
        assert_eq!(body["rows"], json!([]));
    }

    #[test]
    fn unreadable_store_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade_at(dir.path().join("missing").join("unified.db"), None);

        let (status, body) = route("GET", "/reports/blocked-tasks", "", &facade);
        assert_eq!(status, 503);
        assert_eq!(body["available"], json!(false));
    }

    #[test]
    fn ask_validates_body_and_degrades_without_agent() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade_at(dir.path().join("unified.db"), None);

        let (status, _) = route("POST", "/ask-ai", "not json", &facade);
        assert_eq!(status, 400);
        let (status, _) = route("POST", "/ask-ai", r#"{"question": "  "}"#, &facade);
        assert_eq!(status, 400);

        let (status, body) = route(
            "POST",
            "/ask-ai",
            r#"{"question": "Who is blocked?"}"#,
            &facade,
        );
        assert_eq!(status, 200);
        assert_eq!(body["question"], json!("Who is blocked?"));
        assert!(body["answer"].as_str().unwrap().contains("not configured"));
    }

    #[test]
    fn collaborator_failure_becomes_answer_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unified.db");
        load_empty_store(&path);
        let facade = facade_at(path, Some(Silent));

        let (status, body) = route("POST", "/ask-ai", r#"{"question": "Budget?"}"#, &facade);
        assert_eq!(status, 200);
        assert!(body["answer"].as_str().unwrap().contains("offline"));
    }

    #[test]
    fn unknown_routes_and_methods() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade_at(dir.path().join("unified.db"), None);

        assert_eq!(route("GET", "/employees", "", &facade).0, 404);
        assert_eq!(route("DELETE", "/ask-ai", "", &facade).0, 405);
        assert_eq!(route("OPTIONS", "/ask-ai", "", &facade).0, 204);
    }
}
