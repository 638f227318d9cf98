use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::dashboard::{self, Dashboard};
use crate::db::query::{run_query, sanitize_sql};
use crate::db::schema_manager::EMPTY_SCHEMA_CONTEXT;
use crate::llm::models::GeneratedQuery;
use crate::web::state::AppState;

/// Question the test-query probe pushes through the pipeline.
const TEST_QUESTION: &str = "How many rows are in each table?";

// Request/response types

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<Dashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_seconds: Option<f64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AskResponse {
    fn started(question: &str) -> Self {
        Self {
            question: question.to_string(),
            status: "success".to_string(),
            error: None,
            sql_query: None,
            query_explanation: None,
            row_count: None,
            column_count: None,
            dashboard: None,
            execution_time_seconds: None,
            timestamp: chrono::Utc::now(),
        }
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Question failed: {}", message);
        self.status = "error".to_string();
        self.error = Some(message);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct TestQueryResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub table_count: usize,
    pub llm_backend: String,
    pub database: String,
}

// API Implementations

/// `POST /ask` - the full question pipeline: schema context, SQL
/// generation, execution, analysis, chart rendering.
///
/// Only a missing question is an HTTP error; failures later in the
/// pipeline come back as a 200 with `status: "error"` so the chat UI can
/// show them inline.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorBody>)> {
    let started = Instant::now();
    let question = payload.question.trim().to_string();

    if question.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "No question provided".to_string(),
            }),
        ));
    }

    info!("Processing question: {}", question);
    let mut response = AskResponse::started(&question);

    let schema_context = match state.schema_manager.context().await {
        Ok(context) => context,
        Err(e) => {
            return Ok(Json(
                response.failed(format!("Failed to load schema context: {}", e)),
            ))
        }
    };

    if schema_context == EMPTY_SCHEMA_CONTEXT {
        return Ok(Json(response.failed(
            "No tables found in the warehouse - load some data first",
        )));
    }

    let generated = match generate_query(&state, &question, &schema_context).await {
        Ok(generated) => generated,
        Err(message) => return Ok(Json(response.failed(message))),
    };

    let sql = sanitize_sql(&generated.query);
    response.sql_query = Some(sql.clone());
    response.query_explanation = Some(generated.explanation);

    if sql.is_empty() {
        return Ok(Json(response.failed("Failed to generate SQL query")));
    }

    let result = match run_query(state.db_pool.clone(), sql.clone()).await {
        Ok(result) => result,
        Err(e) => return Ok(Json(response.failed(e.to_string()))),
    };

    response.row_count = Some(result.row_count);
    response.column_count = Some(result.columns.len());

    // Chart rendering is CPU-bound, keep it off the async workers
    let title = format!("Analysis for: {}", question);
    let dashboard = match tokio::task::spawn_blocking(move || {
        dashboard::build(&title, &sql, &result.schema, &result.batches)
    })
    .await
    {
        Ok(dashboard) => dashboard,
        Err(e) => return Ok(Json(response.failed(format!("Dashboard task failed: {}", e)))),
    };

    response.dashboard = Some(dashboard);
    response.execution_time_seconds =
        Some((started.elapsed().as_secs_f64() * 100.0).round() / 100.0);

    Ok(Json(response))
}

async fn generate_query(
    state: &Arc<AppState>,
    question: &str,
    schema_context: &str,
) -> Result<GeneratedQuery, String> {
    let manager = state.llm_manager.lock().await;
    manager
        .generate_query(question, schema_context)
        .await
        .map_err(|e| e.to_string())
}

/// `POST /refresh-schema` - force a rebuild of the cached schema context.
pub async fn refresh_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<StatusMessage>)> {
    match state.schema_manager.refresh().await {
        Ok(_) => Ok(Json(StatusMessage {
            status: "success".to_string(),
            message: "Schema context refreshed successfully".to_string(),
        })),
        Err(e) => {
            error!("Schema refresh failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusMessage {
                    status: "error".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

/// `POST /test-query` - run a canned question through generation and
/// execution as a health probe. No dashboard is built.
pub async fn test_query(State(state): State<Arc<AppState>>) -> Json<TestQueryResponse> {
    let failed = |message: String| {
        error!("Test query failed: {}", message);
        Json(TestQueryResponse {
            status: "error".to_string(),
            message: Some(message),
            sql_query: None,
            query_explanation: None,
            row_count: None,
        })
    };

    let schema_context = match state.schema_manager.context().await {
        Ok(context) => context,
        Err(e) => return failed(format!("Failed to load schema context: {}", e)),
    };

    if schema_context == EMPTY_SCHEMA_CONTEXT {
        return failed("No tables found in the warehouse - load some data first".to_string());
    }

    let generated = match generate_query(&state, TEST_QUESTION, &schema_context).await {
        Ok(generated) => generated,
        Err(message) => return failed(message),
    };

    let sql = sanitize_sql(&generated.query);
    if sql.is_empty() {
        return failed("Failed to generate SQL query".to_string());
    }

    let result = match run_query(state.db_pool.clone(), sql.clone()).await {
        Ok(result) => result,
        Err(e) => return failed(e.to_string()),
    };

    Json(TestQueryResponse {
        status: "success".to_string(),
        message: Some(format!(
            "Test query returned {} rows in {}ms",
            result.row_count, result.execution_time_ms
        )),
        sql_query: Some(sql),
        query_explanation: Some(generated.explanation),
        row_count: Some(result.row_count),
    })
}

/// `GET /api/status` - version, uptime, and warehouse shape for the admin UI.
pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, (StatusCode, String)> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let table_count = state.schema_manager.table_count().await.map_err(|e| {
        error!("Failed to count tables: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database error".to_string(),
        )
    })?;

    let llm_backend = state.llm_manager.lock().await.backend().to_string();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        table_count,
        llm_backend,
        database: state.config.database.connection_string.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::db_pool::DuckDBConnectionManager;
    use crate::llm::LlmManager;
    use crate::web::routes;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use r2d2::Pool;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.database.connection_string = ":memory:".to_string();
        config.database.pool_size = 1;

        let manager = DuckDBConnectionManager::new(":memory:".to_string());
        let pool = Pool::builder().max_size(1).build(manager).expect("pool");
        let llm_manager = LlmManager::new(&config.llm).expect("llm manager");

        Arc::new(AppState::new(config, pool, llm_manager))
    }

    fn test_app() -> Router {
        routes::ui_routes()
            .merge(routes::api_routes())
            .with_state(test_state())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn ask_rejects_empty_question() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "   "}"#))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "No question provided");
    }

    #[tokio::test]
    async fn ask_reports_empty_warehouse_as_application_error() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "total sales by region"}"#))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("No tables found"));
    }

    #[tokio::test]
    async fn refresh_schema_reports_success() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/refresh-schema")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Schema context refreshed successfully");
    }

    #[tokio::test]
    async fn test_query_on_empty_warehouse_is_an_error_payload() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/test-query")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn status_reports_version_and_backend() {
        let app = test_app();
        let request = Request::builder()
            .method("GET")
            .uri("/api/status")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["llm_backend"], "ollama");
        assert_eq!(body["table_count"], 0);
    }

    #[tokio::test]
    async fn index_serves_chat_ui() {
        let app = test_app();
        let request = Request::builder()
            .method("GET")
            .uri("/")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("question-form"));
        assert!(html.contains(env!("CARGO_PKG_VERSION")));
    }
}
