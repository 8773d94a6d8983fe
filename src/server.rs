//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/check` | Run a price request: `{"query": "...", "deepSearch": false}` |
//! | `POST` | `/v1/report` | Flag a URL that showed a wrong price: `{"url": "...", "reason": "..."}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::models::{PriceReport, ReportedUrl};
use crate::pipeline::RequestOrchestrator;
use crate::store::Store;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<RequestOrchestrator>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Arc::new(RequestOrchestrator::from_config(config).await?);
    let app = router(orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "fairprice server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The API router, separated from [`run_server`] so it can be driven
/// in-process.
pub fn router(orchestrator: Arc<RequestOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/report", post(handle_report))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /v1/check ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest {
    query: String,
    #[serde(default)]
    deep_search: bool,
}

async fn handle_check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<PriceReport>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let report = state
        .orchestrator
        .process_price_request(&req.query, req.deep_search)
        .await
        .map_err(internal)?;
    Ok(Json(report))
}

// ============ POST /v1/report ============

#[derive(Deserialize)]
struct ReportRequest {
    url: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
struct ReportResponse {
    id: String,
}

async fn handle_report(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> Result<(StatusCode, Json<ReportResponse>), AppError> {
    let url = req.url.trim();
    let valid = url::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !valid {
        return Err(bad_request(format!("invalid url: {}", url)));
    }

    let report = ReportedUrl {
        id: uuid::Uuid::new_v4().to_string(),
        url: url.to_string(),
        reason: req.reason.filter(|r| !r.trim().is_empty()),
        created_at: Utc::now(),
    };
    state
        .orchestrator
        .store()
        .report_url(&report)
        .await
        .map_err(internal)?;

    Ok((StatusCode::CREATED, Json(ReportResponse { id: report.id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, SearchConfig};
    use crate::embedding::HashEmbedder;
    use crate::oracle::DisabledOracle;
    use crate::pipeline::Collaborators;
    use crate::reader::{Page, PageReader};
    use crate::store::memory::InMemoryStore;
    use crate::websearch::DisabledSearcher;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct NoPages;

    #[async_trait]
    impl PageReader for NoPages {
        fn name(&self) -> &str {
            "none"
        }
        async fn read(&self, url: &str) -> anyhow::Result<Page> {
            anyhow::bail!("offline: {}", url)
        }
    }

    fn app(store: Arc<InMemoryStore>) -> Router {
        let parts = Collaborators {
            store,
            embedder: Arc::new(HashEmbedder::new(64)),
            oracle: Arc::new(DisabledOracle::new("test")),
            searcher: Arc::new(DisabledSearcher),
            reader: Arc::new(NoPages),
        };
        let orchestrator =
            RequestOrchestrator::new(parts, &SearchConfig::default(), &PipelineConfig::default());
        router(Arc::new(orchestrator))
    }

    fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app(Arc::new(InMemoryStore::new()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_returns_camel_case_report() {
        let resp = app(Arc::new(InMemoryStore::new()))
            .oneshot(post_json(
                "/v1/check",
                serde_json::json!({"query": "pressure cooker for 2,499 rs"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["price"], 2499);
        assert_eq!(body["item"], "pressure cooker");
        assert_eq!(body["analysis"]["verdict"], "Analysis Pending");
        assert_eq!(body["confidenceScore"], 60);
        assert!(body["webData"].as_array().unwrap().is_empty());
        assert_eq!(body["deepSearch"], false);
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let resp = app(Arc::new(InMemoryStore::new()))
            .oneshot(post_json("/v1/check", serde_json::json!({"query": "  "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_store_outage_is_internal_error() {
        let store = Arc::new(InMemoryStore::new());
        store.set_offline(true);
        let resp = app(store)
            .oneshot(post_json("/v1/check", serde_json::json!({"query": "kettle"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"]["code"], "internal");
    }

    #[tokio::test]
    async fn test_report_url() {
        let store = Arc::new(InMemoryStore::new());
        let resp = app(store.clone())
            .oneshot(post_json(
                "/v1/report",
                serde_json::json!({"url": "https://shop.in/p/1", "reason": "shows EMI"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let reports = store.list_reported_urls(10).await.unwrap();
        assert_eq!(reports[0].reason.as_deref(), Some("shows EMI"));

        let bad = app(store)
            .oneshot(post_json("/v1/report", serde_json::json!({"url": "nope"})))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
