// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/news/run (empty pipeline; stable numeric response)

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use newswire_courier::api::{create_router, AppState};
use newswire_courier::dedup::fingerprint::ContentMatcher;
use newswire_courier::dedup::DuplicateFilter;
use newswire_courier::editor::Editor;
use newswire_courier::job::DailyNewsJob;
use newswire_courier::lang::StopwordGuard;
use newswire_courier::oracle::{Oracle, OracleError};
use newswire_courier::rewriter::Rewriter;
use newswire_courier::store::{HistoryStore, MemoryStore};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct SilentOracle;

#[async_trait::async_trait]
impl Oracle for SilentOracle {
    async fn complete(
        &self,
        _system_prompt: Option<&str>,
        _user_prompt: &str,
    ) -> Result<String, OracleError> {
        Err(OracleError::permanent("not configured"))
    }
    fn name(&self) -> &'static str {
        "silent"
    }
}

/// Build the same Router the binary uses, with no providers and no sink.
fn test_router() -> Router {
    let store: Arc<dyn HistoryStore> = Arc::new(MemoryStore::new());
    let oracle: Arc<dyn Oracle> = Arc::new(SilentOracle);
    let job = Arc::new(DailyNewsJob::new(
        Vec::new(),
        DuplicateFilter::new(store.clone(), ContentMatcher::default(), 24),
        store,
        Editor::new(oracle.clone(), 20),
        Rewriter::new(oracle, Arc::new(StopwordGuard::new()), 4, 200, 400),
        None,
    ));
    create_router(AppState { job })
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "ok", "health body should be 'ok'");
}

#[tokio::test]
async fn api_run_returns_stable_numbers_never_an_error() {
    let app = test_router();

    let req = Request::builder()
        .method("POST")
        .uri("/api/news/run")
        .body(Body::empty())
        .expect("build POST /api/news/run");

    let resp = app.oneshot(req).await.expect("oneshot /api/news/run");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json: Json = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(json["success"], true);
    assert_eq!(json["articles_processed"], 0);
    assert!(json["message"].as_str().unwrap().contains("accepted 0"));
}
