// HTTP surface tests driven through the router
// Author: kelexine (https://github.com/kelexine)

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{default_payload, ScriptedGenerator};
use genguard::config::{AppConfig, RateLimitPolicy};
use genguard::governance::GovernedGenerationService;
use genguard::server::create_router;
use genguard::store::Stores;
use genguard::upstream::UpstreamError;
use genguard::usage::MemoryUsageLedger;
use genguard::utils::clock::ManualClock;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router(config: AppConfig, generator: ScriptedGenerator) -> Router {
    let clock = Arc::new(ManualClock::default());
    let service = GovernedGenerationService::new(
        &config,
        Stores::in_memory(100),
        Arc::new(MemoryUsageLedger::new(config.plans.clone(), clock.clone())),
        Arc::new(generator),
        clock,
    );
    create_router(config, Arc::new(service)).unwrap()
}

fn generate(user: Option<&str>, request_type: &str, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/v1/generate/{}", request_type))
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generate_then_cache_hit() {
    let app = router(AppConfig::default(), ScriptedGenerator::default());
    let body = json!({"input": "Modern 3BR apartment, downtown"});

    let first = app
        .clone()
        .oneshot(generate(Some("u1"), "generate_all", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "miss");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "9");
    assert!(first.headers().contains_key("x-request-id"));
    let first = json_body(first).await;
    assert_eq!(first["payload"], default_payload());
    assert_eq!(first["metadata"]["cached"], false);
    assert_eq!(first["metadata"]["request_type"], "generate_all");

    let second = app
        .oneshot(generate(Some("u1"), "generate_all", body))
        .await
        .unwrap();
    assert_eq!(second.headers()["x-cache"], "hit");
    let second = json_body(second).await;
    assert_eq!(second["payload"], first["payload"]);
    assert_eq!(second["metadata"]["cached"], true);
}

#[tokio::test]
async fn test_rate_limited_request_gets_429_with_retry_after() {
    let mut config = AppConfig::default();
    config.rate_limit.user = RateLimitPolicy::new(1, 60);
    let app = router(config, ScriptedGenerator::default());

    app.clone()
        .oneshot(generate(Some("u1"), "audit", json!({"input": "a"})))
        .await
        .unwrap();
    let denied = app
        .oneshot(generate(Some("u1"), "audit", json!({"input": "b"})))
        .await
        .unwrap();

    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.headers()["retry-after"], "60");
    let body = json_body(denied).await;
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "rate_limited");
    assert_eq!(body["error"]["retry_after_secs"], 60);
}

#[tokio::test]
async fn test_plan_limit_gets_402() {
    let mut config = AppConfig::default();
    config.plans.tiers.insert("free".to_string(), 0);
    let app = router(config, ScriptedGenerator::default());

    let response = app
        .oneshot(generate(Some("u1"), "audit", json!({"input": "a"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "plan_limit_reached");
}

#[tokio::test]
async fn test_upstream_quota_exhaustion_is_masked_503() {
    let generator = ScriptedGenerator::new(vec![Err(UpstreamError::quota_exhausted(
        "org-123 exceeded billing hard limit",
    ))]);
    let app = router(AppConfig::default(), generator);

    let response = app
        .oneshot(generate(Some("u1"), "audit", json!({"input": "a"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "service_unavailable");
    assert_eq!(body["error"]["message"], "AI service temporarily unavailable");
    assert!(!body.to_string().contains("org-123"));
}

#[tokio::test]
async fn test_bad_requests_are_rejected() {
    let app = router(AppConfig::default(), ScriptedGenerator::default());

    let missing_user = app
        .clone()
        .oneshot(generate(None, "audit", json!({"input": "a"})))
        .await
        .unwrap();
    assert_eq!(missing_user.status(), StatusCode::BAD_REQUEST);

    let unknown_type = app
        .clone()
        .oneshot(generate(Some("u1"), "poem", json!({"input": "a"})))
        .await
        .unwrap();
    assert_eq!(unknown_type.status(), StatusCode::BAD_REQUEST);
    let body = json_body(unknown_type).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let no_input = app
        .oneshot(generate(Some("u1"), "audit", json!({"prompt": "a"})))
        .await
        .unwrap();
    assert_eq!(no_input.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_sweep_health_and_metrics() {
    let app = router(AppConfig::default(), ScriptedGenerator::default());
    app.clone()
        .oneshot(generate(Some("u1"), "audit", json!({"input": "a"})))
        .await
        .unwrap();

    let stats = app
        .clone()
        .oneshot(Request::get("/v1/cache/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(stats.status(), StatusCode::OK);
    assert_eq!(json_body(stats).await["entries"], 1);

    let sweep = app
        .clone()
        .oneshot(
            Request::post("/v1/maintenance/sweep")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(sweep.status(), StatusCode::OK);
    assert_eq!(json_body(sweep).await["cache_entries_removed"], 0);

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health = json_body(health).await;
    // No API key in the default config
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["checks"]["store"]["status"], "ok");

    let metrics = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = axum::body::to_bytes(metrics.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&text).contains("governed_requests_total"));
}
