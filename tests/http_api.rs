use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use inference_meter::api::{create_router, ApiState};
use inference_meter::config::MeterConfig;
use inference_meter::limiter::RateLimiter;
use inference_meter::pricing::PricingTable;
use inference_meter::storage::{MeterDatabase, StoreHandle};
use inference_meter::tier::{TierPolicy, TierResolver};
use inference_meter::usage::UsageRecorder;

fn router() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = MeterConfig {
        data_dir: dir.path().to_path_buf(),
        ..MeterConfig::default()
    };

    let database = Arc::new(MeterDatabase::new(config.data_dir.clone()).unwrap());
    let store = StoreHandle::new(database, Duration::from_secs(5));
    let policy = Arc::new(TierPolicy::default());
    let pricing = Arc::new(PricingTable::default());

    let limiter = RateLimiter::new(store.clone(), policy);
    let recorder = UsageRecorder::new(store.clone(), pricing);
    let tiers = TierResolver::new(store, 1_000, Duration::from_secs(60));

    let state = Arc::new(ApiState::new(limiter, recorder, tiers, config));
    (dir, create_router(state))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value, Option<String>) {
    let request = match body {
        Some(value) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .map(|value| value.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value, retry_after)
}

#[tokio::test]
async fn health_reports_service_name() {
    let (_dir, router) = router();
    let (status, body, _) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "inference-meter");
}

#[tokio::test]
async fn admit_rejects_empty_user_id() {
    let (_dir, router) = router();
    let (status, body, _) = send(&router, "POST", "/api/admit", Some(json!({"user_id": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_user_id");
}

#[tokio::test]
async fn fourth_admit_in_free_minute_window_maps_to_429() {
    let (_dir, router) = router();
    let request = json!({"user_id": "user-1", "tier": "free"});

    for _ in 0..3 {
        let (status, body, _) = send(&router, "POST", "/api/admit", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allowed"], true);
    }

    let (status, body, retry_after) = send(&router, "POST", "/api/admit", Some(request)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["limited_by"], "per_minute");

    let retry_after: u64 = retry_after.expect("Retry-After header").parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
}

#[tokio::test]
async fn unassigned_user_admits_under_free_default() {
    let (_dir, router) = router();
    let request = json!({"user_id": "fresh-user"});

    let (status, body, _) = send(&router, "POST", "/api/admit", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["tier"], "free");
}

#[tokio::test]
async fn assigned_tier_raises_the_window_limit() {
    let (_dir, router) = router();

    let (status, _, _) = send(
        &router,
        "PUT",
        "/api/tier/user-2",
        Some(json!({"tier": "pro"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // pro allows 10 per minute; the free limit of 3 must not apply
    for _ in 0..5 {
        let (status, body, _) =
            send(&router, "POST", "/api/admit", Some(json!({"user_id": "user-2"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "pro");
    }
}

#[tokio::test]
async fn unknown_tier_assignment_is_rejected() {
    let (_dir, router) = router();
    let (status, body, _) = send(
        &router,
        "PUT",
        "/api/tier/user-3",
        Some(json!({"tier": "platinum"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "unknown_tier");
}

#[tokio::test]
async fn tier_read_distinguishes_default_from_assigned() {
    let (_dir, router) = router();

    let (status, body, _) = send(&router, "GET", "/api/tier/user-4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "free");
    assert_eq!(body["assigned"], false);

    send(&router, "PUT", "/api/tier/user-4", Some(json!({"tier": "premium"}))).await;

    let (_, body, _) = send(&router, "GET", "/api/tier/user-4", None).await;
    assert_eq!(body["tier"], "premium");
    assert_eq!(body["assigned"], true);
}

#[tokio::test]
async fn recorded_usage_shows_up_in_month_aggregate() {
    let (_dir, router) = router();
    let event = json!({
        "user_id": "user-5",
        "model_id": "claude-sonnet",
        "provider": "anthropic",
        "input_tokens": 1000,
        "output_tokens": 500,
        "cached_tokens": 200,
        "latency_ms": 800,
        "cache_hit": true,
        "success": true,
        "error_type": null,
        "session_id": null
    });

    let (status, body, _) = send(&router, "POST", "/api/usage", Some(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recorded"], true);
    assert_eq!(decimal_field(&body["cost"]), dec!(0.00996));
    assert_eq!(decimal_field(&body["cached_savings"]), dec!(0.00054));

    let (status, body, _) = send(&router, "GET", "/api/usage/user-5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage"]["message_count"], 1);
    assert_eq!(body["usage"]["input_tokens"], 1000);
    assert_eq!(decimal_field(&body["usage"]["total_cost"]), dec!(0.00996));

    let (status, body, _) = send(&router, "GET", "/api/usage/user-5/events?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_event_is_rejected_at_the_boundary() {
    let (_dir, router) = router();
    let event = json!({
        "user_id": "user-6",
        "model_id": "claude-sonnet",
        "input_tokens": 100,
        "output_tokens": 10,
        "cached_tokens": 500,
        "latency_ms": 10,
        "success": true,
        "error_type": null,
        "provider": null,
        "session_id": null
    });

    let (status, body, _) = send(&router, "POST", "/api/usage", Some(event)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_event");
}

#[tokio::test]
async fn usage_for_unseen_user_is_zeroed() {
    let (_dir, router) = router();
    let (status, body, _) = send(&router, "GET", "/api/usage/ghost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage"]["message_count"], 0);
    assert_eq!(decimal_field(&body["usage"]["total_cost"]), Decimal::ZERO);
}

fn decimal_field(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal fields serialize as strings")
        .parse()
        .expect("decimal field parses")
}
