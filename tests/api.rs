//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use incidentlens::aggregate::{Aggregator, AggregatorConfig};
use incidentlens::api::{router, state::AppState};
use incidentlens::clock::ManualClock;
use incidentlens::dashboard::Dashboard;
use incidentlens::source::{Account, CachingSource, DataSource, EventKind, RawEvent, SourceError};
use incidentlens::window::QueryRange;

const T0: i64 = 1_700_000_000_000;

struct OneIncident {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl DataSource for OneIncident {
    async fn fetch_events(
        &self,
        account: &Account,
        _range: &QueryRange,
    ) -> Result<Vec<RawEvent>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Api("rate limited".to_string()));
        }
        Ok(vec![RawEvent {
            timestamp: T0,
            incident_id: "42".to_string(),
            condition_name: "Disk almost full".to_string(),
            policy_name: None,
            priority: Some("warning".to_string()),
            entity_name: Some("db-1".to_string()),
            entity_type: Some("HOST".to_string()),
            event_kind: EventKind::Open,
            account_label: account.label.clone(),
        }])
    }
}

fn now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(T0 + 90_000).unwrap()
}

fn app(fail: bool) -> axum::Router {
    let source = OneIncident {
        fail,
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let aggregator = Aggregator::new(
        Arc::new(source),
        vec![Account::new("Acme", 1, "k1")],
        AggregatorConfig::default(),
    );
    let dashboard = Dashboard::new(aggregator, Arc::new(ManualClock::new(now())));
    router(AppState::new(dashboard))
}

/// Same app with a five-minute cache in front of the source.
fn cached_app(calls: Arc<AtomicUsize>) -> axum::Router {
    let clock = Arc::new(ManualClock::new(now()));
    let source = CachingSource::new(
        OneIncident { fail: false, calls },
        chrono::Duration::minutes(5),
        clock.clone(),
    );
    let aggregator = Aggregator::new(
        Arc::new(source),
        vec![Account::new("Acme", 1, "k1")],
        AggregatorConfig::default(),
    );
    router(AppState::new(Dashboard::new(aggregator, clock)))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app(false), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_windows_lists_all_five() {
    let (_, body) = get(app(false), "/api/v1/windows").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["meta"]["default"], "Last 24 Hours");
}

#[tokio::test]
async fn test_accounts() {
    let (_, body) = get(app(false), "/api/v1/accounts").await;
    assert_eq!(body["data"][0], "Acme");
    assert_eq!(body["meta"]["all_label"], "All Customers");
}

#[tokio::test]
async fn test_dashboard_view() {
    let (status, body) = get(app(false), "/api/v1/dashboard?window=1h&compare=false").await;
    assert_eq!(status, StatusCode::OK);
    let view = &body["data"];
    assert_eq!(view["selection"], "All Customers");
    assert_eq!(view["metrics"]["total"], 1);
    assert_eq!(view["metrics"]["mttr"], "N/A");
    assert_eq!(view["incidents"][0]["incident_id"], "42");
    assert_eq!(view["incidents"][0]["duration"], "1m");
    assert_eq!(view["incidents"][0]["category"], "Infrastructure");
    assert_eq!(body["meta"]["stale"], false);
}

#[tokio::test]
async fn test_dashboard_bad_window_is_400() {
    let (status, body) = get(app(false), "/api/v1/dashboard?window=forever").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("unknown time window"));
}

#[tokio::test]
async fn test_dashboard_unknown_account_is_404() {
    let (status, _) = get(app(false), "/api/v1/dashboard?account=Nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_total_outage_without_history_is_503() {
    let (status, _) = get(app(true), "/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_refresh_forces_refetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = cached_app(calls.clone());
    let uri = "/api/v1/dashboard?compare=false";

    let (status, _) = get(app.clone(), uri).await;
    assert_eq!(status, StatusCode::OK);
    get(app.clone(), uri).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metrics"]["total"], 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let (status, _) = get(app(false), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
