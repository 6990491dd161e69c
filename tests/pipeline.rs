//! End-to-end pipeline tests against an in-memory Data Source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use incidentlens::aggregate::{AccountSelection, Aggregator, AggregatorConfig};
use incidentlens::clock::{Clock, ManualClock};
use incidentlens::dashboard::{Dashboard, DashboardRequest};
use incidentlens::format::format_duration;
use incidentlens::reconcile::{reconcile, Status};
use incidentlens::source::{Account, CachingSource, DataSource, EventKind, RawEvent, SourceError};
use incidentlens::window::{QueryRange, TimeWindow};

const T0: i64 = 1_700_000_000_000;

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(T0).unwrap()
}

fn open(id: &str, label: &str) -> RawEvent {
    RawEvent {
        timestamp: T0,
        incident_id: id.to_string(),
        condition_name: "CPU utilization high".to_string(),
        policy_name: Some("Golden signals".to_string()),
        priority: Some("critical".to_string()),
        entity_name: Some(format!("{}-host", label.to_lowercase())),
        entity_type: Some("HOST".to_string()),
        event_kind: EventKind::Open,
        account_label: label.to_string(),
    }
}

/// Serves fixed rows per account id; ids missing from the map fail.
struct MapSource {
    rows: HashMap<u64, Vec<RawEvent>>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl DataSource for MapSource {
    async fn fetch_events(
        &self,
        account: &Account,
        _range: &QueryRange,
    ) -> Result<Vec<RawEvent>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .get(&account.account_id)
            .cloned()
            .ok_or_else(|| SourceError::Status {
                status: 403,
                body: "forbidden".to_string(),
            })
    }
}

fn accounts() -> Vec<Account> {
    vec![
        Account::new("Acme", 1, "k1"),
        Account::new("Globex", 2, "k2"),
        Account::new("Initech", 3, "k3"),
    ]
}

#[test]
fn test_basic_reconciliation_scenario() {
    let mut close = open("1", "Acme");
    close.event_kind = EventKind::Close;
    close.timestamp = T0 + 600_000;

    let incidents = reconcile(&[open("1", "Acme"), close]).unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].status, Status::Closed);
    assert_eq!(format_duration(incidents[0].duration(Utc::now())).unwrap(), "10m");
}

#[test]
fn test_still_active_scenario() {
    let incidents = reconcile(&[open("2", "Acme")]).unwrap();
    let now = start() + Duration::seconds(3_661);
    assert_eq!(incidents[0].status, Status::Active);
    assert_eq!(format_duration(incidents[0].duration(now)).unwrap(), "1h 1m");
}

#[tokio::test]
async fn test_multi_account_merge_with_failing_account() {
    let source = Arc::new(MapSource {
        rows: HashMap::from([(1, vec![open("a-1", "Acme")]), (2, vec![open("g-1", "Globex")])]),
        calls: AtomicUsize::new(0),
    });
    let aggregator = Aggregator::new(source.clone(), accounts(), AggregatorConfig::default());
    let clock = Arc::new(ManualClock::new(start() + Duration::minutes(5)));
    let dashboard = Dashboard::new(aggregator, clock);

    let view = dashboard.refresh(&DashboardRequest::default()).await.unwrap();
    assert_eq!(view.incidents.len(), 2);
    let mut labels: Vec<&str> = view
        .incidents
        .iter()
        .map(|r| r.incident.account_label.as_str())
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["Acme", "Globex"]);
    assert_eq!(view.failures.len(), 1);
    assert_eq!(view.failures[0].account, "Initech");
    assert_eq!(view.metrics.by_account.len(), 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cached_refresh_hits_backend_once_until_invalidated() {
    let clock = Arc::new(ManualClock::new(start()));
    let backend = MapSource {
        rows: HashMap::from([(1, vec![open("a-1", "Acme")])]),
        calls: AtomicUsize::new(0),
    };
    let cached = Arc::new(CachingSource::new(backend, Duration::minutes(5), clock.clone()));
    let aggregator = Aggregator::new(
        cached.clone(),
        vec![Account::new("Acme", 1, "k1")],
        AggregatorConfig::default(),
    );
    let dashboard = Dashboard::new(aggregator, clock.clone());
    let request = DashboardRequest {
        selection: AccountSelection::One("Acme".to_string()),
        window: TimeWindow::Last6Hours,
        compare: false,
        ..DashboardRequest::default()
    };

    dashboard.refresh(&request).await.unwrap();
    clock.advance(Duration::minutes(1));
    dashboard.refresh(&request).await.unwrap();
    assert_eq!(cached.cache().len(), 1);

    dashboard.invalidate();
    assert!(cached.cache().is_empty());
    dashboard.refresh(&request).await.unwrap();

    clock.advance(Duration::minutes(10));
    let view = dashboard.refresh(&request).await.unwrap();
    assert_eq!(view.generated_at, clock.now());
    assert_eq!(view.incidents[0].duration, "11m");
}
