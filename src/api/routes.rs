//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::aggregate::{AccountSelection, AggregateError, ALL_ACCOUNTS_LABEL};
use crate::dashboard::{DashboardRequest, PipelineError, StatusFilter};
use crate::window::TimeWindow;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/windows", get(list_windows))
        .route("/accounts", get(list_accounts))
        .route("/dashboard", get(dashboard))
        .route("/refresh", post(refresh))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_windows() -> Json<Value> {
    let windows: Vec<&str> = TimeWindow::ALL.iter().map(|w| w.label()).collect();
    Json(json!({
        "data": windows,
        "meta": { "default": TimeWindow::default().label() }
    }))
}

async fn list_accounts(State(state): State<AppState>) -> Json<Value> {
    let labels = state.dashboard.account_labels();
    Json(json!({
        "data": labels,
        "meta": { "total": labels.len(), "all_label": ALL_ACCOUNTS_LABEL }
    }))
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    account: Option<String>,
    window: Option<String>,
    status: Option<String>,
    compare: Option<bool>,
}

impl DashboardQuery {
    fn into_request(self) -> Result<DashboardRequest, String> {
        let window = match self.window.as_deref() {
            Some(label) => label.parse()?,
            None => TimeWindow::default(),
        };
        let status = match self.status.as_deref() {
            Some(s) => s.parse()?,
            None => StatusFilter::All,
        };
        Ok(DashboardRequest {
            selection: AccountSelection::from_param(self.account.as_deref()),
            window,
            status,
            compare: self.compare.unwrap_or(true),
        })
    }
}

async fn dashboard(State(state): State<AppState>, Query(query): Query<DashboardQuery>) -> Response {
    let request = match query.into_request() {
        Ok(r) => r,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    match state.dashboard.refresh(&request).await {
        Ok(view) => {
            let meta = json!({
                "timestamp": view.generated_at.to_rfc3339(),
                "stale": view.stale,
                "total": view.incidents.len(),
            });
            Json(json!({ "data": view, "meta": meta })).into_response()
        }
        Err(e) => {
            let status = match &e {
                PipelineError::NoDataAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Aggregate(AggregateError::UnknownAccount(_)) => StatusCode::NOT_FOUND,
                PipelineError::Aggregate(_) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Reconcile(_) => StatusCode::BAD_GATEWAY,
            };
            error_response(status, &e.to_string())
        }
    }
}

async fn refresh(State(state): State<AppState>) -> Json<Value> {
    state.dashboard.invalidate();
    Json(json!({ "data": { "invalidated": true } }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "data": null, "error": { "message": message } }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let req = DashboardQuery::default().into_request().unwrap();
        assert_eq!(req.selection, AccountSelection::All);
        assert_eq!(req.window, TimeWindow::Last24Hours);
        assert_eq!(req.status, StatusFilter::All);
        assert!(req.compare);
    }

    #[test]
    fn test_query_rejects_unknown_window() {
        let query = DashboardQuery {
            window: Some("Last 90 Days".into()),
            ..DashboardQuery::default()
        };
        assert!(query.into_request().unwrap_err().contains("unknown time window"));
    }

    #[test]
    fn test_query_single_account() {
        let query = DashboardQuery {
            account: Some("Acme".into()),
            window: Some("7d".into()),
            status: Some("closed".into()),
            compare: Some(false),
        };
        let req = query.into_request().unwrap();
        assert_eq!(req.selection, AccountSelection::One("Acme".into()));
        assert_eq!(req.window, TimeWindow::Last7Days);
        assert_eq!(req.status, StatusFilter::Closed);
        assert!(!req.compare);
    }
}
