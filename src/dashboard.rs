//! Refresh pipeline: fetch -> reconcile -> derive, per request.
//!
//! All selection state (account, window, status filter) arrives with the
//! request. The only state kept between calls is the last good view per
//! request, returned flagged `stale` when every account is unreachable.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{AccountFailure, AccountSelection, AggregateError, Aggregator};
use crate::categorize::{Category, Categorizer};
use crate::clock::Clock;
use crate::compare::{compare_periods, PeriodComparison};
use crate::format::format_duration;
use crate::metrics::{condition_breakdown, ConditionBreakdown, MetricsOptions, MetricsSnapshot};
use crate::reconcile::{reconcile, Incident, ReconcileError, Status};
use crate::window::TimeWindow;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no data available: every account failed")]
    NoDataAvailable { failures: Vec<AccountFailure> },
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Closed,
}

impl StatusFilter {
    pub fn matches(self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == Status::Active,
            StatusFilter::Closed => status == Status::Closed,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Active => write!(f, "active"),
            StatusFilter::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "active" | "open" => Ok(StatusFilter::Active),
            "closed" | "resolved" => Ok(StatusFilter::Closed),
            other => Err(format!("unknown status filter '{}'", other)),
        }
    }
}

/// Everything a refresh depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DashboardRequest {
    pub selection: AccountSelection,
    pub window: TimeWindow,
    pub status: StatusFilter,
    /// Also query the prior window for a trend delta.
    pub compare: bool,
}

/// An incident with its duration evaluated at view time.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRow {
    #[serde(flatten)]
    pub incident: Incident,
    pub duration: String,
    pub duration_seconds: i64,
    pub category: Category,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorizedRows {
    pub infrastructure: Vec<IncidentRow>,
    pub other: Vec<IncidentRow>,
}

/// Everything the presentation layer renders for one refresh.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub selection: String,
    pub window: TimeWindow,
    pub status_filter: StatusFilter,
    pub generated_at: DateTime<Utc>,
    pub stale: bool,
    pub incidents: Vec<IncidentRow>,
    pub metrics: MetricsSnapshot,
    pub comparison: Option<PeriodComparison>,
    pub conditions: Vec<ConditionBreakdown>,
    pub categories: CategorizedRows,
    pub failures: Vec<AccountFailure>,
}

pub struct Dashboard {
    aggregator: Aggregator,
    categorizer: Categorizer,
    clock: Arc<dyn Clock>,
    options: MetricsOptions,
    last_good: Mutex<HashMap<DashboardRequest, DashboardView>>,
}

impl Dashboard {
    pub fn new(aggregator: Aggregator, clock: Arc<dyn Clock>) -> Self {
        Self {
            aggregator,
            categorizer: Categorizer::default(),
            clock,
            options: MetricsOptions::default(),
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn with_options(mut self, options: MetricsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn account_labels(&self) -> Vec<String> {
        self.aggregator.accounts().iter().map(|a| a.label.clone()).collect()
    }

    /// Manual refresh: drop cached rows so the next request refetches.
    pub fn invalidate(&self) {
        info!("Manual refresh requested, invalidating cache");
        self.aggregator.source().invalidate();
    }

    pub async fn refresh(&self, request: &DashboardRequest) -> Result<DashboardView, PipelineError> {
        let window = request.window;
        let fetched = match self.aggregator.fetch(&request.selection, &window.range()).await {
            Ok(fetched) => fetched,
            Err(AggregateError::AllAccountsFailed { failures }) => {
                return self.fall_back(request, failures);
            }
            Err(e) => return Err(e.into()),
        };

        let incidents = reconcile(&fetched.events)?;
        let now = self.clock.now();
        let metrics = MetricsSnapshot::compute_with(&incidents, window.label(), &self.options);
        let conditions = condition_breakdown(&incidents);

        let comparison = if request.compare {
            match compare_periods(&self.aggregator, &request.selection, window, incidents.len()).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "Prior-period comparison unavailable");
                    None
                }
            }
        } else {
            None
        };

        let rows: Vec<IncidentRow> = incidents
            .into_iter()
            .filter(|i| request.status.matches(i.status))
            .map(|i| self.row(i, now))
            .collect();

        let mut categories = CategorizedRows::default();
        for row in &rows {
            match row.category {
                Category::Infrastructure => categories.infrastructure.push(row.clone()),
                Category::Other => categories.other.push(row.clone()),
            }
        }

        let view = DashboardView {
            selection: request.selection.label().to_string(),
            window,
            status_filter: request.status,
            generated_at: now,
            stale: false,
            incidents: rows,
            metrics,
            comparison,
            conditions,
            categories,
            failures: fetched.failures,
        };

        self.last_good
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.clone(), view.clone());
        Ok(view)
    }

    fn row(&self, incident: Incident, now: DateTime<Utc>) -> IncidentRow {
        let span = incident.duration(now);
        IncidentRow {
            duration: format_duration(span).unwrap_or_default(),
            duration_seconds: span.num_seconds(),
            category: self.categorizer.classify(&incident),
            incident,
        }
    }

    fn fall_back(
        &self,
        request: &DashboardRequest,
        failures: Vec<AccountFailure>,
    ) -> Result<DashboardView, PipelineError> {
        let previous = self
            .last_good
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(request)
            .cloned();
        match previous {
            Some(mut view) => {
                warn!(
                    selection = %request.selection.label(),
                    generated_at = %view.generated_at,
                    "Every account failed, serving previous results"
                );
                view.stale = true;
                view.failures = failures;
                Ok(view)
            }
            None => {
                warn!(selection = %request.selection.label(), "Every account failed, no data available");
                Err(PipelineError::NoDataAvailable { failures })
            }
        }
    }
}
