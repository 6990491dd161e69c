//! Period-over-period comparison of incident counts.
//!
//! For alert volume a decrease is the good direction, so
//! [`PeriodComparison::is_improvement`] is true when the delta is negative.
//! The delta itself keeps its arithmetic sign.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{AccountSelection, AggregateError, Aggregator};
use crate::reconcile::{reconcile, ReconcileError};
use crate::window::TimeWindow;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub current_count: usize,
    pub prior_count: usize,
    pub percent_delta: f64,
    pub display: String,
}

impl PeriodComparison {
    pub fn new(current_count: usize, prior_count: usize) -> Self {
        let percent_delta = percent_delta(current_count, prior_count);
        let display = if prior_count == 0 {
            if current_count > 0 {
                "+100%".to_string()
            } else {
                "0%".to_string()
            }
        } else {
            format!("{:+.1}%", percent_delta)
        };
        Self {
            current_count,
            prior_count,
            percent_delta,
            display,
        }
    }

    /// Fewer alerts than the prior period.
    pub fn is_improvement(&self) -> bool {
        self.percent_delta < 0.0
    }
}

/// `(current - prior) / prior * 100`, with `prior == 0` mapped to `100`
/// for any new activity and `0` otherwise.
pub fn percent_delta(current: usize, prior: usize) -> f64 {
    if prior == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    (current as f64 - prior as f64) / prior as f64 * 100.0
}

/// Re-query the window immediately before `window` and compare its
/// incident count with `current_count`.
pub async fn compare_periods(
    aggregator: &Aggregator,
    selection: &AccountSelection,
    window: TimeWindow,
    current_count: usize,
) -> Result<PeriodComparison, CompareError> {
    let range = window.prior_range();
    let prior = aggregator.fetch(selection, &range).await?;
    let prior_count = reconcile(&prior.events)?.len();
    debug!(
        window = %window,
        clause = %range.nrql_clause(),
        current_count,
        prior_count,
        "Computed prior-period baseline"
    );
    Ok(PeriodComparison::new(current_count, prior_count))
}
