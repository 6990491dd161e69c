//! Aggregate analytics over a reconciled incident set.
//!
//! Everything here is a pure function of the incidents and the selected
//! window label. Empty input never errors: each metric has a documented
//! empty value (`0` counts, `0%` resolution rate, [`Mttr::NoResolved`]).

pub mod recommend;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::Duration;
use serde::{Serialize, Serializer};

use crate::format::format_duration;
use crate::reconcile::Incident;
use crate::window::{TimeUnit, TimeWindow};

use self::recommend::{recommend, RuleContext};

pub const TOP_CONDITIONS: usize = 5;
pub const TOP_ENTITIES: usize = 3;

// ---------------------------------------------------------------------------
// MTTR
// ---------------------------------------------------------------------------

/// Mean time to resolution over closed incidents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mttr {
    Resolved { mean_seconds: i64, resolved: usize },
    NoResolved,
}

impl Mttr {
    pub const SENTINEL: &'static str = "N/A";

    pub fn from_mean(mean: Duration, resolved: usize) -> Self {
        Mttr::Resolved {
            mean_seconds: mean.num_seconds(),
            resolved,
        }
    }

    fn compute(incidents: &[Incident]) -> Self {
        let spans: Vec<Duration> = incidents
            .iter()
            .filter_map(Incident::resolution_time)
            .collect();
        if spans.is_empty() {
            return Mttr::NoResolved;
        }
        let total_ms: i64 = spans.iter().map(|d| d.num_milliseconds().max(0)).sum();
        let mean_ms = total_ms / spans.len() as i64;
        Mttr::from_mean(Duration::milliseconds(mean_ms), spans.len())
    }

    pub fn mean(&self) -> Option<Duration> {
        match self {
            Mttr::Resolved { mean_seconds, .. } => Some(Duration::seconds(*mean_seconds)),
            Mttr::NoResolved => None,
        }
    }
}

impl fmt::Display for Mttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean().map(format_duration) {
            Some(Ok(text)) => f.write_str(&text),
            _ => f.write_str(Self::SENTINEL),
        }
    }
}

impl Serialize for Mttr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Frequency and trend
// ---------------------------------------------------------------------------

/// Alert frequency normalized by the selected window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    Rate { per_unit: f64, unit: TimeUnit },
    /// Unrecognized window label: only the raw count is meaningful.
    Total { count: usize },
}

impl Frequency {
    pub fn compute(total: usize, window_label: &str) -> Self {
        match TimeWindow::from_label(window_label) {
            Some(window) => {
                let (divisor, unit) = window.frequency_divisor();
                Frequency::Rate {
                    per_unit: total as f64 / f64::from(divisor),
                    unit,
                }
            }
            None => Frequency::Total { count: total },
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Rate { per_unit, unit } => {
                write!(f, "{:.1} alerts/{}", per_unit, unit.singular())
            }
            Frequency::Total { count } => write!(f, "{} alerts", count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeTrend {
    #[serde(rename = "High volume")]
    High,
    #[serde(rename = "Moderate volume")]
    Moderate,
    #[serde(rename = "Low volume")]
    Low,
}

impl fmt::Display for VolumeTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeTrend::High => write!(f, "High volume"),
            VolumeTrend::Moderate => write!(f, "Moderate volume"),
            VolumeTrend::Low => write!(f, "Low volume"),
        }
    }
}

/// Count thresholds for [`VolumeTrend`]; a count must exceed a threshold to
/// reach that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendThresholds {
    pub high: usize,
    pub moderate: usize,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            high: 100,
            moderate: 50,
        }
    }
}

impl TrendThresholds {
    pub fn classify(&self, total: usize) -> VolumeTrend {
        if total > self.high {
            VolumeTrend::High
        } else if total > self.moderate {
            VolumeTrend::Moderate
        } else {
            VolumeTrend::Low
        }
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCount {
    pub name: String,
    pub count: usize,
}

impl RankedCount {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Frequency count, descending by count then ascending by name. Empty names
/// are skipped. `limit` of `None` keeps everything.
fn rank<'a>(names: impl Iterator<Item = &'a str>, limit: Option<usize>) -> Vec<RankedCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names.filter(|n| !n.trim().is_empty()) {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount::new(name, count))
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Tunables for [`MetricsSnapshot::compute_with`].
#[derive(Debug, Clone, Copy)]
pub struct MetricsOptions {
    pub thresholds: TrendThresholds,
    pub top_conditions: usize,
    pub top_entities: usize,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            thresholds: TrendThresholds::default(),
            top_conditions: TOP_CONDITIONS,
            top_entities: TOP_ENTITIES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total: usize,
    pub active_count: usize,
    pub closed_count: usize,
    /// Whole percent, 0..=100.
    pub resolution_rate: u32,
    pub mttr: Mttr,
    pub frequency: Frequency,
    pub trend: VolumeTrend,
    pub top_conditions: Vec<RankedCount>,
    pub top_entities: Vec<RankedCount>,
    pub by_account: Vec<RankedCount>,
    pub by_priority: Vec<RankedCount>,
    pub recommendations: Vec<String>,
}

impl MetricsSnapshot {
    pub fn compute(incidents: &[Incident], window_label: &str) -> Self {
        Self::compute_with(incidents, window_label, &MetricsOptions::default())
    }

    pub fn compute_with(incidents: &[Incident], window_label: &str, opts: &MetricsOptions) -> Self {
        let total = incidents.len();
        let active_count = incidents.iter().filter(|i| i.is_active()).count();
        let closed_count = total - active_count;

        let resolution_rate = if total == 0 {
            0
        } else {
            (closed_count as f64 / total as f64 * 100.0).round() as u32
        };

        let mttr = Mttr::compute(incidents);
        let trend = opts.thresholds.classify(total);
        let top_conditions = rank(
            incidents.iter().map(|i| i.condition_name.as_str()),
            Some(opts.top_conditions),
        );
        let top_entities = rank(
            incidents.iter().map(|i| i.entity_name.as_str()),
            Some(opts.top_entities),
        );
        let by_account = rank(incidents.iter().map(|i| i.account_label.as_str()), None);
        let by_priority = rank(
            incidents.iter().map(|i| {
                if i.priority.is_empty() {
                    "unspecified"
                } else {
                    i.priority.as_str()
                }
            }),
            None,
        );

        let recommendations = recommend(&RuleContext {
            total,
            active: active_count,
            top_condition: top_conditions.first(),
            trend,
            mttr: &mttr,
        });

        Self {
            total,
            active_count,
            closed_count,
            resolution_rate,
            frequency: Frequency::compute(total, window_label),
            mttr,
            trend,
            top_conditions,
            top_entities,
            by_account,
            by_priority,
            recommendations,
        }
    }
}

// ---------------------------------------------------------------------------
// Drill-down
// ---------------------------------------------------------------------------

/// Per-condition breakdown of affected entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionBreakdown {
    pub condition_name: String,
    pub total: usize,
    pub active: usize,
    pub entities: Vec<RankedCount>,
}

/// One row per condition, busiest first.
pub fn condition_breakdown(incidents: &[Incident]) -> Vec<ConditionBreakdown> {
    let mut by_condition: BTreeMap<&str, Vec<&Incident>> = BTreeMap::new();
    for incident in incidents {
        by_condition
            .entry(incident.condition_name.as_str())
            .or_default()
            .push(incident);
    }

    let mut rows: Vec<ConditionBreakdown> = by_condition
        .into_iter()
        .map(|(condition, group)| ConditionBreakdown {
            condition_name: condition.to_string(),
            total: group.len(),
            active: group.iter().filter(|i| i.is_active()).count(),
            entities: rank(group.iter().map(|i| i.entity_name.as_str()), None),
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.condition_name.cmp(&b.condition_name)));
    rows
}
