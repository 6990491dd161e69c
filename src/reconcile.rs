//! Event reconciliation -- folds raw open/close events into incidents.
//!
//! Events are grouped by the full attribute tuple
//! `(incident_id, account, condition, priority, entity)`, so an identifier
//! that is reused across unrelated conditions yields separate incidents.
//! Status comes from the set of distinct event kinds seen in a group, never
//! from the raw event count, which makes duplicate deliveries harmless.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::source::{EventKind, RawEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("malformed timestamp {timestamp} on incident {incident_id}")]
    MalformedTimestamp { incident_id: String, timestamp: i64 },
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Active,
    Closed,
}

impl Status {
    fn from_kinds(kinds: &BTreeSet<EventKind>) -> Self {
        if kinds.len() == 1 && kinds.contains(&EventKind::Open) {
            Status::Active
        } else {
            Status::Closed
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Status::Active => "Active",
            Status::Closed => "Closed",
        })
    }
}

/// Identity of an incident group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct GroupKey {
    incident_id: String,
    account_label: String,
    condition_name: String,
    priority: String,
    entity_name: String,
}

impl GroupKey {
    fn of(event: &RawEvent) -> Self {
        Self {
            incident_id: event.incident_id.clone(),
            account_label: event.account_label.clone(),
            condition_name: event.condition_name.clone(),
            priority: event.priority.clone().unwrap_or_default(),
            entity_name: event.entity_name.clone().unwrap_or_default(),
        }
    }
}

/// A reconciled incident. Its duration is derived on read via
/// [`Incident::duration`] and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub account_label: String,
    pub condition_name: String,
    pub policy_name: Option<String>,
    pub priority: String,
    pub entity_name: String,
    pub entity_type: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub distinct_event_kinds_count: usize,
    pub status: Status,
}

impl Incident {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// How long the incident lasted, or for an active one, how long it has
    /// been open as of `now`. Negative spans from clock skew clamp to zero.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let span = match self.status {
            Status::Active => now - self.start_time,
            Status::Closed => self.end_time - self.start_time,
        };
        if span < Duration::zero() {
            warn!(
                incident_id = %self.incident_id,
                account = %self.account_label,
                "Negative incident duration, clamping to zero"
            );
            return Duration::zero();
        }
        span
    }

    /// Time to resolution, `None` while still active.
    pub fn resolution_time(&self) -> Option<Duration> {
        match self.status {
            Status::Active => None,
            Status::Closed => Some(self.end_time - self.start_time),
        }
    }
}

struct Group {
    policy_name: Option<String>,
    entity_type: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kinds: BTreeSet<EventKind>,
}

/// Reconcile a batch of raw events into incidents.
///
/// Input order does not matter. Attributes that are not part of the group
/// key (`policy_name`, `entity_type`) take the first non-empty value in
/// timestamp order. Output is ordered newest start first.
pub fn reconcile(events: &[RawEvent]) -> Result<Vec<Incident>, ReconcileError> {
    let mut stamped = Vec::with_capacity(events.len());
    for event in events {
        let at = DateTime::<Utc>::from_timestamp_millis(event.timestamp).ok_or_else(|| {
            ReconcileError::MalformedTimestamp {
                incident_id: event.incident_id.clone(),
                timestamp: event.timestamp,
            }
        })?;
        stamped.push((at, event));
    }
    stamped.sort_by(|(a_at, a), (b_at, b)| {
        a_at.cmp(b_at)
            .then_with(|| a.event_kind.cmp(&b.event_kind))
            .then_with(|| a.policy_name.cmp(&b.policy_name))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
    });

    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
    for (at, event) in stamped {
        let group = groups.entry(GroupKey::of(event)).or_insert_with(|| Group {
            policy_name: None,
            entity_type: None,
            start: at,
            end: at,
            kinds: BTreeSet::new(),
        });
        group.start = group.start.min(at);
        group.end = group.end.max(at);
        group.kinds.insert(event.event_kind);
        if group.policy_name.is_none() {
            group.policy_name = non_empty(&event.policy_name);
        }
        if group.entity_type.is_none() {
            group.entity_type = non_empty(&event.entity_type);
        }
    }

    let mut incidents: Vec<Incident> = groups
        .into_iter()
        .map(|(key, group)| Incident {
            incident_id: key.incident_id,
            account_label: key.account_label,
            condition_name: key.condition_name,
            policy_name: group.policy_name,
            priority: key.priority,
            entity_name: key.entity_name,
            entity_type: group.entity_type,
            start_time: group.start,
            end_time: group.end,
            distinct_event_kinds_count: group.kinds.len(),
            status: Status::from_kinds(&group.kinds),
        })
        .collect();

    // BTreeMap iteration already orders by key; a stable sort keeps that as
    // the tie-break.
    incidents.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    Ok(incidents)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}
