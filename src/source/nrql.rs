//! NRQL-over-GraphQL client for `NrAiIncident` events.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Account, DataSource, EventKind, RawEvent, SourceError};
use crate::window::QueryRange;

pub const DEFAULT_ENDPOINT: &str = "https://api.newrelic.com/graphql";

const GRAPHQL_QUERY: &str =
    "query($accountId: Int!, $nrql: Nrql!) { actor { account(id: $accountId) { nrql(query: $nrql) { results } } } }";

/// Build the NRQL statement selecting open/close events for `range`.
pub fn incident_query(range: &QueryRange) -> String {
    format!(
        "SELECT timestamp, conditionName, policyName, priority, incidentId, event, \
         entity.name, entity.type FROM NrAiIncident \
         WHERE event IN ('open', 'close') {} LIMIT MAX",
        range.nrql_clause()
    )
}

/// Data Source backed by the NerdGraph API.
pub struct NrqlSource {
    client: Client,
    endpoint: String,
}

impl NrqlSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("incidentlens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl DataSource for NrqlSource {
    async fn fetch_events(
        &self,
        account: &Account,
        range: &QueryRange,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let nrql = incident_query(range);
        debug!(account = %account.label, %nrql, "Querying NRQL");

        let body = json!({
            "query": GRAPHQL_QUERY,
            "variables": { "accountId": account.account_id, "nrql": nrql },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("API-Key", &account.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| SourceError::Shape(format!("body is not JSON: {}", e)))?;
        parse_response(&payload, &account.label)
    }
}

/// One row of `nrql.results`.
#[derive(Debug, Deserialize)]
struct NrqlRow {
    timestamp: Option<Value>,
    #[serde(rename = "incidentId")]
    incident_id: Option<Value>,
    #[serde(rename = "conditionName")]
    condition_name: Option<String>,
    #[serde(rename = "policyName")]
    policy_name: Option<String>,
    priority: Option<String>,
    event: Option<String>,
    #[serde(rename = "entity.name")]
    entity_name: Option<String>,
    #[serde(rename = "entity.type")]
    entity_type: Option<String>,
}

/// Extract tagged raw events from a NerdGraph response body.
pub fn parse_response(payload: &Value, account_label: &str) -> Result<Vec<RawEvent>, SourceError> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(SourceError::Api(messages.join("; ")));
        }
    }

    let results = payload
        .pointer("/data/actor/account/nrql/results")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Shape("missing data.actor.account.nrql.results".into()))?;

    results
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let row: NrqlRow = serde_json::from_value(row.clone())
                .map_err(|e| SourceError::Shape(format!("row {}: {}", index, e)))?;
            into_raw_event(row, account_label)
                .map_err(|e| match e {
                    SourceError::Shape(msg) => SourceError::Shape(format!("row {}: {}", index, msg)),
                    other => other,
                })
        })
        .collect()
}

fn into_raw_event(row: NrqlRow, account_label: &str) -> Result<RawEvent, SourceError> {
    let timestamp = match row.timestamp {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| SourceError::Shape(format!("timestamp {} out of range", n)))?,
        Some(other) => {
            return Err(SourceError::Shape(format!("timestamp is not numeric: {}", other)))
        }
        None => return Err(SourceError::Shape("missing timestamp".into())),
    };

    let incident_id = match row.incident_id {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(SourceError::Shape("missing incidentId".into())),
    };

    let event = row
        .event
        .ok_or_else(|| SourceError::Shape("missing event".into()))?;

    Ok(RawEvent {
        timestamp,
        incident_id,
        condition_name: row.condition_name.unwrap_or_default(),
        policy_name: row.policy_name,
        priority: row.priority,
        entity_name: row.entity_name,
        entity_type: row.entity_type,
        event_kind: EventKind::parse(&event)?,
        account_label: account_label.to_string(),
    })
}
