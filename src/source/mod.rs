//! Data Source layer -- raw alert events, the fetch trait, and its
//! NRQL and caching implementations.

pub mod cache;
pub mod nrql;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window::QueryRange;

pub use self::cache::{CachingSource, TtlCache};
pub use self::nrql::NrqlSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API reported errors: {0}")]
    Api(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("unknown event kind '{0}'")]
    UnknownEventKind(String),
}

/// Which lifecycle signal a raw event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Close,
}

impl EventKind {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(EventKind::Open),
            "close" => Ok(EventKind::Close),
            _ => Err(SourceError::UnknownEventKind(raw.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Open => write!(f, "open"),
            EventKind::Close => write!(f, "close"),
        }
    }
}

/// One observed open or close signal, as returned by the Data Source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub incident_id: String,
    pub condition_name: String,
    pub policy_name: Option<String>,
    pub priority: Option<String>,
    pub entity_name: Option<String>,
    pub entity_type: Option<String>,
    pub event_kind: EventKind,
    pub account_label: String,
}

/// A configured customer account.
#[derive(Clone)]
pub struct Account {
    pub label: String,
    pub account_id: u64,
    pub api_key: String,
}

impl Account {
    pub fn new(label: impl Into<String>, account_id: u64, api_key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            account_id,
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("label", &self.label)
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Anything that can return raw incident events for one account.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the open/close events for `account` within `range`.
    /// Rows come back tagged with `account.label`.
    async fn fetch_events(
        &self,
        account: &Account,
        range: &QueryRange,
    ) -> Result<Vec<RawEvent>, SourceError>;

    /// Drop any cached rows so the next fetch goes to the backend.
    fn invalidate(&self) {}
}
