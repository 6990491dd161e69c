//! Multi-account fan-out.
//!
//! One fetch per selected account runs on a `JoinSet`, bounded by a
//! semaphore and individually deadlined. A failing or slow account is logged
//! and skipped; the rest are concatenated in configuration order. Dropping
//! the returned future aborts whatever fetches are still in flight.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::source::{Account, DataSource, RawEvent};
use crate::window::QueryRange;

pub const ALL_ACCOUNTS_LABEL: &str = "All Customers";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no accounts configured")]
    NoAccounts,
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
    #[error("every account failed ({} failures)", .failures.len())]
    AllAccountsFailed { failures: Vec<AccountFailure> },
}

/// Which accounts a request covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AccountSelection {
    #[default]
    All,
    One(String),
}

impl AccountSelection {
    /// `None`, empty, "all" or "All Customers" select every account.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") => AccountSelection::All,
            Some(p) if p.eq_ignore_ascii_case("all") || p.eq_ignore_ascii_case(ALL_ACCOUNTS_LABEL) => {
                AccountSelection::All
            }
            Some(p) => AccountSelection::One(p.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            AccountSelection::All => ALL_ACCOUNTS_LABEL,
            AccountSelection::One(label) => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountFailure {
    pub account: String,
    pub reason: String,
}

/// Merged rows from every account that answered.
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    pub events: Vec<RawEvent>,
    pub failures: Vec<AccountFailure>,
    pub accounts_queried: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub concurrency: usize,
    pub fetch_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Aggregator {
    source: Arc<dyn DataSource>,
    accounts: Vec<Account>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn DataSource>, accounts: Vec<Account>, config: AggregatorConfig) -> Self {
        Self {
            source,
            accounts,
            config,
        }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    fn select(&self, selection: &AccountSelection) -> Result<Vec<Account>, AggregateError> {
        if self.accounts.is_empty() {
            return Err(AggregateError::NoAccounts);
        }
        match selection {
            AccountSelection::All => Ok(self.accounts.clone()),
            AccountSelection::One(label) => self
                .accounts
                .iter()
                .find(|a| a.label == *label)
                .cloned()
                .map(|a| vec![a])
                .ok_or_else(|| AggregateError::UnknownAccount(label.clone())),
        }
    }

    /// Fetch and merge events for the selected accounts.
    pub async fn fetch(
        &self,
        selection: &AccountSelection,
        range: &QueryRange,
    ) -> Result<Aggregated, AggregateError> {
        let targets = self.select(selection)?;
        let accounts_queried = targets.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let deadline = self.config.fetch_timeout;
        let range = *range;

        let mut tasks = JoinSet::new();
        for (index, account) in targets.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        match tokio::time::timeout(deadline, source.fetch_events(&account, &range)).await {
                            Ok(Ok(rows)) => Ok(rows),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err(format!("timed out after {:?}", deadline)),
                        }
                    }
                    Err(e) => Err(e.to_string()),
                };
                (index, account.label, outcome)
            });
        }

        let mut results = Vec::with_capacity(accounts_queried);
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, label, Ok(rows))) => {
                    debug!(account = %label, rows = rows.len(), "Account fetch complete");
                    results.push((index, label, rows));
                }
                Ok((_, label, Err(reason))) => {
                    warn!(account = %label, error = %reason, "Account fetch failed, skipping");
                    failures.push(AccountFailure {
                        account: label,
                        reason,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Account fetch task aborted");
                    failures.push(AccountFailure {
                        account: "<unknown>".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failures.len() == accounts_queried {
            return Err(AggregateError::AllAccountsFailed { failures });
        }

        results.sort_by_key(|(index, _, _)| *index);
        let mut events = Vec::new();
        for (_, label, rows) in results {
            events.extend(rows.into_iter().map(|mut row| {
                row.account_label = label.clone();
                row
            }));
        }
        failures.sort_by(|a, b| a.account.cmp(&b.account));

        info!(
            selection = %selection.label(),
            accounts = accounts_queried,
            failed = failures.len(),
            events = events.len(),
            "Aggregated account events"
        );

        Ok(Aggregated {
            events,
            failures,
            accounts_queried,
        })
    }
}
