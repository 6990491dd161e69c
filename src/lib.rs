//! incidentlens -- multi-account alert incident dashboard.
//!
//! This crate reconciles NRQL alert open/close events into incidents and
//! derives MTTR, resolution rate, frequency, trend, period deltas, and
//! categorized drill-down tables from them.

pub mod aggregate;
pub mod api;
pub mod categorize;
pub mod clock;
pub mod compare;
pub mod config;
pub mod dashboard;
pub mod format;
pub mod metrics;
pub mod reconcile;
pub mod source;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::aggregate::Aggregator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::source::{CachingSource, NrqlSource};

/// Wire the NRQL source, cache, aggregator and pipeline from configuration.
pub fn build_dashboard(config: &Config) -> Result<Dashboard> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let nrql = NrqlSource::new(
        config.source.endpoint.clone(),
        Duration::from_secs(config.source.fetch_timeout_secs),
    )
    .context("failed to build HTTP client")?;
    let ttl = i64::try_from(config.source.cache_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .context("source.cache_ttl_secs out of range")?;
    let source = Arc::new(CachingSource::new(nrql, ttl, clock.clone()));

    let accounts = config.accounts();
    if accounts.is_empty() {
        tracing::warn!("No accounts configured; every request will report no data");
    }
    let aggregator = Aggregator::new(source, accounts, config.aggregator_config());
    Ok(Dashboard::new(aggregator, clock)
        .with_options(config.metrics.options())
        .with_categorizer(config.categorize.categorizer()))
}

/// Start the dashboard API server.
pub async fn serve(bind: &str, config: &Config) -> Result<()> {
    let dashboard = build_dashboard(config)?;
    let app = api::router(api::state::AppState::new(dashboard));

    let addr: std::net::SocketAddr = bind.parse().with_context(|| format!("invalid bind address '{}'", bind))?;
    tracing::info!(%addr, "incidentlens listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
