//! TOML configuration for incidentlens.
//!
//! Layered the same way on every entry point: the path in
//! `INCIDENTLENS_CONFIG`, then `./incidentlens.toml`, then compiled-in
//! defaults. Accounts map a display label to an NRQL account id and an API
//! key, given inline or through the name of an environment variable.
//! `[metrics]` and `[categorize]` tune the derived views.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::AggregatorConfig;
use crate::categorize::{Categorizer, Category, INFRASTRUCTURE_KEYWORDS};
use crate::metrics::{MetricsOptions, TrendThresholds, TOP_CONDITIONS, TOP_ENTITIES};
use crate::source::nrql::DEFAULT_ENDPOINT;
use crate::source::Account;

pub const CONFIG_ENV: &str = "INCIDENTLENS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "incidentlens.toml";
/// Longest accepted `source.cache_ttl_secs` (one day).
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub categorize: CategorizeConfig,
    /// Keyed by account label.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), accounts = config.accounts.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try, in order: `INCIDENTLENS_CONFIG`, `./incidentlens.toml`, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "INCIDENTLENS_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_PATH);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        if self.source.concurrency == 0 {
            bail!("source.concurrency must be at least 1");
        }
        if self.source.fetch_timeout_secs == 0 {
            bail!("source.fetch_timeout_secs must be at least 1");
        }
        if self.source.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            bail!(
                "source.cache_ttl_secs must be at most {} (got {})",
                MAX_CACHE_TTL_SECS,
                self.source.cache_ttl_secs
            );
        }
        if self.metrics.moderate_volume >= self.metrics.high_volume {
            bail!("metrics.moderate_volume must be below metrics.high_volume");
        }
        if self.metrics.top_conditions == 0 || self.metrics.top_entities == 0 {
            bail!("metrics.top_conditions and metrics.top_entities must be at least 1");
        }
        for (label, account) in &self.accounts {
            if account.api_key.is_none() && account.api_key_env.is_none() {
                bail!("account '{}' needs api_key or api_key_env", label);
            }
        }
        Ok(())
    }

    /// Resolve accounts with their keys. Accounts whose key cannot be
    /// resolved are skipped with a warning.
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .filter_map(|(label, cfg)| match cfg.resolve_key() {
                Some(key) => Some(Account::new(label.clone(), cfg.account_id, key)),
                None => {
                    warn!(account = %label, "No API key available, skipping account");
                    None
                }
            })
            .collect()
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            concurrency: self.source.concurrency,
            fetch_timeout: Duration::from_secs(self.source.fetch_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Data Source connection and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// GraphQL endpoint.
    pub endpoint: String,
    /// Per-account request deadline (seconds).
    pub fetch_timeout_secs: u64,
    /// Maximum concurrent per-account requests.
    pub concurrency: usize,
    /// How long fetched rows stay cached (seconds).
    pub cache_ttl_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            fetch_timeout_secs: 5,
            concurrency: 4,
            cache_ttl_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Volume trend thresholds and ranking sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Alert count above which the trend is "High volume".
    pub high_volume: usize,
    /// Alert count above which the trend is "Moderate volume".
    pub moderate_volume: usize,
    pub top_conditions: usize,
    pub top_entities: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let thresholds = TrendThresholds::default();
        Self {
            high_volume: thresholds.high,
            moderate_volume: thresholds.moderate,
            top_conditions: TOP_CONDITIONS,
            top_entities: TOP_ENTITIES,
        }
    }
}

impl MetricsConfig {
    pub fn options(&self) -> MetricsOptions {
        MetricsOptions {
            thresholds: TrendThresholds {
                high: self.high_volume,
                moderate: self.moderate_volume,
            },
            top_conditions: self.top_conditions,
            top_entities: self.top_entities,
        }
    }
}

// ---------------------------------------------------------------------------
// Categorize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizeConfig {
    /// Replaces the built-in infrastructure vocabulary when set.
    pub infrastructure_keywords: Option<Vec<String>>,
}

impl CategorizeConfig {
    pub fn categorizer(&self) -> Categorizer {
        let keywords = match &self.infrastructure_keywords {
            Some(words) => words.clone(),
            None => INFRASTRUCTURE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };
        Categorizer::new(vec![(Category::Infrastructure, keywords)])
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account_id: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("account_id", &self.account_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

impl AccountConfig {
    /// Inline key wins over the environment variable.
    fn resolve_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[source]
fetch_timeout_secs = 3
concurrency = 2

[server]
bind = "0.0.0.0:9000"

[accounts.Acme]
account_id = 1234
api_key = "NRAK-ACME"

[accounts.Globex]
account_id = 5678
api_key_env = "INCIDENTLENS_TEST_GLOBEX_KEY_UNSET"
"#;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.source.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.source.cache_ttl_secs, 300);
        assert_eq!(cfg.aggregator_config().concurrency, 4);
        assert!(cfg.accounts().is_empty());
    }

    #[test]
    fn test_parse_sample_and_skip_unresolved_keys() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.source.cache_ttl_secs, 300);
        assert_eq!(cfg.aggregator_config().fetch_timeout, Duration::from_secs(3));

        let accounts = cfg.accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].label, "Acme");
        assert_eq!(accounts[0].account_id, 1234);
    }

    #[test]
    fn test_account_without_any_key_is_rejected() {
        let err = Config::parse("[accounts.Bad]\naccount_id = 1\n").unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        assert!(Config::parse("[source]\nconcurrency = 0\n").is_err());
    }

    #[test]
    fn test_oversized_cache_ttl_is_rejected() {
        let err = Config::parse("[source]\ncache_ttl_secs = 10000000000000000\n").unwrap_err();
        assert!(err.to_string().contains("cache_ttl_secs"));
        assert!(Config::parse("[source]\ncache_ttl_secs = 86400\n").is_ok());
    }

    #[test]
    fn test_metrics_and_categorize_sections() {
        let cfg = Config::parse(
            "[metrics]\nhigh_volume = 20\nmoderate_volume = 10\ntop_conditions = 8\n\n\
             [categorize]\ninfrastructure_keywords = [\"Redis\"]\n",
        )
        .unwrap();
        let opts = cfg.metrics.options();
        assert_eq!(opts.thresholds, TrendThresholds { high: 20, moderate: 10 });
        assert_eq!(opts.top_conditions, 8);
        assert_eq!(opts.top_entities, TOP_ENTITIES);

        let categorizer = cfg.categorize.categorizer();
        assert_eq!(categorizer.classify_text("Redis evictions"), Category::Infrastructure);
        assert_eq!(categorizer.classify_text("CPU utilization"), Category::Other);
        assert_eq!(
            Config::default().categorize.categorizer().classify_text("CPU utilization"),
            Category::Infrastructure
        );
    }

    #[test]
    fn test_inverted_trend_thresholds_are_rejected() {
        let err = Config::parse("[metrics]\nhigh_volume = 10\nmoderate_volume = 10\n").unwrap_err();
        assert!(err.to_string().contains("moderate_volume"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.accounts.len(), 2);
    }

    #[test]
    fn test_debug_redacts_inline_key() {
        let cfg = Config::parse(SAMPLE).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("NRAK-ACME"));
    }
}
