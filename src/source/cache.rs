//! Short-lived result cache in front of a [`DataSource`].
//!
//! Entries are keyed by account and query range and expire after a fixed
//! TTL measured on an injected [`Clock`]. Failed fetches are never cached.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{Account, DataSource, RawEvent, SourceError};
use crate::clock::Clock;
use crate::window::QueryRange;

struct Entry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

/// A key/value store whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return a live entry and the time it was fetched. Expired entries are
    /// evicted on access.
    pub fn get(&self, key: &K) -> Option<(V, DateTime<Utc>)> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if now - entry.fetched_at < self.ttl => {
                Some((entry.value.clone(), entry.fetched_at))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let fetched_at = self.clock.now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Entry { value, fetched_at });
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub account_id: u64,
    pub account_label: String,
    pub range: QueryRange,
}

/// Wraps a [`DataSource`] with a [`TtlCache`] of raw rows.
pub struct CachingSource<S> {
    inner: S,
    cache: TtlCache<CacheKey, Vec<RawEvent>>,
}

impl<S: DataSource> CachingSource<S> {
    pub fn new(inner: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub fn cache(&self) -> &TtlCache<CacheKey, Vec<RawEvent>> {
        &self.cache
    }
}

#[async_trait::async_trait]
impl<S: DataSource> DataSource for CachingSource<S> {
    async fn fetch_events(
        &self,
        account: &Account,
        range: &QueryRange,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let key = CacheKey {
            account_id: account.account_id,
            account_label: account.label.clone(),
            range: *range,
        };

        if let Some((rows, fetched_at)) = self.cache.get(&key) {
            debug!(account = %account.label, %fetched_at, rows = rows.len(), "Cache hit");
            return Ok(rows);
        }

        let rows = self.inner.fetch_events(account, range).await?;
        self.cache.insert(key, rows.clone());
        Ok(rows)
    }

    fn invalidate(&self) {
        debug!("Clearing query cache");
        self.cache.clear();
        self.inner.invalidate();
    }
}
