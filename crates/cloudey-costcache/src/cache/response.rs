//! Short-TTL memoization of read calls
//!
//! Results are keyed by tenant, method name, and the call's arguments. The
//! arguments are canonicalized (sorted by name) so the same call always maps
//! to the same key regardless of how the call site ordered them.

use chrono::{Days, NaiveDate};
use cloudey_common::TenantId;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Canonical parameter strings longer than this are hashed
const MAX_PARAMS_LEN: usize = 100;

/// TTL settings for memoized reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    /// TTL when a caller does not pick one (seconds)
    pub default_ttl_secs: u64,
    /// TTL for cost ranges ending before yesterday (seconds)
    pub historical_ttl_secs: u64,
    /// TTL for cost ranges touching yesterday or today (seconds)
    pub recent_ttl_secs: u64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            historical_ttl_secs: 3600,
            recent_ttl_secs: 300,
        }
    }
}

impl ResponseCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// TTL for a cost range ending on `end`
    ///
    /// Anything before yesterday is settled and kept longer; yesterday and
    /// today may still change.
    pub fn ttl_for_range_end(&self, end: NaiveDate, today: NaiveDate) -> Duration {
        let yesterday = today - Days::new(1);
        if end < yesterday {
            Duration::from_secs(self.historical_ttl_secs)
        } else {
            Duration::from_secs(self.recent_ttl_secs)
        }
    }
}

/// Call arguments, kept sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheArgs(BTreeMap<String, String>);

impl CacheArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    /// `a=1&b=2` in name order
    ///
    /// `%`, `&` and `=` inside names and values are percent-encoded so
    /// distinct argument sets never share a key.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", escape(name), escape(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', '&', '=']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Cached value with its expiry
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Response cache counters
#[derive(Debug, Default)]
pub struct ResponseCacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub stores: AtomicU64,
    pub evictions: AtomicU64,
}

/// In-process memoization cache with per-entry TTL
///
/// One lock guards the whole map; the rate limiter already keeps call volume
/// low. Expired entries are dropped when read and by [`cleanup_expired`].
///
/// [`cleanup_expired`]: ResponseCache::cleanup_expired
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    metrics: ResponseCacheMetrics,
}

impl ResponseCache {
    /// Create a new response cache
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            metrics: ResponseCacheMetrics::default(),
        }
    }

    /// Build the key for a call
    pub fn make_key(tenant: TenantId, method: &str, args: &CacheArgs) -> String {
        let params = args.canonical();
        if params.len() > MAX_PARAMS_LEN {
            let hash = blake3::hash(params.as_bytes());
            format!("{}:{}:#{}", tenant, method, &hash.to_hex()[..32])
        } else {
            format!("{}:{}:{}", tenant, method, params)
        }
    }

    /// Get a fresh cached value
    ///
    /// A value that no longer decodes as `T` counts as a miss.
    pub fn get<T: DeserializeOwned>(
        &self,
        tenant: TenantId,
        method: &str,
        args: &CacheArgs,
    ) -> Option<T> {
        let key = Self::make_key(tenant, method, args);
        let now = Instant::now();

        let value = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
                Some(_) => {
                    entries.remove(&key);
                    self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                    None
                }
                None => None,
            }
        };

        let Some(value) = value else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Response cache miss");
            return None;
        };

        match serde_json::from_value(value) {
            Ok(decoded) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Response cache hit");
                Some(decoded)
            }
            Err(e) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cached response has unexpected shape, ignoring");
                None
            }
        }
    }

    /// Store a value; `ttl` of `None` uses the default
    pub fn set<T: Serialize>(
        &self,
        tenant: TenantId,
        method: &str,
        value: &T,
        ttl: Option<Duration>,
        args: &CacheArgs,
    ) {
        let key = Self::make_key(tenant, method, args);
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Response not cacheable, skipping");
                return;
            }
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.lock().insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.metrics.stores.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
    }

    /// Drop entries for one tenant, or everything when `tenant` is `None`
    pub fn clear(&self, tenant: Option<TenantId>) -> usize {
        let mut entries = self.entries.lock();
        match tenant {
            None => {
                let removed = entries.len();
                entries.clear();
                removed
            }
            Some(tenant) => {
                let prefix = format!("{}:", tenant);
                let before = entries.len();
                entries.retain(|key, _| !key.starts_with(&prefix));
                before - entries.len()
            }
        }
    }

    /// Remove every expired entry
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.metrics
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn metrics(&self) -> &ResponseCacheMetrics {
        &self.metrics
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(ResponseCacheConfig::default().default_ttl())
    }
}
