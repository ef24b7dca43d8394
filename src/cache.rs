use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::CatalogKind;

pub const DEFAULT_GC_AFTER: Duration = Duration::from_secs(5 * 60);

/// In-flight fetch records older than this are dropped by `gc`. Longer than
/// any request timeout the client accepts.
const PENDING_FETCH_TTL_SECS: i64 = 10 * 60;

/// Semantic cache key, e.g. `["post", "<id>"]`. Invalidation matches on
/// key prefix, so `["posts"]` covers `["posts", ...]` but not `["post", id]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn posts() -> Self {
        Self::new(["posts"])
    }

    pub fn post(post_id: &str) -> Self {
        Self::new(["post", post_id])
    }

    pub fn comments(post_id: &str) -> Self {
        Self::new(["comments", post_id])
    }

    pub fn reviews(kind: CatalogKind, parent_id: &str) -> Self {
        Self::new([kind.reviews_key(), parent_id])
    }

    pub fn user(user_id: &str) -> Self {
        Self::new(["user", user_id])
    }

    pub fn saved_posts() -> Self {
        Self::new(["savedPosts"])
    }

    pub fn saved_posts_for<'a, I>(post_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut key = Self::saved_posts();
        key.0.extend(post_ids.into_iter().map(str::to_string));
        key
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// A fetch that has left the lock but not stored its result yet.
#[derive(Debug)]
struct PendingFetch {
    key: QueryKey,
    started_at: DateTime<Utc>,
    invalidated: bool,
}

#[derive(Debug)]
struct CacheInner {
    entries: BTreeMap<QueryKey, CacheEntry>,
    pending: BTreeMap<u64, PendingFetch>,
    next_fetch: u64,
    gc_after: chrono::Duration,
}

/// Per-session store of fetched reads. Cloning shares the same entries.
#[derive(Debug, Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_GC_AFTER)
    }
}

impl QueryCache {
    pub fn new(gc_after: Duration) -> Self {
        let gc_after = chrono::Duration::from_std(gc_after).unwrap_or(chrono::Duration::MAX);
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: BTreeMap::new(),
                pending: BTreeMap::new(),
                next_fetch: 0,
                gc_after,
            })),
        }
    }

    pub async fn store(&self, key: QueryKey, value: Value) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        debug!(key = %key, "cache store");
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                fetched_at: now,
                last_observed_at: now,
            },
        );
    }

    /// Returns the cached entry, stale or not, and records the observation.
    pub async fn read(&self, key: &QueryKey) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(key)?;
        entry.last_observed_at = Utc::now();
        Some(entry.clone())
    }

    pub async fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.inner.lock().await.entries.get(key).map(|e| e.stale)
    }

    /// Marks every entry under `prefix` stale. Nothing is refetched here;
    /// the next [`QueryCache::fetch_with`] on a stale key goes to the server.
    /// Fetches already in flight under `prefix` store their result stale.
    /// Returns how many entries matched.
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut inner = self.inner.lock().await;
        let mut matched = 0;
        for (key, entry) in inner.entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.stale = true;
                matched += 1;
            }
        }
        let mut in_flight = 0;
        for fetch in inner.pending.values_mut() {
            if fetch.key.starts_with(prefix) {
                fetch.invalidated = true;
                in_flight += 1;
            }
        }
        debug!(key = %prefix, matched, in_flight, "cache invalidate");
        matched
    }

    /// Serves a fresh entry from the cache, otherwise runs `fetch` and
    /// stores its result. A result whose key was invalidated while `fetch`
    /// ran is stored stale, so the next read fetches again.
    pub async fn fetch_with<F, Fut, E>(&self, key: QueryKey, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let token = {
            let mut inner = self.inner.lock().await;
            let now = Utc::now();
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_observed_at = now;
                if !entry.stale {
                    return Ok(entry.value.clone());
                }
            }
            let token = inner.next_fetch;
            inner.next_fetch += 1;
            inner.pending.insert(
                token,
                PendingFetch {
                    key: key.clone(),
                    started_at: now,
                    invalidated: false,
                },
            );
            token
        };

        let result = fetch().await;
        let mut inner = self.inner.lock().await;
        let invalidated = inner
            .pending
            .remove(&token)
            .is_some_and(|fetch| fetch.invalidated);
        let value = result?;
        let now = Utc::now();
        if invalidated {
            debug!(key = %key, "cache store after concurrent invalidation, kept stale");
        } else {
            debug!(key = %key, "cache store");
        }
        inner.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                stale: invalidated,
                fetched_at: now,
                last_observed_at: now,
            },
        );
        Ok(value)
    }

    pub async fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.lock().await.entries.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts entries nobody has observed for longer than the gc window.
    pub async fn gc(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().await;
        let gc_after = inner.gc_after;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, e| now.signed_duration_since(e.last_observed_at) <= gc_after);
        // Records left behind by fetches whose future was dropped.
        let pending_ttl = chrono::Duration::seconds(PENDING_FETCH_TTL_SECS);
        inner
            .pending
            .retain(|_, f| now.signed_duration_since(f.started_at) <= pending_ttl);
        let evicted = before - inner.entries.len();
        if evicted > 0 {
            debug!(evicted, "cache gc");
        }
        evicted
    }
}
