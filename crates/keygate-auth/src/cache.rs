//! Signing key cache backed by a remote key set.
//!
//! # Cache Strategy
//!
//! - The whole key set is fetched at once and replaces the previous set
//!   wholesale; entries are never mutated in place.
//! - A set is served for `cache_ttl` after it was fetched. After that the
//!   next resolution behaves as a full miss.
//! - A miss (unknown `kid` or stale set) triggers a refetch, gated by a
//!   sliding-window limiter shared by every caller.
//! - Fetches are serialized. Callers that queued behind a fetch are served
//!   from its result instead of fetching again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{KeyResolutionError, Result};
use crate::jwks::{HttpKeySource, KeySource, SigningKey};
use crate::rate_limit::FetchRateLimiter;
use crate::AuthConfig;

/// One fetched key set.
struct CachedKeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
    generation: u64,
}

impl CachedKeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Point-in-time view of a [`KeyCache`], reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCacheStatus {
    /// Key ids in the cached set, sorted.
    pub cached_key_ids: Vec<String>,
    /// Fetches still allowed in the current rate-limit window.
    pub remaining_fetches: usize,
}

/// Thread-safe cache resolving key ids to signing keys.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    jwks_url: String,
    ttl: Duration,
    fetch_timeout: Duration,
    current: RwLock<Option<Arc<CachedKeySet>>>,
    fetch_lock: Mutex<()>,
    limiter: FetchRateLimiter,
    next_generation: AtomicU64,
}

impl KeyCache {
    /// Create a cache reading from `source` with the limits in `config`.
    #[must_use]
    pub fn new(config: &AuthConfig, source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            jwks_url: config.jwks_url.clone(),
            ttl: config.cache_ttl,
            fetch_timeout: config.fetch_timeout,
            current: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            limiter: FetchRateLimiter::per_minute(config.fetch_rate_limit_per_minute),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Create a cache fetching `config.jwks_url` over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn http(config: &AuthConfig) -> Result<Self> {
        let source = HttpKeySource::new(config.fetch_timeout)?;
        Ok(Self::new(config, Arc::new(source)))
    }

    /// Resolve a key id to its signing key, fetching the key set on a miss.
    ///
    /// # Errors
    ///
    /// - [`KeyResolutionError::RateLimited`] if a fetch is needed but the
    ///   fetch budget for the current minute is spent
    /// - [`KeyResolutionError::FetchFailed`] if the fetch fails or times out
    /// - [`KeyResolutionError::KeyNotFound`] if the freshly fetched set does
    ///   not contain `kid`
    pub async fn resolve(&self, kid: &str) -> std::result::Result<SigningKey, KeyResolutionError> {
        let observed = self.snapshot();
        if let Some(set) = observed.as_deref() {
            if set.is_fresh(self.ttl) {
                if let Some(key) = set.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }
        let observed_generation = observed.map(|set| set.generation);

        let _guard = self.fetch_lock.lock().await;

        // Another caller may have refreshed the set while we waited.
        if let Some(set) = self.snapshot() {
            if Some(set.generation) != observed_generation && set.is_fresh(self.ttl) {
                tracing::debug!(kid, generation = set.generation, "Served by concurrent JWKS fetch");
                return set
                    .keys
                    .get(kid)
                    .cloned()
                    .ok_or_else(|| KeyResolutionError::KeyNotFound(kid.to_string()));
            }
        }

        if !self.limiter.try_acquire() {
            tracing::warn!(kid, url = %self.jwks_url, "JWKS fetch rate limited");
            return Err(KeyResolutionError::RateLimited);
        }

        let set = self.fetch().await?;
        let key = set.keys.get(kid).cloned();
        *self.current.write() = Some(Arc::new(set));

        key.ok_or_else(|| {
            tracing::debug!(kid, "Key id not present in fetched JWKS");
            KeyResolutionError::KeyNotFound(kid.to_string())
        })
    }

    /// Drop the cached key set so the next resolution fetches again.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Key ids of the currently cached set, whether or not it is still fresh.
    #[must_use]
    pub fn cached_key_ids(&self) -> Vec<String> {
        self.snapshot()
            .map(|set| set.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of fetches still allowed in the current rate-limit window.
    #[must_use]
    pub fn remaining_fetches(&self) -> usize {
        self.limiter.remaining()
    }

    /// Snapshot of the cached key ids and the fetch budget.
    #[must_use]
    pub fn status(&self) -> KeyCacheStatus {
        let mut cached_key_ids = self.cached_key_ids();
        cached_key_ids.sort_unstable();
        KeyCacheStatus {
            cached_key_ids,
            remaining_fetches: self.remaining_fetches(),
        }
    }

    fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.current.read().clone()
    }

    async fn fetch(&self) -> std::result::Result<CachedKeySet, KeyResolutionError> {
        let keys = tokio::time::timeout(
            self.fetch_timeout,
            self.source.fetch_key_set(&self.jwks_url),
        )
        .await
        .map_err(|_| {
            KeyResolutionError::FetchFailed(format!(
                "JWKS fetch timed out after {}ms",
                self.fetch_timeout.as_millis()
            ))
        })?
        .inspect_err(|e| tracing::warn!(url = %self.jwks_url, error = %e, "JWKS fetch failed"))?;

        let keys: HashMap<_, _> = keys
            .into_iter()
            .map(|key| (key.kid().to_string(), key))
            .collect();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            url = %self.jwks_url,
            key_count = keys.len(),
            generation,
            "JWKS cache refreshed"
        );

        Ok(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
            generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, StaticKeySource};

    fn config(rate_limit: u32) -> AuthConfig {
        let mut config = AuthConfig::for_base_url("https://idp.example", "api");
        config.fetch_rate_limit_per_minute = rate_limit;
        config
    }

    fn cache_with(source: &Arc<StaticKeySource>, config: &AuthConfig) -> KeyCache {
        KeyCache::new(config, Arc::clone(source) as Arc<dyn KeySource>)
    }

    #[tokio::test(start_paused = true)]
    async fn second_resolution_served_from_cache() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let cache = cache_with(&source, &config(5));

        let first = cache.resolve(testutil::TEST_KID).await.unwrap();
        let second = cache.resolve(testutil::TEST_KID).await.unwrap();

        assert_eq!(first.kid(), testutil::TEST_KID);
        assert_eq!(second.kid(), testutil::TEST_KID);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kid_is_not_found_after_fetch() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let cache = cache_with(&source, &config(5));

        let err = cache.resolve("missing").await.unwrap_err();
        assert_eq!(err, KeyResolutionError::KeyNotFound("missing".to_string()));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_set_is_refetched() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let mut config = config(5);
        config.cache_ttl = Duration::from_secs(60);
        let cache = cache_with(&source, &config);

        cache.resolve(testutil::TEST_KID).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        cache.resolve(testutil::TEST_KID).await.unwrap();
        assert_eq!(source.fetch_count(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve(testutil::TEST_KID).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_set_does_not_serve_removed_key() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let mut config = config(5);
        config.cache_ttl = Duration::from_secs(60);
        let cache = cache_with(&source, &config);

        cache.resolve(testutil::TEST_KID).await.unwrap();
        source.set_keys(vec![testutil::signing_key("rotated")]);
        tokio::time::advance(Duration::from_secs(61)).await;

        let err = cache.resolve(testutil::TEST_KID).await.unwrap_err();
        assert_eq!(err.reason(), "key_not_found");
        assert_eq!(cache.cached_key_ids(), vec!["rotated".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_picked_up_on_miss() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key("old")]));
        let cache = cache_with(&source, &config(5));

        cache.resolve("old").await.unwrap();
        source.set_keys(vec![
            testutil::signing_key("old"),
            testutil::signing_key("new"),
        ]);

        let key = cache.resolve("new").await.unwrap();
        assert_eq!(key.kid(), "new");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn misses_beyond_limit_are_rate_limited() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let cache = cache_with(&source, &config(5));

        for i in 0..5 {
            let err = cache.resolve(&format!("unknown-{i}")).await.unwrap_err();
            assert_eq!(err.reason(), "key_not_found");
        }
        assert_eq!(cache.remaining_fetches(), 0);

        let err = cache.resolve("unknown-5").await.unwrap_err();
        assert_eq!(err, KeyResolutionError::RateLimited);
        assert_eq!(source.fetch_count(), 5);

        // Cached keys are still served while the limiter is exhausted.
        cache.resolve(testutil::TEST_KID).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let err = cache.resolve("unknown-6").await.unwrap_err();
        assert_eq!(err.reason(), "key_not_found");
        assert_eq!(source.fetch_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_reports_fetch_failed() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        source.set_failing(true);
        let cache = cache_with(&source, &config(5));

        let err = cache.resolve(testutil::TEST_KID).await.unwrap_err();
        assert_eq!(err.reason(), "fetch_failed");

        source.set_failing(false);
        cache.resolve(testutil::TEST_KID).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let source = Arc::new(
            StaticKeySource::new(vec![testutil::signing_key(testutil::TEST_KID)])
                .with_delay(Duration::from_secs(30)),
        );
        let mut config = config(5);
        config.fetch_timeout = Duration::from_secs(5);
        let cache = cache_with(&source, &config);

        let err = cache.resolve(testutil::TEST_KID).await.unwrap_err();
        assert!(matches!(err, KeyResolutionError::FetchFailed(_)));
        assert!(cache.cached_key_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let source = Arc::new(
            StaticKeySource::new(vec![testutil::signing_key(testutil::TEST_KID)])
                .with_delay(Duration::from_millis(50)),
        );
        let cache = Arc::new(cache_with(&source, &config(5)));

        let resolutions = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.resolve(testutil::TEST_KID).await }
        });
        let results = futures::future::join_all(resolutions).await;

        assert!(results.iter().all(std::result::Result::is_ok));
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.remaining_fetches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let source = Arc::new(StaticKeySource::new(vec![testutil::signing_key(
            testutil::TEST_KID,
        )]));
        let cache = cache_with(&source, &config(5));

        cache.resolve(testutil::TEST_KID).await.unwrap();
        cache.invalidate();
        assert!(cache.cached_key_ids().is_empty());

        cache.resolve(testutil::TEST_KID).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_keys_and_budget() {
        let source = Arc::new(StaticKeySource::new(vec![
            testutil::signing_key("kid-b"),
            testutil::signing_key("kid-a"),
        ]));
        let cache = cache_with(&source, &config(5));

        let empty = cache.status();
        assert!(empty.cached_key_ids.is_empty());
        assert_eq!(empty.remaining_fetches, 5);

        cache.resolve("kid-a").await.unwrap();
        let status = cache.status();
        assert_eq!(status.cached_key_ids, vec!["kid-a", "kid-b"]);
        assert_eq!(status.remaining_fetches, 4);
    }
}
