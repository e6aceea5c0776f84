//! Access token validation cache.
//!
//! Caches successful validations keyed by a SHA-256 fingerprint of the raw
//! token (never the token itself), so a host that calls `createAccessToken`
//! repeatedly for the same bearer token on a hot path doesn't re-run the
//! full pipeline (network-bound key refreshes included) on every call.
//! Rejections are never cached — a token that becomes valid later (e.g.
//! `nbf` in the near future) must be re-checked, not stuck at its first
//! negative result.
//!
//! A cached entry's expiry is never just `now + ttl`: it's
//! `min(ttl, time until the token's own exp) - early_evict_skew`, so a
//! token never gets served from cache past its real expiration.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;

use crate::config::CacheConfig;
use crate::events::SecurityEvent;
use crate::pipeline::AccessTokenContent;

/// SHA-256 fingerprint of a raw token, used as the cache key so the raw
/// token itself is never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of `token`.
    #[must_use]
    pub fn of(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

struct CacheEntry {
    validated: AccessTokenContent,
    expires_at: Instant,
}

/// Caches [`AccessTokenContent`]s by fingerprint, with a background sweep
/// that evicts expired entries and single-flight coalescing so concurrent
/// calls for the same token share one pipeline run.
///
/// Grounded on the teacher's `key_server::store::InMemoryTokenStore`:
/// a `DashMap`-backed store with a `tokio::spawn`-owned periodic reaper
/// that shuts down on a broadcast signal.
pub struct AccessTokenCache {
    entries: Arc<DashMap<Fingerprint, CacheEntry>>,
    inflight: DashMap<Fingerprint, Arc<AsyncMutex<()>>>,
    max_size: usize,
    ttl: Duration,
    early_evict_skew: Duration,
    shutdown_tx: broadcast::Sender<()>,
    sweep_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AccessTokenCache {
    /// Build a cache from `config`. `max_size == 0` disables caching
    /// entirely: every call re-runs the full pipeline and no background
    /// task is spawned.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let entries: Arc<DashMap<Fingerprint, CacheEntry>> = Arc::new(DashMap::new());

        let sweep_handle = if config.max_size > 0 {
            let entries = entries.clone();
            let sweep_interval = config.sweep_interval;
            let mut shutdown_rx = shutdown_tx.subscribe();
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let now = Instant::now();
                            entries.retain(|_, entry| entry.expires_at > now);
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }))
        } else {
            None
        };

        Self {
            entries,
            inflight: DashMap::new(),
            max_size: config.max_size,
            ttl: config.ttl,
            early_evict_skew: config.early_evict_skew,
            shutdown_tx,
            sweep_handle: std::sync::Mutex::new(sweep_handle),
        }
    }

    /// Return the cached result for `token` if present and unexpired;
    /// otherwise call `compute` (exactly once across concurrent callers
    /// for the same token) and cache a successful result.
    pub async fn get_or_compute<F, Fut>(&self, token: &str, compute: F) -> Result<AccessTokenContent, SecurityEvent>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessTokenContent, SecurityEvent>>,
    {
        if self.max_size == 0 {
            return compute().await;
        }

        let fingerprint = Fingerprint::of(token);
        let now = Instant::now();

        if let Some(cached) = self.lookup(fingerprint, now) {
            return Ok(cached);
        }

        let lock = self
            .inflight
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(cached) = self.lookup(fingerprint, Instant::now()) {
            return Ok(cached);
        }

        let result = compute().await?;

        if self.entries.len() < self.max_size || self.entries.contains_key(&fingerprint) {
            self.entries.insert(
                fingerprint,
                CacheEntry {
                    expires_at: self.effective_expiry(result.expires_at()),
                    validated: result.clone(),
                },
            );
        }

        Ok(result)
    }

    /// `min(ttl, time until exp) - early_evict_skew`, clamped at zero, so a
    /// token whose real `exp` is sooner than `ttl` expires from the cache
    /// no later than that, and no entry with `now >= exp - skew` is
    /// reachable through [`Self::lookup`].
    fn effective_expiry(&self, exp: SystemTime) -> Instant {
        let time_until_exp = exp.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
        let effective_ttl = self.ttl.min(time_until_exp).saturating_sub(self.early_evict_skew);
        Instant::now() + effective_ttl
    }

    fn lookup(&self, fingerprint: Fingerprint, now: Instant) -> Option<AccessTokenContent> {
        let entry = self.entries.get(&fingerprint)?;
        if entry.expires_at > now {
            Some(entry.validated.clone())
        } else {
            None
        }
    }

    /// Number of currently cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop the background sweep task and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.sweep_handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token(subject: &str, expires_at: SystemTime) -> AccessTokenContent {
        crate::pipeline::test_support::access_token_content(
            "acme",
            subject,
            crate::json::decode_bounded(b"{}", crate::config::JsonLimitsConfig::default()).unwrap(),
            expires_at,
        )
    }

    #[tokio::test]
    async fn disabled_cache_always_recomputes() {
        let config = CacheConfig { max_size: 0, ..CacheConfig::default() };
        let cache = AccessTokenCache::new(&config);
        let mut calls = 0;
        for _ in 0..3 {
            let exp = SystemTime::now() + Duration::from_secs(300);
            let _ = cache
                .get_or_compute("token-a", || {
                    calls += 1;
                    async move { Ok(sample_token("alice", exp)) }
                })
                .await;
        }
        assert_eq!(calls, 3);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn successful_validation_is_cached() {
        let config = CacheConfig { max_size: 10, ttl: Duration::from_secs(60), ..CacheConfig::default() };
        let cache = AccessTokenCache::new(&config);
        let exp = SystemTime::now() + Duration::from_secs(300);

        let result = cache.get_or_compute("token-a", || async move { Ok(sample_token("alice", exp)) }).await.unwrap();
        assert_eq!(result.subject(), "alice");
        assert_eq!(cache.len(), 1);

        let result = cache
            .get_or_compute("token-a", || async { panic!("should not recompute a cache hit") })
            .await
            .unwrap();
        assert_eq!(result.subject(), "alice");
    }

    #[tokio::test]
    async fn rejections_are_never_cached() {
        let config = CacheConfig { max_size: 10, ..CacheConfig::default() };
        let cache = AccessTokenCache::new(&config);

        let result = cache
            .get_or_compute("token-a", || async {
                Err(SecurityEvent::new(crate::events::EventType::TokenExpired))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn entry_whose_exp_is_sooner_than_ttl_expires_from_cache_at_exp_minus_skew() {
        let config = CacheConfig {
            max_size: 10,
            ttl: Duration::from_secs(300),
            early_evict_skew: Duration::from_secs(2),
            ..CacheConfig::default()
        };
        let cache = AccessTokenCache::new(&config);
        let exp = SystemTime::now() + Duration::from_millis(50);

        cache.get_or_compute("token-a", || async move { Ok(sample_token("alice", exp)) }).await.unwrap();
        assert_eq!(cache.len(), 1);

        // exp is 50ms out and skew is 2s, so the entry is already
        // unreachable through lookup despite the 300s configured ttl.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let fingerprint = Fingerprint::of("token-a");
        assert!(cache.lookup(fingerprint, Instant::now()).is_none());
    }
}
