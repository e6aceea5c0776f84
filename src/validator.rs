//! The top-level facade: `Validator`.
//!
//! Mirrors the teacher's composition style in `key_server::mod` — a small
//! struct of `Arc`-wrapped subsystems, cheap to clone, safe to share across
//! every concurrent request handler in the host.

use std::sync::Arc;
use std::time::SystemTime;

use crate::cache::AccessTokenCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventType, SecurityEvent, SecurityEventCounter};
use crate::issuer::IssuerRegistry;
use crate::pipeline::{self, AccessTokenContent, IdTokenContent, RefreshTokenContent};

struct Inner {
    config: Config,
    registry: IssuerRegistry,
    cache: AccessTokenCache,
    events: SecurityEventCounter,
}

/// Validates OAuth2/OIDC bearer tokens against a fixed set of configured
/// issuers. Cheap to clone (an `Arc` around its state); one instance
/// should be built per configuration and shared across a host's request
/// handlers.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<Inner>,
}

impl Validator {
    /// Build a validator from `config`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if issuer configuration is invalid (duplicate
    /// ids/issuers, unreadable static key material, empty issuer list, a
    /// discovery document whose issuer doesn't match the configured one)
    /// or the HTTP client can't be constructed.
    pub async fn new(config: Config) -> Result<Self> {
        let registry = IssuerRegistry::new(&config).await?;
        let cache = AccessTokenCache::new(&config.cache);
        Ok(Self {
            inner: Arc::new(Inner {
                events: SecurityEventCounter::new(),
                cache,
                registry,
                config,
            }),
        })
    }

    /// Validate a bearer access token. Successful validations are cached
    /// by fingerprint.
    ///
    /// # Errors
    ///
    /// The [`SecurityEvent`] classifying why the token was rejected.
    pub async fn create_access_token(&self, token: &str) -> Result<AccessTokenContent, SecurityEvent> {
        let result = self
            .inner
            .cache
            .get_or_compute(token, || async {
                pipeline::validate_access(
                    token,
                    SystemTime::now(),
                    self.inner.config.max_token_bytes,
                    self.inner.config.clock_skew,
                    self.inner.config.json_limits,
                    &self.inner.registry,
                )
                .await
            })
            .await;

        self.count_rejection(&result);
        result
    }

    /// Validate an OIDC ID token. Subject to the same checks as an access
    /// token (audience included) — ID tokens carry an `aud` scoped to the
    /// relying party, the same shape this pipeline already checks. Not
    /// cached: ID tokens are typically validated once per sign-in, not on
    /// every request the way access tokens are.
    ///
    /// # Errors
    ///
    /// The [`SecurityEvent`] classifying why the token was rejected.
    pub async fn create_id_token(&self, token: &str) -> Result<IdTokenContent, SecurityEvent> {
        let result = pipeline::validate_id(
            token,
            SystemTime::now(),
            self.inner.config.max_token_bytes,
            self.inner.config.clock_skew,
            self.inner.config.json_limits,
            &self.inner.registry,
        )
        .await;

        self.count_rejection(&result);
        result
    }

    /// Validate a JWT-formatted refresh token.
    ///
    /// Refresh tokens are opaque by default: unless the issuer that owns
    /// `token`'s claimed issuer has `allow_jwt_refresh_tokens` set, this
    /// call cannot determine ownership from an unparsed opaque string and
    /// returns [`EventType::TokenParseFailed`] — callers that accept
    /// opaque refresh tokens should not route them through this method at
    /// all; it exists for issuers that opt into JWT-formatted ones. Not
    /// cached.
    ///
    /// # Errors
    ///
    /// The [`SecurityEvent`] classifying why the token was rejected.
    pub async fn create_refresh_token(&self, token: &str) -> Result<RefreshTokenContent, SecurityEvent> {
        let result = pipeline::validate_refresh(
            token,
            SystemTime::now(),
            self.inner.config.max_token_bytes,
            self.inner.config.clock_skew,
            self.inner.config.json_limits,
            &self.inner.registry,
        )
        .await;

        self.count_rejection(&result);
        result
    }

    fn count_rejection<T>(&self, result: &std::result::Result<T, SecurityEvent>) {
        if let Err(event) = result {
            self.inner.events.increment(event.event_type);
        }
    }

    /// Point-in-time snapshot of every rejection counter.
    #[must_use]
    pub fn security_event_snapshot(&self) -> std::collections::HashMap<EventType, u64> {
        self.inner.events.snapshot()
    }

    /// Number of currently cached access-token validation results.
    #[must_use]
    pub fn cached_entry_count(&self) -> usize {
        self.inner.cache.len()
    }

    /// Stop background tasks (the cache's eviction sweep). Safe to call
    /// more than once; idempotent.
    pub async fn shutdown(&self) {
        self.inner.cache.shutdown().await;
    }
}
