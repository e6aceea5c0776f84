//! Per-issuer key stores and the registry that owns them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::Algorithm;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{Config, IssuerConfig, JsonLimitsConfig, KeySource};
use crate::discovery::WellKnownResolver;
use crate::error::{Error, Result};
use crate::events::EventType;
use crate::http::ETagAwareHttpLoader;
use crate::keys::{self, KeyEntry, KeySet};

/// Where an issuer's keys come from, resolved once at construction.
enum KeyOrigin {
    /// Fetch directly from a fixed JWKS URI.
    Jwks { uri: String },
    /// Resolve `jwks_uri` via discovery on every refresh, re-checking the
    /// discovered `issuer` matches the configured one each time.
    Discovery { issuer_url: String, configured_issuer: String },
    /// No fetching at all; parsed once and held for the store's lifetime.
    Static,
}

/// Holds the current [`KeySet`] for one issuer and refreshes it from the
/// network (or not at all, for [`KeySource::Static`]), subject to a
/// minimum interval between unsolicited refreshes.
pub struct IssuerKeyStore {
    origin: KeyOrigin,
    loader: Arc<ETagAwareHttpLoader>,
    resolver: WellKnownResolver,
    json_limits: JsonLimitsConfig,
    refresh_rate_limit: Duration,
    current: AsyncMutex<(KeySet, Option<Instant>)>,
}

impl IssuerKeyStore {
    fn new(
        config: &IssuerConfig,
        loader: Arc<ETagAwareHttpLoader>,
        json_limits: JsonLimitsConfig,
        refresh_rate_limit: Duration,
    ) -> Result<Self> {
        let (origin, initial_set) = match &config.key_source {
            KeySource::Jwks { uri } => (KeyOrigin::Jwks { uri: uri.clone() }, KeySet::default()),
            KeySource::Discovery { issuer_url } => (
                KeyOrigin::Discovery {
                    issuer_url: issuer_url.clone(),
                    configured_issuer: config.issuer.clone(),
                },
                KeySet::default(),
            ),
            KeySource::Static { jwks_json } => {
                let set = keys::parse_jwks(jwks_json.as_bytes())
                    .map_err(|_| Error::Config(format!("{}: static jwks_json is invalid", config.id)))?;
                (KeyOrigin::Static, set)
            }
        };

        Ok(Self {
            origin,
            resolver: WellKnownResolver::new(loader.clone(), json_limits),
            loader,
            json_limits,
            refresh_rate_limit,
            current: AsyncMutex::new((initial_set, None)),
        })
    }

    /// Look up a key for `(kid, alg)`, refreshing from the network if it's
    /// not found and the issuer's key source supports refreshing (subject
    /// to the refresh rate limit).
    ///
    /// `alg_name` (the token header's raw `alg` string) is checked against
    /// `allowed_algorithms` before any key lookup happens, so a token using
    /// a disallowed algorithm is rejected without even searching the set.
    ///
    /// # Errors
    ///
    /// `KeyAlgorithmNotAllowed` if `alg_name` is not on `allowed_algorithms`;
    /// `KeyNotFound` if no key matches even after a refresh attempt;
    /// `JwksFetchFailed`/`JwksJsonParseFailed` if a forced refresh fails.
    pub async fn find(
        &self,
        kid: Option<&str>,
        alg: Algorithm,
        alg_name: &str,
        allowed_algorithms: &[String],
    ) -> std::result::Result<KeyEntry, EventType> {
        if !allowed_algorithms.iter().any(|a| a == alg_name) {
            return Err(EventType::KeyAlgorithmNotAllowed);
        }

        {
            let guard = self.current.lock().await;
            if let Some(entry) = guard.0.find(kid, alg) {
                return Ok(clone_entry(entry));
            }
        }

        if matches!(self.origin, KeyOrigin::Static) {
            return Err(EventType::KeyNotFound);
        }

        self.refresh(false).await?;

        let guard = self.current.lock().await;
        guard.0.find(kid, alg).map(clone_entry).ok_or(EventType::KeyNotFound)
    }

    /// Force a refresh, bypassing the in-set lookup but still honoring the
    /// rate limit unless `force` is set.
    ///
    /// For [`KeyOrigin::Discovery`], the discovery document's `issuer`
    /// field is compared against the configured issuer on every refresh;
    /// a mismatch is never silently accepted.
    ///
    /// # Errors
    ///
    /// `JwksFetchFailed` on transport failure with no cached fallback;
    /// `JwksJsonParseFailed` if the fetched document doesn't parse;
    /// `WellKnownFetchFailed` if discovery fails or its `issuer` field
    /// doesn't match the configured issuer.
    pub async fn refresh(&self, force: bool) -> std::result::Result<(), EventType> {
        let mut guard = self.current.lock().await;
        if !force {
            if let Some(last) = guard.1 {
                if last.elapsed() < self.refresh_rate_limit {
                    return Ok(());
                }
            }
        }

        let jwks_uri = match &self.origin {
            KeyOrigin::Jwks { uri } => uri.clone(),
            KeyOrigin::Static => return Ok(()),
            KeyOrigin::Discovery { issuer_url, configured_issuer } => {
                let document = self
                    .resolver
                    .resolve(issuer_url)
                    .await
                    .map_err(|_| EventType::WellKnownFetchFailed)?;
                if &document.issuer != configured_issuer {
                    tracing::warn!(
                        expected = %configured_issuer,
                        actual = %document.issuer,
                        "discovery document issuer mismatch"
                    );
                    return Err(EventType::WellKnownFetchFailed);
                }
                document.jwks_uri
            }
        };

        let (body, _state) = self.loader.load(&jwks_uri).await.map_err(|_| EventType::JwksFetchFailed)?;
        let set = keys::parse_jwks(&body)?;
        guard.0 = set;
        guard.1 = Some(Instant::now());
        Ok(())
    }

    /// Eagerly resolve discovery (if this store's key source is
    /// [`KeySource::Discovery`]) and fail with [`Error::Config`] if the
    /// discovered `issuer` doesn't match the configured one. Called once
    /// at registry construction so an issuer/discovery mismatch is a
    /// startup-time configuration error, never a silently-accepted
    /// runtime condition.
    async fn eager_validate_discovery(&self) -> Result<()> {
        let KeyOrigin::Discovery { issuer_url, configured_issuer } = &self.origin else {
            return Ok(());
        };

        let document = self
            .resolver
            .resolve(issuer_url)
            .await
            .map_err(|e| Error::Config(format!("{issuer_url}: discovery fetch failed: {e}")))?;

        if &document.issuer != configured_issuer {
            return Err(Error::Config(format!(
                "{issuer_url}: discovery document issuer '{}' does not match configured issuer '{configured_issuer}'",
                document.issuer
            )));
        }

        let (body, _state) = self
            .loader
            .load(&document.jwks_uri)
            .await
            .map_err(|e| Error::Config(format!("{}: jwks fetch failed: {e}", document.jwks_uri)))?;
        let set = keys::parse_jwks(&body)
            .map_err(|_| Error::Config(format!("{}: jwks document is invalid", document.jwks_uri)))?;

        let mut guard = self.current.lock().await;
        guard.0 = set;
        guard.1 = Some(Instant::now());
        Ok(())
    }

    #[cfg(test)]
    fn json_limits(&self) -> JsonLimitsConfig {
        self.json_limits
    }
}

fn clone_entry(entry: &KeyEntry) -> KeyEntry {
    KeyEntry {
        kid: entry.kid.clone(),
        alg: entry.alg,
        decoding_key: entry.decoding_key.clone(),
    }
}

/// Owns every configured issuer's [`IssuerConfig`] and [`IssuerKeyStore`],
/// keyed by the `iss` claim value.
pub struct IssuerRegistry {
    by_issuer_claim: HashMap<String, (IssuerConfig, IssuerKeyStore)>,
}

impl IssuerRegistry {
    /// Build a registry from `config`, validating id uniqueness and issuer
    /// uniqueness up front, and eagerly resolving OIDC discovery for any
    /// issuer configured with [`KeySource::Discovery`] so an
    /// issuer/discovery mismatch is caught before the registry is ever
    /// used to validate a token.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] on a duplicate `id`, a duplicate `issuer`, an
    /// empty `issuers` list, unparseable static key material, or a
    /// discovery document whose `issuer` doesn't match the configured one.
    pub async fn new(config: &Config) -> Result<Self> {
        if config.issuers.is_empty() {
            return Err(Error::Config("at least one issuer must be configured".to_string()));
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut by_issuer_claim = HashMap::new();

        for issuer_config in &config.issuers {
            if !seen_ids.insert(issuer_config.id.clone()) {
                return Err(Error::Config(format!("duplicate issuer id: {}", issuer_config.id)));
            }
            if by_issuer_claim.contains_key(&issuer_config.issuer) {
                return Err(Error::Config(format!("duplicate issuer claim value: {}", issuer_config.issuer)));
            }

            let loader = Arc::new(ETagAwareHttpLoader::new(&config.http, config.retry)?);
            let store = IssuerKeyStore::new(issuer_config, loader, config.json_limits, config.jwks_refresh_rate_limit)?;
            store.eager_validate_discovery().await?;
            by_issuer_claim.insert(issuer_config.issuer.clone(), (issuer_config.clone(), store));
        }

        Ok(Self { by_issuer_claim })
    }

    /// Look up the configuration and key store for the issuer named by an
    /// `iss` claim value.
    #[must_use]
    pub fn get(&self, issuer_claim: &str) -> Option<(&IssuerConfig, &IssuerKeyStore)> {
        self.by_issuer_claim.get(issuer_claim).map(|(cfg, store)| (cfg, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, RetryConfig};

    fn sample_config() -> Config {
        let jwks_json = std::fs::read_to_string("tests/fixtures/jwks.json").unwrap();
        Config {
            issuers: vec![IssuerConfig {
                id: "acme".to_string(),
                issuer: "https://issuer.example.com".to_string(),
                key_source: KeySource::Static { jwks_json },
                allowed_algorithms: vec!["RS256".to_string()],
                expected_audiences: vec!["client-a".to_string()],
                ..IssuerConfig::default()
            }],
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn rejects_empty_issuer_list() {
        let config = Config::default();
        assert!(IssuerRegistry::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn rejects_duplicate_issuer_ids() {
        let mut config = sample_config();
        let duplicate = config.issuers[0].clone();
        config.issuers.push(duplicate);
        assert!(IssuerRegistry::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn static_key_source_is_immediately_usable() {
        let config = sample_config();
        let registry = IssuerRegistry::new(&config).await.unwrap();
        let (_, store) = registry.get("https://issuer.example.com").unwrap();
        let key = store
            .find(
                Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"),
                Algorithm::RS256,
                "RS256",
                &["RS256".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(key.kid.as_deref(), Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"));
        assert_eq!(store.json_limits().max_depth, config.json_limits.max_depth);
    }

    #[tokio::test]
    async fn static_key_source_never_refreshes_on_miss() {
        let config = sample_config();
        let registry = IssuerRegistry::new(&config).await.unwrap();
        let (_, store) = registry.get("https://issuer.example.com").unwrap();
        let result = store.find(Some("unknown-kid"), Algorithm::RS256, "RS256", &["RS256".to_string()]).await;
        assert_eq!(result.err(), Some(EventType::KeyNotFound));
    }

    #[tokio::test]
    async fn algorithm_not_on_allow_list_is_rejected_before_key_lookup() {
        let config = sample_config();
        let registry = IssuerRegistry::new(&config).await.unwrap();
        let (_, store) = registry.get("https://issuer.example.com").unwrap();
        let result = store
            .find(
                Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"),
                Algorithm::RS256,
                "RS256",
                &["RS384".to_string()],
            )
            .await;
        assert_eq!(result.err(), Some(EventType::KeyAlgorithmNotAllowed));
    }
}
