//! Configuration tree.
//!
//! The crate never reads files or environment variables itself — building
//! a [`Config`] from whatever source the host uses (file, env, code) is the
//! host's job. Every struct here derives `Deserialize` with `#[serde(default)]`
//! and carries an explicit `Default` impl, so a host can deserialize a
//! partial document and still get sane values for everything it omits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`crate::Validator`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Issuers this validator will accept tokens from. Must be non-empty
    /// and have unique `id`s — checked at `Validator` construction time.
    pub issuers: Vec<IssuerConfig>,
    /// Clock skew tolerance applied to `exp`/`nbf`/`iat` checks.
    pub clock_skew: ClockSkewConfig,
    /// Raw compact-serialization size ceiling, checked before any parsing.
    pub max_token_bytes: usize,
    /// Minimum interval between unsolicited JWKS refreshes for a given
    /// issuer (a `kid` miss can still force an out-of-band refresh).
    #[serde(with = "humantime_serde")]
    pub jwks_refresh_rate_limit: Duration,
    /// Access token cache sizing and TTL behavior.
    pub cache: CacheConfig,
    /// HTTP client behavior for JWKS / discovery fetches.
    pub http: HttpConfig,
    /// Retry policy for JWKS / discovery fetches.
    pub retry: RetryConfig,
    /// JSON decode ceilings (payload bytes, string length, array length, depth).
    pub json_limits: JsonLimitsConfig,
}

impl Config {
    const fn default_max_token_bytes() -> usize {
        8192
    }
}

/// Per-issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Stable identifier used in logs and in `SecurityEvent` context;
    /// not the same as the `iss` claim value, though it is often derived
    /// from it.
    pub id: String,
    /// Expected `iss` claim value. Must match exactly (no trailing-slash
    /// normalization).
    pub issuer: String,
    /// Where to obtain signing keys.
    pub key_source: KeySource,
    /// Acceptable signature algorithms for this issuer. A token signed
    /// with any other algorithm — including `none` — is rejected.
    pub allowed_algorithms: Vec<String>,
    /// Expected audience value(s). A token is accepted if its `aud` claim
    /// (or `azp`, for issuers that split client id from audience)
    /// intersects this set.
    pub expected_audiences: Vec<String>,
    /// Expected `azp` (authorized party / client id) value. When set, a
    /// token's `azp` must match this exactly rather than merely appearing
    /// in `expected_audiences` — stricter than the default `aud`-or-`azp`
    /// intersection check.
    pub expected_client_id: Option<String>,
    /// Allow JWT-formatted (signature-verified) refresh tokens for this
    /// issuer in addition to opaque ones. Default `false`: refresh tokens
    /// are treated as opaque strings unless explicitly opted in, since
    /// refresh token format is not standardized across issuers.
    pub allow_jwt_refresh_tokens: bool,
    /// Whether this issuer currently accepts tokens. An issuer can be kept
    /// in configuration but temporarily disabled (e.g. during a key
    /// rotation incident) without removing it and losing its settings;
    /// a disabled issuer is treated as unregistered (`ISSUER_UNKNOWN`).
    pub enabled: bool,
    /// Per-issuer overrides for which raw claim feeds each convenience
    /// accessor on `AccessTokenContent`/`IdTokenContent`. Unset fields fall
    /// back to the OAuth2/OIDC conventional claim name.
    pub claim_mapper_overrides: ClaimMapperOverrides,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            issuer: String::new(),
            key_source: KeySource::default(),
            allowed_algorithms: vec!["RS256".to_string()],
            expected_audiences: Vec::new(),
            expected_client_id: None,
            allow_jwt_refresh_tokens: false,
            enabled: true,
            claim_mapper_overrides: ClaimMapperOverrides::default(),
        }
    }
}

/// Per-issuer claim-name overrides for the typed content accessors.
///
/// Different identity providers put scopes, roles, and groups under
/// different claim names (`scope` vs. `scp`, `roles` vs. a nested
/// `realm_access.roles`, and so on). This crate only resolves flat,
/// top-level claim names; an issuer whose provider nests these under a
/// structured claim must flatten it before the claims reach this crate,
/// or accept the default and read `claims()` directly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClaimMapperOverrides {
    /// Claim name carrying scopes. Defaults to `scope` (space-delimited
    /// string, the OAuth2 convention) and falls back to `scp` (a JSON
    /// array, as some providers emit it) when `scope` is absent.
    pub scopes_claim: Option<String>,
    /// Claim name carrying roles. Defaults to `roles`.
    pub roles_claim: Option<String>,
    /// Claim name carrying group memberships. Defaults to `groups`.
    pub groups_claim: Option<String>,
    /// Claim name carrying the subject's email. Defaults to `email`.
    pub email_claim: Option<String>,
}

/// How an issuer's signing keys are obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySource {
    /// Fetch a JWKS document directly from a fixed URI.
    Jwks {
        /// JWKS document URI.
        uri: String,
    },
    /// Resolve the JWKS URI (and, for validation, confirm the issuer
    /// string) via an OIDC discovery document first.
    Discovery {
        /// Issuer base URL; `/.well-known/openid-configuration` is
        /// appended to obtain the discovery document.
        issuer_url: String,
    },
    /// Static, in-memory key set — no network fetch, no refresh.
    Static {
        /// Raw JWKS document (a JSON Web Key Set).
        jwks_json: String,
    },
}

impl Default for KeySource {
    fn default() -> Self {
        Self::Jwks { uri: String::new() }
    }
}

/// Clock skew tolerance, in whole seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSkewConfig {
    /// Seconds of leeway applied when comparing `exp`, `nbf`, and `iat`
    /// against the current time.
    pub seconds: u64,
}

impl Default for ClockSkewConfig {
    fn default() -> Self {
        Self { seconds: 60 }
    }
}

impl ClockSkewConfig {
    /// This skew as a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

/// Access token cache sizing and expiry sweep behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached validation results. `0` disables the
    /// cache entirely (every call re-runs the full pipeline).
    pub max_size: usize,
    /// How long a cached result is considered valid, independent of the
    /// token's own `exp`. The effective TTL is `min(ttl, time until exp)`,
    /// further reduced by `early_evict_skew`.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Subtracted from the effective TTL so a cache entry is evicted
    /// slightly before the token's real `exp`, rather than at it — no
    /// entry with `now >= exp - early_evict_skew` is ever returned.
    #[serde(with = "humantime_serde")]
    pub early_evict_skew: Duration,
    /// Interval between background sweeps that evict expired entries.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            ttl: Duration::from_secs(300),
            early_evict_skew: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// HTTP client behavior for JWKS / discovery fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// User-Agent header sent on JWKS / discovery requests.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("jwt-id-validator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Retry policy applied to JWKS / discovery fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: usize,
    /// Base delay for exponential backoff.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay between attempts, before jitter.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// JSON decode ceilings enforced while parsing JWT segments, JWKS
/// documents, and discovery documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonLimitsConfig {
    /// Maximum raw payload size, in bytes, before parsing is attempted.
    pub max_payload_bytes: usize,
    /// Maximum length of any single string value.
    pub max_string_len: usize,
    /// Maximum length of any array value.
    pub max_array_len: usize,
    /// Maximum nesting depth (objects and arrays combined).
    pub max_depth: usize,
}

impl Default for JsonLimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 16_384,
            max_string_len: 8192,
            max_array_len: 256,
            max_depth: 16,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuers: Vec::new(),
            clock_skew: ClockSkewConfig::default(),
            max_token_bytes: Self::default_max_token_bytes(),
            jwks_refresh_rate_limit: Duration::from_secs(10),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            json_limits: JsonLimitsConfig::default(),
        }
    }
}
