//! Token validation pipeline: compact-serialization JWT in, a classified
//! typed content view or a [`SecurityEvent`] out.
//!
//! Steps run in a fixed order so that cheap checks reject malformed input
//! before anything touches a key or the network, and so every rejection
//! reason is unambiguous (exactly one step can produce each [`EventType`]):
//!
//! 1. raw size check (`TOKEN_SIZE_EXCEEDED`)
//! 2. split into three segments (`TOKEN_PARSE_FAILED`)
//! 3. decode + bounded-parse the header (`TOKEN_PARSE_FAILED`, `HEADER_INVALID`)
//! 4. reject `alg: none` outright (`ALGORITHM_NOT_ALLOWED`)
//! 5. decode + bounded-parse the payload (`TOKEN_PARSE_FAILED`)
//! 6. extract and check `iss` (`ISSUER_MISSING`)
//! 7. look up the issuer (`ISSUER_UNKNOWN`)
//! 8. find a signing key for `(kid, alg)`, checked against the issuer's
//!    algorithm allow-list inside the key store itself
//!    (`KEY_ALGORITHM_NOT_ALLOWED`, `KEY_NOT_FOUND`), with one rate-limited
//!    refresh attempt on a miss
//! 9. verify the signature (`SIGNATURE_INVALID`)
//! 10. check `exp`/`nbf`/`iat` against the clock, with skew (`TOKEN_EXPIRED`,
//!     `TOKEN_NBF_FUTURE`, `TOKEN_IAT_FUTURE`)
//! 11. check `aud`/`azp` against the issuer's expected audiences, unless
//!     this is a refresh token (`AUDIENCE_MISMATCH`)
//! 12. check `sub` is present and non-empty (`SUBJECT_MISSING`)

use std::time::SystemTime;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;

use crate::claims::{ClaimValue, names};
use crate::codec::{self, CompactSegments};
use crate::config::{ClaimMapperOverrides, ClockSkewConfig, IssuerConfig, JsonLimitsConfig};
use crate::events::{EventType, SecurityEvent};
use crate::issuer::IssuerRegistry;
use crate::json::{MapRepresentation, decode_bounded};

/// Whether audience checking applies to this validation. Refresh tokens
/// are not scoped to a single audience in the common case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Standard access token: audience check applies.
    Access,
    /// OIDC ID token: audience check applies.
    Id,
    /// JWT-formatted refresh token (only reachable when an issuer opts in
    /// via `allow_jwt_refresh_tokens`): audience check is skipped.
    Refresh,
}

/// Claims and metadata shared by every validated token shape.
#[derive(Debug, Clone)]
struct CoreClaims {
    issuer_id: String,
    subject: String,
    claims: MapRepresentation,
    expires_at: SystemTime,
}

/// A validated OAuth2 access token.
#[derive(Debug, Clone)]
pub struct AccessTokenContent {
    core: CoreClaims,
    scopes: Vec<String>,
    roles: Vec<String>,
    groups: Vec<String>,
}

impl AccessTokenContent {
    /// The issuer id this token was validated against (the configured,
    /// stable identifier — not the raw `iss` claim).
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.core.issuer_id
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.core.subject
    }

    /// The full claim set, for host-side use beyond what this crate checks.
    #[must_use]
    pub fn claims(&self) -> &MapRepresentation {
        &self.core.claims
    }

    /// The `exp` claim as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.core.expires_at
    }

    /// The `aud` claim, normalized to a list.
    #[must_use]
    pub fn audience(&self) -> Vec<String> {
        ClaimValue::string_list(&self.core.claims, names::AUD)
            .as_string_list()
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Scopes granted to this token, split on whitespace if carried as a
    /// single space-delimited string (the OAuth2 convention).
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Roles claimed for this token's subject.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Group memberships claimed for this token's subject.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

/// A validated OIDC ID token.
#[derive(Debug, Clone)]
pub struct IdTokenContent {
    core: CoreClaims,
    email: Option<String>,
    roles: Vec<String>,
    groups: Vec<String>,
}

impl IdTokenContent {
    /// The issuer id this token was validated against.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.core.issuer_id
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.core.subject
    }

    /// The full claim set, for host-side use beyond what this crate checks.
    #[must_use]
    pub fn claims(&self) -> &MapRepresentation {
        &self.core.claims
    }

    /// The `exp` claim as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.core.expires_at
    }

    /// The `aud` claim, normalized to a list.
    #[must_use]
    pub fn audience(&self) -> Vec<String> {
        ClaimValue::string_list(&self.core.claims, names::AUD)
            .as_string_list()
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// The subject's email, if the provider supplied one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Roles claimed for this token's subject.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Group memberships claimed for this token's subject.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

/// A validated JWT-formatted refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenContent {
    core: CoreClaims,
}

impl RefreshTokenContent {
    /// The issuer id this token was validated against.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        &self.core.issuer_id
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.core.subject
    }

    /// The full claim set, for host-side use beyond what this crate checks.
    #[must_use]
    pub fn claims(&self) -> &MapRepresentation {
        &self.core.claims
    }

    /// The `exp` claim as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.core.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
}

/// Validate `token` as an access token.
///
/// # Errors
///
/// The [`SecurityEvent`] classifying the first failed step. Never carries
/// the raw token.
pub async fn validate_access(
    token: &str,
    now: SystemTime,
    max_token_bytes: usize,
    clock_skew: ClockSkewConfig,
    json_limits: JsonLimitsConfig,
    registry: &IssuerRegistry,
) -> Result<AccessTokenContent, SecurityEvent> {
    let (core, overrides) = run(TokenKind::Access, token, now, max_token_bytes, clock_skew, json_limits, registry).await?;
    Ok(AccessTokenContent {
        scopes: extract_scopes(&core.claims, &overrides),
        roles: extract_list(&core.claims, overrides.roles_claim.as_deref().unwrap_or("roles")),
        groups: extract_list(&core.claims, overrides.groups_claim.as_deref().unwrap_or("groups")),
        core,
    })
}

/// Validate `token` as an OIDC ID token. Subject to the same checks as an
/// access token (audience included) — ID tokens carry an `aud` scoped to
/// the relying party, the same shape this pipeline already checks.
///
/// # Errors
///
/// The [`SecurityEvent`] classifying the first failed step.
pub async fn validate_id(
    token: &str,
    now: SystemTime,
    max_token_bytes: usize,
    clock_skew: ClockSkewConfig,
    json_limits: JsonLimitsConfig,
    registry: &IssuerRegistry,
) -> Result<IdTokenContent, SecurityEvent> {
    let (core, overrides) = run(TokenKind::Id, token, now, max_token_bytes, clock_skew, json_limits, registry).await?;
    let email_claim = overrides.email_claim.as_deref().unwrap_or("email");
    Ok(IdTokenContent {
        email: ClaimValue::string(&core.claims, email_claim).as_non_empty_str().map(str::to_string),
        roles: extract_list(&core.claims, overrides.roles_claim.as_deref().unwrap_or("roles")),
        groups: extract_list(&core.claims, overrides.groups_claim.as_deref().unwrap_or("groups")),
        core,
    })
}

/// Validate `token` as a JWT-formatted refresh token.
///
/// Only reachable for issuers that opt in via `allow_jwt_refresh_tokens`;
/// refresh tokens are opaque strings otherwise and never reach this
/// pipeline at all.
///
/// # Errors
///
/// The [`SecurityEvent`] classifying the first failed step.
pub async fn validate_refresh(
    token: &str,
    now: SystemTime,
    max_token_bytes: usize,
    clock_skew: ClockSkewConfig,
    json_limits: JsonLimitsConfig,
    registry: &IssuerRegistry,
) -> Result<RefreshTokenContent, SecurityEvent> {
    let (core, _overrides) = run(TokenKind::Refresh, token, now, max_token_bytes, clock_skew, json_limits, registry).await?;
    Ok(RefreshTokenContent { core })
}

async fn run(
    kind: TokenKind,
    token: &str,
    now: SystemTime,
    max_token_bytes: usize,
    clock_skew: ClockSkewConfig,
    json_limits: JsonLimitsConfig,
    registry: &IssuerRegistry,
) -> Result<(CoreClaims, ClaimMapperOverrides), SecurityEvent> {
    if token.len() > max_token_bytes {
        return Err(SecurityEvent::new(EventType::TokenSizeExceeded));
    }

    let segments = codec::split(token).ok_or_else(|| SecurityEvent::new(EventType::TokenParseFailed))?;

    let header = decode_header(segments, json_limits)?;
    let alg = parse_algorithm(&header.alg).ok_or_else(|| SecurityEvent::new(EventType::AlgorithmNotAllowed))?;

    let payload_bytes = codec::base64_url_decode(segments.payload)
        .map_err(|_| SecurityEvent::new(EventType::TokenParseFailed))?;
    let claims = decode_bounded(&payload_bytes, json_limits).map_err(SecurityEvent::new)?;

    let issuer_claim = ClaimValue::string(&claims, names::ISS);
    let issuer_claim = issuer_claim
        .as_non_empty_str()
        .ok_or_else(|| SecurityEvent::new(EventType::IssuerMissing))?;

    let (issuer_config, key_store) = registry
        .get(issuer_claim)
        .filter(|(cfg, _)| cfg.enabled)
        .ok_or_else(|| SecurityEvent::new(EventType::IssuerUnknown))?;

    let key = key_store
        .find(header.kid.as_deref(), alg, &header.alg, &issuer_config.allowed_algorithms)
        .await
        .map_err(SecurityEvent::new)?;

    verify_signature(segments, &key.decoding_key, alg)?;

    check_time_claims(&claims, now, clock_skew)?;

    if kind != TokenKind::Refresh {
        check_audience(&claims, issuer_config)?;
    }

    let subject = ClaimValue::string(&claims, names::SUB);
    let subject = subject
        .as_non_empty_str()
        .ok_or_else(|| SecurityEvent::new(EventType::SubjectMissing))?
        .to_string();

    let expires_at = ClaimValue::date_time(&claims, names::EXP)
        .as_time()
        .unwrap_or(now);

    Ok((
        CoreClaims {
            issuer_id: issuer_config.id.clone(),
            subject,
            claims,
            expires_at,
        },
        issuer_config.claim_mapper_overrides.clone(),
    ))
}

fn extract_list(claims: &MapRepresentation, claim_name: &str) -> Vec<String> {
    ClaimValue::string_list(claims, claim_name)
        .as_string_list()
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

/// Scopes are conventionally a single space-delimited string under
/// `scope`; some providers instead emit a JSON array under `scp`. Try the
/// configured (or default) claim name as a space-delimited string first,
/// then fall back to `scp` as an array.
fn extract_scopes(claims: &MapRepresentation, overrides: &ClaimMapperOverrides) -> Vec<String> {
    let scopes_claim = overrides.scopes_claim.as_deref().unwrap_or("scope");
    if let ClaimValue::StringClaim(s) = ClaimValue::string(claims, scopes_claim) {
        if !s.is_empty() {
            return s.split_whitespace().map(str::to_string).collect();
        }
    }
    extract_list(claims, "scp")
}

fn decode_header(segments: CompactSegments<'_>, json_limits: JsonLimitsConfig) -> Result<RawHeader, SecurityEvent> {
    let bytes = codec::base64_url_decode(segments.header).map_err(|_| SecurityEvent::new(EventType::TokenParseFailed))?;
    let map = decode_bounded(&bytes, json_limits).map_err(SecurityEvent::new)?;
    let alg = map
        .get_str("alg")
        .ok_or_else(|| SecurityEvent::new(EventType::HeaderInvalid))?
        .to_string();
    let kid = map.get_str("kid").map(str::to_string);
    let typ = map.get_str("typ").map(str::to_string);
    if let Some(typ) = &typ {
        if !typ.eq_ignore_ascii_case("JWT") {
            return Err(SecurityEvent::new(EventType::HeaderInvalid));
        }
    }
    Ok(RawHeader { alg, kid, typ })
}

fn parse_algorithm(alg: &str) -> Option<Algorithm> {
    if alg.eq_ignore_ascii_case("none") {
        return None;
    }
    match alg {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        "PS256" => Some(Algorithm::PS256),
        "PS384" => Some(Algorithm::PS384),
        "PS512" => Some(Algorithm::PS512),
        _ => None,
    }
}

fn verify_signature(segments: CompactSegments<'_>, key: &DecodingKey, alg: Algorithm) -> Result<(), SecurityEvent> {
    let signing_input = codec::signing_input(segments);

    let valid = jsonwebtoken::crypto::verify(segments.signature, &signing_input, key, alg)
        .map_err(|_| SecurityEvent::new(EventType::SignatureInvalid))?;

    if valid {
        Ok(())
    } else {
        Err(SecurityEvent::new(EventType::SignatureInvalid))
    }
}

fn check_time_claims(claims: &MapRepresentation, now: SystemTime, skew: ClockSkewConfig) -> Result<(), SecurityEvent> {
    let skew = skew.as_duration();

    if let Some(exp) = ClaimValue::date_time(claims, names::EXP).as_time() {
        if now >= exp + skew {
            return Err(SecurityEvent::new(EventType::TokenExpired));
        }
    }

    if let Some(nbf) = ClaimValue::date_time(claims, names::NBF).as_time() {
        if now + skew < nbf {
            return Err(SecurityEvent::new(EventType::TokenNbfFuture));
        }
    }

    if let Some(iat) = ClaimValue::date_time(claims, names::IAT).as_time() {
        if iat > now + skew {
            return Err(SecurityEvent::new(EventType::TokenIatFuture));
        }
    }

    Ok(())
}

fn check_audience(claims: &MapRepresentation, issuer: &IssuerConfig) -> Result<(), SecurityEvent> {
    if issuer.expected_audiences.is_empty() && issuer.expected_client_id.is_none() {
        return Ok(());
    }

    let aud = ClaimValue::string_list(claims, names::AUD);
    let azp = ClaimValue::string(claims, names::AZP);

    let matches_aud = !issuer.expected_audiences.is_empty()
        && aud
            .as_string_list()
            .is_some_and(|list| list.iter().any(|a| issuer.expected_audiences.iter().any(|e| e == a)));

    let matches_azp = match &issuer.expected_client_id {
        Some(client_id) => azp.as_non_empty_str() == Some(client_id.as_str()),
        None => azp
            .as_non_empty_str()
            .is_some_and(|azp| issuer.expected_audiences.iter().any(|e| e == azp)),
    };

    if matches_aud || matches_azp {
        Ok(())
    } else {
        Err(SecurityEvent::new(EventType::AudienceMismatch))
    }
}
