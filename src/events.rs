//! Security event taxonomy and the process-wide rejection counter.
//!
//! Every validation-path failure maps to exactly one [`EventType`] and
//! increments exactly one counter in [`SecurityEventCounter`]. The counter
//! is a struct of named `AtomicU64` fields rather than a map: the event set
//! is closed and known at compile time, so `increment` is a single atomic
//! add with no hash lookup or bucket lock on the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Exhaustive rejection-reason taxonomy (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Raw token exceeded `maxTokenBytes`.
    TokenSizeExceeded,
    /// Compact serialization did not split into three segments, or a
    /// segment failed to base64url-decode / JSON-parse.
    TokenParseFailed,
    /// Header present but structurally invalid (bad `typ`, missing `alg`).
    HeaderInvalid,
    /// `alg` is `"none"`, or not on the issuer's algorithm allow-list.
    AlgorithmNotAllowed,
    /// A key was found for the `(kid, alg)` pair but `alg` is not on the
    /// issuer's allow-list.
    KeyAlgorithmNotAllowed,
    /// No `KeyEntry` matched `(kid, alg)` after a refresh attempt.
    KeyNotFound,
    /// `iss` claim missing or empty.
    IssuerMissing,
    /// `iss` claim did not match any registered issuer.
    IssuerUnknown,
    /// Signature verification failed.
    SignatureInvalid,
    /// `now >= exp + skew`.
    TokenExpired,
    /// `now + skew < nbf`.
    TokenNbfFuture,
    /// `iat > now + skew`.
    TokenIatFuture,
    /// `aud`/`azp` did not intersect the issuer's expected audience/client id.
    AudienceMismatch,
    /// `sub` claim missing or empty.
    SubjectMissing,
    /// JWKS fetch exhausted retries with no usable cached keyset.
    JwksFetchFailed,
    /// JWKS document fetched but failed to parse as JSON / JWK set.
    JwksJsonParseFailed,
    /// OIDC discovery document fetch exhausted retries with no usable cache.
    WellKnownFetchFailed,
}

impl EventType {
    /// Short, non-sensitive message suitable for logs and error payloads.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::TokenSizeExceeded => "token exceeds maximum size",
            Self::TokenParseFailed => "token could not be parsed",
            Self::HeaderInvalid => "token header is invalid",
            Self::AlgorithmNotAllowed => "algorithm is not allowed",
            Self::KeyAlgorithmNotAllowed => "key algorithm is not allowed for this issuer",
            Self::KeyNotFound => "no matching signing key was found",
            Self::IssuerMissing => "issuer claim is missing",
            Self::IssuerUnknown => "issuer is not registered",
            Self::SignatureInvalid => "signature verification failed",
            Self::TokenExpired => "token has expired",
            Self::TokenNbfFuture => "token is not yet valid",
            Self::TokenIatFuture => "token issued-at is in the future",
            Self::AudienceMismatch => "audience does not match",
            Self::SubjectMissing => "subject claim is missing",
            Self::JwksFetchFailed => "key material could not be fetched",
            Self::JwksJsonParseFailed => "key material is not valid JSON",
            Self::WellKnownFetchFailed => "discovery document could not be fetched",
        }
    }
}

/// A single rejection, carrying its classification and a non-sensitive
/// message. Never carries the raw token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityEvent {
    /// The classified rejection reason.
    pub event_type: EventType,
    /// Short, non-sensitive message.
    pub message: &'static str,
}

impl SecurityEvent {
    /// Construct a security event from an [`EventType`], using its canonical message.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            message: event_type.message(),
        }
    }
}

impl std::fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.event_type, self.message)
    }
}

impl std::error::Error for SecurityEvent {}

/// Process-wide tally of classified security events.
///
/// `increment` is lock-free (a plain atomic add). [`Self::snapshot`] returns
/// a point-in-time copy for observability; there is no runtime reset.
#[derive(Debug, Default)]
pub struct SecurityEventCounter {
    token_size_exceeded: AtomicU64,
    token_parse_failed: AtomicU64,
    header_invalid: AtomicU64,
    algorithm_not_allowed: AtomicU64,
    key_algorithm_not_allowed: AtomicU64,
    key_not_found: AtomicU64,
    issuer_missing: AtomicU64,
    issuer_unknown: AtomicU64,
    signature_invalid: AtomicU64,
    token_expired: AtomicU64,
    token_nbf_future: AtomicU64,
    token_iat_future: AtomicU64,
    audience_mismatch: AtomicU64,
    subject_missing: AtomicU64,
    jwks_fetch_failed: AtomicU64,
    jwks_json_parse_failed: AtomicU64,
    well_known_fetch_failed: AtomicU64,
}

impl SecurityEventCounter {
    /// Create a counter with every count at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn field(&self, event_type: EventType) -> &AtomicU64 {
        match event_type {
            EventType::TokenSizeExceeded => &self.token_size_exceeded,
            EventType::TokenParseFailed => &self.token_parse_failed,
            EventType::HeaderInvalid => &self.header_invalid,
            EventType::AlgorithmNotAllowed => &self.algorithm_not_allowed,
            EventType::KeyAlgorithmNotAllowed => &self.key_algorithm_not_allowed,
            EventType::KeyNotFound => &self.key_not_found,
            EventType::IssuerMissing => &self.issuer_missing,
            EventType::IssuerUnknown => &self.issuer_unknown,
            EventType::SignatureInvalid => &self.signature_invalid,
            EventType::TokenExpired => &self.token_expired,
            EventType::TokenNbfFuture => &self.token_nbf_future,
            EventType::TokenIatFuture => &self.token_iat_future,
            EventType::AudienceMismatch => &self.audience_mismatch,
            EventType::SubjectMissing => &self.subject_missing,
            EventType::JwksFetchFailed => &self.jwks_fetch_failed,
            EventType::JwksJsonParseFailed => &self.jwks_json_parse_failed,
            EventType::WellKnownFetchFailed => &self.well_known_fetch_failed,
        }
    }

    /// Increment the counter for `event_type` and log a WARN with its identifier.
    pub fn increment(&self, event_type: EventType) {
        self.field(event_type).fetch_add(1, Ordering::Relaxed);
        tracing::warn!(event = ?event_type, "token rejected");
    }

    /// Read-only snapshot of every counter, keyed by [`EventType`].
    #[must_use]
    pub fn snapshot(&self) -> std::collections::HashMap<EventType, u64> {
        EventType::ALL
            .iter()
            .map(|&ty| (ty, self.field(ty).load(Ordering::Relaxed)))
            .collect()
    }
}

impl EventType {
    /// Every variant, for iteration (snapshotting).
    pub const ALL: [EventType; 17] = [
        EventType::TokenSizeExceeded,
        EventType::TokenParseFailed,
        EventType::HeaderInvalid,
        EventType::AlgorithmNotAllowed,
        EventType::KeyAlgorithmNotAllowed,
        EventType::KeyNotFound,
        EventType::IssuerMissing,
        EventType::IssuerUnknown,
        EventType::SignatureInvalid,
        EventType::TokenExpired,
        EventType::TokenNbfFuture,
        EventType::TokenIatFuture,
        EventType::AudienceMismatch,
        EventType::SubjectMissing,
        EventType::JwksFetchFailed,
        EventType::JwksJsonParseFailed,
        EventType::WellKnownFetchFailed,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_only_affects_targeted_counter() {
        let counter = SecurityEventCounter::new();
        counter.increment(EventType::TokenExpired);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot[&EventType::TokenExpired], 1);
        for &ty in &EventType::ALL {
            if ty != EventType::TokenExpired {
                assert_eq!(snapshot[&ty], 0, "{ty:?} should not have moved");
            }
        }
    }

    #[test]
    fn increment_is_monotonic() {
        let counter = SecurityEventCounter::new();
        for _ in 0..5 {
            counter.increment(EventType::SignatureInvalid);
        }
        assert_eq!(counter.snapshot()[&EventType::SignatureInvalid], 5);
    }

    #[test]
    fn security_event_carries_no_token_field() {
        let event = SecurityEvent::new(EventType::AudienceMismatch);
        assert_eq!(event.event_type, EventType::AudienceMismatch);
        assert_eq!(event.message, "audience does not match");
    }
}
