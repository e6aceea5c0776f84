//! Typed claim model.
//!
//! [`ClaimValue`] gives each well-known claim a typed representation
//! (string, string-list, or a timestamp) while still distinguishing
//! "claim absent" from "claim present but empty" — both matter for the
//! validation pipeline's error classification.

use std::time::{Duration, SystemTime};

use crate::json::MapRepresentation;

/// Standard claim names this crate interprets directly (RFC 7519 §4.1).
pub mod names {
    /// Issuer.
    pub const ISS: &str = "iss";
    /// Subject.
    pub const SUB: &str = "sub";
    /// Audience.
    pub const AUD: &str = "aud";
    /// Expiration time.
    pub const EXP: &str = "exp";
    /// Not-before time.
    pub const NBF: &str = "nbf";
    /// Issued-at time.
    pub const IAT: &str = "iat";
    /// Authorized party (OIDC; used when `aud` alone is ambiguous).
    pub const AZP: &str = "azp";
}

/// A claim's typed value, distinguishing absence from an empty or
/// malformed present value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    /// The claim key was not present in the payload at all.
    MissingClaim,
    /// A single string-valued claim.
    StringClaim(String),
    /// A claim that is a JSON array of strings, or a single string
    /// normalized to a one-element list (the `aud` convention).
    StringListClaim(Vec<String>),
    /// A `NumericDate` claim (seconds since the Unix epoch), per RFC 7519 §2.
    DateTimeClaim(SystemTime),
}

impl ClaimValue {
    /// Read a string claim by name.
    #[must_use]
    pub fn string(payload: &MapRepresentation, key: &str) -> Self {
        match payload.get_str(key) {
            Some(s) => Self::StringClaim(s.to_string()),
            None if payload.contains_key(key) => Self::StringClaim(String::new()),
            None => Self::MissingClaim,
        }
    }

    /// Read a string-or-string-list claim by name (e.g. `aud`).
    #[must_use]
    pub fn string_list(payload: &MapRepresentation, key: &str) -> Self {
        match payload.get_string_list(key) {
            Some(list) => Self::StringListClaim(list),
            None if payload.contains_key(key) => Self::StringListClaim(Vec::new()),
            None => Self::MissingClaim,
        }
    }

    /// Read a `NumericDate` claim by name (e.g. `exp`, `nbf`, `iat`).
    #[must_use]
    pub fn date_time(payload: &MapRepresentation, key: &str) -> Self {
        match payload.get_i64(key) {
            Some(seconds) if seconds >= 0 => {
                Self::DateTimeClaim(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds as u64))
            }
            Some(_) | None => {
                if payload.contains_key(key) {
                    // Present but not a valid non-negative NumericDate.
                    Self::StringClaim(String::new())
                } else {
                    Self::MissingClaim
                }
            }
        }
    }

    /// The claim as a non-empty string, or `None` for anything else
    /// (missing, empty, or wrong-shaped).
    #[must_use]
    pub fn as_non_empty_str(&self) -> Option<&str> {
        match self {
            Self::StringClaim(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The claim as a list of strings, or `None` if missing/wrong-shaped.
    #[must_use]
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Self::StringListClaim(list) => Some(list),
            _ => None,
        }
    }

    /// The claim as a timestamp, or `None` if missing/wrong-shaped.
    #[must_use]
    pub fn as_time(&self) -> Option<SystemTime> {
        match self {
            Self::DateTimeClaim(t) => Some(*t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> MapRepresentation {
        let limits = crate::config::JsonLimitsConfig::default();
        crate::json::decode_bounded(value.to_string().as_bytes(), limits).unwrap()
    }

    #[test]
    fn string_claim_distinguishes_missing_from_empty() {
        let p = payload(json!({"sub": ""}));
        assert_eq!(ClaimValue::string(&p, names::SUB), ClaimValue::StringClaim(String::new()));
        assert_eq!(ClaimValue::string(&p, "nope"), ClaimValue::MissingClaim);
    }

    #[test]
    fn aud_normalizes_single_string_to_a_list() {
        let p = payload(json!({"aud": "client-a"}));
        let claim = ClaimValue::string_list(&p, names::AUD);
        assert_eq!(claim.as_string_list(), Some(&["client-a".to_string()][..]));
    }

    #[test]
    fn aud_accepts_array_form() {
        let p = payload(json!({"aud": ["client-a", "client-b"]}));
        let claim = ClaimValue::string_list(&p, names::AUD);
        assert_eq!(
            claim.as_string_list(),
            Some(&["client-a".to_string(), "client-b".to_string()][..])
        );
    }

    #[test]
    fn exp_parses_numeric_date() {
        let p = payload(json!({"exp": 1_700_000_000}));
        let claim = ClaimValue::date_time(&p, names::EXP);
        assert_eq!(
            claim.as_time(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn exp_missing_is_missing_claim() {
        let p = payload(json!({}));
        assert_eq!(ClaimValue::date_time(&p, names::EXP), ClaimValue::MissingClaim);
    }

    #[test]
    fn negative_numeric_date_is_treated_as_malformed() {
        let p = payload(json!({"exp": -5}));
        let claim = ClaimValue::date_time(&p, names::EXP);
        assert_eq!(claim.as_time(), None);
    }
}
