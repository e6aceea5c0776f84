//! Signing key material: JWK parsing and signature verification.
//!
//! Parsing is delegated to `jsonwebtoken::jwk` wherever possible — this
//! crate does not reimplement RSA/EC key decoding. What it adds on top is
//! the `(kid, alg)` lookup keying scheme from the validation pipeline and a
//! base64url charset pre-check, since `jsonwebtoken` will happily attempt
//! to decode a key field that was never valid base64url and produce a
//! confusing low-level error instead of a clean rejection.

use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::DecodingKey;

use crate::events::EventType;

/// One usable signing key: the algorithm it verifies and its decoding key,
/// plus the `kid` it was published under (JWKS entries without a `kid`
/// match any `kid` the token presents, per RFC 7517 §4.5).
pub struct KeyEntry {
    /// Key id, if the JWK declared one.
    pub kid: Option<String>,
    /// Algorithm this key verifies.
    pub alg: Algorithm,
    /// The verification key itself.
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// An issuer's complete set of currently-published signing keys.
#[derive(Debug, Default)]
pub struct KeySet {
    entries: Vec<KeyEntry>,
}

impl KeySet {
    /// Find a key matching `kid` (if given) and `alg`.
    ///
    /// A token with no `kid` matches any key whose `alg` matches, provided
    /// the set is unambiguous for that algorithm (more than one candidate
    /// is treated as no match — we must not guess which key signed it).
    #[must_use]
    pub fn find(&self, kid: Option<&str>, alg: Algorithm) -> Option<&KeyEntry> {
        match kid {
            Some(kid) => self
                .entries
                .iter()
                .find(|entry| entry.alg == alg && entry.kid.as_deref() == Some(kid)),
            None => {
                let mut candidates = self.entries.iter().filter(|entry| entry.alg == alg);
                let first = candidates.next()?;
                if candidates.next().is_some() {
                    None
                } else {
                    Some(first)
                }
            }
        }
    }

    /// Number of usable keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no usable keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a raw JWKS document into a [`KeySet`].
///
/// # Errors
///
/// `JwksJsonParseFailed` if the bytes are not a valid JWK set, or every
/// key field fails the base64url charset check.
pub fn parse_jwks(bytes: &[u8]) -> Result<KeySet, EventType> {
    let jwk_set: JwkSet = serde_json::from_slice(bytes).map_err(|_| EventType::JwksJsonParseFailed)?;

    let mut entries = Vec::new();
    for jwk in &jwk_set.keys {
        let Some((alg, decoding_key)) = decoding_key_for(jwk) else {
            continue;
        };
        entries.push(KeyEntry {
            kid: jwk.common.key_id.clone(),
            alg,
            decoding_key,
        });
    }

    Ok(KeySet { entries })
}

/// Picks the verification algorithm and decoding key for one JWK.
///
/// RSA keys use the JWK's own declared `alg` (`common.key_algorithm`),
/// defaulting to RS256 only when the JWK omits it; EC keys have no `alg`
/// field in practice, so the algorithm is derived from the curve, per
/// RFC 7518 §3.4. `jsonwebtoken::Algorithm` has no ES512 variant, so a
/// P-521 key is treated as unusable rather than silently downgraded.
fn decoding_key_for(jwk: &Jwk) -> Option<(Algorithm, DecodingKey)> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            if !is_base64url(&rsa.n) || !is_base64url(&rsa.e) {
                return None;
            }
            let alg = match jwk.common.key_algorithm {
                None | Some(KeyAlgorithm::RS256) => Algorithm::RS256,
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                Some(_) => return None,
            };
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?;
            Some((alg, key))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            if !is_base64url(&ec.x) || !is_base64url(&ec.y) {
                return None;
            }
            let alg = match ec.curve {
                EllipticCurve::P256 => Algorithm::ES256,
                EllipticCurve::P384 => Algorithm::ES384,
                // No Algorithm::ES512 exists in jsonwebtoken 10.3; a P-521
                // key can't be represented and is treated as unusable.
                EllipticCurve::P521 => return None,
            };
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y).ok()?;
            Some((alg, key))
        }
        AlgorithmParameters::OctetKeyPair(_) | AlgorithmParameters::OctetKey(_) => None,
    }
}

/// RFC 4648 §5 base64url alphabet check (`^[A-Za-z0-9_-]*=*$`), run before
/// handing a key field to `jsonwebtoken` so a malformed JWK fails with a
/// clean classification rather than a low-level decode error.
fn is_base64url(s: &str) -> bool {
    let mut chars = s.chars();
    let body_end = chars
        .clone()
        .position(|c| c == '=')
        .unwrap_or(s.len());
    let (body, padding) = s.split_at(body_end);
    body.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && padding.chars().all(|c| c == '=')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    #[test]
    fn parses_a_well_formed_rsa_jwks() {
        let set = parse_jwks(TEST_JWKS.as_bytes()).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.find(Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"), Algorithm::RS256).is_some());
    }

    #[test]
    fn find_rejects_unknown_kid() {
        let set = parse_jwks(TEST_JWKS.as_bytes()).unwrap();
        assert!(set.find(Some("no-such-kid"), Algorithm::RS256).is_none());
    }

    #[test]
    fn find_rejects_mismatched_algorithm() {
        let set = parse_jwks(TEST_JWKS.as_bytes()).unwrap();
        assert!(set.find(Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"), Algorithm::RS384).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert_eq!(parse_jwks(b"not json"), Err(EventType::JwksJsonParseFailed));
    }

    #[test]
    fn base64url_charset_check_rejects_standard_base64_padding_mid_string() {
        assert!(is_base64url("AAAA"));
        assert!(is_base64url("AA=="));
        assert!(!is_base64url("AA+/"));
        assert!(!is_base64url("A=A="));
    }

    #[test]
    fn empty_jwks_document_parses_to_empty_set() {
        let set = parse_jwks(br#"{"keys": []}"#).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn rsa_key_alg_is_taken_from_the_jwk_not_hardcoded() {
        let json = TEST_JWKS.replace("\"RS256\"", "\"RS384\"");
        let set = parse_jwks(json.as_bytes()).unwrap();
        assert!(set.find(Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"), Algorithm::RS384).is_some());
        assert!(set.find(Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"), Algorithm::RS256).is_none());
    }

    #[test]
    fn rsa_key_without_declared_alg_defaults_to_rs256() {
        let json = TEST_JWKS.replace("\"alg\": \"RS256\",\n      ", "");
        let set = parse_jwks(json.as_bytes()).unwrap();
        assert!(set.find(Some("a87fcc83-e46d-4875-a711-0bd8b745a21c"), Algorithm::RS256).is_some());
    }

    #[test]
    fn ec_key_alg_is_derived_from_the_curve() {
        let jwk = serde_json::json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-384",
                "kid": "ec-key-1",
                "x": "AAAA",
                "y": "AAAA",
            }]
        });
        let set = parse_jwks(jwk.to_string().as_bytes()).unwrap();
        assert!(set.find(Some("ec-key-1"), Algorithm::ES384).is_some());
        assert!(set.find(Some("ec-key-1"), Algorithm::ES256).is_none());
    }

    #[test]
    fn p521_ec_key_has_no_representable_algorithm_and_is_skipped() {
        let jwk = serde_json::json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-521",
                "kid": "ec-key-2",
                "x": "AAAA",
                "y": "AAAA",
            }]
        });
        let set = parse_jwks(jwk.to_string().as_bytes()).unwrap();
        assert!(set.is_empty());
    }
}
