//! Bounded JSON decoding.
//!
//! JWT headers, payloads, JWKS documents, and discovery documents are all
//! untrusted JSON from the network (or from a caller-supplied string).
//! [`decode_bounded`] enforces the ceilings from [`crate::config::JsonLimitsConfig`]
//! in two stages: a byte-length check before any parsing (catches the
//! common case cheaply), then a structural walk over the parsed
//! [`serde_json::Value`] enforcing string length, array length, and
//! nesting depth. Only after both stages pass does typed field extraction
//! happen, via [`MapRepresentation`].

use serde_json::Value;

use crate::config::JsonLimitsConfig;
use crate::events::EventType;

/// A decoded JSON object with typed, spec-shaped claim accessors.
///
/// Thin wrapper over `serde_json::Map` so callers get `Option`-returning
/// accessors instead of matching on `Value` at every call site.
#[derive(Debug, Clone)]
pub struct MapRepresentation(serde_json::Map<String, Value>);

impl MapRepresentation {
    /// String-valued field, if present and a JSON string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// Integer-valued field (JSON numbers such as `exp`/`nbf`/`iat`), if
    /// present and representable as `i64`.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key)?.as_i64()
    }

    /// A claim that may be a single string or an array of strings (e.g.
    /// `aud`), normalized to a `Vec<String>`.
    #[must_use]
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                strings
            }
            _ => None,
        }
    }

    /// Raw access to the underlying value, for fields with no typed accessor.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` is present at all (distinguishes "missing" from
    /// "present but wrong type" for callers that care).
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Decode `bytes` as a JSON object, enforcing `limits`.
///
/// # Errors
///
/// Returns the [`EventType`] that best classifies the failure:
/// `TokenSizeExceeded` if the raw payload exceeds `max_payload_bytes`,
/// `TokenParseFailed` if the bytes are not valid JSON, not a JSON object,
/// or the structural walk finds a string/array/depth ceiling violation.
pub fn decode_bounded(bytes: &[u8], limits: JsonLimitsConfig) -> Result<MapRepresentation, EventType> {
    if bytes.len() > limits.max_payload_bytes {
        return Err(EventType::TokenSizeExceeded);
    }

    let value: Value = serde_json::from_slice(bytes).map_err(|_| EventType::TokenParseFailed)?;
    check_structure(&value, limits, 0)?;

    match value {
        Value::Object(map) => Ok(MapRepresentation(map)),
        _ => Err(EventType::TokenParseFailed),
    }
}

fn check_structure(value: &Value, limits: JsonLimitsConfig, depth: usize) -> Result<(), EventType> {
    if depth > limits.max_depth {
        return Err(EventType::TokenParseFailed);
    }
    match value {
        Value::String(s) if s.len() > limits.max_string_len => Err(EventType::TokenParseFailed),
        Value::Array(items) => {
            if items.len() > limits.max_array_len {
                return Err(EventType::TokenParseFailed);
            }
            items.iter().try_for_each(|item| check_structure(item, limits, depth + 1))
        }
        Value::Object(map) => map
            .values()
            .try_for_each(|item| check_structure(item, limits, depth + 1)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> JsonLimitsConfig {
        JsonLimitsConfig {
            max_payload_bytes: 1024,
            max_string_len: 64,
            max_array_len: 8,
            max_depth: 4,
        }
    }

    #[test]
    fn decodes_a_well_formed_object() {
        let json = br#"{"sub": "alice", "aud": ["a", "b"], "exp": 123}"#;
        let map = decode_bounded(json, limits()).unwrap();
        assert_eq!(map.get_str("sub"), Some("alice"));
        assert_eq!(map.get_i64("exp"), Some(123));
        assert_eq!(map.get_string_list("aud"), Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn rejects_oversized_payload_before_parsing() {
        let huge = vec![b' '; 2048];
        assert_eq!(decode_bounded(&huge, limits()), Err(EventType::TokenSizeExceeded));
    }

    #[test]
    fn rejects_invalid_json() {
        assert_eq!(decode_bounded(b"not json", limits()), Err(EventType::TokenParseFailed));
    }

    #[test]
    fn rejects_non_object_top_level() {
        assert_eq!(decode_bounded(b"[1,2,3]", limits()), Err(EventType::TokenParseFailed));
    }

    #[test]
    fn rejects_string_exceeding_max_length() {
        let long_value = "a".repeat(100);
        let json = format!(r#"{{"sub": "{long_value}"}}"#);
        assert_eq!(decode_bounded(json.as_bytes(), limits()), Err(EventType::TokenParseFailed));
    }

    #[test]
    fn rejects_array_exceeding_max_length() {
        let json = r#"{"aud": ["a","b","c","d","e","f","g","h","i"]}"#;
        assert_eq!(decode_bounded(json.as_bytes(), limits()), Err(EventType::TokenParseFailed));
    }

    #[test]
    fn rejects_excessive_nesting_depth() {
        let json = r#"{"a": {"b": {"c": {"d": {"e": 1}}}}}"#;
        assert_eq!(decode_bounded(json.as_bytes(), limits()), Err(EventType::TokenParseFailed));
    }

    #[test]
    fn string_list_rejects_mixed_type_arrays() {
        let json = r#"{"aud": ["a", 1]}"#;
        let map = decode_bounded(json.as_bytes(), limits()).unwrap();
        assert_eq!(map.get_string_list("aud"), None);
    }
}
