//! Compact-serialization codec primitives.
//!
//! Pure functions only: splitting a JWS compact serialization into its
//! three segments, base64url decode, reconstructing the signing input, and
//! a constant-time byte comparison. Nothing here touches a key or a clock.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use subtle::ConstantTimeEq;

/// The three base64url segments of a JWS compact serialization.
#[derive(Debug, Clone, Copy)]
pub struct CompactSegments<'a> {
    /// Encoded header (JSON object).
    pub header: &'a str,
    /// Encoded payload (JSON object).
    pub payload: &'a str,
    /// Encoded signature.
    pub signature: &'a str,
}

/// Split `token` into its three dot-separated segments.
///
/// Returns `None` if `token` does not contain exactly two `.` separators.
/// An empty segment is not rejected here — that is a decode-time concern.
#[must_use]
pub fn split(token: &str) -> Option<CompactSegments<'_>> {
    let mut parts = token.split('.');
    let header = parts.next()?;
    let payload = parts.next()?;
    let signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(CompactSegments {
        header,
        payload,
        signature,
    })
}

/// Decode a base64url (no padding) segment to raw bytes.
///
/// # Errors
///
/// Returns the underlying `base64` decode error on malformed input.
pub fn base64_url_decode(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment)
}

/// Encode raw bytes as base64url (no padding).
#[must_use]
pub fn base64_url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Reconstruct the exact bytes that were signed: `"{header}.{payload}"` as
/// ASCII, per RFC 7515 §5.1.
#[must_use]
pub fn signing_input(segments: CompactSegments<'_>) -> Vec<u8> {
    let mut input = Vec::with_capacity(segments.header.len() + segments.payload.len() + 1);
    input.extend_from_slice(segments.header.as_bytes());
    input.push(b'.');
    input.extend_from_slice(segments.payload.as_bytes());
    input
}

/// Constant-time equality check, for comparisons on the validation path
/// that must not leak timing information (e.g. comparing a presented
/// value against a cached fingerprint).
#[must_use]
pub fn constant_time_equals(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
