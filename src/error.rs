//! Crate-wide error types.
//!
//! Two distinct error shapes exist, matching the propagation split in the
//! validation pipeline: [`Error`] covers construction-time / infrastructure
//! failures (fail fast, surfaced to the embedding host); [`crate::events::SecurityEvent`]
//! covers per-token rejection reasons and is never allowed to carry the raw
//! token.

use thiserror::Error;

/// Result type alias for this crate's infrastructure-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide errors.
///
/// These are construction-time or infrastructure failures: a misconfigured
/// issuer, an unreachable JWKS endpoint with no usable cache, malformed
/// key material supplied in-memory. Per-token rejection reasons are
/// [`crate::events::SecurityEvent`], not this type.
#[derive(Error, Debug)]
pub enum Error {
    /// Validator construction failed (duplicate issuer id, issuer/discovery
    /// mismatch, unsupported algorithm configured, unreadable in-memory JWKS).
    #[error("configuration error: {0}")]
    Config(String),

    /// JWKS or discovery document fetch failed with no usable cached
    /// fallback (see [`crate::http::LoadState`]).
    #[error("key material fetch failed: {0}")]
    KeyMaterialFetch(String),

    /// HTTP client construction failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
