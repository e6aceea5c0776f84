//! OIDC discovery document resolution.
//!
//! Resolves `{issuer}/.well-known/openid-configuration` to the document's
//! `issuer` and `jwks_uri` fields, grounded on the teacher's
//! `oauth::metadata::AuthorizationServerMetadata::discover` fetch pattern.

use std::sync::Arc;

use crate::config::JsonLimitsConfig;
use crate::error::{Error, Result};
use crate::http::ETagAwareHttpLoader;
use crate::json::decode_bounded;

/// The fields of an OIDC discovery document this crate cares about.
#[derive(Debug, Clone)]
pub struct DiscoveryDocument {
    /// The `issuer` field, expected to match the configured issuer string.
    pub issuer: String,
    /// The `jwks_uri` field, used to fetch signing keys.
    pub jwks_uri: String,
}

/// Resolves OIDC discovery documents over a shared [`ETagAwareHttpLoader`].
pub struct WellKnownResolver {
    loader: Arc<ETagAwareHttpLoader>,
    json_limits: JsonLimitsConfig,
}

impl WellKnownResolver {
    /// Build a resolver over an existing loader (loaders are shared across
    /// an issuer's discovery and JWKS fetches per the resource-sharing
    /// policy).
    #[must_use]
    pub fn new(loader: Arc<ETagAwareHttpLoader>, json_limits: JsonLimitsConfig) -> Self {
        Self { loader, json_limits }
    }

    /// Fetch and parse the discovery document for `issuer_url`.
    ///
    /// # Errors
    ///
    /// [`Error::KeyMaterialFetch`] if the document can't be fetched;
    /// [`Error::Config`] if it's fetched but missing `issuer`/`jwks_uri`.
    pub async fn resolve(&self, issuer_url: &str) -> Result<DiscoveryDocument> {
        let url = discovery_url(issuer_url);
        let (body, _state) = self.loader.load(&url).await?;

        let map = decode_bounded(&body, self.json_limits)
            .map_err(|_| Error::Config(format!("{url}: discovery document is not valid JSON")))?;

        let issuer = map
            .get_str("issuer")
            .ok_or_else(|| Error::Config(format!("{url}: discovery document missing 'issuer'")))?
            .to_string();
        let jwks_uri = map
            .get_str("jwks_uri")
            .ok_or_else(|| Error::Config(format!("{url}: discovery document missing 'jwks_uri'")))?
            .to_string();

        Ok(DiscoveryDocument { issuer, jwks_uri })
    }
}

fn discovery_url(issuer_url: &str) -> String {
    format!("{}/.well-known/openid-configuration", issuer_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_url_strips_trailing_slash() {
        assert_eq!(
            discovery_url("https://issuer.example.com/"),
            "https://issuer.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            discovery_url("https://issuer.example.com"),
            "https://issuer.example.com/.well-known/openid-configuration"
        );
    }
}
