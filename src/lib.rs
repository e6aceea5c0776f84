//! OAuth 2.0 / OIDC bearer token validator.
//!
//! Validates compact-serialization JWTs — access tokens, ID tokens, and
//! (for issuers that opt in) JWT-formatted refresh tokens — against one or
//! more configured issuers: JWKS fetched directly, resolved via OIDC
//! discovery, or supplied in-memory. A single [`Validator`] is meant to be
//! built once and shared across every concurrent request a host handles.
//!
//! # Scope
//!
//! This crate validates tokens. It does not parse `Authorization` headers,
//! wire into any particular HTTP framework, load configuration from a file
//! or environment, or export metrics — those are the host's job. It also
//! never installs a global `tracing` subscriber; it only emits events.
//!
//! # Example
//!
//! ```no_run
//! use jwt_id_validator::{Config, Validator};
//! use jwt_id_validator::config::{IssuerConfig, KeySource};
//!
//! # async fn run() -> jwt_id_validator::Result<()> {
//! let config = Config {
//!     issuers: vec![IssuerConfig {
//!         id: "acme".to_string(),
//!         issuer: "https://issuer.example.com".to_string(),
//!         key_source: KeySource::Discovery {
//!             issuer_url: "https://issuer.example.com".to_string(),
//!         },
//!         allowed_algorithms: vec!["RS256".to_string()],
//!         expected_audiences: vec!["my-api".to_string()],
//!         ..IssuerConfig::default()
//!     }],
//!     ..Config::default()
//! };
//!
//! let validator = Validator::new(config).await?;
//! match validator.create_access_token("<bearer token>").await {
//!     Ok(validated) => println!("subject: {}", validated.subject()),
//!     Err(event) => println!("rejected: {event}"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod claims;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod http;
pub mod issuer;
pub mod json;
pub mod keys;
pub mod pipeline;
pub mod validator;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventType, SecurityEvent};
pub use pipeline::{AccessTokenContent, IdTokenContent, RefreshTokenContent};
pub use validator::Validator;
