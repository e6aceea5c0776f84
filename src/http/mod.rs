//! Conditional-GET HTTP loader with retry and single-flight coalescing.
//!
//! Grounded on the teacher's `key_server::store::spawn_reaper` concurrency
//! shape (a `DashMap`-backed store with a lock per coalesced key) and its
//! `oauth::metadata` discovery-fetch pattern, generalized here into a
//! reusable loader for both JWKS and OIDC discovery documents.

pub mod retry;

use std::sync::Arc;
use std::time::Instant;

use backon::Retryable;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{HttpConfig, RetryConfig};
use crate::error::{Error, Result};

/// Outcome classification of a single [`ETagAwareHttpLoader::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// A `200 OK` response was fetched and is new (no prior cached copy).
    Fresh,
    /// A `304 Not Modified` response confirmed the cached copy is current.
    Cached,
    /// The fetch failed, but a usable cached copy (past its freshness
    /// window) was returned instead.
    Stale,
    /// The fetch succeeded with a `200 OK` after a prior attempt had
    /// fallen back to a stale cached copy.
    Recovered,
}

struct CachedDocument {
    etag: Option<String>,
    body: Vec<u8>,
    fetched_at: Instant,
    was_stale: bool,
}

/// Fetches a document (JWKS, discovery) over HTTP, caching the response
/// body keyed by ETag and retrying transient failures with backoff before
/// falling back to a stale cached copy.
pub struct ETagAwareHttpLoader {
    client: reqwest::Client,
    retry: RetryConfig,
    cache: DashMap<String, CachedDocument>,
    inflight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ETagAwareHttpLoader {
    /// Build a loader with its own `reqwest::Client`, configured per `http`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the client cannot be constructed (bad
    /// timeout configuration, TLS backend init failure).
    pub fn new(http: &HttpConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.request_timeout)
            .connect_timeout(http.connect_timeout)
            .user_agent(http.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            retry,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        })
    }

    /// Load the document at `url`, using the ETag cache and retrying
    /// transient failures before falling back to a stale cached copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterialFetch`] if every retry attempt fails and
    /// there is no cached copy to fall back to.
    pub async fn load(&self, url: &str) -> Result<(Vec<u8>, LoadState)> {
        let lock = self
            .inflight
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let prior_etag = self.cache.get(url).and_then(|entry| entry.etag.clone());
        let was_previously_stale = self.cache.get(url).is_some_and(|entry| entry.was_stale);

        let fetch = || async { self.fetch_once(url, prior_etag.as_deref()).await };

        match fetch.retry(retry::strategy(self.retry)).when(is_retryable).await {
            Ok(Outcome::NotModified) => {
                let body = self
                    .cache
                    .get(url)
                    .map(|entry| entry.body.clone())
                    .ok_or_else(|| Error::KeyMaterialFetch(format!("{url}: 304 with no cached body")))?;
                Ok((body, LoadState::Cached))
            }
            Ok(Outcome::Fetched { body, etag }) => {
                self.cache.insert(
                    url.to_string(),
                    CachedDocument {
                        etag,
                        body: body.clone(),
                        fetched_at: Instant::now(),
                        was_stale: false,
                    },
                );
                let state = if was_previously_stale { LoadState::Recovered } else { LoadState::Fresh };
                Ok((body, state))
            }
            Err(err) => {
                if let Some(mut entry) = self.cache.get_mut(url) {
                    tracing::warn!(url, error = %err, "fetch failed, serving stale cached copy");
                    entry.was_stale = true;
                    Ok((entry.body.clone(), LoadState::Stale))
                } else {
                    Err(Error::KeyMaterialFetch(format!("{url}: {err}")))
                }
            }
        }
    }

    /// Age of the currently cached entry for `url`, if any.
    #[must_use]
    pub fn cache_age(&self, url: &str) -> Option<std::time::Duration> {
        self.cache.get(url).map(|entry| entry.fetched_at.elapsed())
    }

    async fn fetch_once(&self, url: &str, etag: Option<&str>) -> std::result::Result<Outcome, FetchError> {
        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await.map_err(FetchError::Transport)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(Outcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(FetchError::Transport)?.to_vec();
        Ok(Outcome::Fetched { body, etag })
    }
}

enum Outcome {
    NotModified,
    Fetched { body: Vec<u8>, etag: Option<String> },
}

/// A single fetch attempt's failure, classified for the retry predicate:
/// a non-retryable `4xx` (bad request, not found, misconfigured auth) is
/// never worth retrying, while a transport failure or `5xx` might clear
/// up on its own.
#[derive(Debug)]
enum FetchError {
    Transport(reqwest::Error),
    Status(StatusCode),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Status(status) => write!(f, "unexpected status {status}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Only retry transport failures and server errors. A `4xx` status means
/// the request itself is wrong (or the server permanently refuses it) —
/// retrying with the same request and credentials cannot succeed.
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Transport(_) => true,
        FetchError::Status(status) => status.is_server_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    async fn spawn_server(responses: Vec<(u16, Option<&'static str>, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, etag, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let etag_header = etag.map(|e| format!("ETag: {e}\r\n")).unwrap_or_default();
                let reason = if status == 304 { "Not Modified" } else { "OK" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\n{etag_header}Content-Length: {}\r\n\r\n{body}",
                    body.len()
                );
                let _: Result<(), Infallible> = Ok(());
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fresh_fetch_is_cached_and_classified_fresh() {
        let base = spawn_server(vec![(200, Some("\"v1\""), r#"{"keys":[]}"#)]).await;
        let loader = ETagAwareHttpLoader::new(&HttpConfig::default(), RetryConfig::default()).unwrap();
        let (body, state) = loader.load(&base).await.unwrap();
        assert_eq!(state, LoadState::Fresh);
        assert_eq!(body, br#"{"keys":[]}"#);
    }

    #[tokio::test]
    async fn not_found_is_fetched_once_and_not_retried() {
        let base = spawn_server(vec![(404, None, "")]).await;
        let mut retry = RetryConfig::default();
        retry.max_attempts = 3;
        let loader = ETagAwareHttpLoader::new(&HttpConfig::default(), retry).unwrap();
        let result = loader.load(&base).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn server_error_is_retried_then_recovers() {
        let base = spawn_server(vec![(503, None, ""), (200, Some("\"v1\""), r#"{"keys":[]}"#)]).await;
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let loader = ETagAwareHttpLoader::new(&HttpConfig::default(), retry).unwrap();
        let (body, state) = loader.load(&base).await.unwrap();
        assert_eq!(state, LoadState::Fresh);
        assert_eq!(body, br#"{"keys":[]}"#);
    }

    #[tokio::test]
    async fn not_modified_returns_cached_body() {
        let base = spawn_server(vec![
            (200, Some("\"v1\""), r#"{"keys":[]}"#),
            (304, None, ""),
        ])
        .await;
        let loader = ETagAwareHttpLoader::new(&HttpConfig::default(), RetryConfig::default()).unwrap();
        let (_, first_state) = loader.load(&base).await.unwrap();
        assert_eq!(first_state, LoadState::Fresh);
        let (body, state) = loader.load(&base).await.unwrap();
        assert_eq!(state, LoadState::Cached);
        assert_eq!(body, br#"{"keys":[]}"#);
    }
}
