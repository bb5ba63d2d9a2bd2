//! Conditional, retrying HTTP fetcher
//!
//! The composed adapter the JWKS loader and well-known resolver share: an
//! ETag/Last-Modified-aware conditional GET wrapped in exponential-backoff
//! retries with jitter. Validators are cached per URI; nothing else keys the
//! cache (the endpoints are public documents).

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{HttpClientConfig, RetryConfig};

/// Outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 200 with a (size-checked) body
    Fresh(Vec<u8>),
    /// 304 — the cached representation is still current
    NotModified,
}

/// Failure of a fetch after retries are exhausted.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, TLS, timeout, or protocol failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected HTTP status
    #[error("unexpected status {0}")]
    Status(u16),

    /// Response body over the configured limit
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit
        limit: usize,
    },

    /// A fetched document failed to parse
    #[error("document parse error: {0}")]
    Parse(String),

    /// The reqwest client could not be built
    #[error("http client construction failed: {0}")]
    Client(String),
}

impl FetchError {
    /// Transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::BodyTooLarge { .. } | Self::Parse(_) | Self::Client(_) => false,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
}

/// ETag-aware HTTP fetcher with a retry envelope.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
    max_body: usize,
    validators: DashMap<String, Validators>,
}

impl HttpFetcher {
    /// Build a fetcher from the issuer's HTTP and retry settings.
    pub fn new(http: &HttpClientConfig, retry: &RetryConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(http.connect_timeout)
            .timeout(http.read_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .https_only(http.https_only)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            retry: retry.clone(),
            max_body: http.max_response_bytes,
            validators: DashMap::new(),
        })
    }

    /// Conditionally GET `url`, retrying transient failures per the policy.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        if !self.retry.enabled || self.retry.max_attempts <= 1 {
            return self.fetch_once(url).await;
        }

        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.initial_delay)
            .with_max_delay(self.retry.max_delay)
            .with_factor(self.retry.multiplier)
            .with_max_times(self.retry.max_attempts.saturating_sub(1) as usize);
        if self.retry.jitter {
            backoff = backoff.with_jitter();
        }

        (|| self.fetch_once(url))
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, delay: Duration| {
                debug!(url, %err, delay_ms = delay.as_millis(), "retrying fetch after backoff");
            })
            .await
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(url);
        if let Some(validators) = self.validators.get(url) {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "document not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "unexpected upstream status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let validators = Validators {
            etag,
            last_modified,
        };

        if let Some(length) = response.content_length() {
            if length > self.max_body as u64 {
                return Err(FetchError::BodyTooLarge {
                    limit: self.max_body,
                });
            }
        }
        let body = response.bytes().await?;
        if body.len() > self.max_body {
            return Err(FetchError::BodyTooLarge {
                limit: self.max_body,
            });
        }

        self.validators.insert(url.to_string(), validators);
        Ok(FetchOutcome::Fresh(body.to_vec()))
    }
}
