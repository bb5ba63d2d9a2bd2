//! OIDC discovery resolver
//!
//! Fetches `.../.well-known/openid-configuration` once, lazily, through the
//! shared conditional fetcher, and exposes the document's endpoints. Callers
//! arriving before the first load block on it; later callers read the cached
//! document.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use super::fetch::{FetchError, FetchOutcome, HttpFetcher};

/// The subset of an OIDC discovery document this engine consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    /// `issuer` member
    #[serde(default)]
    pub issuer: Option<String>,
    /// `jwks_uri` member
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// `authorization_endpoint` member
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// `token_endpoint` member
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// `userinfo_endpoint` member
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// `end_session_endpoint` member
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Lazily-cached well-known document for one issuer.
#[derive(Debug)]
pub struct WellKnownResolver {
    url: String,
    fetcher: Arc<HttpFetcher>,
    document: OnceCell<DiscoveryDocument>,
}

impl WellKnownResolver {
    /// Create a resolver for a discovery URL.
    #[must_use]
    pub fn new(url: impl Into<String>, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
            document: OnceCell::new(),
        }
    }

    /// The discovery document, fetching it on first use.
    pub async fn document(&self) -> Result<&DiscoveryDocument, FetchError> {
        self.document
            .get_or_try_init(|| async {
                debug!(url = %self.url, "fetching discovery document");
                match self.fetcher.fetch(&self.url).await? {
                    FetchOutcome::Fresh(bytes) => serde_json::from_slice(&bytes)
                        .map_err(|e| FetchError::Parse(e.to_string())),
                    // First load carries no validators, so a 304 means a
                    // non-compliant upstream.
                    FetchOutcome::NotModified => Err(FetchError::Status(304)),
                }
            })
            .await
    }

    /// The document's `jwks_uri`, when present.
    pub async fn jwks_uri(&self) -> Result<Option<String>, FetchError> {
        Ok(self.document().await?.jwks_uri.clone())
    }

    /// The document's `issuer`, when present.
    pub async fn issuer(&self) -> Result<Option<String>, FetchError> {
        Ok(self.document().await?.issuer.clone())
    }
}

/// The conventional discovery URL for an issuer identifier.
#[must_use]
pub fn default_well_known_url(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/openid-configuration")
}
