//! Access-token result cache
//!
//! Caches successful core validations (decode → signature → claims) keyed by
//! the SHA-256 fingerprint of the raw token, never the token itself.
//! Concurrent validations of one fingerprint coalesce into a single build;
//! failures are never cached. Entries expire at `exp - skew` or at the
//! configured TTL, whichever comes first. DPoP is deliberately outside this
//! cache: proofs are per-request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::Expiry;
use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::content::AccessTokenContent;
use crate::error::ValidationError;

/// Cache key: cryptographic fingerprint of the raw token string.
pub(crate) type Fingerprint = [u8; 32];

/// Fingerprint a raw token for cache keying.
pub(crate) fn fingerprint(raw: &str) -> Fingerprint {
    Sha256::digest(raw.as_bytes()).into()
}

#[derive(Debug, Clone)]
struct CachedToken {
    content: AccessTokenContent,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<Fingerprint, CachedToken> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CachedToken,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Coalescing, bounded, TTL-aware result cache.
pub(crate) struct TokenCache {
    inner: Option<Cache<Fingerprint, CachedToken>>,
}

impl TokenCache {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        let inner = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.capacity)
                .expire_after(PerEntryTtl)
                .build()
        });
        Self { inner }
    }

    /// Return the cached content for `key`, or run `build` — once across all
    /// concurrent callers — and cache its success.
    ///
    /// `build` yields the content plus the entry lifetime (already clamped to
    /// `exp - skew` by the caller); the lifetime is capped at the configured
    /// cache TTL on the way in. Errors propagate to every coalesced waiter
    /// and leave no cache entry behind.
    pub(crate) async fn get_or_build<F>(
        &self,
        key: Fingerprint,
        max_ttl: Duration,
        build: F,
    ) -> Result<AccessTokenContent, ValidationError>
    where
        F: Future<Output = Result<(AccessTokenContent, Duration), ValidationError>>,
    {
        let Some(cache) = &self.inner else {
            return build.await.map(|(content, _)| content);
        };
        let entry = cache
            .try_get_with(key, async move {
                let (content, lifetime) = build.await?;
                Ok(CachedToken {
                    content,
                    ttl: lifetime.min(max_ttl),
                })
            })
            .await
            .map_err(|err: Arc<ValidationError>| (*err).clone())?;
        Ok(entry.content)
    }
}
