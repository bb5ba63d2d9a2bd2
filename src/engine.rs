//! The validation engine façade
//!
//! Composition root: owns the issuer registry, the mapper registry, the
//! access-token cache, the DPoP replay store and the security event counter,
//! and exposes the three validation entry points.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use tracing::debug;

use crate::cache::{TokenCache, fingerprint};
use crate::config::{DpopConfig, EngineConfig, ParserConfig};
use crate::content::{AccessTokenContent, IdentityTokenContent, RefreshTokenContent};
use crate::decoder::decode_compact;
use crate::dpop::{self, ReplayGuard};
use crate::error::{EngineError, ValidationError, redact};
use crate::events::{EventsSnapshot, SecurityEventCounter};
use crate::mapper::{ClaimMapper, MapperRegistry};
use crate::registry::{IssuerRegistry, IssuerStatus};
use crate::validator;

/// A thread-safe OAuth 2.0 / OIDC token validation engine.
///
/// Construct once with [`Engine::new`] and share behind an `Arc`; any number
/// of tasks may validate concurrently. Construction must happen inside a
/// Tokio runtime: HTTP-backed key loaders start their initial load
/// immediately and the replay store spawns its sweeper.
pub struct Engine {
    registry: IssuerRegistry,
    mappers: MapperRegistry,
    replay: ReplayGuard,
    cache: TokenCache,
    cache_ttl: Duration,
    events: Arc<SecurityEventCounter>,
    parser: ParserConfig,
}

impl Engine {
    /// Build the engine from an owned configuration.
    ///
    /// # Errors
    ///
    /// [`EngineError`] for invalid configuration: duplicate enabled mappers,
    /// duplicate or anonymous issuers, unparseable inline or file JWKS
    /// documents, or an unbuildable HTTP client.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let events = Arc::new(SecurityEventCounter::new());
        let mappers = MapperRegistry::new(if config.mappers.is_empty() {
            ClaimMapper::defaults()
        } else {
            config.mappers
        })?;

        // The replay store is global (a jti is globally unique per RFC 9449),
        // sized to the most generous issuer.
        let defaults = DpopConfig::default();
        let (replay_size, replay_ttl) = config
            .issuers
            .iter()
            .filter(|issuer| issuer.enabled)
            .filter_map(|issuer| issuer.dpop.as_ref())
            .fold(
                (defaults.replay_cache_size, defaults.replay_ttl),
                |(size, ttl), dpop| (size.max(dpop.replay_cache_size), ttl.max(dpop.replay_ttl)),
            );

        let registry = IssuerRegistry::new(config.issuers, &events)?;

        Ok(Self {
            registry,
            mappers,
            replay: ReplayGuard::new(replay_size, replay_ttl),
            cache: TokenCache::new(&config.cache),
            cache_ttl: config.cache.ttl,
            events,
            parser: config.parser,
        })
    }

    /// Validate an access token against the issuer named by its `iss` claim.
    ///
    /// `headers` is the incoming request's header map; it is only consulted
    /// for the `DPoP` proof. Results are cached per token fingerprint; DPoP
    /// proofs are validated on every request, cached or not.
    pub async fn validate_access_token(
        &self,
        raw: &str,
        headers: &HeaderMap,
    ) -> Result<AccessTokenContent, ValidationError> {
        let outcome = self.access_inner(raw, headers).await;
        if let Err(err) = &outcome {
            self.events.record(err.event_kind());
            debug!(error = %err, "access token rejected");
        }
        outcome
    }

    async fn access_inner(
        &self,
        raw: &str,
        headers: &HeaderMap,
    ) -> Result<AccessTokenContent, ValidationError> {
        let now = Utc::now().timestamp();
        let key = fingerprint(raw);

        let content = self
            .cache
            .get_or_build(key, self.cache_ttl, self.build_access(raw, now))
            .await?;

        // Per-request sender-constraint check, after hit or build alike.
        let handle = self
            .registry
            .resolve(&content.issuer)
            .ok_or_else(|| ValidationError::UnknownIssuer(redact(&content.issuer)))?;
        dpop::validate_proof(
            &handle.config,
            headers,
            content.confirmation_thumbprint.as_deref(),
            raw,
            &self.replay,
            &self.parser,
            now,
        )?;

        Ok(content)
    }

    /// The full core pipeline for a cache miss. Returns the content plus the
    /// cache lifetime, clamped so no entry outlives `exp - skew`.
    async fn build_access(
        &self,
        raw: &str,
        now: i64,
    ) -> Result<(AccessTokenContent, Duration), ValidationError> {
        let decoded = decode_compact(raw, &self.parser)?;
        let issuer = decoded
            .claim_str("iss")
            .ok_or_else(|| ValidationError::MissingClaim("iss".to_string()))?;
        let handle = self
            .registry
            .resolve(issuer)
            .ok_or_else(|| ValidationError::UnknownIssuer(redact(issuer)))?;

        let content = validator::validate_access(&handle, &self.mappers, &decoded, now).await?;

        let lifetime = content.expires_at.timestamp() - handle.config.clock_skew_secs - now;
        let lifetime = Duration::from_secs(u64::try_from(lifetime).unwrap_or(0));
        Ok((content, lifetime))
    }

    /// Validate an OpenID Connect identity token.
    ///
    /// When `expected_nonce` is given, the token's `nonce` claim must match
    /// it exactly.
    pub async fn validate_id_token(
        &self,
        raw: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdentityTokenContent, ValidationError> {
        let outcome = self.identity_inner(raw, expected_nonce).await;
        if let Err(err) = &outcome {
            self.events.record(err.event_kind());
            debug!(error = %err, "identity token rejected");
        }
        outcome
    }

    async fn identity_inner(
        &self,
        raw: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdentityTokenContent, ValidationError> {
        let now = Utc::now().timestamp();
        let decoded = decode_compact(raw, &self.parser)?;
        let issuer = decoded
            .claim_str("iss")
            .ok_or_else(|| ValidationError::MissingClaim("iss".to_string()))?;
        let handle = self
            .registry
            .resolve(issuer)
            .ok_or_else(|| ValidationError::UnknownIssuer(redact(issuer)))?;
        validator::validate_identity(&handle, &self.mappers, &decoded, expected_nonce, now).await
    }

    /// Structurally parse a refresh token; no cryptographic validation.
    pub fn validate_refresh_token(
        &self,
        raw: &str,
    ) -> Result<RefreshTokenContent, ValidationError> {
        let outcome = validator::refresh_content(raw, &self.parser);
        if let Err(err) = &outcome {
            self.events.record(err.event_kind());
        }
        outcome
    }

    /// Health view over every configured issuer.
    #[must_use]
    pub fn issuer_status(&self) -> Vec<IssuerStatus> {
        self.registry.statuses()
    }

    /// Snapshot of the security event tallies.
    #[must_use]
    pub fn security_events(&self) -> EventsSnapshot {
        self.events.snapshot()
    }

    /// Stop background tasks (JWKS refreshes, replay sweeper) and clear the
    /// replay store. Validation keeps working on already-loaded keys.
    pub fn close(&self) {
        self.registry.close();
        self.replay.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, IssuerConfig, KeySource};
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    fn inline_engine() -> Engine {
        let jwks = json!({
            "keys": [{
                "kty": "OKP", "crv": "Ed25519", "kid": "k1",
                "x": URL_SAFE_NO_PAD.encode([1u8; 32]),
            }]
        })
        .to_string();
        Engine::new(EngineConfig {
            issuers: vec![IssuerConfig::new(
                "https://issuer.example",
                KeySource::Inline { jwks },
            )],
            ..EngineConfig::default()
        })
        .expect("valid engine config")
    }

    #[tokio::test]
    async fn unknown_issuer_is_rejected_and_counted() {
        let engine = inline_engine();
        let header = URL_SAFE_NO_PAD.encode(json!({"alg":"EdDSA","kid":"k1"}).to_string());
        let body = URL_SAFE_NO_PAD
            .encode(json!({"iss":"https://other.example","exp":2_000_000_000}).to_string());
        let raw = format!("{header}.{body}.c2ln");

        let err = engine
            .validate_access_token(&raw, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownIssuer(_)));
        assert_eq!(engine.security_events().counts.get("unknown_issuer"), Some(&1));
    }

    #[tokio::test]
    async fn missing_iss_is_rejected() {
        let engine = inline_engine();
        let header = URL_SAFE_NO_PAD.encode(json!({"alg":"EdDSA","kid":"k1"}).to_string());
        let body = URL_SAFE_NO_PAD.encode(json!({"sub":"u"}).to_string());
        let raw = format!("{header}.{body}.c2ln");

        let err = engine
            .validate_access_token(&raw, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingClaim(name) if name == "iss"));
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let engine = inline_engine();
        let err = engine
            .validate_access_token("garbage", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedToken(_)));
        assert_eq!(
            engine.security_events().counts.get("malformed_token"),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn issuer_status_lists_inline_issuer() {
        let engine = inline_engine();
        let statuses = engine.issuer_status();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].identifier, "https://issuer.example");
        assert!(statuses[0].enabled);
        assert_eq!(statuses[0].current_keys, 1);
    }

    #[tokio::test]
    async fn duplicate_mappers_fail_engine_construction() {
        let config = EngineConfig {
            mappers: vec![
                ClaimMapper::new("scope", crate::mapper::MapperKind::StringArray),
                ClaimMapper::new("scope", crate::mapper::MapperKind::StringArray),
            ],
            cache: CacheConfig::default(),
            ..EngineConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }
}
