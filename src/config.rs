//! Engine configuration model
//!
//! Owned, immutable configuration handed to [`crate::Engine::new`] by value.
//! The embedder owns property resolution (files, environment, DI); these
//! structs only model the resolved values and their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::JwsAlgorithm;
use crate::mapper::ClaimMapper;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trusted issuers, keyed by their `iss` identifier
    pub issuers: Vec<IssuerConfig>,
    /// Parser limits applied to every token and DPoP proof
    pub parser: ParserConfig,
    /// Access-token result cache
    pub cache: CacheConfig,
    /// Claim mappers applied globally (empty ⇒ [`ClaimMapper::defaults`])
    pub mappers: Vec<ClaimMapper>,
}

/// One trusted issuer. Immutable after engine construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Expected value of the `iss` claim (URI or symbolic)
    pub identifier: String,
    /// Disabled issuers are skipped entirely
    pub enabled: bool,
    /// Where verification keys come from
    pub key_source: KeySource,
    /// Expected audiences; empty set disables the audience check
    pub audiences: Vec<String>,
    /// Expected `azp` claim, when asserted
    pub authorized_party: Option<String>,
    /// Expected `typ` header value (RFC 9068 `at+jwt`), compared
    /// case-insensitively when set
    pub expected_type: Option<String>,
    /// Ordered allowlist of accepted signature algorithms
    pub algorithms: Vec<JwsAlgorithm>,
    /// Clock skew tolerance in seconds for time-based claims
    pub clock_skew_secs: i64,
    /// Maximum accepted token age measured from `iat` (unlimited when unset)
    pub max_token_age: Option<Duration>,
    /// DPoP sender-constraint enforcement (off when unset)
    pub dpop: Option<DpopConfig>,
    /// Outbound HTTP behavior for JWKS / discovery fetches
    pub http: HttpClientConfig,
    /// Retry policy for those fetches
    pub retry: RetryConfig,
    /// Key-rotation grace behavior
    pub rotation: RotationConfig,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            enabled: true,
            key_source: KeySource::default(),
            audiences: Vec::new(),
            authorized_party: None,
            expected_type: None,
            algorithms: JwsAlgorithm::ALL.to_vec(),
            clock_skew_secs: 60,
            max_token_age: None,
            dpop: None,
            http: HttpClientConfig::default(),
            retry: RetryConfig::default(),
            rotation: RotationConfig::default(),
        }
    }
}

impl IssuerConfig {
    /// Convenience constructor for the common HTTP JWKS case.
    #[must_use]
    pub fn new(identifier: impl Into<String>, key_source: KeySource) -> Self {
        Self {
            identifier: identifier.into(),
            key_source,
            ..Self::default()
        }
    }

    /// Whether DPoP proofs are mandatory for this issuer.
    #[must_use]
    pub fn dpop_required(&self) -> bool {
        self.dpop.as_ref().is_some_and(|d| d.required)
    }
}

/// Where an issuer's verification keys come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySource {
    /// A literal JWK Set document
    Inline {
        /// JWKS JSON text
        jwks: String,
    },
    /// A JWK Set document on disk, read at construction
    File {
        /// Path to the JWKS file
        path: PathBuf,
    },
    /// A JWKS endpoint fetched over HTTP(S)
    Http {
        /// Absolute JWKS URL
        url: String,
    },
    /// OIDC discovery: fetch the well-known document, then its `jwks_uri`
    WellKnown {
        /// Absolute URL of `.../.well-known/openid-configuration`; an empty
        /// string derives it from the issuer identifier by convention
        url: String,
    },
}

impl Default for KeySource {
    fn default() -> Self {
        Self::Inline {
            jwks: String::new(),
        }
    }
}

/// DPoP (RFC 9449) enforcement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DpopConfig {
    /// Reject bearer requests outright (default: false — DPoP is enforced
    /// only for tokens carrying `cnf.jkt`)
    pub required: bool,
    /// Maximum accepted proof age measured from the proof `iat`
    pub proof_max_age: Duration,
    /// Capacity of the shared jti replay cache
    pub replay_cache_size: usize,
    /// How long a jti stays fresh in the replay cache
    pub replay_ttl: Duration,
}

impl Default for DpopConfig {
    fn default() -> Self {
        Self {
            required: false,
            proof_max_age: Duration::from_secs(300),
            replay_cache_size: 10_000,
            replay_ttl: Duration::from_secs(300),
        }
    }
}

/// Structural limits applied while parsing tokens and proofs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum raw token length in bytes
    pub max_token_bytes: usize,
    /// Maximum decoded size of any single part (header / body) in bytes
    pub max_part_bytes: usize,
    /// Maximum JSON nesting depth inside header and body
    pub max_json_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_token_bytes: 8 * 1024,
            max_part_bytes: 16 * 1024,
            max_json_depth: 10,
        }
    }
}

/// Outbound HTTP client settings for JWKS and discovery fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-request read timeout
    pub read_timeout: Duration,
    /// Maximum accepted response body size in bytes
    pub max_response_bytes: usize,
    /// Refuse plain-http endpoints (disable only for tests)
    pub https_only: bool,
    /// Re-fetch the JWKS in the background after any terminal initial load
    pub background_refresh: bool,
    /// Interval between background refreshes
    pub refresh_interval: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_response_bytes: 1024 * 1024,
            https_only: true,
            background_refresh: true,
            refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Exponential-backoff retry policy for upstream fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether to retry at all
    pub enabled: bool,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff growth factor
    pub multiplier: f32,
    /// Add full jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Key-rotation grace behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// How long retired keysets keep serving lookups
    pub grace_period: Duration,
    /// Upper bound on retained retired keysets
    pub max_retired_keysets: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(300),
            max_retired_keysets: 5,
        }
    }
}

/// Access-token result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to force a full pipeline run per request
    pub enabled: bool,
    /// Maximum cached tokens before eviction
    pub capacity: u64,
    /// Upper bound on entry lifetime (entries also expire at `exp - skew`)
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_defaults_accept_all_asymmetric_algorithms() {
        let cfg = IssuerConfig::default();
        assert_eq!(cfg.algorithms.len(), 10);
        assert!(cfg.enabled);
        assert_eq!(cfg.clock_skew_secs, 60);
        assert!(cfg.max_token_age.is_none());
        assert!(!cfg.dpop_required());
    }

    #[test]
    fn dpop_defaults_match_rfc_guidance() {
        let dpop = DpopConfig::default();
        assert!(!dpop.required);
        assert_eq!(dpop.proof_max_age, Duration::from_secs(300));
        assert_eq!(dpop.replay_cache_size, 10_000);
        assert_eq!(dpop.replay_ttl, Duration::from_secs(300));
    }

    #[test]
    fn key_source_serializes_with_kind_tag() {
        let source = KeySource::Http {
            url: "https://issuer.example/jwks".to_string(),
        };
        let json = serde_json::to_value(&source).expect("serializes");
        assert_eq!(json["kind"], "http");
        assert_eq!(json["url"], "https://issuer.example/jwks");
    }

    #[test]
    fn engine_config_round_trips_through_serde() {
        let cfg = EngineConfig {
            issuers: vec![IssuerConfig::new(
                "https://issuer.example",
                KeySource::WellKnown {
                    url: "https://issuer.example/.well-known/openid-configuration".into(),
                },
            )],
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&cfg).expect("serializes");
        let back: EngineConfig = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.issuers.len(), 1);
        assert_eq!(back.issuers[0].identifier, "https://issuer.example");
    }
}
