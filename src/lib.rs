//! Token Warden
//!
//! An embeddable OAuth 2.0 / OpenID Connect JWT validation engine for
//! request-processing hot paths.
//!
//! # Features
//!
//! - **Multi-issuer**: per-issuer trust contexts resolved from the `iss`
//!   claim, with inline, file, HTTP JWKS and OIDC discovery key sources
//! - **Key rotation**: atomic keyset swaps with a grace window for retired
//!   kids, ETag-aware background refresh, retry with jitter
//! - **Three pipelines**: access tokens (RFC 9068), identity tokens, and
//!   structural refresh-token parsing
//! - **DPoP** (RFC 9449): proof verification, `ath`/`cnf.jkt` binding, and
//!   process-wide jti replay protection
//! - **Result cache**: fingerprint-keyed, coalesced, DPoP-aware
//! - **Typed failures**: every rejection names its rule and feeds one
//!   security-event counter
//!
//! # Example
//!
//! ```no_run
//! use token_warden::{Engine, EngineConfig, IssuerConfig, KeySource};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig {
//!     issuers: vec![IssuerConfig::new(
//!         "https://issuer.example",
//!         KeySource::WellKnown {
//!             url: "https://issuer.example/.well-known/openid-configuration".into(),
//!         },
//!     )],
//!     ..EngineConfig::default()
//! })?;
//!
//! let headers = http::HeaderMap::new();
//! let content = engine.validate_access_token("eyJ...", &headers).await?;
//! println!("subject: {}", content.subject);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
pub mod claims;
pub mod config;
pub mod content;
pub mod decoder;
pub mod dpop;
mod engine;
pub mod error;
pub mod events;
pub mod jwks;
pub mod keys;
pub mod mapper;
pub mod registry;
mod validator;

pub use claims::{ClaimMap, ClaimValue, ParsedClaim};
pub use config::{
    CacheConfig, DpopConfig, EngineConfig, HttpClientConfig, IssuerConfig, KeySource,
    ParserConfig, RetryConfig, RotationConfig,
};
pub use content::{AccessTokenContent, IdentityTokenContent, RefreshTokenContent};
pub use engine::Engine;
pub use error::{EngineError, Result, ValidationError};
pub use events::{EventsSnapshot, SecurityEventCounter, SecurityEventKind};
pub use jwks::LoaderStatus;
pub use keys::JwsAlgorithm;
pub use mapper::{ClaimMapper, MapperKind, MapperRegistry};
pub use registry::IssuerStatus;

// The request-context type used by `validate_access_token`.
pub use http::HeaderMap;
