//! Error types for the validation engine

use thiserror::Error;

use crate::events::SecurityEventKind;

/// Result type alias for validation outcomes
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A validation failure.
///
/// Every variant names exactly one violated rule and maps to exactly one
/// [`SecurityEventKind`]. Messages never contain key material and token
/// fragments are truncated to 16 characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The token is not a structurally valid compact JWS
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The `iss` claim does not match any enabled issuer configuration
    #[error("unknown or disabled issuer: {0}")]
    UnknownIssuer(String),

    /// A required claim or header parameter is absent
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The `alg` header is symmetric, unknown, or not in the issuer allowlist
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The header embeds key material (`jwk`/`jku`), CVE-2018-0114 class
    #[error("embedded key material in header is forbidden: {0}")]
    EmbeddedJwkForbidden(String),

    /// The `typ` header does not match the issuer's expected value
    #[error("token type mismatch: expected {expected:?}, got {actual:?}")]
    TokenTypeMismatch {
        /// Configured expected `typ` value
        expected: String,
        /// Observed `typ` value
        actual: String,
    },

    /// No key with the requested `kid` in the current or grace-period keysets
    #[error("no verification key for kid {0:?}")]
    KeyNotFound(String),

    /// Key type and declared algorithm are incompatible
    #[error("algorithm/key mismatch: {0}")]
    AlgorithmKeyMismatch(String),

    /// Cryptographic signature verification failed
    #[error("signature verification failed")]
    BadSignature,

    /// `exp` (plus skew) is in the past
    #[error("token expired at {expired_at} (unix seconds)")]
    Expired {
        /// `exp` claim value
        expired_at: i64,
    },

    /// `nbf` (minus skew) is in the future
    #[error("token not valid before {not_before} (unix seconds)")]
    NotYetValid {
        /// `nbf` claim value
        not_before: i64,
    },

    /// `iat` is outside the accepted window
    #[error("issued-at outside accepted window: {0}")]
    IssuedAtOutOfRange(String),

    /// Token audience does not intersect the configured audience set
    #[error("audience mismatch: {0}")]
    AudienceMismatch(String),

    /// `azp` absent or different from the expected authorized party
    #[error("authorized party mismatch: {0}")]
    AuthorizedPartyMismatch(String),

    /// ID-token nonce differs from the expected nonce
    #[error("nonce mismatch")]
    NonceMismatch,

    /// A registered claim mapper rejected its input
    #[error("claim mapping failed for {claim:?}: {detail}")]
    ClaimMappingFailed {
        /// Claim the failing mapper is registered for
        claim: String,
        /// Mapper failure detail
        detail: String,
    },

    /// Token is DPoP-bound or DPoP is required, but carries no `cnf.jkt`
    #[error("access token carries no cnf.jkt confirmation")]
    DpopCnfMissing,

    /// A DPoP proof was required but the request carries none
    #[error("DPoP proof missing from request")]
    DpopProofMissing,

    /// The DPoP proof is structurally or semantically invalid
    #[error("invalid DPoP proof: {0}")]
    DpopProofInvalid(String),

    /// The DPoP proof `iat` is older than the configured max age
    #[error("DPoP proof expired: issued {age_secs}s ago, max {max_secs}s")]
    DpopProofExpired {
        /// Seconds since the proof was issued
        age_secs: i64,
        /// Configured proof max age in seconds
        max_secs: u64,
    },

    /// The proof `ath` does not hash the presented access token
    #[error("DPoP ath does not match the presented access token")]
    DpopAthMismatch,

    /// The proof key thumbprint does not match the token's `cnf.jkt`
    #[error("DPoP key thumbprint does not match cnf.jkt")]
    DpopThumbprintMismatch,

    /// The proof `jti` was already seen inside the replay TTL
    #[error("DPoP proof replay detected")]
    DpopReplayDetected,
}

impl ValidationError {
    /// The security-event kind counted for this failure.
    #[must_use]
    pub fn event_kind(&self) -> SecurityEventKind {
        match self {
            Self::MalformedToken(_) => SecurityEventKind::MalformedToken,
            Self::UnknownIssuer(_) => SecurityEventKind::UnknownIssuer,
            Self::MissingClaim(_) => SecurityEventKind::MissingClaim,
            Self::UnsupportedAlgorithm(_) => SecurityEventKind::UnsupportedAlgorithm,
            Self::EmbeddedJwkForbidden(_) => SecurityEventKind::EmbeddedJwkForbidden,
            Self::TokenTypeMismatch { .. } => SecurityEventKind::TokenTypeMismatch,
            Self::KeyNotFound(_) => SecurityEventKind::KeyNotFound,
            Self::AlgorithmKeyMismatch(_) => SecurityEventKind::AlgorithmKeyMismatch,
            Self::BadSignature => SecurityEventKind::BadSignature,
            Self::Expired { .. } => SecurityEventKind::Expired,
            Self::NotYetValid { .. } => SecurityEventKind::NotYetValid,
            Self::IssuedAtOutOfRange(_) => SecurityEventKind::IssuedAtOutOfRange,
            Self::AudienceMismatch(_) => SecurityEventKind::AudienceMismatch,
            Self::AuthorizedPartyMismatch(_) => SecurityEventKind::AuthorizedPartyMismatch,
            Self::NonceMismatch => SecurityEventKind::NonceMismatch,
            Self::ClaimMappingFailed { .. } => SecurityEventKind::ClaimMappingFailed,
            Self::DpopCnfMissing => SecurityEventKind::DpopCnfMissing,
            Self::DpopProofMissing => SecurityEventKind::DpopProofMissing,
            Self::DpopProofInvalid(_) => SecurityEventKind::DpopProofInvalid,
            Self::DpopProofExpired { .. } => SecurityEventKind::DpopProofExpired,
            Self::DpopAthMismatch => SecurityEventKind::DpopAthMismatch,
            Self::DpopThumbprintMismatch => SecurityEventKind::DpopThumbprintMismatch,
            Self::DpopReplayDetected => SecurityEventKind::DpopReplayDetected,
        }
    }
}

/// Engine construction failure.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An issuer or mapper configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// An inline or file key source could not be loaded or parsed
    #[error("key source error for issuer {issuer:?}: {detail}")]
    KeySource {
        /// Issuer identifier the failing source belongs to
        issuer: String,
        /// Load or parse failure detail
        detail: String,
    },

    /// The outbound HTTP client could not be constructed
    #[error("http client error: {0}")]
    HttpClient(String),
}

/// Truncate a potentially sensitive fragment for diagnostics.
///
/// Keeps at most 16 characters so error messages and logs never reproduce a
/// usable token.
#[must_use]
pub fn redact(fragment: &str) -> String {
    if fragment.chars().count() <= 16 {
        fragment.to_string()
    } else {
        let head: String = fragment.chars().take(16).collect();
        format!("{head}…")
    }
}
