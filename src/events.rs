//! Security event counters
//!
//! Tallies typed security events raised by the validation pipeline, the JWKS
//! loaders, and the DPoP validator. Increments are lock-free; snapshots are
//! consistent enough for health and observability surfaces.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Typed kinds of security-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SecurityEventKind {
    /// Structurally invalid token
    MalformedToken,
    /// `iss` resolved to no enabled issuer
    UnknownIssuer,
    /// Discovered issuer differed from the configured identifier
    IssuerMismatch,
    /// Required claim or header parameter absent
    MissingClaim,
    /// Symmetric, unknown, or disallowed algorithm
    UnsupportedAlgorithm,
    /// Header-embedded key material rejected
    EmbeddedJwkForbidden,
    /// `typ` header did not match the expected value
    TokenTypeMismatch,
    /// No verification key for the requested kid
    KeyNotFound,
    /// Key type incompatible with the declared algorithm
    AlgorithmKeyMismatch,
    /// Signature verification failed
    BadSignature,
    /// Token past `exp + skew`
    Expired,
    /// Token before `nbf - skew`
    NotYetValid,
    /// `iat` outside the accepted window
    IssuedAtOutOfRange,
    /// Audience assertion failed
    AudienceMismatch,
    /// Authorized-party assertion failed
    AuthorizedPartyMismatch,
    /// ID-token nonce mismatch
    NonceMismatch,
    /// A claim mapper rejected its input
    ClaimMappingFailed,
    /// DPoP confirmation (`cnf.jkt`) absent where required
    DpopCnfMissing,
    /// DPoP proof absent where required
    DpopProofMissing,
    /// DPoP proof structurally or semantically invalid
    DpopProofInvalid,
    /// DPoP proof older than its max age
    DpopProofExpired,
    /// DPoP `ath` did not hash the presented token
    DpopAthMismatch,
    /// DPoP key thumbprint did not match `cnf.jkt`
    DpopThumbprintMismatch,
    /// DPoP proof jti replayed inside its TTL
    DpopReplayDetected,
}

impl SecurityEventKind {
    /// Stable name used in snapshots and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::UnknownIssuer => "unknown_issuer",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::MissingClaim => "missing_claim",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::EmbeddedJwkForbidden => "embedded_jwk_forbidden",
            Self::TokenTypeMismatch => "token_type_mismatch",
            Self::KeyNotFound => "key_not_found",
            Self::AlgorithmKeyMismatch => "algorithm_key_mismatch",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::IssuedAtOutOfRange => "issued_at_out_of_range",
            Self::AudienceMismatch => "audience_mismatch",
            Self::AuthorizedPartyMismatch => "authorized_party_mismatch",
            Self::NonceMismatch => "nonce_mismatch",
            Self::ClaimMappingFailed => "claim_mapping_failed",
            Self::DpopCnfMissing => "dpop_cnf_missing",
            Self::DpopProofMissing => "dpop_proof_missing",
            Self::DpopProofInvalid => "dpop_proof_invalid",
            Self::DpopProofExpired => "dpop_proof_expired",
            Self::DpopAthMismatch => "dpop_ath_mismatch",
            Self::DpopThumbprintMismatch => "dpop_thumbprint_mismatch",
            Self::DpopReplayDetected => "dpop_replay_detected",
        }
    }
}

/// Concurrency-safe tally of security events.
#[derive(Debug, Default)]
pub struct SecurityEventCounter {
    counts: DashMap<SecurityEventKind, AtomicU64>,
}

impl SecurityEventCounter {
    /// Create a counter with all tallies at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    /// Record one occurrence of `kind`.
    pub fn record(&self, kind: SecurityEventKind) {
        self.counts
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current tally for `kind`.
    pub fn count(&self, kind: SecurityEventKind) -> u64 {
        self.counts
            .get(&kind)
            .map_or(0, |entry| entry.load(Ordering::Relaxed))
    }

    /// Snapshot all non-zero tallies.
    pub fn snapshot(&self) -> EventsSnapshot {
        let counts: BTreeMap<&'static str, u64> = self
            .counts
            .iter()
            .map(|entry| (entry.key().name(), entry.value().load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let total = counts.values().sum();
        EventsSnapshot { counts, total }
    }
}

/// Point-in-time view of the security event tallies.
#[derive(Debug, Clone, Serialize)]
pub struct EventsSnapshot {
    /// Per-kind counts, keyed by stable event name
    pub counts: BTreeMap<&'static str, u64>,
    /// Sum of all counts
    pub total: u64,
}
