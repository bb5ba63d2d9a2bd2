//! DPoP proof validation (RFC 9449)
//!
//! Enforces sender-constrained access tokens. Runs after the access token
//! itself validated (or was served from cache): locates the `DPoP` request
//! header, verifies the proof JWT with its embedded key, checks `jti`
//! freshness against the process-wide replay store, binds `ath` to the
//! presented token, and binds the key thumbprint to the token's `cnf.jkt`.

pub(crate) mod replay;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::HeaderMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::{DpopConfig, IssuerConfig, ParserConfig};
use crate::decoder::decode_compact;
use crate::error::ValidationError;
use crate::keys::{jwk_thumbprint, jwk::parse_jwk, verify_signature};
use crate::validator::header::proof_algorithm;

pub use replay::ReplayGuard;

/// Proofs over this size are rejected before any parsing.
const MAX_PROOF_BYTES: usize = 8 * 1024;

/// Allowed clock skew for a proof `iat` in the future, per RFC 9449 guidance.
const IAT_FUTURE_LEEWAY_SECS: i64 = 60;

/// Compute the `ath` binding value: `base64url(SHA-256(raw token))`, no
/// padding.
#[must_use]
pub fn compute_ath(raw_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(raw_token.as_bytes()))
}

fn ct_equal(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn invalid(detail: impl Into<String>) -> ValidationError {
    ValidationError::DpopProofInvalid(detail.into())
}

/// Validate the request's DPoP posture for an access token.
///
/// `cnf_jkt` is the token's confirmation thumbprint, when the token is
/// sender-constrained. Bearer requests (no proof, no `cnf.jkt`, DPoP not
/// required) pass untouched.
pub(crate) fn validate_proof(
    config: &IssuerConfig,
    headers: &HeaderMap,
    cnf_jkt: Option<&str>,
    raw_token: &str,
    replay: &ReplayGuard,
    limits: &ParserConfig,
    now: i64,
) -> Result<(), ValidationError> {
    let required = config.dpop_required();
    let dpop_defaults = DpopConfig::default();
    let dpop = config.dpop.as_ref().unwrap_or(&dpop_defaults);

    // One DPoP header, at most, and bounded before any decoding.
    let mut values = headers.get_all("dpop").iter();
    let first = values.next();
    if values.next().is_some() {
        return Err(invalid("multiple DPoP headers"));
    }
    let proof = match first {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| invalid("header is not valid ASCII"))?,
        ),
        None => None,
    };
    if let Some(proof) = proof {
        if proof.len() > MAX_PROOF_BYTES {
            return Err(invalid("proof exceeds 8 KiB"));
        }
    }

    // Gating: who must present what.
    let proof = match (proof, cnf_jkt) {
        (None, None) if !required => {
            debug!("bearer request, DPoP not in play");
            return Ok(());
        }
        (None, None) => return Err(ValidationError::DpopCnfMissing),
        (None, Some(_)) => return Err(ValidationError::DpopProofMissing),
        (Some(_), None) => return Err(ValidationError::DpopCnfMissing),
        (Some(proof), Some(_)) => proof,
    };
    let expected_jkt = cnf_jkt.expect("gating leaves only the bound case");

    // The proof is itself a compact JWS with its own (tighter) size bound.
    let proof_limits = ParserConfig {
        max_token_bytes: MAX_PROOF_BYTES,
        ..limits.clone()
    };
    let decoded = decode_compact(proof, &proof_limits).map_err(|err| match err {
        ValidationError::MalformedToken(detail) => invalid(detail),
        other => other,
    })?;

    // Proof header: typ, allowlisted alg, embedded key as a real object.
    let typ = decoded.header_str("typ").unwrap_or_default();
    if !typ.eq_ignore_ascii_case("dpop+jwt") {
        return Err(invalid(format!("typ {typ:?} is not dpop+jwt")));
    }
    let alg = proof_algorithm(&decoded, config).map_err(|err| match err {
        ValidationError::UnsupportedAlgorithm(detail) => invalid(format!("alg: {detail}")),
        ValidationError::MissingClaim(name) => invalid(format!("missing {name}")),
        other => other,
    })?;
    let jwk_value = decoded
        .header
        .get("jwk")
        .ok_or_else(|| invalid("missing jwk header"))?;
    if !matches!(jwk_value, Value::Object(_)) {
        return Err(invalid("jwk header must be a JSON object"));
    }
    let proof_key =
        parse_jwk(jwk_value).map_err(|err| invalid(format!("embedded jwk: {err}")))?;

    // Proof signature, with the embedded key.
    verify_signature(
        &proof_key.material,
        alg,
        &decoded.signing_input(),
        &decoded.signature,
    )
    .map_err(|err| match err {
        ValidationError::BadSignature => invalid("signature verification failed"),
        ValidationError::AlgorithmKeyMismatch(detail)
        | ValidationError::UnsupportedAlgorithm(detail) => invalid(detail),
        other => other,
    })?;

    // Proof claims: jti replay first, then the iat window, then ath binding.
    let jti = decoded
        .claim_str("jti")
        .ok_or_else(|| invalid("missing jti"))?;
    if !replay.check_and_store(jti) {
        return Err(ValidationError::DpopReplayDetected);
    }

    let iat = decoded
        .claim_i64("iat")
        .ok_or_else(|| invalid("missing iat"))?;
    let age = now - iat;
    if age < -IAT_FUTURE_LEEWAY_SECS {
        return Err(invalid(format!("iat {iat} is in the future")));
    }
    let max_age = i64::try_from(dpop.proof_max_age.as_secs()).unwrap_or(i64::MAX);
    if age > max_age {
        return Err(ValidationError::DpopProofExpired {
            age_secs: age,
            max_secs: dpop.proof_max_age.as_secs(),
        });
    }

    let ath = decoded
        .claim_str("ath")
        .ok_or_else(|| invalid("missing ath"))?;
    if !ct_equal(ath, &compute_ath(raw_token)) {
        return Err(ValidationError::DpopAthMismatch);
    }

    // Key binding: thumbprint of the embedded key against cnf.jkt.
    if !ct_equal(&jwk_thumbprint(&proof_key.material), expected_jkt) {
        return Err(ValidationError::DpopThumbprintMismatch);
    }

    Ok(())
}
