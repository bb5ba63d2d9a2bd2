//! JWS header checks
//!
//! Runs before any key lookup: algorithm allowlisting, kid presence,
//! rejection of header-embedded key material (CVE-2018-0114), and the
//! optional RFC 9068 `typ` assertion.

use crate::config::IssuerConfig;
use crate::decoder::DecodedJwt;
use crate::error::ValidationError;
use crate::keys::JwsAlgorithm;

/// Validate the token header against the issuer configuration.
///
/// Returns the accepted algorithm and the `kid` to resolve.
pub(crate) fn validate_header(
    decoded: &DecodedJwt,
    config: &IssuerConfig,
) -> Result<(JwsAlgorithm, String), ValidationError> {
    let alg_name = decoded
        .header_str("alg")
        .ok_or_else(|| ValidationError::MissingClaim("alg".to_string()))?;

    let alg = JwsAlgorithm::from_name(alg_name).ok_or_else(|| {
        if alg_name.starts_with("HS") {
            ValidationError::UnsupportedAlgorithm(format!(
                "{alg_name} is symmetric and never accepted"
            ))
        } else {
            ValidationError::UnsupportedAlgorithm(alg_name.to_string())
        }
    })?;
    if !config.algorithms.contains(&alg) {
        return Err(ValidationError::UnsupportedAlgorithm(format!(
            "{alg} is not in the issuer allowlist"
        )));
    }

    // Key material must come from the issuer's JWKS, never from the token.
    for forbidden in ["jwk", "jku"] {
        if decoded.header.contains_key(forbidden) {
            return Err(ValidationError::EmbeddedJwkForbidden(forbidden.to_string()));
        }
    }

    let kid = decoded.header_str("kid").ok_or_else(|| {
        let observed: Vec<&str> = decoded.header.keys().map(String::as_str).collect();
        ValidationError::MissingClaim(format!("kid (header carries {observed:?})"))
    })?;

    if let Some(expected) = &config.expected_type {
        let actual = decoded.header_str("typ").unwrap_or_default();
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ValidationError::TokenTypeMismatch {
                expected: expected.clone(),
                actual: actual.to_string(),
            });
        }
    }

    Ok((alg, kid.to_string()))
}

/// Parse and allowlist the `alg` of a DPoP proof header.
///
/// Same algorithm policy as the token header, without the kid / typ / jwk
/// rules (a proof is expected to embed its key).
pub(crate) fn proof_algorithm(
    decoded: &DecodedJwt,
    config: &IssuerConfig,
) -> Result<JwsAlgorithm, ValidationError> {
    let alg_name = decoded
        .header_str("alg")
        .ok_or_else(|| ValidationError::MissingClaim("alg".to_string()))?;
    let alg = JwsAlgorithm::from_name(alg_name)
        .ok_or_else(|| ValidationError::UnsupportedAlgorithm(alg_name.to_string()))?;
    if !config.algorithms.contains(&alg) {
        return Err(ValidationError::UnsupportedAlgorithm(format!(
            "{alg} is not in the issuer allowlist"
        )));
    }
    Ok(alg)
}
