//! Body claim checks
//!
//! Only ever runs on verified bodies. Time claims honor the issuer's clock
//! skew; `aud` accepts both the string and array forms of RFC 7519.

use serde_json::Value;

use crate::config::IssuerConfig;
use crate::decoder::DecodedJwt;
use crate::error::ValidationError;

/// Validated time claims, as epoch seconds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeClaims {
    /// `exp`, always present
    pub expires_at: i64,
    /// `iat`, when present
    pub issued_at: Option<i64>,
    /// `nbf`, when present
    pub not_before: Option<i64>,
}

/// Check `exp`, `nbf` and `iat` against `now` with the issuer's skew.
pub(crate) fn validate_time_claims(
    decoded: &DecodedJwt,
    config: &IssuerConfig,
    now: i64,
) -> Result<TimeClaims, ValidationError> {
    let skew = config.clock_skew_secs;

    let expires_at = decoded
        .claim_i64("exp")
        .ok_or_else(|| ValidationError::MissingClaim("exp".to_string()))?;
    if now > expires_at.saturating_add(skew) {
        return Err(ValidationError::Expired {
            expired_at: expires_at,
        });
    }

    let not_before = decoded.claim_i64("nbf");
    if let Some(nbf) = not_before {
        if now.saturating_add(skew) < nbf {
            return Err(ValidationError::NotYetValid { not_before: nbf });
        }
    }

    let issued_at = decoded.claim_i64("iat");
    if let Some(iat) = issued_at {
        if iat > now.saturating_add(skew) {
            return Err(ValidationError::IssuedAtOutOfRange(format!(
                "iat {iat} is in the future"
            )));
        }
        if let Some(max_age) = config.max_token_age {
            let age = now.saturating_sub(iat);
            let max = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            if age > max {
                return Err(ValidationError::IssuedAtOutOfRange(format!(
                    "token is {age}s old, max accepted age is {max}s"
                )));
            }
        }
    }

    Ok(TimeClaims {
        expires_at,
        issued_at,
        not_before,
    })
}

/// The token's audiences as a set; a lone string becomes a one-element set.
pub(crate) fn audience_values(decoded: &DecodedJwt) -> Vec<String> {
    match decoded.body.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Intersect the token audiences with the configured expected set.
///
/// An empty configured set disables the check.
pub(crate) fn validate_audience(
    decoded: &DecodedJwt,
    config: &IssuerConfig,
) -> Result<Vec<String>, ValidationError> {
    let audiences = audience_values(decoded);
    if config.audiences.is_empty() {
        return Ok(audiences);
    }
    if audiences.iter().any(|aud| config.audiences.contains(aud)) {
        Ok(audiences)
    } else {
        Err(ValidationError::AudienceMismatch(format!(
            "token audiences {audiences:?} do not intersect the expected set"
        )))
    }
}

/// Enforce the `azp` rules: equality with the configured value, and presence
/// whenever the token names several audiences.
pub(crate) fn validate_authorized_party(
    decoded: &DecodedJwt,
    config: &IssuerConfig,
    audiences: &[String],
) -> Result<Option<String>, ValidationError> {
    let azp = decoded.claim_str("azp").map(str::to_string);

    if let Some(expected) = &config.authorized_party {
        match azp.as_deref() {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Err(ValidationError::AuthorizedPartyMismatch(format!(
                    "expected {expected:?}, got {actual:?}"
                )));
            }
            None => {
                return Err(ValidationError::AuthorizedPartyMismatch(format!(
                    "expected {expected:?}, claim absent"
                )));
            }
        }
    }

    if audiences.len() > 1 && azp.is_none() {
        return Err(ValidationError::AuthorizedPartyMismatch(
            "azp is required when aud is multi-valued".to_string(),
        ));
    }

    Ok(azp)
}

/// `sub` is mandatory on every verified token.
pub(crate) fn required_subject(decoded: &DecodedJwt) -> Result<String, ValidationError> {
    decoded
        .claim_str("sub")
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingClaim("sub".to_string()))
}
