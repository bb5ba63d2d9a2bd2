//! Token-type validation pipelines
//!
//! The ordered check sequences for access, identity and refresh tokens.
//! Later steps rely on earlier guarantees: claim semantics are only examined
//! after the signature verified, so every returned claim is trusted.

pub(crate) mod body;
pub(crate) mod header;

use chrono::DateTime;

use crate::claims::{ClaimMap, ClaimValue, nested_str};
use crate::config::ParserConfig;
use crate::content::{
    AccessTokenContent, IdentityTokenContent, RefreshTokenContent, str_claim, string_set_claim,
};
use crate::decoder::{DecodedJwt, decode_compact};
use crate::error::ValidationError;
use crate::keys::verify_signature;
use crate::mapper::MapperRegistry;
use crate::registry::IssuerHandle;

fn instant(secs: i64, what: &str) -> Result<chrono::DateTime<chrono::Utc>, ValidationError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ValidationError::MalformedToken(format!("{what} out of range")))
}

/// Access-token pipeline after decoding and issuer resolution: header,
/// signature, body and claim-mapper checks. DPoP and caching live with the
/// engine.
pub(crate) async fn validate_access(
    handle: &IssuerHandle,
    mappers: &MapperRegistry,
    decoded: &DecodedJwt,
    now: i64,
) -> Result<AccessTokenContent, ValidationError> {
    let (alg, kid) = header::validate_header(decoded, &handle.config)?;
    let key = handle.loader.get_key(&kid).await?;
    verify_signature(&key.material, alg, &decoded.signing_input(), &decoded.signature)?;

    let times = body::validate_time_claims(decoded, &handle.config, now)?;
    let audiences = body::validate_audience(decoded, &handle.config)?;
    let authorized_party = body::validate_authorized_party(decoded, &handle.config, &audiences)?;
    let subject = body::required_subject(decoded)?;

    let mut claims = ClaimMap::from_object(&decoded.body);
    mappers.apply_all(&decoded.body, &mut claims)?;

    Ok(AccessTokenContent {
        subject,
        issuer: handle.config.identifier.clone(),
        audiences,
        authorized_party,
        scopes: string_set_claim(&claims, "scope"),
        roles: string_set_claim(&claims, "roles"),
        groups: string_set_claim(&claims, "groups"),
        issued_at: times
            .issued_at
            .map(|secs| instant(secs, "iat"))
            .transpose()?,
        not_before: times
            .not_before
            .map(|secs| instant(secs, "nbf"))
            .transpose()?,
        expires_at: instant(times.expires_at, "exp")?,
        confirmation_thumbprint: nested_str(&decoded.body, "cnf.jkt").map(str::to_string),
        claims,
    })
}

/// Identity-token pipeline: the access checks minus DPoP, plus nonce
/// comparison and the multi-audience `azp` rule.
pub(crate) async fn validate_identity(
    handle: &IssuerHandle,
    mappers: &MapperRegistry,
    decoded: &DecodedJwt,
    expected_nonce: Option<&str>,
    now: i64,
) -> Result<IdentityTokenContent, ValidationError> {
    let (alg, kid) = header::validate_header(decoded, &handle.config)?;
    let key = handle.loader.get_key(&kid).await?;
    verify_signature(&key.material, alg, &decoded.signing_input(), &decoded.signature)?;

    let times = body::validate_time_claims(decoded, &handle.config, now)?;
    let audiences = body::validate_audience(decoded, &handle.config)?;
    let authorized_party = body::validate_authorized_party(decoded, &handle.config, &audiences)?;
    let subject = body::required_subject(decoded)?;

    let nonce = decoded.claim_str("nonce").map(str::to_string);
    if let Some(expected) = expected_nonce {
        match nonce.as_deref() {
            Some(actual) if actual == expected => {}
            _ => return Err(ValidationError::NonceMismatch),
        }
    }

    let mut claims = ClaimMap::from_object(&decoded.body);
    mappers.apply_all(&decoded.body, &mut claims)?;

    Ok(IdentityTokenContent {
        subject,
        issuer: handle.config.identifier.clone(),
        audiences,
        authorized_party,
        nonce,
        issued_at: times
            .issued_at
            .map(|secs| instant(secs, "iat"))
            .transpose()?,
        expires_at: instant(times.expires_at, "exp")?,
        email: str_claim(&claims, "email"),
        email_verified: claims.get("email_verified").and_then(ClaimValue::as_bool),
        name: str_claim(&claims, "name"),
        preferred_username: str_claim(&claims, "preferred_username"),
        claims,
    })
}

/// Refresh-token pipeline: structural parsing at most, never cryptographic.
pub(crate) fn refresh_content(
    raw: &str,
    limits: &ParserConfig,
) -> Result<RefreshTokenContent, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::MalformedToken("empty token".to_string()));
    }
    if raw.len() > limits.max_token_bytes {
        return Err(ValidationError::MalformedToken(format!(
            "token of {} bytes exceeds the {}-byte limit",
            raw.len(),
            limits.max_token_bytes
        )));
    }

    // Opaque tokens are fine; claims are best-effort introspection only.
    let decoded = decode_compact(raw, limits).ok();
    let expires_at = decoded
        .as_ref()
        .and_then(|d| d.claim_i64("exp"))
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    let claims = decoded.map(|d| ClaimMap::from_object(&d.body));

    Ok(RefreshTokenContent {
        raw: raw.to_string(),
        claims,
        expires_at,
    })
}
