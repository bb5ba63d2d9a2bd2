//! Validated token content
//!
//! The three result types returned by the engine, one per validation
//! pipeline. All claims survive in the typed [`ClaimMap`]; the prominent
//! ones are lifted into named fields.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::claims::{ClaimMap, ClaimValue};

/// A validated OAuth 2.0 access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessTokenContent {
    /// `sub` claim
    pub subject: String,
    /// `iss` claim
    pub issuer: String,
    /// `aud` claim as a set (a lone string becomes a one-element set)
    pub audiences: Vec<String>,
    /// `azp` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_party: Option<String>,
    /// Mapped `scope` claim
    pub scopes: Vec<String>,
    /// Mapped `roles` claim
    pub roles: Vec<String>,
    /// Mapped `groups` claim
    pub groups: Vec<String>,
    /// `iat` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    /// `nbf` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// `exp` claim
    pub expires_at: DateTime<Utc>,
    /// `cnf.jkt` DPoP key thumbprint, when the token is sender-constrained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_thumbprint: Option<String>,
    /// Every body claim in typed form
    pub claims: ClaimMap,
}

impl AccessTokenContent {
    /// Whether the token grants `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether the token is bound to a DPoP key.
    #[must_use]
    pub fn is_sender_constrained(&self) -> bool {
        self.confirmation_thumbprint.is_some()
    }
}

/// A validated OpenID Connect identity token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityTokenContent {
    /// `sub` claim
    pub subject: String,
    /// `iss` claim
    pub issuer: String,
    /// `aud` claim as a set
    pub audiences: Vec<String>,
    /// `azp` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_party: Option<String>,
    /// `nonce` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// `iat` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    /// `exp` claim
    pub expires_at: DateTime<Utc>,
    /// `email` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `email_verified` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// `name` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `preferred_username` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Every body claim in typed form
    pub claims: ClaimMap,
}

/// A refresh token, structurally parsed at most.
///
/// Refresh tokens are opaque to resource servers; when the token happens to
/// be JWT-shaped its claims are exposed for introspection, without any
/// cryptographic verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshTokenContent {
    /// The raw token, unmodified
    pub raw: String,
    /// Claims, when the token parsed as a JWT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimMap>,
    /// `exp` claim, when present in a JWT-shaped token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshTokenContent {
    /// Whether the token parsed as a JWT.
    #[must_use]
    pub fn is_jwt(&self) -> bool {
        self.claims.is_some()
    }
}

pub(crate) fn string_set_claim(claims: &ClaimMap, name: &str) -> Vec<String> {
    claims.get(name).map_or_else(Vec::new, |value| {
        value.as_string_set().map_or_else(
            || value.as_str().map(str::to_string).into_iter().collect(),
            <[String]>::to_vec,
        )
    })
}

pub(crate) fn str_claim(claims: &ClaimMap, name: &str) -> Option<String> {
    claims.get(name).and_then(ClaimValue::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_membership() {
        let body = json!({ "sub": "u" });
        let content = AccessTokenContent {
            subject: "u".into(),
            issuer: "https://issuer".into(),
            audiences: vec!["api".into()],
            authorized_party: None,
            scopes: vec!["read".into(), "write".into()],
            roles: Vec::new(),
            groups: Vec::new(),
            issued_at: None,
            not_before: None,
            expires_at: DateTime::from_timestamp(2_000_000_000, 0).unwrap(),
            confirmation_thumbprint: None,
            claims: ClaimMap::from_object(body.as_object().unwrap()),
        };
        assert!(content.has_scope("read"));
        assert!(!content.has_scope("admin"));
        assert!(!content.is_sender_constrained());
    }

    #[test]
    fn string_set_claim_accepts_lone_string() {
        let body = json!({ "groups": "staff" });
        let claims = ClaimMap::from_object(body.as_object().unwrap());
        assert_eq!(string_set_claim(&claims, "groups"), vec!["staff".to_string()]);
        assert!(string_set_claim(&claims, "missing").is_empty());
    }
}
