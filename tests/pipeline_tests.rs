//! End-to-end validation pipeline tests over inline key sources.

mod common;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use http::HeaderMap;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{TestKey, mint, mint_with_header};
use token_warden::{
    CacheConfig, Engine, EngineConfig, IssuerConfig, JwsAlgorithm, KeySource, ValidationError,
};

const ISSUER: &str = "https://issuer.example";

fn engine_with(key: &TestKey, kid: &str, tweak: impl FnOnce(&mut EngineConfig)) -> Engine {
    let issuer = IssuerConfig::new(ISSUER, KeySource::Inline { jwks: key.jwks(kid) });
    let mut config = EngineConfig {
        issuers: vec![issuer],
        ..EngineConfig::default()
    };
    tweak(&mut config);
    Engine::new(config).expect("valid engine config")
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn standard_claims(now: i64) -> serde_json::Value {
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": ["api"],
        "azp": "client-1",
        "scope": "openid profile",
        "iat": now,
        "exp": now + 3600,
    })
}

#[tokio::test]
async fn valid_rs256_access_token_yields_trusted_content() {
    let key = TestKey::rsa();
    let engine = engine_with(&key, "K1", |cfg| {
        cfg.issuers[0].audiences = vec!["api".to_string()];
        cfg.issuers[0].expected_type = Some("at+jwt".to_string());
    });
    let raw = mint_with_header(
        &key,
        &json!({ "alg": "RS256", "kid": "K1", "typ": "at+jwt" }),
        &standard_claims(now()),
    );

    let content = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .expect("valid token");
    assert_eq!(content.subject, "user-1");
    assert_eq!(content.issuer, ISSUER);
    assert_eq!(content.audiences, vec!["api".to_string()]);
    assert_eq!(content.authorized_party.as_deref(), Some("client-1"));
    assert_eq!(
        content.scopes,
        vec!["openid".to_string(), "profile".to_string()]
    );
    assert!(content.has_scope("profile"));
    assert!(!content.is_sender_constrained());
}

#[tokio::test]
async fn valid_es256_and_ed25519_tokens_verify() {
    for key in [TestKey::p256(), TestKey::ed25519()] {
        let engine = engine_with(&key, "K1", |_| {});
        let raw = mint(&key, "K1", &standard_claims(now()));
        let content = engine
            .validate_access_token(&raw, &HeaderMap::new())
            .await
            .expect("valid token");
        assert_eq!(content.subject, "user-1");
    }
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let now = now();
    let raw = mint(
        &key,
        "K1",
        &json!({ "iss": ISSUER, "sub": "u", "iat": now - 3600, "exp": now - 120 }),
    );

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::Expired { .. }));
    assert_eq!(engine.security_events().counts.get("expired"), Some(&1));
}

#[tokio::test]
async fn tampered_token_fails_closed() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |cfg| {
        cfg.cache.enabled = false;
    });
    let raw = mint(&key, "K1", &standard_claims(now()));

    // Flip one character in the body part; depending on where it lands the
    // token is either no longer JSON or no longer validly signed.
    let dot = raw.find('.').unwrap();
    let body_start = dot + 1;
    let mut bytes = raw.clone().into_bytes();
    for at in body_start..body_start + 8 {
        let original = bytes[at];
        bytes[at] = if original == b'A' { b'B' } else { b'A' };
        if bytes[at] == original {
            continue;
        }
        let tampered = String::from_utf8(bytes.clone()).unwrap();
        let err = engine
            .validate_access_token(&tampered, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ValidationError::BadSignature | ValidationError::MalformedToken(_)
            ),
            "unexpected error for tampered token: {err:?}"
        );
        bytes[at] = original;
    }
}

#[tokio::test]
async fn mangled_ecdsa_signature_length_is_rejected() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let raw = mint(&key, "K1", &standard_claims(now()));

    // Truncate the 64-byte P-1363 signature to 63 bytes
    let mut parts: Vec<&str> = raw.split('.').collect();
    let sig = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
    assert_eq!(sig.len(), 64);
    let truncated = URL_SAFE_NO_PAD.encode(&sig[..63]);
    parts[2] = &truncated;
    let mangled = parts.join(".");

    let err = engine
        .validate_access_token(&mangled, &HeaderMap::new())
        .await
        .unwrap_err();
    assert_eq!(err, ValidationError::BadSignature);
}

#[tokio::test]
async fn algorithm_outside_allowlist_is_rejected() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |cfg| {
        cfg.issuers[0].algorithms = vec![JwsAlgorithm::RS256];
    });
    let raw = mint(&key, "K1", &standard_claims(now()));

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnsupportedAlgorithm(_)));
}

#[tokio::test]
async fn unknown_kid_is_key_not_found() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let raw = mint(&key, "K-unknown", &standard_claims(now()));

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::KeyNotFound(_)));
}

#[tokio::test]
async fn audience_must_intersect_expected_set() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |cfg| {
        cfg.issuers[0].audiences = vec!["api".to_string()];
    });
    let now = now();
    let raw = mint(
        &key,
        "K1",
        &json!({ "iss": ISSUER, "sub": "u", "aud": "web", "iat": now, "exp": now + 600 }),
    );

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::AudienceMismatch(_)));
}

#[tokio::test]
async fn token_type_mismatch_is_rejected() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |cfg| {
        cfg.issuers[0].expected_type = Some("at+jwt".to_string());
    });
    let raw = mint_with_header(
        &key,
        &json!({ "alg": "ES256", "kid": "K1", "typ": "JWT" }),
        &standard_claims(now()),
    );

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::TokenTypeMismatch { .. }));
}

#[tokio::test]
async fn repeated_validation_is_deterministic() {
    let key = TestKey::ed25519();
    let engine = engine_with(&key, "K1", |cfg| {
        // Exercise the full pipeline both times
        cfg.cache = CacheConfig::default();
    });
    let raw = mint(&key, "K1", &standard_claims(now()));

    let first = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .expect("valid");
    let second = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .expect("still valid");
    assert_eq!(first, second);
}

#[tokio::test]
async fn identity_token_checks_nonce() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let now = now();
    let raw = mint(
        &key,
        "K1",
        &json!({
            "iss": ISSUER, "sub": "u", "aud": "client-1", "nonce": "n-123",
            "iat": now, "exp": now + 600,
            "email": "u@example.com", "name": "U",
        }),
    );

    let content = engine
        .validate_id_token(&raw, Some("n-123"))
        .await
        .expect("nonce matches");
    assert_eq!(content.nonce.as_deref(), Some("n-123"));
    assert_eq!(content.email.as_deref(), Some("u@example.com"));

    let err = engine.validate_id_token(&raw, Some("other")).await.unwrap_err();
    assert_eq!(err, ValidationError::NonceMismatch);

    // Nonce enforcement only applies when the caller expects one
    assert!(engine.validate_id_token(&raw, None).await.is_ok());
}

#[tokio::test]
async fn identity_token_with_multiple_audiences_requires_azp() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let now = now();
    let without_azp = mint(
        &key,
        "K1",
        &json!({
            "iss": ISSUER, "sub": "u", "aud": ["client-1", "client-2"],
            "iat": now, "exp": now + 600,
        }),
    );
    let err = engine.validate_id_token(&without_azp, None).await.unwrap_err();
    assert!(matches!(err, ValidationError::AuthorizedPartyMismatch(_)));

    let with_azp = mint(
        &key,
        "K1",
        &json!({
            "iss": ISSUER, "sub": "u", "aud": ["client-1", "client-2"], "azp": "client-1",
            "iat": now, "exp": now + 600,
        }),
    );
    assert!(engine.validate_id_token(&with_azp, None).await.is_ok());
}

#[tokio::test]
async fn refresh_tokens_parse_structurally() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});

    let opaque = engine
        .validate_refresh_token("opaque-refresh-token")
        .expect("opaque accepted");
    assert!(!opaque.is_jwt());

    let now = now();
    let jwt_shaped = mint(
        &key,
        "K1",
        &json!({ "iss": ISSUER, "sub": "u", "exp": now + 600 }),
    );
    let parsed = engine
        .validate_refresh_token(&jwt_shaped)
        .expect("jwt-shaped accepted");
    assert!(parsed.is_jwt());
    assert_eq!(
        parsed.expires_at.map(|at| at.timestamp()),
        Some(now + 600)
    );
}

#[tokio::test]
async fn missing_subject_is_rejected() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});
    let now = now();
    let raw = mint(
        &key,
        "K1",
        &json!({ "iss": ISSUER, "aud": "api", "iat": now, "exp": now + 600 }),
    );

    let err = engine
        .validate_access_token(&raw, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::MissingClaim(name) if name == "sub"));
}

#[tokio::test]
async fn every_failure_counts_exactly_one_event() {
    let key = TestKey::p256();
    let engine = engine_with(&key, "K1", |_| {});

    let _ = engine
        .validate_access_token("not-a-token", &HeaderMap::new())
        .await;
    let _ = engine
        .validate_access_token("also.not.valid", &HeaderMap::new())
        .await;

    let snapshot = engine.security_events();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.counts.get("malformed_token"), Some(&2));
}
