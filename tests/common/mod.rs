//! Shared test fixtures: signing keys, token minting, and a local IdP server
//! serving JWKS and discovery documents.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::rsa::KeySize;
use aws_lc_rs::signature::{
    self, ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair,
};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap as RequestHeaders, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use token_warden::keys::jwk::parse_jwk;
use token_warden::keys::jwk_thumbprint;

pub fn b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A signing keypair for minting test tokens.
pub enum TestKey {
    Rsa(RsaKeyPair),
    P256(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

impl TestKey {
    pub fn rsa() -> Self {
        Self::Rsa(RsaKeyPair::generate(KeySize::Rsa2048).expect("RSA keygen"))
    }

    pub fn p256() -> Self {
        Self::P256(EcdsaKeyPair::generate(&ECDSA_P256_SHA256_FIXED_SIGNING).expect("EC keygen"))
    }

    pub fn ed25519() -> Self {
        Self::Ed25519(Ed25519KeyPair::generate().expect("Ed25519 keygen"))
    }

    pub fn alg(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RS256",
            Self::P256(_) => "ES256",
            Self::Ed25519(_) => "EdDSA",
        }
    }

    /// The public half as a JWK object.
    pub fn public_jwk(&self, kid: &str) -> Value {
        match self {
            Self::Rsa(pair) => {
                let (n, e) = rsa_public_components(pair.public_key().as_ref());
                json!({ "kty": "RSA", "kid": kid, "use": "sig", "n": b64(&n), "e": b64(&e) })
            }
            Self::P256(pair) => {
                let point = pair.public_key().as_ref();
                assert_eq!(point.len(), 65, "expected uncompressed P-256 point");
                json!({
                    "kty": "EC", "crv": "P-256", "kid": kid, "use": "sig",
                    "x": b64(&point[1..33]), "y": b64(&point[33..65]),
                })
            }
            Self::Ed25519(pair) => json!({
                "kty": "OKP", "crv": "Ed25519", "kid": kid, "use": "sig",
                "x": b64(pair.public_key().as_ref()),
            }),
        }
    }

    /// A single-key JWKS document for this key.
    pub fn jwks(&self, kid: &str) -> String {
        json!({ "keys": [self.public_jwk(kid)] }).to_string()
    }

    /// RFC 7638 thumbprint of the public half.
    pub fn thumbprint(&self) -> String {
        let key = parse_jwk(&self.public_jwk("tp")).expect("own JWK parses");
        jwk_thumbprint(&key.material)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        match self {
            Self::Rsa(pair) => {
                // 2048-bit modulus ⇒ 256-byte signature
                let mut sig = vec![0u8; 256];
                pair.sign(&signature::RSA_PKCS1_SHA256, &rng, message, &mut sig)
                    .expect("RSA signing");
                sig
            }
            Self::P256(pair) => pair.sign(&rng, message).expect("EC signing").as_ref().to_vec(),
            Self::Ed25519(pair) => pair.sign(message).as_ref().to_vec(),
        }
    }
}

/// Mint a signed compact JWS with the conventional header for `key`.
pub fn mint(key: &TestKey, kid: &str, claims: &Value) -> String {
    mint_with_header(key, &json!({ "alg": key.alg(), "kid": kid }), claims)
}

/// Mint a signed compact JWS with full control over the header.
pub fn mint_with_header(key: &TestKey, header: &Value, claims: &Value) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let sig = key.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig))
}

/// Mint a DPoP proof JWT with `key` embedded in the header.
pub fn mint_proof(key: &TestKey, claims: &Value) -> String {
    mint_with_header(
        key,
        &json!({
            "typ": "dpop+jwt",
            "alg": key.alg(),
            "jwk": key.public_jwk("proof"),
        }),
        claims,
    )
}

/// Parse `RSAPublicKey ::= SEQUENCE { modulus INTEGER, exponent INTEGER }`.
fn rsa_public_components(der: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(der[0], 0x30, "expected DER SEQUENCE");
    let (_, content) = read_der_len(der, 1);
    let (n, next) = read_der_integer(der, content);
    let (e, _) = read_der_integer(der, next);
    (n, e)
}

fn read_der_len(der: &[u8], at: usize) -> (usize, usize) {
    let first = der[at];
    if first & 0x80 == 0 {
        (usize::from(first), at + 1)
    } else {
        let count = usize::from(first & 0x7f);
        let mut len = 0usize;
        for i in 0..count {
            len = (len << 8) | usize::from(der[at + 1 + i]);
        }
        (len, at + 1 + count)
    }
}

fn read_der_integer(der: &[u8], at: usize) -> (Vec<u8>, usize) {
    assert_eq!(der[at], 0x02, "expected DER INTEGER");
    let (len, start) = read_der_len(der, at + 1);
    let mut bytes = &der[start..start + len];
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    (bytes.to_vec(), start + len)
}

/// State of the local IdP fixture.
pub struct IdpState {
    pub issuer: RwLock<String>,
    pub jwks_uri: RwLock<String>,
    pub jwks: RwLock<String>,
    pub etag: RwLock<Option<String>>,
    pub fail_with: RwLock<Option<u16>>,
    pub failures_remaining: AtomicUsize,
    pub jwks_hits: AtomicUsize,
    pub not_modified_responses: AtomicUsize,
    pub discovery_hits: AtomicUsize,
}

/// A local HTTP server playing the role of an OIDC provider: serves
/// `/jwks` and `/.well-known/openid-configuration`.
pub struct TestIdp {
    pub base_url: String,
    pub state: Arc<IdpState>,
}

impl TestIdp {
    pub async fn spawn(issuer: &str, jwks: String) -> Self {
        let state = Arc::new(IdpState {
            issuer: RwLock::new(issuer.to_string()),
            jwks_uri: RwLock::new(String::new()),
            jwks: RwLock::new(jwks),
            etag: RwLock::new(Some("\"v1\"".to_string())),
            fail_with: RwLock::new(None),
            failures_remaining: AtomicUsize::new(0),
            jwks_hits: AtomicUsize::new(0),
            not_modified_responses: AtomicUsize::new(0),
            discovery_hits: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/jwks", get(serve_jwks))
            .route("/.well-known/openid-configuration", get(serve_discovery))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        *state.jwks_uri.write().unwrap() = format!("http://{addr}/jwks");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test idp serve");
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/jwks", self.base_url)
    }

    pub fn well_known_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.base_url)
    }

    /// Replace the served JWKS and bump the ETag.
    pub fn rotate_jwks(&self, jwks: String, etag: &str) {
        *self.state.jwks.write().unwrap() = jwks;
        *self.state.etag.write().unwrap() = Some(format!("\"{etag}\""));
    }

    /// Respond with `status` for the next `count` JWKS requests.
    pub fn fail_next(&self, status: u16, count: usize) {
        *self.state.fail_with.write().unwrap() = Some(status);
        self.state.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn jwks_hits(&self) -> usize {
        self.state.jwks_hits.load(Ordering::SeqCst)
    }

    pub fn not_modified_responses(&self) -> usize {
        self.state.not_modified_responses.load(Ordering::SeqCst)
    }
}

async fn serve_jwks(
    State(state): State<Arc<IdpState>>,
    headers: RequestHeaders,
) -> Response {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);

    if state.fail_with.read().unwrap().is_some()
        && state
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    {
        let status = state.fail_with.read().unwrap().unwrap_or(500);
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    let etag = state.etag.read().unwrap().clone();
    if let Some(etag) = &etag {
        let sent = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok());
        if sent == Some(etag.as_str()) {
            state.not_modified_responses.fetch_add(1, Ordering::SeqCst);
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    let body = state.jwks.read().unwrap().clone();
    let mut response = (StatusCode::OK, body).into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(
            header::ETAG,
            etag.parse().expect("etag is a valid header value"),
        );
    }
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
    response
}

async fn serve_discovery(State(state): State<Arc<IdpState>>) -> Response {
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);
    let issuer = state.issuer.read().unwrap().clone();
    // The fixture serves both endpoints from one listener, so jwks_uri is
    // derived from the request-independent base the server was spawned on.
    let body = json!({
        "issuer": issuer,
        "jwks_uri": state.jwks_uri.read().unwrap().clone(),
        "token_endpoint": format!("{issuer}/token"),
    })
    .to_string();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
