//! JWK and JWK Set parsing (RFC 7517)
//!
//! Parses JWK objects into [`VerificationKey`]s holding raw public key
//! material. Supported key types: RSA, EC (P-256/P-384/P-521) and OKP
//! (Ed25519/Ed448). Private-key members are ignored; only the public parts
//! are retained.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure to interpret a JWK or JWK Set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The JWK is not a JSON object
    #[error("JWK is not a JSON object")]
    NotAnObject,

    /// `kty` names a key type this engine does not verify
    #[error("unsupported key type {0:?}")]
    UnsupportedKeyType(String),

    /// `crv` names an unrecognized curve
    #[error("unrecognized curve {0:?}")]
    UnknownCurve(String),

    /// A required member for the declared `kty` is absent
    #[error("JWK of type {kty} is missing {field:?}")]
    MissingField {
        /// Declared key type
        kty: &'static str,
        /// Absent member name
        field: &'static str,
    },

    /// A key member is not valid base64url
    #[error("JWK member {0:?} is not base64url")]
    InvalidEncoding(&'static str),

    /// Key material has an implausible length
    #[error("implausible key material: {0}")]
    KeyLength(String),

    /// The JWK Set document is not valid JSON of the expected shape
    #[error("JWK set parse error: {0}")]
    Json(String),

    /// The JWK Set contains no usable signature keys
    #[error("JWK set contains no usable keys")]
    Empty,
}

/// NIST curves accepted for EC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    /// secp256r1
    P256,
    /// secp384r1
    P384,
    /// secp521r1
    P521,
}

impl EcCurve {
    /// JOSE curve name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Byte length of one coordinate (and of one ECDSA signature half).
    #[must_use]
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    fn from_name(name: &str) -> Result<Self, KeyError> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            other => Err(KeyError::UnknownCurve(other.to_string())),
        }
    }
}

/// Edwards curves accepted for OKP keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkpCurve {
    /// Ed25519 (32-byte public key)
    Ed25519,
    /// Ed448 (57-byte public key)
    Ed448,
}

impl OkpCurve {
    /// JOSE curve name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Ed448 => "Ed448",
        }
    }

    fn public_key_len(self) -> usize {
        match self {
            Self::Ed25519 => 32,
            Self::Ed448 => 57,
        }
    }

    fn from_name(name: &str) -> Result<Self, KeyError> {
        match name {
            "Ed25519" => Ok(Self::Ed25519),
            "Ed448" => Ok(Self::Ed448),
            other => Err(KeyError::UnknownCurve(other.to_string())),
        }
    }
}

/// Decoded public key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// RSA public key (big-endian modulus and exponent)
    Rsa {
        /// Modulus bytes
        n: Vec<u8>,
        /// Public exponent bytes
        e: Vec<u8>,
    },
    /// EC public key (fixed-length affine coordinates)
    Ec {
        /// Curve the point lies on
        curve: EcCurve,
        /// X coordinate
        x: Vec<u8>,
        /// Y coordinate
        y: Vec<u8>,
    },
    /// Edwards public key
    Okp {
        /// Edwards curve
        curve: OkpCurve,
        /// Raw public key bytes
        x: Vec<u8>,
    },
}

impl KeyMaterial {
    /// Short human name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RSA",
            Self::Ec { .. } => "EC",
            Self::Okp { .. } => "OKP",
        }
    }
}

/// A verification key extracted from a JWK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    /// `kid` member, when present
    pub kid: Option<String>,
    /// Decoded public material
    pub material: KeyMaterial,
}

fn member<'a>(obj: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a str> {
    obj.get(name).and_then(Value::as_str)
}

fn decode_member(
    obj: &serde_json::Map<String, Value>,
    kty: &'static str,
    field: &'static str,
) -> Result<Vec<u8>, KeyError> {
    let raw = member(obj, field).ok_or(KeyError::MissingField { kty, field })?;
    URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| KeyError::InvalidEncoding(field))
}

/// Parse one JWK into a [`VerificationKey`].
///
/// Validates required members per `kty`, curve recognition, and key-material
/// length plausibility. Never touches private members.
pub fn parse_jwk(value: &Value) -> Result<VerificationKey, KeyError> {
    let obj = value.as_object().ok_or(KeyError::NotAnObject)?;
    let kty = member(obj, "kty").ok_or(KeyError::MissingField {
        kty: "?",
        field: "kty",
    })?;
    let kid = member(obj, "kid").map(str::to_string);

    let material = match kty {
        "RSA" => {
            let n = decode_member(obj, "RSA", "n")?;
            let e = decode_member(obj, "RSA", "e")?;
            if n.len() < 256 || n.len() > 1024 {
                return Err(KeyError::KeyLength(format!(
                    "RSA modulus of {} bytes (expected 2048..8192 bit)",
                    n.len()
                )));
            }
            if e.is_empty() || e.len() > 8 {
                return Err(KeyError::KeyLength(format!(
                    "RSA exponent of {} bytes",
                    e.len()
                )));
            }
            KeyMaterial::Rsa { n, e }
        }
        "EC" => {
            let crv = member(obj, "crv")
                .ok_or(KeyError::MissingField {
                    kty: "EC",
                    field: "crv",
                })
                .and_then(EcCurve::from_name)?;
            let x = decode_member(obj, "EC", "x")?;
            let y = decode_member(obj, "EC", "y")?;
            let want = crv.coordinate_len();
            if x.len() != want || y.len() != want {
                return Err(KeyError::KeyLength(format!(
                    "{} coordinates of {}/{} bytes (expected {want})",
                    crv.name(),
                    x.len(),
                    y.len()
                )));
            }
            KeyMaterial::Ec { curve: crv, x, y }
        }
        "OKP" => {
            let crv = member(obj, "crv")
                .ok_or(KeyError::MissingField {
                    kty: "OKP",
                    field: "crv",
                })
                .and_then(OkpCurve::from_name)?;
            let x = decode_member(obj, "OKP", "x")?;
            if x.len() != crv.public_key_len() {
                return Err(KeyError::KeyLength(format!(
                    "{} public key of {} bytes (expected {})",
                    crv.name(),
                    x.len(),
                    crv.public_key_len()
                )));
            }
            KeyMaterial::Okp { curve: crv, x }
        }
        // "oct" and anything exotic: this engine only verifies asymmetric
        // signatures.
        other => return Err(KeyError::UnsupportedKeyType(other.to_string())),
    };

    Ok(VerificationKey { kid, material })
}

/// Parse a JWK Set document into the usable signature keys, keyed by kid.
///
/// Keys that are unusable (wrong `use`, unknown type, missing kid, malformed
/// members) are skipped with a warning, matching lenient upstream providers.
/// An empty result is an error.
pub fn parse_jwk_set(bytes: &[u8]) -> Result<Vec<VerificationKey>, KeyError> {
    let doc: Value =
        serde_json::from_slice(bytes).map_err(|e| KeyError::Json(e.to_string()))?;
    let keys = doc
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| KeyError::Json("missing \"keys\" array".to_string()))?;

    let mut out = Vec::with_capacity(keys.len());
    for entry in keys {
        if let Some(key_use) = entry.get("use").and_then(Value::as_str) {
            if key_use != "sig" {
                debug!(key_use, "skipping non-signature JWK");
                continue;
            }
        }
        match parse_jwk(entry) {
            Ok(key) if key.kid.is_some() => out.push(key),
            Ok(_) => warn!("skipping JWK without kid (lookup is kid-based)"),
            Err(err) => warn!(%err, "skipping unusable JWK"),
        }
    }

    if out.is_empty() {
        return Err(KeyError::Empty);
    }
    Ok(out)
}
