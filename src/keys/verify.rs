//! JWS signature verification
//!
//! Verifies a detached signature over a signing input given a parsed
//! verification key and a declared algorithm. Symmetric algorithms are never
//! accepted. ECDSA signatures arrive as IEEE P-1363 (`r || s`, the JWS wire
//! form) and are converted to ASN.1 DER before reaching the primitive; DER
//! input is passed through unchanged.

use aws_lc_rs::signature::{
    self, RsaPublicKeyComponents, UnparsedPublicKey, VerificationAlgorithm,
};
use serde::{Deserialize, Serialize};

use super::jwk::{EcCurve, KeyMaterial, OkpCurve};
use crate::error::ValidationError;

/// Asymmetric JWS signature algorithms this engine verifies.
///
/// The enum is closed: anything else — notably the `HS*` family — fails to
/// parse and is rejected as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// RSASSA-PSS with SHA-256
    PS256,
    /// RSASSA-PSS with SHA-384
    PS384,
    /// RSASSA-PSS with SHA-512
    PS512,
    /// ECDSA on P-256 with SHA-256
    ES256,
    /// ECDSA on P-384 with SHA-384
    ES384,
    /// ECDSA on P-521 with SHA-512
    ES512,
    /// Edwards-curve signatures (Ed25519)
    EdDSA,
}

impl JwsAlgorithm {
    /// All supported algorithms, in default preference order.
    pub const ALL: [Self; 10] = [
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::EdDSA,
    ];

    /// JOSE name of the algorithm.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Parse a JOSE `alg` value; `None` for symmetric or unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name() == name)
    }

    /// The curve an `ES*` algorithm requires, if any.
    #[must_use]
    fn ec_curve(self) -> Option<EcCurve> {
        match self {
            Self::ES256 => Some(EcCurve::P256),
            Self::ES384 => Some(EcCurve::P384),
            Self::ES512 => Some(EcCurve::P521),
            _ => None,
        }
    }
}

impl std::fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Verify `signature` over `signing_input` with `key` under `alg`.
///
/// # Errors
///
/// [`ValidationError::AlgorithmKeyMismatch`] when the key type cannot carry
/// the declared algorithm, [`ValidationError::BadSignature`] when the
/// cryptographic check (or ECDSA signature-shape validation) fails.
pub fn verify_signature(
    key: &KeyMaterial,
    alg: JwsAlgorithm,
    signing_input: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ValidationError> {
    match (alg, key) {
        (
            JwsAlgorithm::RS256
            | JwsAlgorithm::RS384
            | JwsAlgorithm::RS512
            | JwsAlgorithm::PS256
            | JwsAlgorithm::PS384
            | JwsAlgorithm::PS512,
            KeyMaterial::Rsa { n, e },
        ) => {
            let params = rsa_params(alg);
            RsaPublicKeyComponents { n, e }
                .verify(params, signing_input, signature_bytes)
                .map_err(|_| ValidationError::BadSignature)
        }
        (JwsAlgorithm::ES256 | JwsAlgorithm::ES384 | JwsAlgorithm::ES512, material) => {
            let expected_curve = alg.ec_curve().expect("ES* algorithms carry a curve");
            let KeyMaterial::Ec { curve, x, y } = material else {
                return Err(mismatch(alg, material));
            };
            if *curve != expected_curve {
                return Err(ValidationError::AlgorithmKeyMismatch(format!(
                    "{alg} requires a {} key, got {}",
                    expected_curve.name(),
                    curve.name()
                )));
            }
            let der = ecdsa_to_der(signature_bytes, curve.coordinate_len())?;
            let point = uncompressed_point(x, y);
            UnparsedPublicKey::new(ecdsa_params(alg), &point)
                .verify(signing_input, &der)
                .map_err(|_| ValidationError::BadSignature)
        }
        (JwsAlgorithm::EdDSA, KeyMaterial::Okp { curve, x }) => match curve {
            OkpCurve::Ed25519 => UnparsedPublicKey::new(&signature::ED25519, x)
                .verify(signing_input, signature_bytes)
                .map_err(|_| ValidationError::BadSignature),
            OkpCurve::Ed448 => Err(ValidationError::UnsupportedAlgorithm(
                "Ed448 signature verification is unavailable".to_string(),
            )),
        },
        (alg, material) => Err(mismatch(alg, material)),
    }
}

fn mismatch(alg: JwsAlgorithm, material: &KeyMaterial) -> ValidationError {
    ValidationError::AlgorithmKeyMismatch(format!(
        "{alg} cannot be verified with a {} key",
        material.kind()
    ))
}

fn rsa_params(alg: JwsAlgorithm) -> &'static signature::RsaParameters {
    match alg {
        JwsAlgorithm::RS256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        JwsAlgorithm::RS384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        JwsAlgorithm::RS512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        JwsAlgorithm::PS256 => &signature::RSA_PSS_2048_8192_SHA256,
        JwsAlgorithm::PS384 => &signature::RSA_PSS_2048_8192_SHA384,
        JwsAlgorithm::PS512 => &signature::RSA_PSS_2048_8192_SHA512,
        _ => unreachable!("caller matched an RSA algorithm"),
    }
}

fn ecdsa_params(alg: JwsAlgorithm) -> &'static dyn VerificationAlgorithm {
    match alg {
        JwsAlgorithm::ES256 => &signature::ECDSA_P256_SHA256_ASN1,
        JwsAlgorithm::ES384 => &signature::ECDSA_P384_SHA384_ASN1,
        JwsAlgorithm::ES512 => &signature::ECDSA_P521_SHA512_ASN1,
        _ => unreachable!("caller matched an ECDSA algorithm"),
    }
}

fn uncompressed_point(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    point
}

/// Normalize an ECDSA signature to ASN.1 DER.
///
/// A signature of exactly `2 * coordinate_len` bytes is IEEE P-1363 and gets
/// converted. Anything else must already start with a DER SEQUENCE tag;
/// remaining shapes cannot be a signature for the curve and are rejected
/// without touching the primitive.
fn ecdsa_to_der(sig: &[u8], coordinate_len: usize) -> Result<Vec<u8>, ValidationError> {
    if sig.len() == 2 * coordinate_len {
        let (r, s) = sig.split_at(coordinate_len);
        let r = der_integer(r);
        let s = der_integer(s);
        let mut out = vec![0x30];
        push_der_len(&mut out, r.len() + s.len());
        out.extend_from_slice(&r);
        out.extend_from_slice(&s);
        Ok(out)
    } else if sig.first() == Some(&0x30) {
        Ok(sig.to_vec())
    } else {
        Err(ValidationError::BadSignature)
    }
}

fn der_integer(scalar: &[u8]) -> Vec<u8> {
    let mut value = scalar;
    while value.len() > 1 && value[0] == 0 {
        value = &value[1..];
    }
    let pad = value.first().is_some_and(|b| b & 0x80 != 0);
    let mut out = vec![0x02];
    push_der_len(&mut out, value.len() + usize::from(pad));
    if pad {
        out.push(0);
    }
    out.extend_from_slice(value);
    out
}

fn push_der_len(out: &mut Vec<u8>, len: usize) {
    // ECDSA-Sig-Value content never exceeds 255 bytes, even on P-521.
    debug_assert!(len < 256);
    if len < 128 {
        out.push(u8::try_from(len).expect("checked above"));
    } else {
        out.push(0x81);
        out.push(u8::try_from(len).expect("checked above"));
    }
}
