//! Compact JWS decoding
//!
//! Splits a compact serialization into header, body and signature without
//! verifying anything. All structural rules live here: exactly three parts,
//! canonical base64url (no padding), JSON objects for header and body, and
//! the configured size and nesting limits.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::config::ParserConfig;
use crate::error::{ValidationError, redact};

/// A decoded (not verified) compact JWS.
#[derive(Debug, Clone)]
pub struct DecodedJwt {
    /// Header parameters
    pub header: Map<String, Value>,
    /// Body claims
    pub body: Map<String, Value>,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// First part, verbatim
    pub header_b64: String,
    /// Second part, verbatim
    pub body_b64: String,
    /// Third part, verbatim
    pub signature_b64: String,
}

impl DecodedJwt {
    /// The exact bytes the signature covers: `header_b64 || '.' || body_b64`.
    #[must_use]
    pub fn signing_input(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(self.header_b64.len() + 1 + self.body_b64.len());
        input.extend_from_slice(self.header_b64.as_bytes());
        input.push(b'.');
        input.extend_from_slice(self.body_b64.as_bytes());
        input
    }

    /// A string-typed header parameter.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    /// A string-typed body claim.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }

    /// A numeric body claim as `i64` (JWT `NumericDate`s are numbers).
    #[must_use]
    pub fn claim_i64(&self, name: &str) -> Option<i64> {
        self.body.get(name).and_then(Value::as_i64)
    }
}

/// Decode a compact JWS under the given parser limits.
///
/// # Errors
///
/// [`ValidationError::MalformedToken`] for every structural violation; the
/// message never reproduces more than 16 characters of the input.
pub fn decode_compact(raw: &str, limits: &ParserConfig) -> Result<DecodedJwt, ValidationError> {
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

    let mut parts = raw.split('.');
    let (Some(header_b64), Some(body_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ValidationError::MalformedToken(format!(
            "expected 3 dot-separated parts in {:?}",
            redact(raw)
        )));
    };

    let header = decode_json_part(header_b64, "header", limits)?;
    let body = decode_json_part(body_b64, "body", limits)?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| ValidationError::MalformedToken("signature is not base64url".to_string()))?;

    Ok(DecodedJwt {
        header,
        body,
        signature,
        header_b64: header_b64.to_string(),
        body_b64: body_b64.to_string(),
        signature_b64: signature_b64.to_string(),
    })
}

fn decode_json_part(
    part: &str,
    what: &str,
    limits: &ParserConfig,
) -> Result<Map<String, Value>, ValidationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| ValidationError::MalformedToken(format!("{what} is not base64url")))?;
    if bytes.len() > limits.max_part_bytes {
        return Err(ValidationError::MalformedToken(format!(
            "{what} of {} bytes exceeds the {}-byte limit",
            bytes.len(),
            limits.max_part_bytes
        )));
    }
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|_| ValidationError::MalformedToken(format!("{what} is not valid JSON")))?;
    if json_depth(&value) > limits.max_json_depth {
        return Err(ValidationError::MalformedToken(format!(
            "{what} exceeds the nesting limit of {}",
            limits.max_json_depth
        )));
    }
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::MalformedToken(format!(
            "{what} is not a JSON object"
        ))),
    }
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn token(header: &Value, body: &Value) -> String {
        format!(
            "{}.{}.{}",
            encode(header),
            encode(body),
            URL_SAFE_NO_PAD.encode([1u8, 2, 3])
        )
    }

    #[test]
    fn decodes_well_formed_token() {
        let raw = token(
            &json!({ "alg": "RS256", "kid": "k1" }),
            &json!({ "iss": "https://issuer", "sub": "u" }),
        );
        let decoded = decode_compact(&raw, &ParserConfig::default()).unwrap();
        assert_eq!(decoded.header_str("alg"), Some("RS256"));
        assert_eq!(decoded.claim_str("iss"), Some("https://issuer"));
        assert_eq!(decoded.signature, vec![1, 2, 3]);
        assert_eq!(
            decoded.signing_input(),
            format!("{}.{}", decoded.header_b64, decoded.body_b64).into_bytes()
        );
    }

    #[test]
    fn rejects_wrong_part_count() {
        let limits = ParserConfig::default();
        for raw in ["a.b", "a.b.c.d", "", "no-dots-at-all"] {
            assert!(matches!(
                decode_compact(raw, &limits),
                Err(ValidationError::MalformedToken(_))
            ));
        }
    }

    #[test]
    fn rejects_padded_base64() {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg":"RS256"}).to_string());
        let body = format!("{}==", URL_SAFE_NO_PAD.encode(json!({"iss":"i"}).to_string()));
        let raw = format!("{header}.{body}.c2ln");
        assert!(matches!(
            decode_compact(&raw, &ParserConfig::default()),
            Err(ValidationError::MalformedToken(_))
        ));
    }

    #[test]
    fn rejects_non_object_body() {
        let raw = format!(
            "{}.{}.c2ln",
            encode(&json!({ "alg": "RS256" })),
            URL_SAFE_NO_PAD.encode("[1,2,3]")
        );
        assert!(matches!(
            decode_compact(&raw, &ParserConfig::default()),
            Err(ValidationError::MalformedToken(_))
        ));
    }

    #[test]
    fn enforces_token_size_limit() {
        let limits = ParserConfig {
            max_token_bytes: 64,
            ..ParserConfig::default()
        };
        let raw = token(
            &json!({ "alg": "RS256" }),
            &json!({ "iss": "https://issuer", "sub": "user-with-a-sufficiently-long-identifier" }),
        );
        assert!(raw.len() > 64);
        assert!(matches!(
            decode_compact(&raw, &limits),
            Err(ValidationError::MalformedToken(_))
        ));
    }

    #[test]
    fn enforces_nesting_limit() {
        let limits = ParserConfig {
            max_json_depth: 3,
            ..ParserConfig::default()
        };
        let raw = token(
            &json!({ "alg": "RS256" }),
            &json!({ "a": { "b": { "c": { "d": 1 } } } }),
        );
        assert!(matches!(
            decode_compact(&raw, &limits),
            Err(ValidationError::MalformedToken(_))
        ));
    }

    #[test]
    fn error_message_truncates_input() {
        let raw = "x".repeat(100);
        let Err(ValidationError::MalformedToken(msg)) =
            decode_compact(&raw, &ParserConfig::default())
        else {
            panic!("expected malformed token");
        };
        assert!(!msg.contains(&raw));
    }
}
