//! QR payload encoding and the decoded-string interpretation chain.
//!
//! Image decoding happens elsewhere; this module starts from the decoded
//! text and tries, in order: base64-encoded JSON, raw JSON, opaque string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::types::CandidateId;

/// Failure reported by the image-decoding collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QrDecodeFailure {
    NoCodeFound,
    UnsupportedFormat,
}

impl QrDecodeFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            QrDecodeFailure::NoCodeFound => "NO_CODE_FOUND",
            QrDecodeFailure::UnsupportedFormat => "UNSUPPORTED_FORMAT",
        }
    }
}

/// Interpretation of a decoded QR string.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedQr {
    Base64Json(Value),
    RawJson(Value),
    Opaque(String),
    Unrecognized,
}

impl DecodedQr {
    /// The JSON document, for the two JSON variants.
    pub fn json(&self) -> Option<&Value> {
        match self {
            DecodedQr::Base64Json(v) | DecodedQr::RawJson(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecodedQr::Base64Json(_) => "base64_json",
            DecodedQr::RawJson(_) => "raw_json",
            DecodedQr::Opaque(_) => "opaque",
            DecodedQr::Unrecognized => "unrecognized",
        }
    }
}

/// One fallible step in the decoding chain.
trait QrDecoder {
    fn decode(&self, input: &str) -> Option<DecodedQr>;
}

fn structured(value: Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value),
        _ => None,
    }
}

struct Base64JsonDecoder;

impl QrDecoder for Base64JsonDecoder {
    fn decode(&self, input: &str) -> Option<DecodedQr> {
        let bytes = STANDARD.decode(input).ok()?;
        let value = serde_json::from_slice(&bytes).ok()?;
        structured(value).map(DecodedQr::Base64Json)
    }
}

struct RawJsonDecoder;

impl QrDecoder for RawJsonDecoder {
    fn decode(&self, input: &str) -> Option<DecodedQr> {
        let value = serde_json::from_str(input).ok()?;
        structured(value).map(DecodedQr::RawJson)
    }
}

struct OpaqueDecoder;

impl QrDecoder for OpaqueDecoder {
    fn decode(&self, input: &str) -> Option<DecodedQr> {
        Some(DecodedQr::Opaque(input.to_string()))
    }
}

/// Run the decoding chain over a decoded QR string.
pub fn decode_qr(input: &str) -> DecodedQr {
    let input = input.trim();
    if input.is_empty() {
        return DecodedQr::Unrecognized;
    }

    let chain: [&dyn QrDecoder; 3] = [&Base64JsonDecoder, &RawJsonDecoder, &OpaqueDecoder];
    chain
        .iter()
        .find_map(|decoder| decoder.decode(input))
        .unwrap_or(DecodedQr::Unrecognized)
}

/// Payload embedded in a candidate's shareable QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub candidate_id: CandidateId,
    pub timestamp: DateTime<Utc>,
    pub verification_url: String,
}

impl QrPayload {
    pub fn new(candidate_id: CandidateId, base_url: &str, now: DateTime<Utc>) -> Self {
        let verification_url = format!(
            "{}/verify/{}",
            base_url.trim_end_matches('/'),
            candidate_id
        );
        Self {
            candidate_id,
            timestamp: now,
            verification_url,
        }
    }

    /// JSON, then base64.
    pub fn encode(&self) -> Result<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chain_prefers_base64_json() {
        let encoded = STANDARD.encode(br#"{"candidateId":"c1"}"#);
        assert_eq!(
            decode_qr(&encoded),
            DecodedQr::Base64Json(json!({"candidateId": "c1"}))
        );
    }

    #[test]
    fn test_chain_falls_back_to_raw_json() {
        assert_eq!(
            decode_qr(r#" {"credentialId": "x"} "#),
            DecodedQr::RawJson(json!({"credentialId": "x"}))
        );
    }

    #[test]
    fn test_chain_falls_back_to_opaque() {
        assert_eq!(
            decode_qr("CRED-12345"),
            DecodedQr::Opaque("CRED-12345".into())
        );
        // Valid base64 that is not JSON stays opaque.
        assert_eq!(decode_qr("aGVsbG8="), DecodedQr::Opaque("aGVsbG8=".into()));
    }

    #[test]
    fn test_chain_empty_is_unrecognized() {
        assert_eq!(decode_qr("   "), DecodedQr::Unrecognized);
    }

    #[test]
    fn test_payload_encodes_for_chain() {
        let payload = QrPayload::new(CandidateId::new("c9"), "https://verify.example/", Utc::now());
        assert_eq!(payload.verification_url, "https://verify.example/verify/c9");

        let decoded = decode_qr(&payload.encode().unwrap());
        let back: QrPayload = serde_json::from_value(decoded.json().unwrap().clone()).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_failure_wire_names() {
        assert_eq!(
            serde_json::to_value(QrDecodeFailure::NoCodeFound).unwrap(),
            json!("NO_CODE_FOUND")
        );
        assert_eq!(QrDecodeFailure::UnsupportedFormat.as_str(), "UNSUPPORTED_FORMAT");
    }
}
