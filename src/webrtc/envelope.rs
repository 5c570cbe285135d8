//! Offer/answer envelopes exchanged with the avatar service

use crate::errors::{Result, RtcError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{type, sdp}` as carried inside the base64 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpEnvelope {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

impl SdpEnvelope {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: "offer".to_string(),
            sdp: sdp.into(),
        }
    }
}

/// Encode a local offer the way the service expects it in `client_sdp`.
pub fn encode_offer(sdp: &str) -> Result<String> {
    let json = serde_json::to_string(&SdpEnvelope::offer(sdp))?;
    Ok(STANDARD.encode(json))
}

/// Reverse of [`encode_offer`]; also accepts any base64 JSON with an `sdp` field.
pub fn decode_envelope(encoded: &str) -> Result<String> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let value: Value = serde_json::from_slice(&bytes)?;
    value
        .get("sdp")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RtcError::InvalidAnswer("encoded envelope has no sdp field".to_string()))
}

/// Which field an answer SDP was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    ServerSdp,
    Sdp,
    Answer,
}

/// Pull the answer SDP out of an inbound message.
///
/// Lookup order is `server_sdp` (base64 JSON), then `sdp`, then `answer`.
/// The first field present decides; a malformed `server_sdp` is an error
/// rather than a fallthrough.
pub fn extract_answer_sdp(message: &Value) -> Result<(AnswerShape, String)> {
    if let Some(encoded) = message.get("server_sdp").and_then(Value::as_str) {
        return Ok((AnswerShape::ServerSdp, decode_envelope(encoded)?));
    }
    if let Some(sdp) = message.get("sdp").and_then(Value::as_str) {
        return Ok((AnswerShape::Sdp, sdp.to_string()));
    }
    if let Some(sdp) = message.get("answer").and_then(Value::as_str) {
        return Ok((AnswerShape::Answer, sdp.to_string()));
    }
    Err(RtcError::InvalidAnswer(
        "message carries none of server_sdp, sdp, answer".to_string(),
    ))
}
