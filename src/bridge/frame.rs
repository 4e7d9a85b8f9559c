//! # Frames and Wire Envelopes
//!
//! `Frame` is what travels over either connection. The telephony side wraps its
//! audio in JSON with base64 payloads; the assistant side sends raw PCM as
//! binary frames.
//!
//! ## Telephony wire format:
//! - **Inbound**: `{"type":"audio","data":{"audio_b64":"<base64 PCM>"}}`
//! - **Outbound**: `{"type":"audio","audio_b64":"<base64 PCM>","chunk_id":<int>}`

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// One message received from or sent to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
        }
    }
}

/// Outcome of processing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOp<T> {
    /// Forward the payload downstream now
    Relay(T),
    /// Nothing to forward for this frame
    Pass,
}

/// Audio chunk sent back to the telephony platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAudio {
    #[serde(rename = "type")]
    pub kind: String,
    pub audio_b64: String,
    pub chunk_id: u64,
}

impl OutboundAudio {
    /// Wrap PCM bytes for the telephony side.
    pub fn new(audio: &[u8], chunk_id: u64) -> Self {
        Self {
            kind: "audio".to_string(),
            audio_b64: BASE64.encode(audio),
            chunk_id,
        }
    }

    /// Serialise into a text frame.
    pub fn into_frame(self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(&self).map(Frame::Text)
    }
}

/// Decode a standard base64 payload.
pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_envelope_shape() {
        let frame = OutboundAudio::new(b"ABC", 7).into_frame().unwrap();
        let Frame::Text(text) = frame else {
            panic!("envelope must be a text frame");
        };

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "audio");
        assert_eq!(value["audio_b64"], "QUJD");
        assert_eq!(value["chunk_id"], 7);
    }

    #[test]
    fn test_base64_round_trip() {
        let pcm: Vec<u8> = (0..=255u8).collect();
        let envelope = OutboundAudio::new(&pcm, 1);
        assert_eq!(decode_audio(&envelope.audio_b64).unwrap(), pcm);
    }

    #[test]
    fn test_frame_helpers() {
        assert_eq!(Frame::Binary(vec![1, 2, 3]).len(), 3);
        assert_eq!(Frame::Text("hi".into()).kind(), "text");
        assert!(Frame::Binary(Vec::new()).is_empty());
    }
}
