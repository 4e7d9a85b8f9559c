//! # Frame Classification
//!
//! Decides what each inbound frame means for the bridge. Classification errors
//! are ordinary control flow: they are logged and the frame is passed, never
//! propagated to the session.

use crate::bridge::frame::{decode_audio, Frame, StreamOp};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Why a telephony frame could not be decoded.
#[derive(Debug)]
pub enum FrameError {
    /// Text was not valid JSON
    Json(serde_json::Error),
    /// A required field was absent or not a string
    MissingField(&'static str),
    /// `audio_b64` was not valid base64
    Base64(base64::DecodeError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Json(err) => write!(f, "invalid JSON: {}", err),
            FrameError::MissingField(field) => write!(f, "missing field `{}`", field),
            FrameError::Base64(err) => write!(f, "invalid base64 audio: {}", err),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        FrameError::Json(err)
    }
}

impl From<base64::DecodeError> for FrameError {
    fn from(err: base64::DecodeError) -> Self {
        FrameError::Base64(err)
    }
}

/// Decode one frame from the telephony connection.
///
/// ## Returns:
/// - **Ok(Relay(pcm))**: an audio event, with its decoded PCM
/// - **Ok(Pass)**: a well-formed non-audio event, or a binary frame
/// - **Err(..)**: the frame could not be understood
pub fn decode_call_frame(frame: &Frame) -> Result<StreamOp<Vec<u8>>, FrameError> {
    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(data) => {
            debug!(bytes = data.len(), "Ignoring binary frame from telephony");
            return Ok(StreamOp::Pass);
        }
    };

    let message: Value = serde_json::from_str(text)?;
    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingField("type"))?;

    if kind != "audio" {
        debug!(event = kind, "Telephony event");
        return Ok(StreamOp::Pass);
    }

    let encoded = message
        .pointer("/data/audio_b64")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingField("data.audio_b64"))?;

    Ok(StreamOp::Relay(decode_audio(encoded)?))
}

/// Classify a telephony frame, passing anything that fails to decode.
pub fn classify_call_frame(frame: &Frame) -> StreamOp<Vec<u8>> {
    decode_call_frame(frame).unwrap_or_else(|err| {
        warn!(error = %err, bytes = frame.len(), "Dropping malformed telephony frame");
        StreamOp::Pass
    })
}

/// Split an assistant frame into audio (for the aggregator) or control.
///
/// Control messages are logged and passed.
pub fn classify_assistant_frame(frame: Frame) -> StreamOp<Vec<u8>> {
    match frame {
        Frame::Binary(data) => StreamOp::Relay(data),
        Frame::Text(text) => {
            info!(message = %text, "Assistant control");
            StreamOp::Pass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(json: &str) -> Frame {
        Frame::Text(json.to_string())
    }

    #[test]
    fn test_audio_event_is_relayed() {
        let frame = text(r#"{"type":"audio","data":{"audio_b64":"QUJD"}}"#);
        assert_eq!(classify_call_frame(&frame), StreamOp::Relay(b"ABC".to_vec()));
    }

    #[test]
    fn test_other_events_pass() {
        for json in [
            r#"{"type":"start","data":{"stream_id":"abc"}}"#,
            r#"{"type":"dtmf","data":{"digit":"5"}}"#,
            r#"{"type":"Audio","data":{"audio_b64":"QUJD"}}"#,
        ] {
            assert_eq!(classify_call_frame(&text(json)), StreamOp::Pass, "{}", json);
        }
    }

    #[test]
    fn test_malformed_json_passes() {
        let frame = text("{not json");
        assert!(matches!(decode_call_frame(&frame), Err(FrameError::Json(_))));
        assert_eq!(classify_call_frame(&frame), StreamOp::Pass);
    }

    #[test]
    fn test_missing_fields_pass() {
        let no_type = text(r#"{"data":{"audio_b64":"QUJD"}}"#);
        assert!(matches!(decode_call_frame(&no_type), Err(FrameError::MissingField("type"))));

        let no_audio = text(r#"{"type":"audio","data":{}}"#);
        assert!(matches!(
            decode_call_frame(&no_audio),
            Err(FrameError::MissingField("data.audio_b64"))
        ));
        assert_eq!(classify_call_frame(&no_audio), StreamOp::Pass);
    }

    #[test]
    fn test_bad_base64_passes() {
        let frame = text(r#"{"type":"audio","data":{"audio_b64":"!!!"}}"#);
        assert!(matches!(decode_call_frame(&frame), Err(FrameError::Base64(_))));
        assert_eq!(classify_call_frame(&frame), StreamOp::Pass);
    }

    #[test]
    fn test_binary_from_telephony_passes() {
        assert_eq!(classify_call_frame(&Frame::Binary(vec![1, 2])), StreamOp::Pass);
    }

    #[test]
    fn test_assistant_frames() {
        assert_eq!(
            classify_assistant_frame(Frame::Binary(vec![1, 2])),
            StreamOp::Relay(vec![1, 2])
        );
        assert_eq!(
            classify_assistant_frame(text(r#"{"type":"speech-update"}"#)),
            StreamOp::Pass
        );
    }
}
