use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::playback::AudioFragment;

/// JSON envelope carried by every text frame, in both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("'{0}' frame has no string payload")]
    MissingPayload(String),

    #[error("audio payload is not valid base64: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

/// Message received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(String),
    /// Structured extraction result, interpreted by the session
    Object(Value),
    Audio(AudioFragment),
    Error(String),
    /// Keepalive reply, never dispatched
    Pong,
    Other { kind: String, payload: Value },
}

impl InboundMessage {
    pub fn parse(frame: &str) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_str(frame)?;

        let message = match envelope.kind.as_str() {
            "pong" => Self::Pong,
            "text" => Self::Text(string_payload(envelope)?),
            "error" => Self::Error(string_payload(envelope)?),
            "obj" => Self::Object(envelope.payload),
            "audio" => {
                let sequence_id = envelope.sentence_id.unwrap_or(0);
                let encoded = string_payload(envelope)?;
                Self::Audio(AudioFragment {
                    sequence_id,
                    payload: BASE64.decode(encoded.as_bytes())?,
                })
            }
            _ => Self::Other {
                kind: envelope.kind,
                payload: envelope.payload,
            },
        };

        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Object(_) => "obj",
            Self::Audio(_) => "audio",
            Self::Error(_) => "error",
            Self::Pong => "pong",
            Self::Other { kind, .. } => kind,
        }
    }
}

fn string_payload(envelope: Envelope) -> Result<String, MessageError> {
    match envelope.payload {
        Value::String(s) => Ok(s),
        _ => Err(MessageError::MissingPayload(envelope.kind)),
    }
}

/// Message sent to the server
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Recorded audio (WAV bytes), base64-encoded on the wire
    Audio(Vec<u8>),
    Text(String),
    Ping,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Text(_) => "text",
            Self::Ping => "ping",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let (payload, sentence_id) = match self {
            Self::Audio(bytes) => (Value::String(BASE64.encode(bytes)), Some(0)),
            Self::Text(text) => (Value::String(text.clone()), Some(0)),
            Self::Ping => (Value::Null, None),
        };
        Envelope {
            kind: self.kind().to_string(),
            payload,
            sentence_id,
        }
    }

    pub fn to_frame(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&self.to_envelope())?)
    }
}
