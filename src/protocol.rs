//! Control envelopes for the duplex voice channel
//!
//! Every non-binary frame on the channel is one tagged JSON envelope from a
//! closed set of kinds. Unknown kinds are a protocol error at the parsing
//! boundary, not something handlers discover later. Downstream playback audio
//! travels as raw binary WebSocket frames and never appears here.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A control frame on the client/relay channel
///
/// The `type` tag on the wire uses `snake_case` kind names. Audio payloads
/// inside envelopes are base64 text; their serialized size is bounded by the
/// transport chunker before they get here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEnvelope {
    /// One bounded chunk of base64 PCM16 capture audio (client to relay)
    AudioChunk { data: String },
    /// Capture input has ended for this turn (client to relay)
    EndAudio,
    /// The caller started speaking over playback; drop queued audio now
    Interrupted,
    /// The engine finished speaking for this turn
    TurnComplete,
    /// An agent handoff is settling; playback should expect a masked pause
    HandoffPending,
    /// Recoverable condition, session continues
    Warning { message: String },
    /// Fatal condition, session ends after delivery
    Error { message: String },
    /// Session established, first envelope on a new channel
    SessionStarted { session_id: uuid::Uuid },
    /// Client asks the relay to tear the session down
    EndSession,
    /// Out-of-band text input routed through the same session
    TextMessage { text: String },
    /// Final transcript of what the caller said
    UserTranscript { transcript: String },
    /// Final transcript of what the engine said
    AssistantTranscript { transcript: String },
}

impl ControlEnvelope {
    /// Build an `AudioChunk` envelope from raw PCM16 bytes.
    #[must_use]
    pub fn audio_chunk(payload: &[u8]) -> Self {
        Self::AudioChunk {
            data: base64::engine::general_purpose::STANDARD.encode(payload),
        }
    }

    /// Serialize for a text WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` for malformed JSON or an unknown kind.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("invalid envelope: {e}")))
    }
}

/// Decode the base64 audio payload of an `AudioChunk`.
///
/// # Errors
///
/// Returns `Error::Protocol` if the payload is not valid base64.
pub fn decode_audio_payload(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::Protocol(format!("invalid audio payload: {e}")))
}
