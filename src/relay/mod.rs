//! Bridge relay between the client channel and the speech engine
//!
//! The relay is a pure transformation: engine events map to outbound client
//! frames, client envelopes map to engine commands. It owns no audio state
//! beyond the pending-handoff flag, so both directions can be pumped by
//! independent tasks without sharing anything else.
//!
//! Forwarding rules worth knowing:
//! - interruption envelopes go out with no transformation delay
//! - audio always goes out, split when a payload would reach the transport
//!   ceiling, and is never retried
//! - a handoff tool call pads the downstream stream with silence until the
//!   next genuine delta arrives
//! - engine complaints about already-truncated audio are warnings; every
//!   other engine error ends the session

mod handoff;

pub use handoff::{HandoffDetector, MarkerDetector};

use crate::audio::{silence_bytes, split_payload};
use crate::config::{AudioConfig, HandoffConfig};
use crate::engine::{EngineCommand, EngineEvent};
use crate::guardrail::{Guardrail, Permissive};
use crate::protocol::{ControlEnvelope, decode_audio_payload};

/// Engine error substring marking a recoverable truncation complaint
const TRUNCATION_MARKER: &str = "already shorter than";

/// Client-facing text for that complaint
const SYNC_WARNING: &str = "Audio sync issue detected, continuing";

/// One frame headed for the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON control envelope
    Envelope(ControlEnvelope),
    /// Raw PCM16 bytes, sent as a single binary frame
    Audio(Vec<u8>),
}

/// Per-session relay state
pub struct RelaySession {
    detector: Box<dyn HandoffDetector>,
    guardrail: Box<dyn Guardrail>,
    sample_rate: u32,
    silence_secs: f64,
    frame_ceiling: usize,
    handoff_pending: bool,
    finished: bool,
}

impl RelaySession {
    /// Create a relay with the default marker detector and a permissive
    /// guardrail.
    #[must_use]
    pub fn new(audio: &AudioConfig, handoff: &HandoffConfig) -> Self {
        Self {
            detector: Box::new(MarkerDetector::from(handoff)),
            guardrail: Box::new(Permissive),
            sample_rate: audio.sample_rate,
            silence_secs: handoff.silence_secs,
            frame_ceiling: audio.transport_ceiling,
            handoff_pending: false,
            finished: false,
        }
    }

    /// Swap in a different handoff predicate.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn HandoffDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Swap in a different text guardrail.
    #[must_use]
    pub fn with_guardrail(mut self, guardrail: Box<dyn Guardrail>) -> Self {
        self.guardrail = guardrail;
        self
    }

    /// True once the session should stop pumping events.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// True between a detected handoff and the next genuine delta.
    #[must_use]
    pub const fn handoff_pending(&self) -> bool {
        self.handoff_pending
    }

    /// Map one engine event to the frames the client should receive.
    pub fn handle_engine_event(&mut self, event: EngineEvent) -> Vec<Outbound> {
        match event {
            EngineEvent::SessionCreated => {
                tracing::debug!("engine session live");
                Vec::new()
            }
            EngineEvent::AudioDelta(bytes) => {
                if self.handoff_pending {
                    self.handoff_pending = false;
                    tracing::debug!("handoff settled, engine audio resumed");
                }
                self.split_downstream(&bytes)
            }
            EngineEvent::AudioDone => {
                vec![Outbound::Envelope(ControlEnvelope::TurnComplete)]
            }
            EngineEvent::Interrupted => {
                vec![Outbound::Envelope(ControlEnvelope::Interrupted)]
            }
            EngineEvent::UserTranscript(transcript) => {
                vec![Outbound::Envelope(ControlEnvelope::UserTranscript {
                    transcript,
                })]
            }
            EngineEvent::AssistantTranscript(transcript) => {
                vec![Outbound::Envelope(ControlEnvelope::AssistantTranscript {
                    transcript,
                })]
            }
            EngineEvent::ToolCall { name } => self.handle_tool_call(&name),
            EngineEvent::Error(message) => {
                if message.contains(TRUNCATION_MARKER) {
                    tracing::warn!(%message, "recoverable engine complaint");
                    vec![Outbound::Envelope(ControlEnvelope::Warning {
                        message: SYNC_WARNING.to_string(),
                    })]
                } else {
                    tracing::error!(%message, "fatal engine error");
                    self.finished = true;
                    vec![Outbound::Envelope(ControlEnvelope::Error { message })]
                }
            }
            EngineEvent::Closed => {
                tracing::debug!("engine connection closed");
                self.finished = true;
                Vec::new()
            }
        }
    }

    /// Map one client envelope to engine commands plus immediate replies.
    pub async fn handle_client_envelope(
        &mut self,
        envelope: ControlEnvelope,
    ) -> (Vec<EngineCommand>, Vec<Outbound>) {
        match envelope {
            ControlEnvelope::AudioChunk { data } => match decode_audio_payload(&data) {
                Ok(bytes) if !bytes.is_empty() && bytes.len() % 2 == 0 => {
                    (vec![EngineCommand::AppendAudio(bytes)], Vec::new())
                }
                Ok(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping torn audio chunk");
                    (Vec::new(), Vec::new())
                }
                Err(error) => {
                    tracing::warn!(%error, "skipping undecodable audio chunk");
                    (Vec::new(), Vec::new())
                }
            },
            ControlEnvelope::EndAudio => {
                // Turn-end is the engine VAD's call; nothing to forward.
                tracing::debug!("client finished sending audio");
                (Vec::new(), Vec::new())
            }
            ControlEnvelope::TextMessage { text } => {
                let verdict = self.guardrail.check(&text).await;
                if verdict.allowed {
                    (vec![EngineCommand::SendText(text)], Vec::new())
                } else {
                    let message = verdict
                        .reason
                        .unwrap_or_else(|| "message rejected".to_string());
                    tracing::info!(%message, "guardrail blocked client text");
                    (
                        Vec::new(),
                        vec![Outbound::Envelope(ControlEnvelope::Warning { message })],
                    )
                }
            }
            ControlEnvelope::EndSession => {
                tracing::debug!("client ended session");
                self.finished = true;
                (vec![EngineCommand::Close], Vec::new())
            }
            other => {
                tracing::warn!(?other, "unexpected envelope from client");
                (Vec::new(), Vec::new())
            }
        }
    }

    fn handle_tool_call(&mut self, name: &str) -> Vec<Outbound> {
        if !self.detector.is_handoff(name) {
            tracing::trace!(tool = name, "tool call without handoff");
            return Vec::new();
        }

        tracing::info!(tool = name, "handoff detected, padding with silence");
        self.handoff_pending = true;
        let silence = silence_bytes(self.silence_secs, self.sample_rate);
        self.split_downstream(&silence)
    }

    /// Split audio so no binary frame reaches the transport ceiling.
    fn split_downstream(&self, bytes: &[u8]) -> Vec<Outbound> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let cap = self.frame_ceiling.saturating_sub(1) & !1;
        split_payload(bytes, cap)
            .into_iter()
            .map(Outbound::Audio)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::guardrail::MaxLength;

    fn relay() -> RelaySession {
        let config = Config::default();
        RelaySession::new(&config.audio, &config.handoff)
    }

    // ---- engine events ----

    #[test]
    fn delta_goes_out_as_one_binary_frame() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::AudioDelta(vec![1, 2, 3, 4]));
        assert_eq!(out, vec![Outbound::Audio(vec![1, 2, 3, 4])]);
    }

    #[test]
    fn oversized_delta_is_split_below_ceiling() {
        let ceiling = Config::default().audio.transport_ceiling;
        let mut relay = relay();
        let big: Vec<u8> = (0..700 * 1024).map(|i| u8::try_from(i % 256).unwrap()).collect();

        let out = relay.handle_engine_event(EngineEvent::AudioDelta(big.clone()));

        assert!(out.len() >= 3);
        let mut rebuilt = Vec::new();
        for frame in &out {
            let Outbound::Audio(bytes) = frame else {
                panic!("expected only audio frames");
            };
            assert!(bytes.len() < ceiling);
            assert_eq!(bytes.len() % 2, 0);
            rebuilt.extend_from_slice(bytes);
        }
        assert_eq!(rebuilt, big);
    }

    #[test]
    fn interrupted_is_forwarded_unchanged() {
        let out = relay().handle_engine_event(EngineEvent::Interrupted);
        assert_eq!(out, vec![Outbound::Envelope(ControlEnvelope::Interrupted)]);
    }

    #[test]
    fn audio_done_becomes_turn_complete() {
        let out = relay().handle_engine_event(EngineEvent::AudioDone);
        assert_eq!(out, vec![Outbound::Envelope(ControlEnvelope::TurnComplete)]);
    }

    #[test]
    fn transcripts_keep_their_direction() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::UserTranscript("two please".into()));
        assert_eq!(
            out,
            vec![Outbound::Envelope(ControlEnvelope::UserTranscript {
                transcript: "two please".into()
            })]
        );

        let out =
            relay.handle_engine_event(EngineEvent::AssistantTranscript("right away".into()));
        assert_eq!(
            out,
            vec![Outbound::Envelope(ControlEnvelope::AssistantTranscript {
                transcript: "right away".into()
            })]
        );
    }

    // ---- handoff ----

    #[test]
    fn handoff_tool_injects_silence_and_sets_flag() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::ToolCall {
            name: "transfer_to_reservation_specialist".into(),
        });

        assert!(relay.handoff_pending());
        let total: usize = out
            .iter()
            .map(|frame| match frame {
                Outbound::Audio(bytes) => bytes.len(),
                Outbound::Envelope(_) => panic!("expected only audio frames"),
            })
            .sum();
        // 2 s of PCM16 at 24 kHz.
        assert_eq!(total, 96_000);
    }

    #[test]
    fn routing_transfer_is_silent() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::ToolCall {
            name: "transfer_to_main_agent".into(),
        });
        assert!(out.is_empty());
        assert!(!relay.handoff_pending());
    }

    #[test]
    fn ordinary_tool_is_ignored() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::ToolCall {
            name: "lookup_menu".into(),
        });
        assert!(out.is_empty());
        assert!(!relay.handoff_pending());
    }

    #[test]
    fn genuine_delta_clears_pending_handoff() {
        let mut relay = relay();
        relay.handle_engine_event(EngineEvent::ToolCall {
            name: "handoff_to_specialist".into(),
        });
        assert!(relay.handoff_pending());

        relay.handle_engine_event(EngineEvent::AudioDelta(vec![0, 0]));
        assert!(!relay.handoff_pending());
    }

    // ---- engine errors ----

    #[test]
    fn truncation_complaint_is_a_warning_not_fatal() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::Error(
            "Audio content of 23ms is already shorter than 60ms".into(),
        ));

        assert_eq!(
            out,
            vec![Outbound::Envelope(ControlEnvelope::Warning {
                message: SYNC_WARNING.to_string()
            })]
        );
        assert!(!relay.is_finished());
    }

    #[test]
    fn other_engine_errors_end_the_session() {
        let mut relay = relay();
        let out = relay.handle_engine_event(EngineEvent::Error("session expired".into()));

        assert_eq!(
            out,
            vec![Outbound::Envelope(ControlEnvelope::Error {
                message: "session expired".to_string()
            })]
        );
        assert!(relay.is_finished());
    }

    #[test]
    fn engine_close_finishes_quietly() {
        let mut relay = relay();
        assert!(relay.handle_engine_event(EngineEvent::Closed).is_empty());
        assert!(relay.is_finished());
    }

    // ---- client envelopes ----

    #[tokio::test]
    async fn audio_chunk_is_decoded_and_appended() {
        let mut relay = relay();
        let envelope = ControlEnvelope::audio_chunk(&[1, 0, 2, 0]);
        let (commands, out) = relay.handle_client_envelope(envelope).await;

        assert_eq!(commands, vec![EngineCommand::AppendAudio(vec![1, 0, 2, 0])]);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn undecodable_chunk_is_skipped() {
        let mut relay = relay();
        let envelope = ControlEnvelope::AudioChunk {
            data: "!!!".into(),
        };
        let (commands, out) = relay.handle_client_envelope(envelope).await;

        assert!(commands.is_empty());
        assert!(out.is_empty());
        assert!(!relay.is_finished());
    }

    #[tokio::test]
    async fn odd_length_chunk_is_skipped() {
        let mut relay = relay();
        // Three raw bytes cannot be whole PCM16 samples.
        let envelope = ControlEnvelope::audio_chunk(&[1, 2, 3]);
        let (commands, _) = relay.handle_client_envelope(envelope).await;
        assert!(commands.is_empty());
    }

    #[tokio::test]
    async fn end_audio_sends_nothing_upstream() {
        let mut relay = relay();
        let (commands, out) = relay.handle_client_envelope(ControlEnvelope::EndAudio).await;
        assert!(commands.is_empty());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn text_passes_permissive_guardrail() {
        let mut relay = relay();
        let envelope = ControlEnvelope::TextMessage {
            text: "a table for four".into(),
        };
        let (commands, out) = relay.handle_client_envelope(envelope).await;

        assert_eq!(
            commands,
            vec![EngineCommand::SendText("a table for four".to_string())]
        );
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn rejected_text_becomes_warning() {
        let mut relay = relay().with_guardrail(Box::new(MaxLength(8)));
        let envelope = ControlEnvelope::TextMessage {
            text: "a very long reservation request".into(),
        };
        let (commands, out) = relay.handle_client_envelope(envelope).await;

        assert!(commands.is_empty());
        assert!(matches!(
            out.as_slice(),
            [Outbound::Envelope(ControlEnvelope::Warning { .. })]
        ));
        assert!(!relay.is_finished());
    }

    #[tokio::test]
    async fn end_session_closes_engine() {
        let mut relay = relay();
        let (commands, _) = relay
            .handle_client_envelope(ControlEnvelope::EndSession)
            .await;

        assert_eq!(commands, vec![EngineCommand::Close]);
        assert!(relay.is_finished());
    }
}
