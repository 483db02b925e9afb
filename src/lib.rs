//! Bistro Bridge - realtime voice bridge for restaurant ordering
//!
//! This library provides the core functionality for the bridge:
//! - Fixed-window capture encoding and transport-size chunking
//! - A duplex WebSocket channel of typed control envelopes plus binary audio
//! - A relay that shuttles audio between callers and the speech engine,
//!   masking agent handoffs and honoring barge-in
//! - Gapless playback scheduling with interruption
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Callers                          │
//! │   native client (cpal)  │  app / web frontends      │
//! └────────────────────┬────────────────────────────────┘
//!                      │  envelopes up, binary audio down
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Bistro Bridge                        │
//! │   Capture  │  Chunker  │  Relay  │  Playback        │
//! └────────────────────┬────────────────────────────────┘
//!                      │  PCM16 both ways
//! ┌────────────────────▼────────────────────────────────┐
//! │              Realtime Speech Engine                  │
//! │   STT  │  agent + tools  │  TTS                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod guardrail;
pub mod playback;
pub mod protocol;
pub mod relay;
pub mod session;

pub use audio::{AudioFrame, CaptureEncoder, EncodedChunk, TransportChunker};
pub use config::Config;
pub use engine::{EngineCommand, EngineEvent, EngineHandle};
pub use error::{Error, Result};
pub use guardrail::{Guardrail, Permissive, Verdict};
pub use playback::{AudioSink, DeviceSink, PlaybackScheduler, SchedulerState};
pub use protocol::ControlEnvelope;
pub use relay::{HandoffDetector, MarkerDetector, Outbound, RelaySession};
pub use session::{SessionAudioState, SessionRegistry};
