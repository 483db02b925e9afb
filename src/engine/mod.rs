//! Speech engine boundary
//!
//! The realtime engine speaks its own JSON vocabulary over WebSocket. This
//! module pins that vocabulary behind a command/event channel pair so the
//! relay and session logic never see wire strings, only typed messages.

mod realtime;

pub use realtime::connect;

use tokio::sync::mpsc;

use crate::{Error, Result};

/// Commands sent to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Append raw PCM16 capture audio to the engine's input buffer
    AppendAudio(Vec<u8>),
    /// Inject a text turn into the conversation
    SendText(String),
    /// Close the connection
    Close,
}

/// Events received from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine session is live
    SessionCreated,
    /// One run of decoded PCM16 response audio
    AudioDelta(Vec<u8>),
    /// Response audio finished for this turn
    AudioDone,
    /// Caller speech detected while the engine was speaking
    Interrupted,
    /// Final transcript of caller speech
    UserTranscript(String),
    /// Final transcript of engine speech
    AssistantTranscript(String),
    /// Engine invoked a tool
    ToolCall { name: String },
    /// Engine-reported error text; the relay decides recoverable vs fatal
    Error(String),
    /// Upstream connection closed
    Closed,
}

/// Sends commands to a connected engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub(crate) const fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command for the engine writer task.
    ///
    /// # Errors
    ///
    /// Returns `Error::Engine` if the connection has shut down.
    pub async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Engine("engine connection closed".to_string()))
    }
}
