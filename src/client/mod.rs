//! Native voice client
//!
//! Dials the bridge, streams microphone audio up, and plays engine audio
//! back with gapless scheduling. One cooperative loop processes capture
//! ticks, inbound frames, and the hang-up signal; control and audio are
//! handled strictly in arrival order, so an `interrupted` envelope can
//! never race the binary frame that follows it.

mod capture;

pub use capture::{MicCapture, RateAdapter, downmix, pcm_to_wav};

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Config;
use crate::playback::{AudioSink, DeviceSink};
use crate::protocol::ControlEnvelope;
use crate::session::SessionAudioState;
use crate::Result;

/// How often buffered capture is drained into the encoder
const CAPTURE_TICK: Duration = Duration::from_millis(20);

/// Input samples per resampler block when rate adaptation is needed
const ADAPT_BLOCK: usize = 960;

/// WebSocket URL for the bridge bound to `config.server`.
#[must_use]
pub fn bridge_url(config: &Config) -> String {
    let host = if config.server.host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        config.server.host.as_str()
    };
    let port = config.server.port;
    format!("ws://{host}:{port}/ws/voice")
}

/// Run an interactive voice call against the bridge.
///
/// Holds the cpal streams on the calling task, so this future must run on
/// the main task rather than a spawned one.
///
/// # Errors
///
/// Returns error if no audio device is usable, the bridge is unreachable,
/// or the channel fails mid-call.
#[allow(clippy::future_not_send)]
pub async fn run(config: &Config) -> Result<()> {
    let url = bridge_url(config);
    tracing::info!(%url, "dialing bridge");
    let (ws, _) = connect_async(&url).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut audio = SessionAudioState::new(&config.audio)?;
    let mut capture = MicCapture::new(config.audio.sample_rate)?;
    let mut adapter = RateAdapter::new(
        capture.sample_rate(),
        config.audio.sample_rate,
        ADAPT_BLOCK,
    )?;
    let mut sink = DeviceSink::new(config.audio.sample_rate)?;

    capture.start()?;
    let mut ticker = tokio::time::interval(CAPTURE_TICK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let samples = adapter.process(&capture.take_buffer());
                for frame in audio.encoder.push(&samples) {
                    for chunk in audio.chunker.push(&frame) {
                        let envelope = ControlEnvelope::audio_chunk(&chunk.payload);
                        ws_tx.send(Message::Text(envelope.to_json()?)).await?;
                    }
                }
                audio.scheduler.retire(sink.now());
            }
            incoming = ws_rx.next() => {
                let Some(message) = incoming else {
                    tracing::info!("bridge closed the channel");
                    break;
                };
                match message? {
                    Message::Binary(bytes) => {
                        if let Some(scheduled) = audio.scheduler.schedule(&bytes, sink.now()) {
                            sink.begin(&scheduled.unit, &scheduled.samples)?;
                        }
                    }
                    Message::Text(text) => {
                        if handle_envelope(&text, &mut audio, &mut sink) {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        tracing::info!("bridge ended the session");
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("hanging up");
                hang_up(&mut audio, &mut ws_tx).await;
                break;
            }
        }
    }

    capture.stop();
    Ok(())
}

/// React to one control envelope; true means the call is over.
fn handle_envelope(text: &str, audio: &mut SessionAudioState, sink: &mut DeviceSink) -> bool {
    let envelope = match ControlEnvelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(%error, "ignoring malformed envelope");
            return false;
        }
    };

    match envelope {
        ControlEnvelope::SessionStarted { session_id } => {
            tracing::info!(%session_id, "session live");
        }
        ControlEnvelope::Interrupted => {
            let halted = audio.scheduler.interrupt();
            sink.halt_all();
            tracing::debug!(halted = halted.len(), "barge-in, playback halted");
        }
        ControlEnvelope::TurnComplete => {
            tracing::debug!("turn complete");
        }
        ControlEnvelope::UserTranscript { transcript } => {
            println!("you: {transcript}");
        }
        ControlEnvelope::AssistantTranscript { transcript } => {
            println!("bistro: {transcript}");
        }
        ControlEnvelope::Warning { message } => {
            tracing::warn!(%message, "bridge warning");
        }
        ControlEnvelope::Error { message } => {
            tracing::error!(%message, "bridge error, ending call");
            return true;
        }
        other => {
            tracing::trace!(?other, "ignoring envelope");
        }
    }
    false
}

/// Flush any held capture audio, then tell the bridge the session is over.
async fn hang_up<S>(audio: &mut SessionAudioState, ws_tx: &mut S)
where
    S: futures::Sink<Message> + Unpin,
{
    let mut chunks = Vec::new();
    if let Some(frame) = audio.encoder.flush() {
        chunks.extend(audio.chunker.push(&frame));
    }
    chunks.extend(audio.chunker.flush());

    for chunk in chunks {
        let envelope = ControlEnvelope::audio_chunk(&chunk.payload);
        if let Ok(json) = envelope.to_json() {
            if ws_tx.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
    }

    if let Ok(bye) = ControlEnvelope::EndSession.to_json() {
        let _ = ws_tx.send(Message::Text(bye)).await;
    }
}
