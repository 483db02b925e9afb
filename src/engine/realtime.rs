//! Realtime engine WebSocket client
//!
//! Dials the engine, then runs one writer task (commands to JSON frames) and
//! one reader task (JSON frames to events). Response audio arrives base64
//! inside `response.audio.delta` events and is decoded exactly once, here;
//! everything downstream works with raw PCM16 bytes.

use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::config::EngineConfig;
use crate::engine::{EngineCommand, EngineEvent, EngineHandle};
use crate::{Error, Result};

/// Connect to the realtime engine.
///
/// Returns a handle for commands plus the event stream. Both underlying
/// tasks end when the socket closes or the handle is dropped.
///
/// # Errors
///
/// Returns error if the URL is invalid or the WebSocket handshake fails.
pub async fn connect(
    config: &EngineConfig,
) -> Result<(EngineHandle, mpsc::Receiver<EngineEvent>)> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Engine(format!("invalid engine url: {e}")))?;

    if let Some(ref key) = config.api_key {
        let value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| Error::Engine("api key is not a valid header value".to_string()))?;
        request.headers_mut().insert("Authorization", value);
    }
    // The hosted realtime endpoint rejects connections without this header.
    request
        .headers_mut()
        .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (ws, _) = connect_async(request).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<EngineCommand>(32);
    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(32);

    let session_update = session_update(config);
    tokio::spawn(async move {
        if ws_tx
            .send(Message::Text(session_update.to_string()))
            .await
            .is_err()
        {
            return;
        }

        'commands: while let Some(command) = cmd_rx.recv().await {
            if matches!(command, EngineCommand::Close) {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            for frame in command_frames(command) {
                if ws_tx.send(Message::Text(frame.to_string())).await.is_err() {
                    break 'commands;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(event) = parse_event(&text) {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    let _ = event_tx.send(EngineEvent::Closed).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = event_tx.send(EngineEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    });

    Ok((EngineHandle::new(cmd_tx), event_rx))
}

/// Session setup frame sent before any command.
///
/// PCM16 both ways at the configured rate, server-side turn detection so
/// barge-ins surface as `speech_started`, and caller transcription enabled.
fn session_update(config: &EngineConfig) -> Value {
    json!({
        "type": "session.update",
        "session": {
            "voice": config.voice,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "turn_detection": {"type": "server_vad"},
            "input_audio_transcription": {"model": "whisper-1"},
        }
    })
}

/// Wire frames for one command. Text turns take two: the conversation item
/// and an explicit response request (server VAD only auto-responds to audio).
fn command_frames(command: EngineCommand) -> Vec<Value> {
    match command {
        EngineCommand::AppendAudio(bytes) => vec![json!({
            "type": "input_audio_buffer.append",
            "audio": base64::engine::general_purpose::STANDARD.encode(bytes),
        })],
        EngineCommand::SendText(text) => vec![
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": text}],
                }
            }),
            json!({"type": "response.create"}),
        ],
        EngineCommand::Close => Vec::new(),
    }
}

/// Parse one engine frame into an event, `None` for kinds we don't consume.
fn parse_event(text: &str) -> Option<EngineEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable engine frame");
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str)? {
        "session.created" => Some(EngineEvent::SessionCreated),
        "response.audio.delta" => {
            let delta = value.get("delta").and_then(Value::as_str)?;
            match base64::engine::general_purpose::STANDARD.decode(delta) {
                Ok(bytes) => Some(EngineEvent::AudioDelta(bytes)),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable audio delta");
                    None
                }
            }
        }
        "response.audio.done" => Some(EngineEvent::AudioDone),
        "input_audio_buffer.speech_started" => Some(EngineEvent::Interrupted),
        "response.audio_transcript.done" => value
            .get("transcript")
            .and_then(Value::as_str)
            .map(|t| EngineEvent::AssistantTranscript(t.to_string())),
        "conversation.item.input_audio_transcription.completed" => value
            .get("transcript")
            .and_then(Value::as_str)
            .map(|t| EngineEvent::UserTranscript(t.to_string())),
        "response.function_call_arguments.done" => {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            Some(EngineEvent::ToolCall {
                name: name.to_string(),
            })
        }
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown engine error");
            Some(EngineEvent::Error(message.to_string()))
        }
        other => {
            tracing::trace!(kind = other, "ignoring engine event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_delta_is_decoded_once() {
        let frame = r#"{"type":"response.audio.delta","delta":"AAABAAIA"}"#;
        let event = parse_event(frame).unwrap();
        assert_eq!(event, EngineEvent::AudioDelta(vec![0, 0, 1, 0, 2, 0]));
    }

    #[test]
    fn bad_base64_delta_is_skipped() {
        let frame = r#"{"type":"response.audio.delta","delta":"!!!"}"#;
        assert!(parse_event(frame).is_none());
    }

    #[test]
    fn speech_started_maps_to_interrupted() {
        let frame = r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120}"#;
        assert_eq!(parse_event(frame), Some(EngineEvent::Interrupted));
    }

    #[test]
    fn transcripts_map_by_direction() {
        let assistant = r#"{"type":"response.audio_transcript.done","transcript":"We open at noon."}"#;
        assert_eq!(
            parse_event(assistant),
            Some(EngineEvent::AssistantTranscript("We open at noon.".to_string()))
        );

        let user = r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"table for two"}"#;
        assert_eq!(
            parse_event(user),
            Some(EngineEvent::UserTranscript("table for two".to_string()))
        );
    }

    #[test]
    fn tool_call_carries_name() {
        let frame = r#"{"type":"response.function_call_arguments.done","name":"transfer_to_reservation_specialist","arguments":"{}"}"#;
        assert_eq!(
            parse_event(frame),
            Some(EngineEvent::ToolCall {
                name: "transfer_to_reservation_specialist".to_string()
            })
        );
    }

    #[test]
    fn error_message_is_extracted() {
        let frame = r#"{"type":"error","error":{"type":"invalid_request_error","message":"Audio content of 20ms is already shorter than 80ms"}}"#;
        let Some(EngineEvent::Error(message)) = parse_event(frame) else {
            panic!("expected error event");
        };
        assert!(message.contains("already shorter than"));
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        assert!(parse_event(r#"{"type":"rate_limits.updated"}"#).is_none());
        assert!(parse_event("not json").is_none());
    }

    #[test]
    fn append_audio_frame_is_base64() {
        let frames = command_frames(EngineCommand::AppendAudio(vec![1, 2, 3]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "input_audio_buffer.append");
        assert_eq!(frames[0]["audio"], "AQID");
    }

    #[test]
    fn text_turn_creates_item_then_requests_response() {
        let frames = command_frames(EngineCommand::SendText("hello".to_string()));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "conversation.item.create");
        assert_eq!(frames[0]["item"]["role"], "user");
        assert_eq!(frames[0]["item"]["content"][0]["text"], "hello");
        assert_eq!(frames[1]["type"], "response.create");
    }

    #[test]
    fn close_has_no_text_frames() {
        assert!(command_frames(EngineCommand::Close).is_empty());
    }

    #[test]
    fn session_update_requests_pcm16_both_ways() {
        let config = EngineConfig::default();
        let frame = session_update(&config);
        assert_eq!(frame["session"]["input_audio_format"], "pcm16");
        assert_eq!(frame["session"]["output_audio_format"], "pcm16");
        assert_eq!(frame["session"]["turn_detection"]["type"], "server_vad");
    }
}
