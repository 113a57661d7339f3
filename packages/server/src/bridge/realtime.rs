//! Outbound WebSocket client to the AI realtime peer: connects with a
//! bounded deadline, retries with backoff up to a session-level cap, and
//! translates the peer's event stream into `RealtimeEvent`s the bridge
//! relays to the caller.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::config::Config;
use crate::error::BridgeError;

pub type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound event from the AI realtime peer, normalized for the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    /// The AI peer's complete spoken reply for one turn, emitted once per
    /// turn with a stable `item_id`: this, not the streaming `.delta`
    /// variant, is what gets persisted, so the persisted entry count
    /// exactly matches the number of these events observed (no dup, no
    /// drop).
    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscript { transcript: String, item_id: String },
    #[serde(rename = "response.done")]
    ResponseDone { item_id: Option<String> },
    /// The AI peer's own transcription of what the caller said, emitted
    /// once per caller turn; both sides of the conversation are persisted,
    /// not just the AI's.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    CallerTranscript { transcript: String, item_id: String },
    /// Server-side voice-activity-detection boundaries, used to mark turn
    /// start/stop for latency metrics independent of audio arrival.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    /// Caller's turn has been committed to the conversation; the bridge
    /// replies with `response.create` to prompt the assistant.
    #[serde(rename = "input_audio_buffer.committed")]
    Committed,
    #[serde(other)]
    Other,
}

/// Outbound frame the bridge sends to the AI realtime peer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeCommand {
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdatePayload },
    /// Prompts the AI to speak without waiting for caller input, used for
    /// `speakFirst` sessions and to resume after `input_audio_buffer
    /// .committed`.
    #[serde(rename = "response.create")]
    ResponseCreate {
        response: ResponseCreatePayload,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseCreatePayload {
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdatePayload {
    pub voice: String,
    pub instructions: Option<String>,
}

/// Connects to the AI realtime peer, with a per-attempt deadline and an
/// overall retry cap, falling back gracefully if the peer stays
/// unreachable.
pub async fn connect_with_retry(config: &Config) -> Result<RealtimeSocket, BridgeError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match connect_once(config).await {
            Ok(socket) => return Ok(socket),
            Err(e) if attempts >= config.ai_max_retries => {
                return Err(BridgeError::ConnectFailed(e.to_string()));
            }
            Err(e) => {
                warn!(attempt = attempts, error = %e, "AI realtime connect failed, retrying");
                tokio::time::sleep(backoff_delay(attempts)).await;
            }
        }
    }
}

async fn connect_once(config: &Config) -> Result<RealtimeSocket, tokio_tungstenite::tungstenite::Error> {
    let request = Request::builder()
        .uri(format!("{}?voice={}", config.ai_realtime_url, config.ai_voice))
        .header("Host", host_of(&config.ai_realtime_url))
        .header("Authorization", format!("Bearer {}", config.ai_realtime_api_key))
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", tokio_tungstenite::tungstenite::handshake::client::generate_key())
        .body(())
        .expect("static realtime connect request is always well-formed");

    let connect = tokio_tungstenite::connect_async(request);
    match tokio::time::timeout(config.ai_connect_deadline, connect).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(tokio_tungstenite::tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "AI realtime connect deadline exceeded",
        ))),
    }
}

fn host_of(url: &str) -> String {
    url.trim_start_matches("wss://")
        .trim_start_matches("ws://")
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// 1s/2s/3s linear backoff between connect attempts, capped at 3s per
/// spec §4.4. Reused for post-connect reconnect attempts, which run under
/// a separate, configurable attempt cap (`ai_max_retries`).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(attempt.clamp(1, 3) as u64)
}

pub async fn send_command(socket: &mut RealtimeSocket, command: &RealtimeCommand) -> Result<(), BridgeError> {
    let text = serde_json::to_string(command).expect("RealtimeCommand always serializes");
    socket
        .send(Message::Text(text))
        .await
        .map_err(|_| BridgeError::AiSocketClosed { code: None })
}

pub async fn next_event(socket: &mut RealtimeSocket) -> Option<Result<RealtimeEvent, BridgeError>> {
    loop {
        match socket.next().await? {
            Ok(Message::Text(text)) => {
                return Some(
                    serde_json::from_str(&text)
                        .map_err(|e| BridgeError::ConnectFailed(format!("malformed realtime event: {e}"))),
                )
            }
            Ok(Message::Close(frame)) => {
                return Some(Err(BridgeError::AiSocketClosed {
                    code: frame.map(|f| f.code.into()),
                }))
            }
            Ok(_) => continue,
            Err(_) => return Some(Err(BridgeError::AiSocketClosed { code: None })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let d1 = backoff_delay(1);
        let d2 = backoff_delay(2);
        let d3 = backoff_delay(3);
        let d10 = backoff_delay(10);
        assert!(d2 > d1);
        assert_eq!(d3, Duration::from_secs(3));
        assert_eq!(d10, d3);
        assert_eq!(d10, backoff_delay(6));
    }

    #[test]
    fn host_of_strips_scheme_and_path() {
        assert_eq!(host_of("wss://api.openai.com/v1/realtime"), "api.openai.com");
    }

    #[test]
    fn parses_audio_delta_event() {
        let raw = serde_json::json!({"type": "response.audio.delta", "delta": "AAAA"});
        let event: RealtimeEvent = serde_json::from_value(raw).unwrap();
        assert!(matches!(event, RealtimeEvent::AudioDelta { .. }));
    }
}
