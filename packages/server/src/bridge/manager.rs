//! `BridgeManager`: the in-process registry of active `BridgeSession`s and
//! the relay loop that pairs one provider media-stream socket with one AI
//! realtime socket.
//!
//! The registry follows the same topic-keyed `Arc<RwLock<HashMap<...>>>`
//! shape used elsewhere in this codebase for in-process pub/sub.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use twilio::StreamOptions;

use crate::config::Config;
use crate::domain::transcript::{NewTranscriptEntry, TranscriptRole};
use crate::persistence::PersistenceLayer;

use super::metrics::TurnMetrics;
use super::provider::{ClearFrame, OutboundMediaFrame, ProviderFrame};
use super::realtime::{self, RealtimeCommand, RealtimeEvent, RealtimeSocket, SessionUpdatePayload};
use super::session::{BridgeSession, SessionState};

/// A session is allowed this many AI-side error events over its lifetime
/// before it gives up and fails permanently.
const MAX_AI_ERROR_EVENTS: u32 = 5;
/// Pause before a mid-session reconnect attempt that reuses the session
/// config.
const RECONNECT_PAUSE: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Clone)]
pub struct BridgeManager {
    sessions: Arc<RwLock<HashMap<String, Arc<BridgeSession>>>>,
    config: Arc<Config>,
    persistence: Arc<dyn PersistenceLayer>,
}

impl BridgeManager {
    pub fn new(config: Arc<Config>, persistence: Arc<dyn PersistenceLayer>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            persistence,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn register(&self, call_sid: &str) -> Arc<BridgeSession> {
        let session = Arc::new(BridgeSession::new(call_sid.to_string()));
        self.sessions
            .write()
            .await
            .insert(call_sid.to_string(), session.clone());
        session
    }

    async fn remove(&self, call_sid: &str) {
        self.sessions.write().await.remove(call_sid);
    }

    /// Entry point from the `/media-stream` axum WebSocket route.
    /// `stream_options` is recovered by the route handler from the
    /// upgrade request's query string, originally set by `place_call`'s
    /// answer URL.
    pub async fn handle_provider_socket(&self, socket: WebSocket, stream_options: StreamOptions) {
        let (mut provider_tx, mut provider_rx) = socket.split();

        // The provider always sends `start` before any `media` frame, so we
        // don't know the call_sid (and can't register a session) until
        // that's been received.
        let start = loop {
            match provider_rx.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ProviderFrame>(&text) {
                    Ok(ProviderFrame::Start { stream_sid, start }) => break (stream_sid, start),
                    Ok(ProviderFrame::Connected { .. }) => continue,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "malformed provider frame while awaiting start");
                        continue;
                    }
                },
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "provider socket error while awaiting start");
                    return;
                }
                None => return,
            }
        };
        let (stream_sid, start) = start;
        let call_sid = start.call_sid.clone();

        let session = self.register(&call_sid).await;
        session.transition(SessionState::Connecting);

        let mut ai_socket = match realtime::connect_with_retry(&self.config).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(call_sid = %call_sid, error = %e, "AI realtime peer unreachable, falling back to provider-only");
                session.transition(SessionState::Failed);
                self.remove(&call_sid).await;
                return;
            }
        };
        session.transition(SessionState::Ready);

        if let Err(e) = self.send_session_update(&mut ai_socket).await {
            warn!(call_sid = %call_sid, error = %e, "failed to send initial session.update");
        }

        if stream_options.speak_first {
            if let Err(e) = realtime::send_command(
                &mut ai_socket,
                &RealtimeCommand::ResponseCreate {
                    response: realtime::ResponseCreatePayload {
                        instructions: stream_options.initial_message.clone(),
                    },
                },
            )
            .await
            {
                warn!(call_sid = %call_sid, error = %e, "failed to prompt AI for opening line");
            }
        }
        session.transition(SessionState::Streaming);

        let mut metrics = TurnMetrics::new();
        let mut ai_error_events: u32 = 0;
        let mut ai_reconnect_attempts: u32 = 0;
        let mut lead_linked = false;

        loop {
            tokio::select! {
                frame = provider_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ProviderFrame>(&text) {
                                Ok(ProviderFrame::Media { media, .. }) => {
                                    if !media.is_inbound() {
                                        continue;
                                    }
                                    if realtime::send_command(
                                        &mut ai_socket,
                                        &RealtimeCommand::AppendAudio { audio: media.payload },
                                    ).await.is_err() {
                                        warn!(call_sid = %call_sid, "AI socket closed while forwarding caller audio");
                                        break;
                                    }
                                }
                                Ok(ProviderFrame::Stop { .. }) => {
                                    debug!(call_sid = %call_sid, "provider sent stop");
                                    break;
                                }
                                Ok(_) => {}
                                Err(e) => warn!(call_sid = %call_sid, error = %e, "malformed provider frame"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(call_sid = %call_sid, error = %e, "provider socket error");
                            break;
                        }
                    }
                }
                event = realtime::next_event(&mut ai_socket) => {
                    match event {
                        Some(Ok(RealtimeEvent::SpeechStarted)) => {
                            debug!(call_sid = %call_sid, "caller speech started");
                        }
                        Some(Ok(RealtimeEvent::SpeechStopped)) => {
                            metrics.mark_turn_start();
                        }
                        Some(Ok(RealtimeEvent::AudioDelta { delta })) => {
                            metrics.mark_first_ai_audio(&call_sid);
                            let frame = OutboundMediaFrame::new(stream_sid.clone(), delta);
                            let payload = serde_json::to_string(&frame).expect("OutboundMediaFrame always serializes");
                            if provider_tx.send(Message::Text(payload)).await.is_err() {
                                warn!(call_sid = %call_sid, "provider socket closed while relaying AI audio");
                                break;
                            }
                        }
                        Some(Ok(RealtimeEvent::AssistantTranscript { transcript, item_id })) => {
                            let entry = NewTranscriptEntry {
                                call_sid: call_sid.clone(),
                                provider_message_id: Some(item_id),
                                role: TranscriptRole::Assistant,
                                content: transcript,
                                occurred_at: Utc::now(),
                            };
                            self.persist_transcript(&call_sid, entry, &mut lead_linked).await;
                        }
                        Some(Ok(RealtimeEvent::CallerTranscript { transcript, item_id })) => {
                            let entry = NewTranscriptEntry {
                                call_sid: call_sid.clone(),
                                provider_message_id: Some(item_id),
                                role: TranscriptRole::Caller,
                                content: transcript,
                                occurred_at: Utc::now(),
                            };
                            self.persist_transcript(&call_sid, entry, &mut lead_linked).await;
                        }
                        Some(Ok(RealtimeEvent::Committed)) => {
                            // The caller's turn is committed to the
                            // conversation; prompt the assistant to
                            // respond now rather than waiting idle.
                            if realtime::send_command(&mut ai_socket, &RealtimeCommand::ResponseCreate {
                                response: realtime::ResponseCreatePayload { instructions: None },
                            }).await.is_err() {
                                warn!(call_sid = %call_sid, "AI socket closed while requesting response after commit");
                                break;
                            }
                        }
                        Some(Ok(RealtimeEvent::ResponseDone { .. })) | Some(Ok(RealtimeEvent::Other)) => {}
                        Some(Err(e)) => {
                            ai_error_events += 1;
                            warn!(call_sid = %call_sid, error = %e, error_count = ai_error_events, "AI realtime socket closed");

                            if ai_error_events >= MAX_AI_ERROR_EVENTS || ai_reconnect_attempts >= self.config.ai_max_retries {
                                session.transition(SessionState::Failed);
                                self.send_terminator(&mut provider_tx, &stream_sid).await;
                                break;
                            }

                            ai_reconnect_attempts += 1;
                            tokio::time::sleep(RECONNECT_PAUSE).await;
                            match realtime::connect_with_retry(&self.config).await {
                                Ok(new_socket) => {
                                    ai_socket = new_socket;
                                    if let Err(e) = self.send_session_update(&mut ai_socket).await {
                                        warn!(call_sid = %call_sid, error = %e, "failed to resend session.update after reconnect");
                                    }
                                    info!(call_sid = %call_sid, attempt = ai_reconnect_attempts, "reconnected to AI realtime peer");
                                }
                                Err(e) => {
                                    error!(call_sid = %call_sid, error = %e, "AI realtime reconnect failed");
                                    session.transition(SessionState::Failed);
                                    self.send_terminator(&mut provider_tx, &stream_sid).await;
                                    break;
                                }
                            }
                        }
                        None => {
                            warn!(call_sid = %call_sid, "AI realtime socket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        session.transition(SessionState::Closing);
        info!(call_sid = %call_sid, avg_turn_latency_ms = ?metrics.average_latency_ms(), "bridge session closed");
        self.remove(&call_sid).await;
    }

    async fn send_session_update(&self, ai_socket: &mut RealtimeSocket) -> Result<(), crate::error::BridgeError> {
        realtime::send_command(
            ai_socket,
            &RealtimeCommand::SessionUpdate {
                session: SessionUpdatePayload {
                    voice: self.config.ai_voice.clone(),
                    instructions: None,
                },
            },
        )
        .await
    }

    /// Persists a transcript turn and, on the very first one for this
    /// call, best-effort-links the call to a lead by phone number.
    async fn persist_transcript(&self, call_sid: &str, entry: NewTranscriptEntry, lead_linked: &mut bool) {
        if let Err(e) = self.persistence.append_transcript_entry(entry).await {
            warn!(call_sid = %call_sid, error = %e, "failed to persist transcript entry");
            return;
        }
        if !*lead_linked {
            *lead_linked = true;
            if let Err(e) = self.persistence.link_lead_for_call(call_sid).await {
                warn!(call_sid = %call_sid, error = %e, "failed to link lead for call");
            }
        }
    }

    /// On unrecoverable AI failure, play the terminator marker (a `clear`
    /// frame stopping any queued playback) and let the provider tear down
    /// the call rather than leaving it hanging.
    async fn send_terminator(
        &self,
        provider_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
        stream_sid: &str,
    ) {
        let frame = ClearFrame::new(stream_sid.to_string());
        if let Ok(payload) = serde_json::to_string(&frame) {
            let _ = provider_tx.send(Message::Text(payload)).await;
        }
    }
}
