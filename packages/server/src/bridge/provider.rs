//! Wire types for the telephony provider's media-stream WebSocket protocol:
//! μ-law 8kHz audio, base64-encoded, framed as JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProviderFrame {
    Connected {
        protocol: String,
    },
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartMetadata {
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "mediaFormat")]
    pub media_format: MediaFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaFormat {
    pub encoding: String,
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaPayload {
    /// Base64-encoded μ-law 8kHz audio frame.
    pub payload: String,
    pub timestamp: String,
    /// `"inbound"` (caller -> engine) or `"outbound"` (engine -> caller,
    /// echoed back by some providers). Only inbound frames are forwarded
    /// to the AI peer; absent on providers that don't echo, treated as
    /// inbound.
    #[serde(default)]
    pub track: Option<String>,
}

impl MediaPayload {
    pub fn is_inbound(&self) -> bool {
        matches!(self.track.as_deref(), None | Some("inbound"))
    }
}

/// Sent to the provider to stop queued playback immediately, e.g. right
/// before the fallback terminator message on an unrecoverable AI failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearFrame {
    pub event: &'static str,
    pub stream_sid: String,
}

impl ClearFrame {
    pub fn new(stream_sid: String) -> Self {
        Self {
            event: "clear",
            stream_sid,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkPayload {
    pub name: String,
}

/// Outbound frame: audio the bridge sends back to the provider for
/// playback to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMediaFrame {
    pub event: &'static str,
    pub stream_sid: String,
    pub media: OutboundMediaPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaPayload {
    pub payload: String,
}

impl OutboundMediaFrame {
    pub fn new(stream_sid: String, base64_payload: String) -> Self {
        Self {
            event: "media",
            stream_sid,
            media: OutboundMediaPayload {
                payload: base64_payload,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_frame() {
        let raw = serde_json::json!({
            "event": "start",
            "streamSid": "MZ123",
            "start": {
                "callSid": "CA123",
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            }
        });
        let frame: ProviderFrame = serde_json::from_value(raw).unwrap();
        match frame {
            ProviderFrame::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ123");
                assert_eq!(start.call_sid, "CA123");
                assert_eq!(start.media_format.sample_rate, 8000);
            }
            _ => panic!("expected Start frame"),
        }
    }

    #[test]
    fn parses_media_frame() {
        let raw = serde_json::json!({
            "event": "media",
            "streamSid": "MZ123",
            "media": {"payload": "AAAA", "timestamp": "5"}
        });
        let frame: ProviderFrame = serde_json::from_value(raw).unwrap();
        assert!(matches!(frame, ProviderFrame::Media { .. }));
    }
}
