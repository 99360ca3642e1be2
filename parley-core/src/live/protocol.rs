//! Wire messages for the bidirectional live endpoint.
//!
//! ## Messages
//!
//! | Direction | JSON | Rust |
//! |-----------|------|------|
//! | → | `{"setup": {...}}` | [`ClientMessage::Setup`] |
//! | → | `{"realtimeInput": {"audio": {...}}}` | [`ClientMessage::RealtimeInput`] |
//! | ← | `{"setupComplete": {}}` | [`InboundMessage::setup_complete`] |
//! | ← | `{"serverContent": {"modelTurn": {"parts": [...]}}}` | [`InboundMessage::audio`] |
//!
//! The session itself only deals in [`OutboundMedia`] and [`InboundMessage`].

use serde::{Deserialize, Serialize};

use crate::buffering::chunk::EncodedAudioChunk;
use crate::error::{ParleyError, Result};

/// Implied rate of inbound agent audio when the payload does not say.
pub const DEFAULT_INBOUND_RATE: u32 = 24_000;

/// Sent once when the connection opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    /// Model name without the `models/` prefix.
    pub model: String,
    pub system_instruction: String,
}

/// One captured block on its way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMedia {
    pub encoding: &'static str,
    pub sample_rate_hz: u32,
    pub data: String,
}

impl OutboundMedia {
    pub fn pcm16(chunk: &EncodedAudioChunk) -> Self {
        Self {
            encoding: "pcm16",
            sample_rate_hz: chunk.sample_rate(),
            data: chunk.data().to_owned(),
        }
    }

    fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate_hz)
    }
}

/// Everything the session cares about in one server message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Audio parts in payload order. Empty for control-only messages.
    pub audio: Vec<EncodedAudioChunk>,
    pub setup_complete: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub transcript: Option<String>,
}

impl InboundMessage {
    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupBody),
    RealtimeInput(RealtimeInputBody),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupBody {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputBody {
    pub audio: Blob,
}

impl ClientMessage {
    pub fn setup(setup: &LiveSetup) -> Self {
        let model = if setup.model.starts_with("models/") {
            setup.model.clone()
        } else {
            format!("models/{}", setup.model)
        };
        Self::Setup(SetupBody {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".into()],
            },
            system_instruction: Content {
                parts: vec![Part {
                    text: Some(setup.system_instruction.clone()),
                    inline_data: None,
                }],
            },
        })
    }

    pub fn audio(media: &OutboundMedia) -> Self {
        Self::RealtimeInput(RealtimeInputBody {
            audio: Blob {
                mime_type: media.mime_type(),
                data: media.data.clone(),
            },
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Shared content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<Content>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

/// Parse one server frame.
///
/// # Errors
/// `ParleyError::Decode` when the frame is not a JSON object.
pub fn parse_server_message(text: &str) -> Result<InboundMessage> {
    let msg: ServerMessage = serde_json::from_str(text)
        .map_err(|e| ParleyError::Decode(format!("server message: {e}")))?;

    let mut inbound = InboundMessage {
        setup_complete: msg.setup_complete.is_some(),
        ..InboundMessage::default()
    };

    if let Some(content) = msg.server_content {
        inbound.turn_complete = content.turn_complete;
        inbound.interrupted = content.interrupted;
        inbound.transcript = content
            .output_transcription
            .map(|t| t.text)
            .filter(|t| !t.is_empty());
        if let Some(turn) = content.model_turn {
            inbound.audio = turn
                .parts
                .into_iter()
                .filter_map(|p| p.inline_data)
                .filter(|blob| blob.mime_type.is_empty() || blob.mime_type.starts_with("audio/"))
                .map(|blob| {
                    let rate = rate_from_mime(&blob.mime_type).unwrap_or(DEFAULT_INBOUND_RATE);
                    EncodedAudioChunk::new(blob.data, rate)
                })
                .collect();
        }
    }

    Ok(inbound)
}

/// `audio/pcm;rate=24000` → `Some(24000)`.
fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_message_shape() {
        let msg = ClientMessage::setup(&LiveSetup {
            model: "gemini-live".into(),
            system_instruction: "Be the supplier".into(),
        });
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(json["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be the supplier"
        );
        assert!(json["setup"]["systemInstruction"]["parts"][0]
            .get("inlineData")
            .is_none());
    }

    #[test]
    fn audio_message_carries_rate_in_mime_type() {
        let chunk = EncodedAudioChunk::new("AAA=", 16_000);
        let media = OutboundMedia::pcm16(&chunk);
        assert_eq!(media.encoding, "pcm16");
        assert_eq!(media.sample_rate_hz, 16_000);

        let json = serde_json::to_value(ClientMessage::audio(&media)).unwrap();
        assert_eq!(
            json["realtimeInput"]["audio"]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(json["realtimeInput"]["audio"]["data"], "AAA=");
    }

    #[test]
    fn audio_parts_become_chunks_in_order() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAE="}},
            {"text":"thinking"},
            {"inlineData":{"mimeType":"audio/pcm","data":"AgM="}}
        ]}}}"#;
        let msg = parse_server_message(text).unwrap();
        assert_eq!(msg.audio.len(), 2);
        assert_eq!(msg.audio[0].data(), "AAE=");
        assert_eq!(msg.audio[1].data(), "AgM=");
        assert!(msg.audio.iter().all(|c| c.sample_rate() == 24_000));
    }

    #[test]
    fn control_messages_carry_no_audio() {
        let setup = parse_server_message(r#"{"setupComplete":{}}"#).unwrap();
        assert!(setup.setup_complete && !setup.has_audio());

        let done = parse_server_message(
            r#"{"serverContent":{"turnComplete":true,"interrupted":true}}"#,
        )
        .unwrap();
        assert!(done.turn_complete && done.interrupted && !done.has_audio());

        let usage = parse_server_message(r#"{"usageMetadata":{"totalTokenCount":5}}"#).unwrap();
        assert_eq!(usage, InboundMessage::default());
    }

    #[test]
    fn garbage_frame_is_a_decode_error() {
        assert!(matches!(
            parse_server_message("not json"),
            Err(ParleyError::Decode(_))
        ));
    }

    #[test]
    fn mime_rate_parsing() {
        assert_eq!(rate_from_mime("audio/pcm;rate=16000"), Some(16_000));
        assert_eq!(rate_from_mime("audio/pcm; rate=8000"), Some(8_000));
        assert_eq!(rate_from_mime("audio/pcm"), None);
    }
}
