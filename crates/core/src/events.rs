//! Wire protocol events.
//!
//! Outbound intents are serialized into the realtime service's JSON message
//! shapes; inbound frames are parsed into a tagged [`ServerEvent`]. The remote
//! protocol exists in two wire eras that name the same semantic event
//! differently (e.g. `response.text.delta` vs `response.output_text.delta`),
//! so parsing goes through an explicit alias table before dispatch.

use crate::error::EngineError;
use serde_json::{Value, json};

/// Per-session configuration sent in a `session.update` intent, both on
/// connect and when the caller updates instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    pub instructions: String,
    pub voice: String,
}

/// Outbound protocol intents the engine emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SessionUpdate(SessionConfig),
    /// Append a user message item to the remote conversation.
    ConversationItemCreate { text: String },
    /// Append one chunk of base64 PCM16 to the remote input buffer.
    InputAudioBufferAppend { audio: String },
    InputAudioBufferClear,
    InputAudioBufferCommit,
    /// Ask the service to generate a response with the given modalities.
    ResponseCreate { modalities: Vec<String> },
    /// Best-effort cancellation of the in-flight response.
    ResponseCancel,
}

impl ClientEvent {
    pub fn to_json(&self) -> Value {
        match self {
            ClientEvent::SessionUpdate(config) => json!({
                "type": "session.update",
                "session": {
                    "model": config.model,
                    "modalities": ["text", "audio"],
                    "instructions": config.instructions,
                    "voice": config.voice,
                    "input_audio_format": "pcm16",
                    "output_audio_format": "pcm16",
                    "input_audio_transcription": { "model": "whisper-1" },
                    "turn_detection": {
                        "type": "server_vad",
                        "threshold": 0.5,
                        "prefix_padding_ms": 200,
                        "silence_duration_ms": 700
                    }
                }
            }),
            ClientEvent::ConversationItemCreate { text } => json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_text", "text": text }]
                }
            }),
            ClientEvent::InputAudioBufferAppend { audio } => json!({
                "type": "input_audio_buffer.append",
                "audio": audio
            }),
            ClientEvent::InputAudioBufferClear => json!({ "type": "input_audio_buffer.clear" }),
            ClientEvent::InputAudioBufferCommit => json!({ "type": "input_audio_buffer.commit" }),
            ClientEvent::ResponseCreate { modalities } => json!({
                "type": "response.create",
                "response": { "modalities": modalities }
            }),
            ClientEvent::ResponseCancel => json!({ "type": "response.cancel" }),
        }
    }
}

/// Inbound protocol events, reduced to what the dispatcher handles.
///
/// Everything the engine does not act on is folded into `Informational`,
/// which keeps the original wire name for trace logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `session.created` / `session.updated` acknowledgements.
    SessionAck,
    TextDelta(String),
    /// One base64 chunk of response audio.
    AudioDelta(String),
    /// Transcript of the spoken response; used as the text channel only when
    /// no direct text delta arrives.
    AudioTranscriptDelta(String),
    /// Transcription of caller-supplied input audio.
    InputTranscriptCompleted(String),
    /// Terminal event: the response is fully generated.
    ResponseDone,
    Error(String),
    Informational(String),
}

/// Maps both wire eras onto one canonical event name.
fn canonical(kind: &str) -> &str {
    match kind {
        "response.output_text.delta" => "response.text.delta",
        "response.output_audio.delta" => "response.audio.delta",
        "response.output_audio_transcript.delta" => "response.audio_transcript.delta",
        "input_audio_buffer.transcription.completed" => {
            "conversation.item.input_audio_transcription.completed"
        }
        "response.completed" => "response.done",
        other => other,
    }
}

fn delta_field(value: &Value, kind: &str) -> Result<String, EngineError> {
    value
        .get("delta")
        .and_then(Value::as_str)
        .or_else(|| value.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| EngineError::RemoteProtocolError(format!("{kind} event without a delta")))
}

impl ServerEvent {
    /// Parses one inbound text frame.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| EngineError::RemoteProtocolError(format!("unparseable event: {e}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::RemoteProtocolError("event without a type".to_string()))?;

        let event = match canonical(kind) {
            "session.created" | "session.updated" => ServerEvent::SessionAck,
            "response.text.delta" => ServerEvent::TextDelta(delta_field(&value, kind)?),
            "response.audio.delta" => ServerEvent::AudioDelta(delta_field(&value, kind)?),
            "response.audio_transcript.delta" => {
                ServerEvent::AudioTranscriptDelta(delta_field(&value, kind)?)
            }
            "conversation.item.input_audio_transcription.completed" => {
                let transcript = value
                    .get("transcript")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ServerEvent::InputTranscriptCompleted(transcript)
            }
            "response.done" => ServerEvent::ResponseDone,
            "error" => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .or_else(|| value.get("message").and_then(Value::as_str))
                    .unwrap_or("realtime service returned an error")
                    .to_string();
                ServerEvent::Error(message)
            }
            other => ServerEvent::Informational(other.to_string()),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_text_delta_eras_alias_to_one_variant() {
        let legacy =
            ServerEvent::parse(r#"{"type":"response.text.delta","delta":"hel"}"#).unwrap();
        let current =
            ServerEvent::parse(r#"{"type":"response.output_text.delta","delta":"hel"}"#).unwrap();
        assert_eq!(legacy, ServerEvent::TextDelta("hel".to_string()));
        assert_eq!(legacy, current);
    }

    #[test]
    fn test_audio_and_transcript_aliases() {
        let audio =
            ServerEvent::parse(r#"{"type":"response.output_audio.delta","delta":"QUJD"}"#).unwrap();
        assert_eq!(audio, ServerEvent::AudioDelta("QUJD".to_string()));

        let transcript = ServerEvent::parse(
            r#"{"type":"response.output_audio_transcript.delta","delta":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            transcript,
            ServerEvent::AudioTranscriptDelta("hi".to_string())
        );

        let legacy_done = ServerEvent::parse(r#"{"type":"response.done"}"#).unwrap();
        let current_done = ServerEvent::parse(r#"{"type":"response.completed"}"#).unwrap();
        assert_eq!(legacy_done, ServerEvent::ResponseDone);
        assert_eq!(legacy_done, current_done);
    }

    #[test]
    fn test_input_transcription_aliases() {
        let legacy = ServerEvent::parse(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#,
        )
        .unwrap();
        let current = ServerEvent::parse(
            r#"{"type":"input_audio_buffer.transcription.completed","transcript":"hello"}"#,
        )
        .unwrap();
        assert_eq!(
            legacy,
            ServerEvent::InputTranscriptCompleted("hello".to_string())
        );
        assert_eq!(legacy, current);
    }

    #[test]
    fn test_error_message_extraction() {
        let nested =
            ServerEvent::parse(r#"{"type":"error","error":{"message":"rate limited"}}"#).unwrap();
        assert_eq!(nested, ServerEvent::Error("rate limited".to_string()));

        let flat = ServerEvent::parse(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(flat, ServerEvent::Error("boom".to_string()));

        let bare = ServerEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert_eq!(
            bare,
            ServerEvent::Error("realtime service returned an error".to_string())
        );
    }

    #[test]
    fn test_unhandled_events_are_informational() {
        for kind in [
            "rate_limits.updated",
            "conversation.item.created",
            "input_audio_buffer.committed",
            "input_audio_buffer.cleared",
            "input_audio_buffer.speech_started",
            "response.created",
            "response.output_item.added",
            "response.audio.done",
        ] {
            let raw = format!(r#"{{"type":"{kind}"}}"#);
            match ServerEvent::parse(&raw).unwrap() {
                ServerEvent::Informational(name) => assert_eq!(name, kind),
                other => panic!("{kind} should be informational, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        assert!(matches!(
            ServerEvent::parse("not json"),
            Err(EngineError::RemoteProtocolError(_))
        ));
        assert!(matches!(
            ServerEvent::parse(r#"{"delta":"x"}"#),
            Err(EngineError::RemoteProtocolError(_))
        ));
        assert!(matches!(
            ServerEvent::parse(r#"{"type":"response.text.delta"}"#),
            Err(EngineError::RemoteProtocolError(_))
        ));
    }

    #[test]
    fn test_session_update_wire_shape() {
        let event = ClientEvent::SessionUpdate(SessionConfig {
            model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            instructions: "be brief".to_string(),
            voice: "alloy".to_string(),
        });
        let wire = event.to_json();
        assert_eq!(wire["type"], "session.update");
        assert_eq!(wire["session"]["voice"], "alloy");
        assert_eq!(wire["session"]["input_audio_format"], "pcm16");
        assert_eq!(wire["session"]["output_audio_format"], "pcm16");
        assert_eq!(wire["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(wire["session"]["turn_detection"]["type"], "server_vad");
    }

    #[test]
    fn test_item_create_and_response_create_wire_shapes() {
        let item = ClientEvent::ConversationItemCreate {
            text: "hello".to_string(),
        }
        .to_json();
        assert_eq!(item["type"], "conversation.item.create");
        assert_eq!(item["item"]["role"], "user");
        assert_eq!(item["item"]["content"][0]["type"], "input_text");
        assert_eq!(item["item"]["content"][0]["text"], "hello");

        let response = ClientEvent::ResponseCreate {
            modalities: vec!["text".to_string(), "audio".to_string()],
        }
        .to_json();
        assert_eq!(response["type"], "response.create");
        assert_eq!(response["response"]["modalities"][1], "audio");

        let append = ClientEvent::InputAudioBufferAppend {
            audio: "UENN".to_string(),
        }
        .to_json();
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], "UENN");
    }
}
