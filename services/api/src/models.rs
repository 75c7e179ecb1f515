//! API Models
//!
//! Request and response bodies for the HTTP surface. These mirror the engine
//! types from `voxbridge-core` with `utoipa` schemas attached; conversions
//! are one-way projections out of the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use voxbridge_core::models::{ExchangeResult, SessionHistory, SessionSummary, Turn};

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateSessionPayload {
    /// System instructions for the session; the configured default applies
    /// when omitted.
    pub instructions: Option<String>,
    #[schema(example = "alloy")]
    pub voice: Option<String>,
    /// Caller-chosen session id; generated when omitted.
    pub id: Option<String>,
    /// Opaque key/value mapping stored with the session, never interpreted.
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendTextPayload {
    #[schema(example = "What's the weather like?")]
    pub text: String,
    #[serde(default)]
    pub return_audio: bool,
}

/// Format of the `audio` field in a send-audio request.
#[derive(Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Raw 16-bit mono 24 kHz PCM.
    #[default]
    Pcm16,
    /// The same PCM wrapped in the minimal 44-byte WAV container.
    Wav,
}

#[derive(Deserialize, ToSchema)]
pub struct SendAudioPayload {
    /// Base64-encoded audio in the declared format.
    pub audio: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub return_audio: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateInstructionsPayload {
    pub instructions: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    #[schema(example = "connected")]
    pub status: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub turn_count: usize,
}

impl From<SessionSummary> for SessionResponse {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            status: summary.status.to_string(),
            model: summary.model,
            voice: summary.voice,
            instructions: summary.instructions,
            created_at: summary.created_at,
            last_activity_at: summary.last_activity_at,
            metadata: summary.metadata,
            turn_count: summary.turn_count,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ExchangeResponse {
    pub response_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcript: Option<String>,
    pub duration_ms: u64,
    /// Base64 raw PCM16 at `sample_rate`; present only when the call asked
    /// for audio and the service produced some.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl From<ExchangeResult> for ExchangeResponse {
    fn from(result: ExchangeResult) -> Self {
        Self {
            response_text: result.response_text,
            input_transcript: result.input_transcript,
            duration_ms: result.duration_ms,
            audio_base64: result.audio_base64,
            audio_format: result.audio_format,
            sample_rate: result.sample_rate,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TurnResponse {
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "text")]
    pub content_type: String,
    pub has_audio: bool,
}

impl From<Turn> for TurnResponse {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role.to_string(),
            content: turn.content,
            timestamp: turn.timestamp,
            content_type: match turn.content_type {
                voxbridge_core::models::ContentKind::Text => "text".to_string(),
                voxbridge_core::models::ContentKind::Audio => "audio".to_string(),
            },
            has_audio: turn.has_audio,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub id: String,
    pub messages: Vec<TurnResponse>,
    pub total: usize,
}

impl From<SessionHistory> for HistoryResponse {
    fn from(history: SessionHistory) -> Self {
        Self {
            id: history.id,
            total: history.total,
            messages: history.messages.into_iter().map(TurnResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionIdResponse {
    pub id: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_core::models::{ContentKind, SessionStatus, TurnRole};

    #[test]
    fn test_send_text_payload_defaults() {
        let payload: SendTextPayload = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(payload.text, "hi");
        assert!(!payload.return_audio);
    }

    #[test]
    fn test_send_audio_payload_defaults() {
        let payload: SendAudioPayload = serde_json::from_str(r#"{"audio":"QUJD"}"#).unwrap();
        assert_eq!(payload.format, AudioFormat::Pcm16);
        assert!(!payload.return_audio);

        let payload: SendAudioPayload =
            serde_json::from_str(r#"{"audio":"QUJD","format":"wav","return_audio":true}"#).unwrap();
        assert_eq!(payload.format, AudioFormat::Wav);
        assert!(payload.return_audio);
    }

    #[test]
    fn test_send_text_payload_missing_field() {
        let result: Result<SendTextPayload, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_session_response_projection() {
        let summary = SessionSummary {
            id: "s-1".to_string(),
            status: SessionStatus::Connected,
            model: "gpt-realtime".to_string(),
            voice: "alloy".to_string(),
            instructions: "be brief".to_string(),
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            metadata: HashMap::new(),
            turn_count: 4,
        };
        let response = SessionResponse::from(summary);
        assert_eq!(response.status, "connected");
        assert_eq!(response.turn_count, 4);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"connected\""));
    }

    #[test]
    fn test_exchange_response_omits_absent_audio() {
        let response = ExchangeResponse::from(ExchangeResult {
            response_text: "hello".to_string(),
            input_transcript: None,
            duration_ms: 5,
            audio_base64: None,
            audio_format: None,
            sample_rate: None,
        });
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("audio_base64"));
        assert!(!json.contains("input_transcript"));
    }

    #[test]
    fn test_turn_response_projection() {
        let turn = Turn {
            role: TurnRole::User,
            content: "hello".to_string(),
            timestamp: Utc::now(),
            content_type: ContentKind::Audio,
            has_audio: true,
        };
        let response = TurnResponse::from(turn);
        assert_eq!(response.role, "user");
        assert_eq!(response.content_type, "audio");
        assert!(response.has_audio);
    }
}
