//! Engine Data Model
//!
//! Caller-facing projections of session state. Nothing in here exposes the
//! transport or the pending-request internals; summaries are plain values
//! cloned out of the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a session.
///
/// `Connecting` moves to `Connected` once the transport is established and
/// configured, or is discarded on failure. `Error` and `Closed` are terminal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Error,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Error => write!(f, "error"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// What kind of content a turn originally carried.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Audio,
}

/// One recorded exchange unit in a session's conversation history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentKind,
    pub has_audio: bool,
}

/// Options accepted by `SessionRegistry::create_session`.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    /// Caller-supplied id; generated when absent. Must not collide with a
    /// live session.
    pub id: Option<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    /// Opaque key/value mapping stored verbatim and never interpreted.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Read-only projection of a live session.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub turn_count: usize,
}

/// Aggregated outcome of one `send_text` / `send_audio` call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExchangeResult {
    pub response_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcript: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

/// Result of a successful `close_session`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub id: String,
}

/// Conversation history snapshot returned to callers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionHistory {
    pub id: String,
    pub messages: Vec<Turn>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Connected).unwrap(),
            "\"connected\""
        );
        let status: SessionStatus = serde_json::from_str("\"closed\"").unwrap();
        assert_eq!(status, SessionStatus::Closed);
        assert_eq!(format!("{}", SessionStatus::Connecting), "connecting");
    }

    #[test]
    fn test_turn_round_trip() {
        let turn = Turn {
            role: TurnRole::Assistant,
            content: "hello there".to_string(),
            timestamp: Utc::now(),
            content_type: ContentKind::Text,
            has_audio: false,
        };
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn test_exchange_result_omits_absent_audio() {
        let result = ExchangeResult {
            response_text: "hi".to_string(),
            input_transcript: None,
            duration_ms: 12,
            audio_base64: None,
            audio_format: None,
            sample_rate: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("audio_base64"));
        assert!(!json.contains("input_transcript"));
        assert!(!json.contains("sample_rate"));
    }

    #[test]
    fn test_exchange_result_includes_audio_when_present() {
        let result = ExchangeResult {
            response_text: "hi".to_string(),
            input_transcript: Some("hey".to_string()),
            duration_ms: 12,
            audio_base64: Some("AAAA".to_string()),
            audio_format: Some("pcm16".to_string()),
            sample_rate: Some(24_000),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"audio_base64\":\"AAAA\""));
        assert!(json.contains("\"sample_rate\":24000"));
    }
}
