//! In-flight exchange state.
//!
//! One `PendingExchange` exists per dispatched call. It accumulates partial
//! protocol events until a terminal or error event settles it, the deadline
//! fires, or the owning session tears down. Settling consumes the exchange,
//! so it can never complete twice.

use crate::audio;
use crate::error::EngineError;
use crate::models::ExchangeResult;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

pub(crate) type ExchangeReply = oneshot::Sender<Result<ExchangeResult, EngineError>>;

/// What the caller originally submitted; shapes the history turns written on
/// resolution.
#[derive(Debug, Clone)]
pub(crate) enum CallInput {
    Text(String),
    Audio,
}

pub(crate) struct PendingExchange {
    pub id: String,
    pub input: CallInput,
    pub return_audio: bool,
    pub input_transcript: Option<String>,
    pub deadline: Instant,
    text: String,
    audio_transcript: String,
    audio: Vec<u8>,
    reply: ExchangeReply,
    started: Instant,
}

impl PendingExchange {
    pub fn new(
        input: CallInput,
        return_audio: bool,
        reply: ExchangeReply,
        timeout: std::time::Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            return_audio,
            input_transcript: None,
            deadline: now + timeout,
            text: String::new(),
            audio_transcript: String::new(),
            audio: Vec::new(),
            reply,
            started: now,
        }
    }

    pub fn is_audio_input(&self) -> bool {
        matches!(self.input, CallInput::Audio)
    }

    pub fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn push_audio_transcript(&mut self, delta: &str) {
        self.audio_transcript.push_str(delta);
    }

    /// Appends one base64 audio chunk. Chunks that fail to decode are skipped
    /// rather than failing the whole exchange.
    pub fn push_audio(&mut self, chunk: &str) {
        match BASE64.decode(chunk) {
            Ok(bytes) => self.audio.extend_from_slice(&bytes),
            Err(e) => warn!(exchange = %self.id, error = %e, "dropping undecodable audio chunk"),
        }
    }

    /// Response text: direct text deltas win; the spoken-response transcript
    /// fills in only when no text delta ever arrived.
    fn response_text(&self) -> String {
        if self.text.is_empty() {
            self.audio_transcript.clone()
        } else {
            self.text.clone()
        }
    }

    /// Settles the exchange with its accumulated buffers and hands a copy of
    /// the outcome back for history bookkeeping.
    pub fn resolve(self) -> ExchangeResult {
        let audio_base64 = if self.return_audio && !self.audio.is_empty() {
            Some(BASE64.encode(&self.audio))
        } else {
            None
        };
        let has_audio = audio_base64.is_some();
        let result = ExchangeResult {
            response_text: self.response_text(),
            input_transcript: self.input_transcript.clone(),
            duration_ms: self.started.elapsed().as_millis() as u64,
            audio_base64,
            audio_format: has_audio.then(|| "pcm16".to_string()),
            sample_rate: has_audio.then_some(audio::SAMPLE_RATE),
        };
        let _ = self.reply.send(Ok(result.clone()));
        result
    }

    /// Settles the exchange with an error. The caller may already be gone;
    /// that is fine.
    pub fn reject(self, error: EngineError) {
        let _ = self.reply.send(Err(error));
    }
}
