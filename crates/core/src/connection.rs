//! Per-session transport dispatcher.
//!
//! Each live session runs one `SessionConnection` task that owns the
//! transport exclusively. The task translates engine-level commands into
//! outbound protocol intents and routes inbound events into the active
//! exchange. The wire protocol carries no usable correlation id, so exactly
//! one exchange is in flight per session; calls issued while one is active
//! wait in a FIFO queue and are dispatched only after the predecessor
//! settles. Events that arrive while nothing is active are dropped.

use crate::audio;
use crate::error::EngineError;
use crate::events::{ClientEvent, ServerEvent, SessionConfig};
use crate::models::{ContentKind, SessionStatus, Turn, TurnRole};
use crate::pending::{CallInput, ExchangeReply, PendingExchange};
use crate::registry::SessionShared;
use crate::transport::Transport;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

/// The transport rejects oversized frames, so input audio is appended in
/// chunks of at most ~15 000 base64 characters (11 250 raw bytes).
const AUDIO_CHUNK_BYTES: usize = 11_250;

pub(crate) enum Command {
    SendText {
        text: String,
        return_audio: bool,
        reply: ExchangeReply,
    },
    SendAudio {
        pcm: Vec<u8>,
        return_audio: bool,
        reply: ExchangeReply,
    },
    UpdateInstructions {
        instructions: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

enum QueuedCall {
    Text {
        text: String,
        return_audio: bool,
        reply: ExchangeReply,
    },
    Audio {
        pcm: Vec<u8>,
        return_audio: bool,
        reply: ExchangeReply,
    },
}

impl QueuedCall {
    fn reject(self, error: EngineError) {
        let reply = match self {
            QueuedCall::Text { reply, .. } => reply,
            QueuedCall::Audio { reply, .. } => reply,
        };
        let _ = reply.send(Err(error));
    }
}

enum Step {
    Cmd(Option<Command>),
    Event(Option<Result<ServerEvent, EngineError>>),
    Timeout,
}

enum ExitReason {
    /// Command channel closed: the registry dropped this session.
    Orphaned,
    /// Remote end closed the stream.
    RemoteClosed,
    Failed(EngineError),
}

pub(crate) struct SessionConnection {
    shared: Arc<SessionShared>,
    transport: Box<dyn Transport>,
    cmd_rx: mpsc::Receiver<Command>,
    request_timeout: Duration,
    pending: Option<PendingExchange>,
    queue: VecDeque<QueuedCall>,
}

impl SessionConnection {
    pub fn new(
        shared: Arc<SessionShared>,
        transport: Box<dyn Transport>,
        cmd_rx: mpsc::Receiver<Command>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            shared,
            transport,
            cmd_rx,
            request_timeout,
            pending: None,
            queue: VecDeque::new(),
        }
    }

    pub async fn run(mut self) {
        let reason = loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);
            let step = {
                let Self {
                    cmd_rx, transport, ..
                } = &mut self;
                tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => Step::Cmd(cmd),
                    event = transport.next_event() => Step::Event(event),
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        Step::Timeout
                    }
                }
            };

            match step {
                Step::Cmd(None) => break ExitReason::Orphaned,
                Step::Cmd(Some(Command::Close { ack })) => {
                    self.teardown(
                        SessionStatus::Closed,
                        EngineError::unavailable(&self.shared.id, "session closed"),
                    )
                    .await;
                    let _ = ack.send(());
                    return;
                }
                Step::Cmd(Some(cmd)) => {
                    if let Err(e) = self.handle_command(cmd).await {
                        break ExitReason::Failed(e);
                    }
                }
                Step::Event(Some(Ok(event))) => {
                    if let Err(e) = self.handle_event(event).await {
                        break ExitReason::Failed(e);
                    }
                }
                Step::Event(Some(Err(e))) => break ExitReason::Failed(e),
                Step::Event(None) => break ExitReason::RemoteClosed,
                Step::Timeout => {
                    if let Err(e) = self.expire_active().await {
                        break ExitReason::Failed(e);
                    }
                }
            }
        };

        match reason {
            ExitReason::Orphaned => {
                self.teardown(
                    SessionStatus::Closed,
                    EngineError::unavailable(&self.shared.id, "session closed"),
                )
                .await;
            }
            ExitReason::RemoteClosed => {
                debug!(session = %self.shared.id, "remote service closed the connection");
                self.teardown(
                    SessionStatus::Closed,
                    EngineError::unavailable(&self.shared.id, "connection closed by remote service"),
                )
                .await;
            }
            ExitReason::Failed(e) => {
                warn!(session = %self.shared.id, error = %e, "session transport failed");
                self.teardown(SessionStatus::Error, e).await;
            }
        }
    }

    /// Rejects everything outstanding, records the terminal status, and
    /// releases the transport.
    async fn teardown(&mut self, status: SessionStatus, cause: EngineError) {
        if let Some(pending) = self.pending.take() {
            pending.reject(cause.clone());
        }
        for queued in self.queue.drain(..) {
            queued.reject(cause.clone());
        }
        *self.shared.status.write().await = status;
        self.transport.close().await;
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<(), EngineError> {
        match cmd {
            Command::SendText {
                text,
                return_audio,
                reply,
            } => {
                if self.pending.is_some() {
                    self.queue.push_back(QueuedCall::Text {
                        text,
                        return_audio,
                        reply,
                    });
                } else {
                    self.start_text(text, return_audio, reply).await?;
                }
            }
            Command::SendAudio {
                pcm,
                return_audio,
                reply,
            } => {
                if self.pending.is_some() {
                    self.queue.push_back(QueuedCall::Audio {
                        pcm,
                        return_audio,
                        reply,
                    });
                } else {
                    self.start_audio(pcm, return_audio, reply).await?;
                }
            }
            Command::UpdateInstructions {
                instructions,
                reply,
            } => {
                *self.shared.instructions.write().await = instructions.clone();
                let config = SessionConfig {
                    model: self.shared.model.clone(),
                    instructions,
                    voice: self.shared.voice.clone(),
                };
                match self.transport.send(ClientEvent::SessionUpdate(config)).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.clone()));
                        return Err(e);
                    }
                }
            }
            Command::Close { .. } => unreachable!("close is handled in the run loop"),
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ServerEvent) -> Result<(), EngineError> {
        match event {
            ServerEvent::TextDelta(delta) => match &mut self.pending {
                Some(pending) => pending.push_text(&delta),
                None => trace!(session = %self.shared.id, "dropping text delta with no active exchange"),
            },
            ServerEvent::AudioDelta(chunk) => {
                if let Some(pending) = &mut self.pending {
                    if pending.return_audio {
                        pending.push_audio(&chunk);
                    }
                } else {
                    trace!(session = %self.shared.id, "dropping audio delta with no active exchange");
                }
            }
            ServerEvent::AudioTranscriptDelta(delta) => {
                if let Some(pending) = &mut self.pending {
                    pending.push_audio_transcript(&delta);
                }
            }
            ServerEvent::InputTranscriptCompleted(transcript) => {
                if let Some(pending) = &mut self.pending {
                    if pending.is_audio_input() {
                        pending.input_transcript = Some(transcript);
                    }
                }
            }
            ServerEvent::ResponseDone => {
                match self.pending.take() {
                    Some(pending) => self.finish(pending).await,
                    None => trace!(session = %self.shared.id, "dropping terminal event with no active exchange"),
                }
                self.dispatch_next().await?;
            }
            ServerEvent::Error(message) => {
                match self.pending.take() {
                    Some(pending) => {
                        pending.reject(EngineError::RemoteProtocolError(message));
                    }
                    None => {
                        warn!(session = %self.shared.id, %message, "remote error with no active exchange");
                    }
                }
                self.dispatch_next().await?;
            }
            ServerEvent::SessionAck => {
                trace!(session = %self.shared.id, "session configuration acknowledged");
            }
            ServerEvent::Informational(kind) => {
                trace!(session = %self.shared.id, %kind, "ignoring informational event");
            }
        }
        Ok(())
    }

    /// Resolves the active exchange and records both turns.
    async fn finish(&mut self, pending: PendingExchange) {
        let input = pending.input.clone();
        let transcript = pending.input_transcript.clone();
        let result = pending.resolve();

        let now = Utc::now();
        let (content, content_type, has_audio) = match input {
            CallInput::Text(text) => (text, ContentKind::Text, false),
            CallInput::Audio => (
                transcript.unwrap_or_else(|| "[audio message]".to_string()),
                ContentKind::Audio,
                true,
            ),
        };
        let mut history = self.shared.history.write().await;
        history.push(Turn {
            role: TurnRole::User,
            content,
            timestamp: now,
            content_type,
            has_audio,
        });
        history.push(Turn {
            role: TurnRole::Assistant,
            content: result.response_text.clone(),
            timestamp: now,
            content_type: ContentKind::Text,
            has_audio: result.audio_base64.is_some(),
        });
    }

    /// Fires the active exchange's deadline: reject the caller, try to cancel
    /// the remote response so late deltas stop, and move on.
    async fn expire_active(&mut self) -> Result<(), EngineError> {
        if let Some(pending) = self.pending.take() {
            warn!(
                session = %self.shared.id,
                exchange = %pending.id,
                "no terminal event within the response deadline"
            );
            pending.reject(EngineError::RequestTimeout(
                self.request_timeout.as_millis() as u64,
            ));
            self.transport.send(ClientEvent::ResponseCancel).await?;
        }
        self.dispatch_next().await
    }

    async fn dispatch_next(&mut self) -> Result<(), EngineError> {
        match self.queue.pop_front() {
            Some(QueuedCall::Text {
                text,
                return_audio,
                reply,
            }) => self.start_text(text, return_audio, reply).await,
            Some(QueuedCall::Audio {
                pcm,
                return_audio,
                reply,
            }) => self.start_audio(pcm, return_audio, reply).await,
            None => Ok(()),
        }
    }

    async fn start_text(
        &mut self,
        text: String,
        return_audio: bool,
        reply: ExchangeReply,
    ) -> Result<(), EngineError> {
        self.pending = Some(PendingExchange::new(
            CallInput::Text(text.clone()),
            return_audio,
            reply,
            self.request_timeout,
        ));
        self.transport
            .send(ClientEvent::ConversationItemCreate { text })
            .await?;
        self.transport
            .send(ClientEvent::ResponseCreate {
                modalities: modalities(return_audio),
            })
            .await
    }

    async fn start_audio(
        &mut self,
        pcm: Vec<u8>,
        return_audio: bool,
        reply: ExchangeReply,
    ) -> Result<(), EngineError> {
        debug!(
            session = %self.shared.id,
            bytes = pcm.len(),
            seconds = audio::estimate_duration_secs(&pcm, audio::SAMPLE_RATE),
            "uploading input audio"
        );
        self.pending = Some(PendingExchange::new(
            CallInput::Audio,
            return_audio,
            reply,
            self.request_timeout,
        ));
        self.transport.send(ClientEvent::InputAudioBufferClear).await?;
        for chunk in pcm.chunks(AUDIO_CHUNK_BYTES) {
            self.transport
                .send(ClientEvent::InputAudioBufferAppend {
                    audio: BASE64.encode(chunk),
                })
                .await?;
        }
        self.transport.send(ClientEvent::InputAudioBufferCommit).await?;
        self.transport
            .send(ClientEvent::ResponseCreate {
                modalities: modalities(return_audio),
            })
            .await
    }
}

fn modalities(return_audio: bool) -> Vec<String> {
    if return_audio {
        vec!["text".to_string(), "audio".to_string()]
    } else {
        vec!["text".to_string()]
    }
}
