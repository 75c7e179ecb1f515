//! Session registry.
//!
//! Exclusive owner of every live session and its transport. The session
//! table is the only cross-call shared structure in the engine; inserts and
//! removals are atomic with respect to lookups, and everything session-local
//! lives behind the per-session dispatcher task.

use crate::connection::{Command, SessionConnection};
use crate::error::EngineError;
use crate::events::{ClientEvent, SessionConfig};
use crate::models::{
    ClosedSession, CreateSessionOptions, ExchangeResult, SessionHistory, SessionStatus,
    SessionSummary, Turn,
};
use crate::settings::EngineSettings;
use crate::transport::{Connector, Transport};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Caller-activity timestamps. The monotonic instant drives idle detection;
/// the wall clock is only for display.
pub(crate) struct Activity {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

/// Session state readable without going through the dispatcher task.
pub(crate) struct SessionShared {
    pub id: String,
    pub model: String,
    pub voice: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub status: RwLock<SessionStatus>,
    pub instructions: RwLock<String>,
    pub history: RwLock<Vec<Turn>>,
    pub last_activity: RwLock<Activity>,
}

impl SessionShared {
    fn new(id: String, settings: &EngineSettings, opts: CreateSessionOptions) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            model: settings.model.clone(),
            voice: opts.voice.unwrap_or_else(|| settings.default_voice.clone()),
            created_at,
            metadata: opts.metadata,
            status: RwLock::new(SessionStatus::Connecting),
            instructions: RwLock::new(
                opts.instructions
                    .unwrap_or_else(|| settings.default_instructions.clone()),
            ),
            history: RwLock::new(Vec::new()),
            last_activity: RwLock::new(Activity {
                instant: Instant::now(),
                wall: created_at,
            }),
        }
    }

    /// Stamps caller activity. Transport-internal events never call this, so
    /// idle detection reflects caller inactivity only.
    async fn touch(&self) {
        let mut activity = self.last_activity.write().await;
        activity.instant = Instant::now();
        activity.wall = Utc::now();
    }

    async fn summarize(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            status: *self.status.read().await,
            model: self.model.clone(),
            voice: self.voice.clone(),
            instructions: self.instructions.read().await.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity.read().await.wall,
            metadata: self.metadata.clone(),
            turn_count: self.history.read().await.len(),
        }
    }
}

#[derive(Clone)]
struct SessionHandle {
    shared: Arc<SessionShared>,
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn ensure_usable(&self) -> Result<(), EngineError> {
        match *self.shared.status.read().await {
            SessionStatus::Error => Err(EngineError::unavailable(
                &self.shared.id,
                "session is in error state",
            )),
            SessionStatus::Closed => {
                Err(EngineError::unavailable(&self.shared.id, "session closed"))
            }
            SessionStatus::Connecting | SessionStatus::Connected => Ok(()),
        }
    }
}

pub struct SessionRegistry {
    settings: EngineSettings,
    connector: Arc<dyn Connector>,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(settings: EngineSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens a new session: reserves the id, dials the transport under the
    /// connect deadline, pushes the initial configuration, and spawns the
    /// dispatcher task. A failed dial discards the reservation.
    pub async fn create_session(
        &self,
        opts: CreateSessionOptions,
    ) -> Result<SessionSummary, EngineError> {
        let id = match &opts.id {
            Some(id) if id.trim().is_empty() => {
                return Err(EngineError::InvalidInput(
                    "session id must not be empty".to_string(),
                ));
            }
            Some(id) => id.clone(),
            None => Uuid::new_v4().to_string(),
        };

        let shared = Arc::new(SessionShared::new(id.clone(), &self.settings, opts));
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        {
            let mut sessions = self.sessions.write().await;
            if let Some(max) = self.settings.max_sessions {
                if sessions.len() >= max {
                    return Err(EngineError::LimitExceeded(max));
                }
            }
            if sessions.contains_key(&id) {
                return Err(EngineError::InvalidInput(format!(
                    "session id '{id}' is already in use"
                )));
            }
            sessions.insert(
                id.clone(),
                SessionHandle {
                    shared: Arc::clone(&shared),
                    cmd_tx,
                },
            );
        }

        let transport =
            match tokio::time::timeout(self.settings.connect_timeout, self.dial(&shared)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    self.discard(&id).await;
                    return Err(e);
                }
                Err(_) => {
                    self.discard(&id).await;
                    return Err(EngineError::ConnectionTimeout);
                }
            };

        *shared.status.write().await = SessionStatus::Connected;

        let connection = SessionConnection::new(
            Arc::clone(&shared),
            transport,
            cmd_rx,
            self.settings.request_timeout,
        );
        let sessions = Arc::clone(&self.sessions);
        let task_id = id.clone();
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            connection.run().await;
            // The id may have been reused after an explicit close; only remove
            // the entry if it still belongs to this task's session.
            let mut sessions = sessions.write().await;
            if sessions
                .get(&task_id)
                .is_some_and(|handle| Arc::ptr_eq(&handle.shared, &task_shared))
            {
                sessions.remove(&task_id);
            }
            debug!(session = %task_id, "session task finished");
        });

        info!(session = %id, voice = %shared.voice, "session created");
        Ok(shared.summarize().await)
    }

    async fn dial(&self, shared: &SessionShared) -> Result<Box<dyn Transport>, EngineError> {
        let mut transport = self.connector.connect().await?;
        let config = SessionConfig {
            model: shared.model.clone(),
            instructions: shared.instructions.read().await.clone(),
            voice: shared.voice.clone(),
        };
        transport.send(ClientEvent::SessionUpdate(config)).await?;
        Ok(transport)
    }

    async fn discard(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle, EngineError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    pub async fn get_session(&self, id: &str) -> Option<SessionSummary> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        Some(handle.shared.summarize().await)
    }

    /// All live sessions, ordered by creation time.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.shared.summarize().await);
        }
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Closes a session, rejecting all of its outstanding work. Unknown ids
    /// report `SessionNotFound` rather than panicking, which also makes a
    /// second close of the same id safe.
    pub async fn close_session(&self, id: &str) -> Result<ClosedSession, EngineError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.cmd_tx.send(Command::Close { ack: ack_tx }).await.is_ok() {
            // The task rejects pending work and releases the transport before
            // acknowledging. If it already died, the entry removal above is
            // all that is left to do.
            let _ = ack_rx.await;
        }
        info!(session = %id, "session closed");
        Ok(ClosedSession { id: id.to_string() })
    }

    pub async fn send_text(
        &self,
        id: &str,
        text: impl Into<String>,
        return_audio: bool,
    ) -> Result<ExchangeResult, EngineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "text must not be empty".to_string(),
            ));
        }
        let handle = self.handle(id).await?;
        handle.ensure_usable().await?;
        handle.shared.touch().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(Command::SendText {
                text,
                return_audio,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::unavailable(id, "session task is gone"))?;
        reply_rx
            .await
            .map_err(|_| EngineError::unavailable(id, "session closed before responding"))?
    }

    /// Sends raw PCM16 audio (24 kHz mono). Container-formatted input must be
    /// unwrapped via [`crate::audio::wav_to_pcm`] before it reaches here.
    pub async fn send_audio(
        &self,
        id: &str,
        pcm: Vec<u8>,
        return_audio: bool,
    ) -> Result<ExchangeResult, EngineError> {
        if pcm.is_empty() {
            return Err(EngineError::InvalidInput(
                "audio payload must not be empty".to_string(),
            ));
        }
        if pcm.len() % 2 != 0 {
            return Err(EngineError::InvalidInput(
                "audio payload is not whole 16-bit samples".to_string(),
            ));
        }
        let handle = self.handle(id).await?;
        handle.ensure_usable().await?;
        handle.shared.touch().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(Command::SendAudio {
                pcm,
                return_audio,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::unavailable(id, "session task is gone"))?;
        reply_rx
            .await
            .map_err(|_| EngineError::unavailable(id, "session closed before responding"))?
    }

    /// Replaces the session's instructions for subsequent turns. Existing
    /// history is untouched.
    pub async fn update_instructions(
        &self,
        id: &str,
        instructions: impl Into<String>,
    ) -> Result<(), EngineError> {
        let handle = self.handle(id).await?;
        handle.ensure_usable().await?;
        handle.shared.touch().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(Command::UpdateInstructions {
                instructions: instructions.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::unavailable(id, "session task is gone"))?;
        reply_rx
            .await
            .map_err(|_| EngineError::unavailable(id, "session closed before responding"))?
    }

    pub async fn history(&self, id: &str) -> Result<SessionHistory, EngineError> {
        let handle = self.handle(id).await?;
        let messages = handle.shared.history.read().await.clone();
        Ok(SessionHistory {
            id: id.to_string(),
            total: messages.len(),
            messages,
        })
    }

    /// One pass of idle reclamation over a snapshot of the table. Closures
    /// go through the ordinary close path; individual failures are logged,
    /// never propagated.
    pub async fn sweep_once(&self) -> usize {
        let idle_after = self.settings.idle_timeout;
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                let idle = handle.shared.last_activity.read().await.instant.elapsed();
                if idle > idle_after {
                    expired.push(id.clone());
                }
            }
        }

        let mut reclaimed = 0;
        for id in expired {
            match self.close_session(&id).await {
                Ok(_) => {
                    info!(session = %id, "idle session reclaimed");
                    reclaimed += 1;
                }
                Err(e) => warn!(session = %id, error = %e, "idle sweep could not close session"),
            }
        }
        reclaimed
    }

    /// Spawns the periodic idle sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.settings.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // An interval's first tick completes immediately; skip it so the
            // first sweep happens one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reclaimed = registry.sweep_once().await;
                if reclaimed > 0 {
                    debug!(count = reclaimed, "idle sweep complete");
                }
            }
        })
    }
}
