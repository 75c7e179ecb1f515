//! Engine tunables.

use std::time::Duration;

/// Knobs for the registry and its sessions. [`Default`] carries the
/// documented production values; tests shrink the timeouts.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Model identifier sent in the initial session configuration.
    pub model: String,
    /// Voice tag used when the caller does not supply one.
    pub default_voice: String,
    /// Instructions used when the caller does not supply any.
    pub default_instructions: String,
    /// Maximum live sessions; `None` means unlimited.
    pub max_sessions: Option<usize>,
    /// Deadline for establishing and configuring a transport.
    pub connect_timeout: Duration,
    /// Deadline for a terminal event after a call is dispatched.
    pub request_timeout: Duration,
    /// Caller inactivity after which a session is reclaimed.
    pub idle_timeout: Duration,
    /// Interval of the background idle sweep.
    pub sweep_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            default_voice: "alloy".to_string(),
            default_instructions: "You are a helpful voice assistant.".to_string(),
            max_sessions: None,
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}
