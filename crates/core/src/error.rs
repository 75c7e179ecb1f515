use thiserror::Error;

/// All failures the engine reports to its callers.
///
/// None of these are retried internally; every variant maps to a caller-visible
/// result. Background maintenance (the idle sweep) logs instead of surfacing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("realtime connection not established within the connect deadline")]
    ConnectionTimeout,

    #[error("realtime connection failed: {0}")]
    ConnectionError(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{id}' is unavailable: {reason}")]
    SessionUnavailable { id: String, reason: String },

    #[error("no response received within {0} ms")]
    RequestTimeout(u64),

    #[error("realtime service error: {0}")]
    RemoteProtocolError(String),

    #[error("maximum of {0} concurrent sessions reached")]
    LimitExceeded(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Shorthand used on every teardown path that rejects outstanding work.
    pub(crate) fn unavailable(id: &str, reason: &str) -> Self {
        Self::SessionUnavailable {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
