use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use voxbridge_core::EngineSettings;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub realtime_endpoint: String,
    pub model: String,
    pub voice: String,
    pub max_sessions: Option<usize>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub log_level: Level,
}

fn secs_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-10-01".to_string());
        let realtime_endpoint = std::env::var("REALTIME_ENDPOINT")
            .unwrap_or_else(|_| format!("wss://api.openai.com/v1/realtime?model={model}"));
        let voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let max_sessions = match std::env::var("MAX_SESSIONS") {
            Ok(raw) => Some(raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MAX_SESSIONS".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };

        let connect_timeout_secs = secs_var("CONNECT_TIMEOUT_SECS", 15)?;
        let request_timeout_secs = secs_var("REQUEST_TIMEOUT_SECS", 30)?;
        let idle_timeout_secs = secs_var("SESSION_IDLE_TIMEOUT_SECS", 300)?;
        let sweep_interval_secs = secs_var("SESSION_SWEEP_INTERVAL_SECS", 60)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_endpoint,
            model,
            voice,
            max_sessions,
            connect_timeout_secs,
            request_timeout_secs,
            idle_timeout_secs,
            sweep_interval_secs,
            log_level,
        })
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            model: self.model.clone(),
            default_voice: self.voice.clone(),
            max_sessions: self.max_sessions,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            ..EngineSettings::default()
        }
    }
}
