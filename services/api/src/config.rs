use callbridge_core::{conversation::ConversationOverrides, endpoint::ElevenLabsSettings};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_agent_id: Option<String>,
    pub elevenlabs_api_base: String,
    /// Upper bound on the whole AI handshake (URL acquisition plus socket open).
    pub ai_connect_timeout: Duration,
    pub agent_first_message: Option<String>,
    pub agent_language: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let elevenlabs_api_key = non_empty_var("ELEVENLABS_API_KEY");
        let elevenlabs_agent_id = non_empty_var("ELEVENLABS_AGENT_ID");
        let elevenlabs_api_base =
            non_empty_var("ELEVENLABS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let timeout_str =
            std::env::var("AI_CONNECT_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let ai_connect_timeout = match timeout_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "AI_CONNECT_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            elevenlabs_api_key,
            elevenlabs_agent_id,
            elevenlabs_api_base,
            ai_connect_timeout,
            agent_first_message: non_empty_var("AGENT_FIRST_MESSAGE"),
            agent_language: non_empty_var("AGENT_LANGUAGE"),
            log_level,
        })
    }

    /// Names of the credentials that are not configured. Sessions cannot reach
    /// the conversation backend until this is empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.elevenlabs_api_key.is_none() {
            missing.push("ELEVENLABS_API_KEY");
        }
        if self.elevenlabs_agent_id.is_none() {
            missing.push("ELEVENLABS_AGENT_ID");
        }
        missing
    }

    pub fn elevenlabs_settings(&self) -> ElevenLabsSettings {
        ElevenLabsSettings {
            api_base: self.elevenlabs_api_base.clone(),
            api_key: self.elevenlabs_api_key.clone(),
            agent_id: self.elevenlabs_agent_id.clone(),
            timeout: self.ai_connect_timeout,
        }
    }

    pub fn conversation_overrides(&self) -> ConversationOverrides {
        ConversationOverrides {
            first_message: self.agent_first_message.clone(),
            language: self.agent_language.clone(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
