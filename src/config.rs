use crate::types::constants::{
    DEFAULT_LISTEN_ADDR, DEFAULT_MODEL, DEFAULT_QUEUE_BOUND, DEFAULT_SESSIONS_URL,
    DEFAULT_UPSTREAM_URL, DEFAULT_VOICE,
};
use crate::types::{RelayError, Result};
use std::time::Duration;

/// Relay configuration, read once at process start.
///
/// Environment variables:
/// - `RELAY_LISTEN_ADDR` — address the server binds (default `127.0.0.1:3001`)
/// - `RELAY_UPSTREAM_URL` — realtime WebSocket endpoint
/// - `RELAY_SESSIONS_URL` — HTTP endpoint for minting ephemeral credentials
/// - `OPENAI_API_KEY` — server-side API key consumed by the token provider
/// - `RELAY_MODEL`, `RELAY_VOICE`, `RELAY_INSTRUCTIONS` — upstream session settings
/// - `RELAY_QUEUE_BOUND` — per-session delivery queue bound (default 256)
/// - `RELAY_IDLE_TIMEOUT_MS` — optional idle timeout per session; unset means none
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub upstream_url: String,
    pub sessions_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub instructions: Option<String>,
    pub queue_bound: usize,
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            sessions_url: DEFAULT_SESSIONS_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: None,
            queue_bound: DEFAULT_QUEUE_BOUND,
            idle_timeout: None,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_var("RELAY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(url) = env_var("RELAY_UPSTREAM_URL") {
            config.upstream_url = url;
        }
        if let Some(url) = env_var("RELAY_SESSIONS_URL") {
            config.sessions_url = url;
        }
        config.api_key = env_var("OPENAI_API_KEY");
        if let Some(model) = env_var("RELAY_MODEL") {
            config.model = model;
        }
        if let Some(voice) = env_var("RELAY_VOICE") {
            config.voice = voice;
        }
        config.instructions = env_var("RELAY_INSTRUCTIONS");
        if let Some(bound) = env_var("RELAY_QUEUE_BOUND") {
            config.queue_bound = parse_queue_bound(&bound)?;
        }
        if let Some(millis) = env_var("RELAY_IDLE_TIMEOUT_MS") {
            config.idle_timeout = Some(parse_idle_timeout(&millis)?);
        }

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_queue_bound(value: &str) -> Result<usize> {
    let bound: usize = value
        .parse()
        .map_err(|_| RelayError::Config(format!("invalid queue bound: {:?}", value)))?;
    if bound == 0 {
        return Err(RelayError::Config("queue bound must be at least 1".to_string()));
    }
    Ok(bound)
}

fn parse_idle_timeout(value: &str) -> Result<Duration> {
    let millis: u64 = value
        .parse()
        .map_err(|_| RelayError::Config(format!("invalid idle timeout: {:?}", value)))?;
    Ok(Duration::from_millis(millis))
}
