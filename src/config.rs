// src/config.rs
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::env;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1";
pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.5-flash";
pub const PREFERRED_MODELS: [&str; 4] = [
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// Sampling parameters sent with every generate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Key source
    pub keys_file: PathBuf,

    // Provider
    pub api_base_url: String,
    pub model: Option<String>, // Fixed model; skips resolution when set
    pub fallback_model: String,
    pub preferred_models: Vec<String>,
    pub resolve_model: bool,

    // Conversation
    pub max_history: usize,
    pub generation: GenerationSettings,

    // Retry / timeouts
    pub request_timeout_secs: u64,
    pub retry_multiplier: u32,
    pub backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            keys_file: PathBuf::from("keys.txt"),
            api_base_url: DEFAULT_API_BASE.to_string(),
            model: None,
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            preferred_models: PREFERRED_MODELS.iter().map(|m| m.to_string()).collect(),
            resolve_model: true,
            max_history: 50,
            generation: GenerationSettings::default(),
            request_timeout_secs: 120,
            retry_multiplier: 2,
            backoff_ms: 1000,
        }
    }
}

// Reads `name` from the environment; unset or blank means "keep the default".
fn env_value<T: FromStr>(name: &str) -> Result<Option<T>, ConfigurationError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigurationError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
        _ => Ok(None),
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigurationError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Builds a config from the current process environment only.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut config = Config::default();

        if let Some(path) = env_value::<PathBuf>("KEYCHAT_KEYS_FILE")? {
            config.keys_file = path;
        }
        if let Some(base) = env_value::<String>("KEYCHAT_API_BASE")? {
            config.api_base_url = base.trim_end_matches('/').to_string();
        }
        config.model = env_value::<String>("KEYCHAT_MODEL")?;
        if let Some(fallback) = env_value::<String>("KEYCHAT_FALLBACK_MODEL")? {
            config.fallback_model = fallback;
        }
        if let Some(resolve) = env_value::<bool>("KEYCHAT_RESOLVE_MODEL")? {
            config.resolve_model = resolve;
        }
        if let Some(n) = env_value::<usize>("KEYCHAT_MAX_HISTORY")? {
            config.max_history = n;
        }
        if let Some(secs) = env_value::<u64>("KEYCHAT_TIMEOUT_SECS")? {
            config.request_timeout_secs = secs;
        }
        if let Some(multiplier) = env_value::<u32>("KEYCHAT_RETRY_MULTIPLIER")? {
            config.retry_multiplier = multiplier.max(1);
        }
        if let Some(ms) = env_value::<u64>("KEYCHAT_BACKOFF_MS")? {
            config.backoff_ms = ms;
        }

        let generation = &mut config.generation;
        if let Some(v) = env_value::<f32>("KEYCHAT_TEMPERATURE")? {
            generation.temperature = v;
        }
        if let Some(v) = env_value::<f32>("KEYCHAT_TOP_P")? {
            generation.top_p = v;
        }
        if let Some(v) = env_value::<u32>("KEYCHAT_TOP_K")? {
            generation.top_k = v;
        }
        if let Some(v) = env_value::<u32>("KEYCHAT_MAX_OUTPUT_TOKENS")? {
            generation.max_output_tokens = v;
        }

        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
