use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for the engine, its agents and the oracle client.
///
/// Every field has a default, so a config file only needs the values it
/// changes. Durations are written as integer milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tick_rate_hz: u32,
    /// Walking speed in pixels per second
    pub movement_speed: f64,
    /// Radius used both for overhearing and for "close enough to talk"
    pub interaction_range: f64,
    pub arrival_epsilon: f64,

    #[serde(with = "millis")]
    pub blocked_give_up: Duration,
    #[serde(with = "millis")]
    pub idle_duration: Duration,
    #[serde(with = "millis")]
    pub conversation_timeout: Duration,
    #[serde(with = "millis")]
    pub message_debounce: Duration,
    #[serde(with = "millis")]
    pub chunk_delay: Duration,
    #[serde(with = "millis")]
    pub broadcast_interval: Duration,
    #[serde(with = "millis")]
    pub person_repath_interval: Duration,
    pub person_repath_distance: f64,
    #[serde(with = "millis")]
    pub replan_cooldown: Duration,
    #[serde(with = "millis_opt")]
    pub listen_silence_timeout: Option<Duration>,

    pub reflection_limit: usize,
    pub plan_attempts: usize,
    pub vote_candidates: Vec<String>,
    pub voting_place: String,
    pub seed: u64,
    /// Directory of `<prompt>.txt` files overriding the built-in prompts
    pub prompts_dir: Option<PathBuf>,

    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            movement_speed: 50.0,
            interaction_range: 30.0,
            arrival_epsilon: 1.0,
            blocked_give_up: Duration::from_millis(5000),
            idle_duration: Duration::from_millis(10_000),
            conversation_timeout: Duration::from_millis(15_000),
            message_debounce: Duration::from_millis(3000),
            chunk_delay: Duration::from_millis(1000),
            broadcast_interval: Duration::from_millis(5000),
            person_repath_interval: Duration::from_millis(500),
            person_repath_distance: 32.0,
            replan_cooldown: Duration::from_millis(10_000),
            listen_silence_timeout: None,
            reflection_limit: 10,
            plan_attempts: 5,
            vote_candidates: vec!["Alex Morgan".to_string(), "Jordan Reyes".to_string()],
            voting_place: "Town Hall".to_string(),
            seed: 7,
            prompts_dir: None,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

/// Where and how to reach the chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
