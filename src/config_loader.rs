use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Intelligence backend
    pub intel_base_url: String,
    pub intel_timeout_ms: u64,
    pub intel_cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    // Optional LLM for free-form questions
    pub enable_llm: bool,
    pub llm_url: String,
    pub llm_model: String,
    // Voice
    pub wake_word: String,
    pub enable_wake_word: bool,
    pub speech_language: String,
    pub speech_max_alternatives: u32,
    pub restart_delay_ms: u64,
    pub vosk_model_path: String,
    // Personality
    pub humor_probability: f64,
    // Storage; empty means the platform data dir
    pub data_dir: String,
}

fn default_vosk_model_path() -> String {
    format!(
        "{}/.cache/vosk/vosk-model-small-en-us-0.15",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            intel_base_url: "http://localhost:8080".to_string(),
            intel_timeout_ms: 5000,
            intel_cache_ttl_secs: 30,
            refresh_interval_secs: 30,
            enable_llm: false,
            llm_url: "http://localhost:11434".to_string(),
            llm_model: "llama3".to_string(),
            wake_word: "hey pulse".to_string(),
            enable_wake_word: false,
            speech_language: "en-US".to_string(),
            speech_max_alternatives: 1,
            restart_delay_ms: 300,
            vosk_model_path: default_vosk_model_path(),
            humor_probability: 0.15,
            data_dir: String::new(),
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::new().unwrap_or_else(|e| {
        eprintln!("Invalid configuration ({}), falling back to defaults", e);
        Settings::default()
    }));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let builder = Config::builder()
            .set_default("intel_base_url", defaults.intel_base_url)?
            .set_default("intel_timeout_ms", defaults.intel_timeout_ms as i64)?
            .set_default("intel_cache_ttl_secs", defaults.intel_cache_ttl_secs as i64)?
            .set_default("refresh_interval_secs", defaults.refresh_interval_secs as i64)?
            .set_default("enable_llm", defaults.enable_llm)?
            .set_default("llm_url", defaults.llm_url)?
            .set_default("llm_model", defaults.llm_model)?
            .set_default("wake_word", defaults.wake_word)?
            .set_default("enable_wake_word", defaults.enable_wake_word)?
            .set_default("speech_language", defaults.speech_language)?
            .set_default("speech_max_alternatives", defaults.speech_max_alternatives as i64)?
            .set_default("restart_delay_ms", defaults.restart_delay_ms as i64)?
            .set_default("vosk_model_path", defaults.vosk_model_path)?
            .set_default("humor_probability", defaults.humor_probability)?
            .set_default("data_dir", defaults.data_dir)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Pulse").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/pulse-assistant/Pulse",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            )
            // Merge with environment variables (e.g. PULSE_INTEL_BASE_URL)
            .add_source(config::Environment::with_prefix("PULSE"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.humor_probability) {
            return Err(config::ConfigError::Message(format!(
                "Invalid humor_probability: {}. Must be between 0.0 and 1.0",
                self.humor_probability
            )));
        }
        if self.intel_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "intel_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.intel_cache_ttl_secs == 0 {
            return Err(config::ConfigError::Message(
                "intel_cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if !self.intel_base_url.starts_with("http://") && !self.intel_base_url.starts_with("https://")
        {
            return Err(config::ConfigError::Message(format!(
                "intel_base_url must be an http(s) URL, got '{}'",
                self.intel_base_url
            )));
        }
        if self.wake_word.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "wake_word must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding the preference database.
    pub fn data_path(&self) -> PathBuf {
        if !self.data_dir.is_empty() {
            return PathBuf::from(&self.data_dir);
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-assistant")
    }
}
