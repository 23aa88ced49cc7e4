use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "nogen.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub commands: Vec<CustomCommand>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            product: default_product(),
            lang: default_lang(),
            wake: WakeConfig::default(),
            speech: SpeechConfig::default(),
            fields: default_fields(),
            commands: Vec::new(),
        }
    }
}

fn default_name() -> String {
    "Nogen".into()
}
fn default_product() -> String {
    "Quick Notes AI".into()
}
fn default_lang() -> String {
    "en-US".into()
}

// ============================================================================
// Wake Config
// ============================================================================

/// How long the assistant stays awake after hearing the wake word
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WakePolicyConfig {
    /// Stay awake until the assistant is dropped
    #[default]
    Sticky,
    /// Go back to sleep after one dispatched command
    SingleCommand,
    /// Go back to sleep after `timeout_secs` without a command
    Timeout,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WakeConfig {
    #[serde(default = "default_wake_word")]
    pub word: String,
    /// Tolerate transcription errors in the wake word
    #[serde(default)]
    pub fuzzy: bool,
    /// Classify whatever follows the wake word in the same utterance
    #[serde(default)]
    pub inline_commands: bool,
    #[serde(default)]
    pub policy: WakePolicyConfig,
    #[serde(default = "default_wake_timeout")]
    pub timeout_secs: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            word: default_wake_word(),
            fuzzy: false,
            inline_commands: false,
            policy: WakePolicyConfig::default(),
            timeout_secs: default_wake_timeout(),
        }
    }
}

fn default_wake_word() -> String {
    "nogen".into()
}
fn default_wake_timeout() -> u64 {
    30
}

// ============================================================================
// Speech Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Speak the welcome greeting once the microphone is live
    #[serde(default = "default_true")]
    pub greet: bool,
    #[serde(default = "default_rate")]
    pub rate: f32,
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    /// Pause between cancelling the synthesizer and queueing a new utterance
    #[serde(default = "default_speak_delay")]
    pub speak_delay_ms: u64,
    /// Restart delay after the stream ends or hits a recoverable error
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
    /// Retry interval when recognition cannot be initialized at all
    #[serde(default = "default_init_retry")]
    pub init_retry_ms: u64,
    /// Speak success feedback even when the target control does not exist
    #[serde(default)]
    pub confirm_missing_targets: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            greet: true,
            rate: default_rate(),
            pitch: default_pitch(),
            speak_delay_ms: default_speak_delay(),
            restart_delay_ms: default_restart_delay(),
            init_retry_ms: default_init_retry(),
            confirm_missing_targets: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_rate() -> f32 {
    1.0
}
fn default_pitch() -> f32 {
    1.0
}
fn default_speak_delay() -> u64 {
    300
}
fn default_restart_delay() -> u64 {
    500
}
fn default_init_retry() -> u64 {
    1000
}

/// Fixed delays used by the assistant loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub speak_delay: Duration,
    pub restart_delay: Duration,
    pub init_retry: Duration,
}

impl SpeechConfig {
    pub fn timings(&self) -> Timings {
        Timings {
            speak_delay: Duration::from_millis(self.speak_delay_ms),
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            init_retry: Duration::from_millis(self.init_retry_ms),
        }
    }
}

// ============================================================================
// Form fields and custom commands
// ============================================================================

/// Logical form field and the spoken keywords that target it
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl FieldRule {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

fn default_fields() -> Vec<FieldRule> {
    vec![
        FieldRule::new("course", &["course", "class"]),
        FieldRule::new("subject", &["subject", "topic"]),
        FieldRule::new("level", &["level", "difficulty"]),
        FieldRule::new("year", &["year", "date"]),
        FieldRule::new("topics", &["topics", "subtopics"]),
        FieldRule::new("format", &["format", "type"]),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CustomCommand {
    pub phrase: String,
    pub action: String,
}

impl Config {
    /// Load config from `path`, or from `nogen.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_PATH);
                if !fallback.exists() {
                    return Ok(Config::default());
                }
                fallback.to_path_buf()
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    /// Replace the wake word, with the same clean-up as a configured one
    pub fn set_wake_word(&mut self, word: &str) {
        self.wake.word = word.trim().to_lowercase();
        if self.wake.word.is_empty() {
            tracing::warn!("empty wake word, using default");
            self.wake.word = default_wake_word();
        }
    }

    /// Matching is done on lower-cased transcripts, so keywords are lower-cased too
    fn normalize(&mut self) {
        let word = std::mem::take(&mut self.wake.word);
        self.set_wake_word(&word);
        for field in &mut self.fields {
            field.keywords = field
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }
        for command in &mut self.commands {
            command.phrase = command.phrase.trim().to_lowercase();
        }
    }

    pub fn timings(&self) -> Timings {
        self.speech.timings()
    }
}
