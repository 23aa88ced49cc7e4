//! Wake word gate - keeps commands out until the wake word has been heard

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{WakeConfig, WakePolicyConfig};
use crate::fuzzy::contains_phrase;

/// When an awake gate falls back asleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePolicy {
    /// Never, once woken the gate stays open
    Sticky,
    /// After the next dispatched command
    SingleCommand,
    /// After this long without waking or dispatching
    Timeout(Duration),
}

impl WakePolicy {
    pub fn from_config(config: &WakeConfig) -> Self {
        match config.policy {
            WakePolicyConfig::Sticky => WakePolicy::Sticky,
            WakePolicyConfig::SingleCommand => WakePolicy::SingleCommand,
            WakePolicyConfig::Timeout => {
                WakePolicy::Timeout(Duration::from_secs(config.timeout_secs))
            }
        }
    }
}

/// What to do with one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Asleep and no wake word, drop it
    Ignored,
    /// Wake word just heard. `remainder` is the text after it, present only
    /// when inline commands are enabled and the text is non-empty.
    Woke { remainder: Option<String> },
    /// Already awake, classify the whole transcript
    Forward,
}

pub struct WakeGate {
    word: String,
    fuzzy: bool,
    inline_commands: bool,
    policy: WakePolicy,
    /// Set while awake: time of waking or of the last dispatched command
    last_activity: Option<Instant>,
}

impl WakeGate {
    pub fn new(config: &WakeConfig) -> Self {
        Self {
            word: config.word.to_lowercase(),
            fuzzy: config.fuzzy,
            inline_commands: config.inline_commands,
            policy: WakePolicy::from_config(config),
            last_activity: None,
        }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn policy(&self) -> WakePolicy {
        self.policy
    }

    pub fn is_awake(&self, now: Instant) -> bool {
        match (self.last_activity, self.policy) {
            (None, _) => false,
            (Some(since), WakePolicy::Timeout(timeout)) => now.duration_since(since) < timeout,
            (Some(_), _) => true,
        }
    }

    /// When the current wake window lapses on its own, if it ever does
    pub fn asleep_at(&self) -> Option<Instant> {
        match (self.last_activity, self.policy) {
            (Some(since), WakePolicy::Timeout(timeout)) => Some(since + timeout),
            _ => None,
        }
    }

    /// Pass a normalized transcript through the gate
    pub fn observe(&mut self, transcript: &str, now: Instant) -> Gate {
        if self.is_awake(now) {
            return Gate::Forward;
        }
        self.last_activity = None;

        let Some(end) = contains_phrase(transcript, &self.word, self.fuzzy) else {
            return Gate::Ignored;
        };
        self.last_activity = Some(now);

        let remainder = if self.inline_commands {
            let rest = transcript[end..]
                .trim_start_matches([',', '!', '.', '?', ' '])
                .trim();
            (!rest.is_empty()).then(|| rest.to_string())
        } else {
            None
        };
        Gate::Woke { remainder }
    }

    /// Apply the policy after a command has been handled
    pub fn command_dispatched(&mut self, now: Instant) {
        match self.policy {
            WakePolicy::Sticky => {}
            WakePolicy::SingleCommand => self.last_activity = None,
            WakePolicy::Timeout(_) => {
                if self.last_activity.is_some() {
                    self.last_activity = Some(now);
                }
            }
        }
    }
}
