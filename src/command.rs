//! Command classifier - turns an awake transcript into exactly one intent
//!
//! Rules are checked in order and the first match wins:
//! 1. AI assistant navigation ("open ai assistant", "go to ai assistant")
//! 2. Advanced mode on / off
//! 3. Word download
//! 4. Custom commands from config
//! 5. Form filling against the field table (fallback)

use std::fmt;

use crate::config::{Config, FieldRule};

/// Route of the AI assistant page
pub const AI_ASSISTANT_PATH: &str = "/AiAssistant";

/// Classified meaning of one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Navigate(String),
    ToggleMode(bool),
    Download(String),
    /// One entry per matched field, in field table order
    FillFields(Vec<FieldFill>),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFill {
    pub field: String,
    pub value: String,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Navigate(path) => write!(f, "navigate {}", path),
            Intent::ToggleMode(true) => write!(f, "advanced mode on"),
            Intent::ToggleMode(false) => write!(f, "advanced mode off"),
            Intent::Download(format) => write!(f, "download {}", format),
            Intent::FillFields(fills) => {
                write!(f, "fill")?;
                for fill in fills {
                    write!(f, " {}={:?}", fill.field, fill.value)?;
                }
                Ok(())
            }
            Intent::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

struct CustomCommandDef {
    phrase: String,
    intent: Intent,
}

pub struct CommandClassifier {
    fields: Vec<FieldRule>,
    custom_commands: Vec<CustomCommandDef>,
}

impl CommandClassifier {
    pub fn new(config: &Config) -> Self {
        let custom_commands = config
            .commands
            .iter()
            .filter_map(|c| match parse_action(&c.action) {
                Some(intent) if !c.phrase.is_empty() => Some(CustomCommandDef {
                    phrase: c.phrase.to_lowercase(),
                    intent,
                }),
                _ => {
                    tracing::warn!(phrase = %c.phrase, action = %c.action, "skipping invalid custom command");
                    None
                }
            })
            .collect();

        Self {
            fields: config.fields.clone(),
            custom_commands,
        }
    }

    pub fn classify(&self, transcript: &str) -> Intent {
        let text = transcript.trim().to_lowercase();

        if let Some(intent) = check_builtin(&text) {
            return intent;
        }
        if let Some(intent) = self.check_custom(&text) {
            return intent;
        }
        self.fill_fields(&text)
    }

    fn check_custom(&self, text: &str) -> Option<Intent> {
        self.custom_commands
            .iter()
            .find(|cmd| text.contains(&cmd.phrase))
            .map(|cmd| cmd.intent.clone())
    }

    /// Every field whose keyword occurs gets the text after that keyword
    fn fill_fields(&self, text: &str) -> Intent {
        let fills: Vec<FieldFill> = self
            .fields
            .iter()
            .filter_map(|rule| {
                let (keyword, pos) = rule
                    .keywords
                    .iter()
                    .find_map(|k| text.find(k.as_str()).map(|pos| (k, pos)))?;
                Some(FieldFill {
                    field: rule.name.clone(),
                    value: text[pos + keyword.len()..].trim().to_string(),
                })
            })
            .collect();

        if fills.is_empty() {
            Intent::Unrecognized
        } else {
            Intent::FillFields(fills)
        }
    }
}

fn check_builtin(text: &str) -> Option<Intent> {
    if text.contains("ai assistant")
        && (text.contains("go to") || text.contains("open") || text.contains("turn on"))
    {
        return Some(Intent::Navigate(AI_ASSISTANT_PATH.to_string()));
    }

    if text.contains("turn on advanced mode") {
        return Some(Intent::ToggleMode(true));
    }

    if text.contains("turn off advanced mode") {
        return Some(Intent::ToggleMode(false));
    }

    if text.contains("download as word file") {
        return Some(Intent::Download("word".to_string()));
    }

    None
}

/// Parse action string from config into an intent
fn parse_action(action: &str) -> Option<Intent> {
    let (kind, arg) = action.trim().split_once(':')?;
    let arg = arg.trim();
    match kind.trim() {
        "navigate" if arg.starts_with('/') => Some(Intent::Navigate(arg.to_string())),
        "mode" => match arg {
            "on" => Some(Intent::ToggleMode(true)),
            "off" => Some(Intent::ToggleMode(false)),
            _ => None,
        },
        "download" if !arg.is_empty() => Some(Intent::Download(arg.to_lowercase())),
        _ => None,
    }
}

/// Page name for spoken feedback: "/AiAssistant" -> "Ai Assistant"
pub fn spoken_page_name(path: &str) -> String {
    let bare = path.strip_prefix('/').unwrap_or(path);
    let mut name = String::with_capacity(bare.len() + 4);
    let mut prev: Option<char> = None;
    for c in bare.chars() {
        if c == '-' {
            name.push(' ');
        } else {
            if c.is_uppercase() && prev.is_some_and(char::is_lowercase) {
                name.push(' ');
            }
            name.push(c);
        }
        prev = Some(c);
    }
    name
}
