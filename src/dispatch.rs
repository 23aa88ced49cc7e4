//! Intent handlers - form edits, navigation and download requests
//!
//! The dispatcher never talks to a UI toolkit directly. Forms are reached
//! through [`FormAdapter`], navigation and downloads through [`Hooks`].
//! Each dispatch returns the feedback line to speak.

use tokio::sync::mpsc;

use crate::command::{FieldFill, Intent, spoken_page_name};
use crate::session::AssistantEvent;

/// Identifier of the advanced mode switch
pub const ADVANCED_MODE_TOGGLE: &str = "advancedModeToggle";

pub const NOT_UNDERSTOOD: &str = "I didn't understand that command. Please try again.";

/// Opaque reference to a control found by a [`FormAdapter`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldHandle(pub String);

pub trait FormAdapter: Send {
    /// Look up a control by identifier, `None` if it is not on the page
    fn field(&mut self, name: &str) -> Option<FieldHandle>;

    fn set_field(&mut self, handle: &FieldHandle, value: &str);

    /// Set a checkbox-like control and notify its change listeners
    fn set_checked(&mut self, handle: &FieldHandle, checked: bool);
}

/// Form adapter for hosts without any form on screen
pub struct NoForm;

impl FormAdapter for NoForm {
    fn field(&mut self, _name: &str) -> Option<FieldHandle> {
        None
    }

    fn set_field(&mut self, _handle: &FieldHandle, _value: &str) {}

    fn set_checked(&mut self, _handle: &FieldHandle, _checked: bool) {}
}

type PathCallback = Box<dyn FnMut(&str) + Send>;

/// Host callbacks for navigation and downloads
#[derive(Default)]
pub struct Hooks {
    on_navigate: Option<PathCallback>,
    download_observers: Vec<PathCallback>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router navigation. Without it navigation falls back to [`AssistantEvent::PageLoad`].
    pub fn on_navigate(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_navigate = Some(Box::new(f));
        self
    }

    /// Called with the format (e.g. "word") whenever an export is requested
    pub fn on_download_requested(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.download_observers.push(Box::new(f));
        self
    }
}

/// Conventional event name for a download format: "word" -> "downloadWord"
pub fn download_event_name(format: &str) -> String {
    let mut chars = format.chars();
    match chars.next() {
        Some(first) => format!("download{}{}", first.to_uppercase(), chars.as_str()),
        None => "download".to_string(),
    }
}

pub struct Dispatcher {
    form: Box<dyn FormAdapter>,
    hooks: Hooks,
    event_tx: mpsc::UnboundedSender<AssistantEvent>,
    confirm_missing_targets: bool,
}

impl Dispatcher {
    pub fn new(
        form: Box<dyn FormAdapter>,
        hooks: Hooks,
        event_tx: mpsc::UnboundedSender<AssistantEvent>,
        confirm_missing_targets: bool,
    ) -> Self {
        Self {
            form,
            hooks,
            event_tx,
            confirm_missing_targets,
        }
    }

    /// Run the side effects of `intent`, returning the line to speak
    pub fn dispatch(&mut self, intent: &Intent) -> String {
        let _ = self.event_tx.send(AssistantEvent::Intent(intent.clone()));
        match intent {
            Intent::Navigate(path) => self.navigate(path),
            Intent::ToggleMode(enabled) => self.toggle_advanced_mode(*enabled),
            Intent::Download(format) => self.request_download(format),
            Intent::FillFields(fills) => self.fill_form(fills),
            Intent::Unrecognized => NOT_UNDERSTOOD.to_string(),
        }
    }

    fn navigate(&mut self, path: &str) -> String {
        tracing::info!(path, "navigating");
        match self.hooks.on_navigate.as_mut() {
            Some(navigate) => navigate(path),
            None => {
                let _ = self.event_tx.send(AssistantEvent::PageLoad(path.to_string()));
            }
        }
        format!("Taking you to the {} page.", spoken_page_name(path))
    }

    fn toggle_advanced_mode(&mut self, enabled: bool) -> String {
        let found = match self.form.field(ADVANCED_MODE_TOGGLE) {
            Some(toggle) => {
                self.form.set_checked(&toggle, enabled);
                true
            }
            None => {
                tracing::debug!(id = ADVANCED_MODE_TOGGLE, "advanced mode toggle not found");
                false
            }
        };

        if !found && !self.confirm_missing_targets {
            return "I couldn't find the advanced mode switch on this page.".to_string();
        }
        if enabled {
            "Advanced mode activated. You now have access to additional features.".to_string()
        } else {
            "Advanced mode deactivated.".to_string()
        }
    }

    /// Stateless: every request notifies every observer again
    fn request_download(&mut self, format: &str) -> String {
        let event = download_event_name(format);
        tracing::info!(format, event = %event, "download requested");
        for observer in &mut self.hooks.download_observers {
            observer(format);
        }
        let _ = self.event_tx.send(AssistantEvent::Download {
            format: format.to_string(),
            event,
        });
        format!("Preparing your {} file for download.", format)
    }

    fn fill_form(&mut self, fills: &[FieldFill]) -> String {
        let mut confirmations = Vec::new();
        for fill in fills {
            match self.form.field(&fill.field) {
                Some(input) => {
                    self.form.set_field(&input, &fill.value);
                    tracing::info!(field = %fill.field, value = %fill.value, "filled field");
                }
                None => {
                    tracing::debug!(field = %fill.field, "field not on page");
                    if !self.confirm_missing_targets {
                        continue;
                    }
                }
            }
            confirmations.push(format!("Filled {} with {}.", fill.field, fill.value));
        }

        if confirmations.is_empty() {
            NOT_UNDERSTOOD.to_string()
        } else {
            confirmations.join(" ")
        }
    }
}
