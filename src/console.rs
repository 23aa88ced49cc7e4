//! Console adapters - typed lines stand in for the microphone, speech is printed
//!
//! Lines starting with `!` simulate stream events:
//! `!error <code>` reports a recognition error, `!end` ends the stream.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::Config;
use crate::dispatch::{ADVANCED_MODE_TOGGLE, FieldHandle, FormAdapter};
use crate::error::SpeechError;
use crate::session::AssistantHandle;
use crate::speech::{
    RecognitionEvent, RecognitionSender, RecognitionStream, SpeechInput, SpeechOutput, Utterance,
};

/// Parse one console line into a recognition event
pub fn parse_line(line: &str) -> Option<RecognitionEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.strip_prefix('!') {
        Some("end") => Some(RecognitionEvent::End),
        Some(rest) => {
            let code = rest.strip_prefix("error")?.trim();
            code.parse().ok().map(RecognitionEvent::Error)
        }
        None => Some(RecognitionEvent::Result(line.to_string())),
    }
}

#[derive(Default)]
struct LineRoute {
    target: Mutex<Option<RecognitionSender>>,
    active: AtomicBool,
}

/// Recognition input fed by a stdin reader thread
#[derive(Clone, Default)]
pub struct ConsoleInput {
    route: Arc<LineRoute>,
}

impl ConsoleInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read stdin on a background thread. The first line counts as the user
    /// interaction that opens the microphone, later lines are transcripts.
    pub fn spawn_reader(&self, handle: AssistantHandle) -> thread::JoinHandle<()> {
        let route = Arc::clone(&self.route);
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut interacted = false;
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if !interacted {
                    interacted = true;
                    handle.user_interaction();
                    continue;
                }
                let Some(event) = parse_line(&line) else { continue };
                if !route.active.load(Ordering::SeqCst) {
                    tracing::debug!("microphone off, dropping input");
                    continue;
                }
                let target = route.target.lock().ok().and_then(|t| t.clone());
                if let Some(tx) = target {
                    let _ = tx.send(event);
                }
            }
            handle.shutdown();
        })
    }
}

impl SpeechInput for ConsoleInput {
    fn open(
        &mut self,
        _lang: &str,
        events: RecognitionSender,
    ) -> Result<Box<dyn RecognitionStream>, SpeechError> {
        let mut target = self
            .route
            .target
            .lock()
            .map_err(|_| SpeechError::Init("console input poisoned".into()))?;
        *target = Some(events.clone());
        Ok(Box::new(ConsoleStream {
            route: Arc::clone(&self.route),
            events,
        }))
    }
}

struct ConsoleStream {
    route: Arc<LineRoute>,
    events: RecognitionSender,
}

impl RecognitionStream for ConsoleStream {
    fn start(&mut self) -> Result<(), SpeechError> {
        self.route.active.store(true, Ordering::SeqCst);
        let _ = self.events.send(RecognitionEvent::Started);
        Ok(())
    }

    fn stop(&mut self) {
        self.route.active.store(false, Ordering::SeqCst);
    }
}

/// Prints utterances instead of playing them
#[derive(Default)]
pub struct ConsoleSpeech;

impl SpeechOutput for ConsoleSpeech {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        let mut out = std::io::stdout();
        writeln!(out, "\r\x1b[K\x1b[35m♪ {}\x1b[0m", utterance.text)
            .and_then(|_| out.flush())
            .map_err(|e| SpeechError::Synthesis(e.to_string()))
    }

    fn cancel(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

/// In-memory form with the configured fields and the advanced mode switch
pub struct ConsoleForm {
    values: HashMap<String, String>,
    checked: HashMap<String, bool>,
}

impl ConsoleForm {
    pub fn new(config: &Config) -> Self {
        let values = config
            .fields
            .iter()
            .map(|f| (f.name.clone(), String::new()))
            .collect();
        let checked = HashMap::from([(ADVANCED_MODE_TOGGLE.to_string(), false)]);
        Self { values, checked }
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl FormAdapter for ConsoleForm {
    fn field(&mut self, name: &str) -> Option<FieldHandle> {
        (self.values.contains_key(name) || self.checked.contains_key(name))
            .then(|| FieldHandle(name.to_string()))
    }

    fn set_field(&mut self, handle: &FieldHandle, value: &str) {
        println!("\r\x1b[K\x1b[90m[form] {} = {:?}\x1b[0m", handle.0, value);
        self.values.insert(handle.0.clone(), value.to_string());
    }

    fn set_checked(&mut self, handle: &FieldHandle, checked: bool) {
        println!("\r\x1b[K\x1b[90m[form] {} -> {}\x1b[0m", handle.0, checked);
        self.checked.insert(handle.0.clone(), checked);
    }
}
