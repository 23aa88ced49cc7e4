//! Assistant session - owns recognition, synthesis and dispatch
//!
//! Everything runs inside one task. Recognition events, control commands
//! and the assistant's own timers (delayed speech, stream restart,
//! re-initialization) are multiplexed with `tokio::select!`, so no state
//! is shared mutably across tasks.

use chrono::Timelike;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::command::{CommandClassifier, Intent};
use crate::config::{Config, Timings};
use crate::dispatch::{Dispatcher, FormAdapter, Hooks};
use crate::speech::{
    RecognitionError, RecognitionEvent, RecognitionStream, SpeechInput, SpeechOutput, Utterance,
    normalize_transcript,
};
use crate::state::{AssistantStatus, Lifecycle, SharedStatus};
use crate::wake::{Gate, WakeGate};

pub const ACKNOWLEDGEMENT: &str = "Yes, I am listening. What do you want me to do?";

pub enum SessionCommand {
    /// Arm the assistant; recognition starts on the next user interaction
    Start,
    UserInteraction,
    Stop,
    Shutdown,
}

/// Status updates for the host UI
#[derive(Clone, Debug, PartialEq)]
pub enum AssistantEvent {
    Listening,
    Heard(String),
    Woke,
    Intent(Intent),
    /// No router callback installed, the host should load `path` itself
    PageLoad(String),
    Download { format: String, event: String },
    /// Utterance handed to the synthesizer
    Said(String),
    Stopped,
}

/// Cloneable control handle for a running [`Assistant`]
#[derive(Clone)]
pub struct AssistantHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    status: SharedStatus,
}

impl AssistantHandle {
    pub fn start(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Start);
    }

    /// Report a click or key press. The first one after `start` opens the microphone.
    pub fn user_interaction(&self) {
        let _ = self.cmd_tx.send(SessionCommand::UserInteraction);
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Stop);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }

    pub fn status(&self) -> &AssistantStatus {
        &self.status
    }
}

/// Greeting for the local hour
pub fn greeting(hour: u32, name: &str, product: &str) -> String {
    let salutation = if hour < 12 { "Good morning" } else { "Good evening" };
    format!(
        "{}, Welcome to {}. I am your assistant, {}. Ask anything if you want.",
        salutation, product, name
    )
}

async fn recv_event(
    rx: Option<&flume::Receiver<RecognitionEvent>>,
) -> Result<RecognitionEvent, flume::RecvError> {
    match rx {
        Some(rx) => rx.recv_async().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub struct Assistant {
    config: Config,
    timings: Timings,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    gate: WakeGate,
    classifier: CommandClassifier,
    dispatcher: Dispatcher,
    status: SharedStatus,
    event_tx: mpsc::UnboundedSender<AssistantEvent>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    /// Events of the current stream only. Replaced with the stream, so a
    /// discarded stream can never reach its successor.
    recognition_rx: Option<flume::Receiver<RecognitionEvent>>,
    stream: Option<Box<dyn RecognitionStream>>,
    /// Waiting for the first user interaction
    armed: bool,
    pending_speech: Option<(Utterance, Instant)>,
    restart_at: Option<Instant>,
    reinit_at: Option<Instant>,
}

impl Assistant {
    pub fn new(
        config: Config,
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        form: Box<dyn FormAdapter>,
        hooks: Hooks,
    ) -> (Self, AssistantHandle, mpsc::UnboundedReceiver<AssistantEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let status = AssistantStatus::new();

        let assistant = Self {
            timings: config.timings(),
            gate: WakeGate::new(&config.wake),
            classifier: CommandClassifier::new(&config),
            dispatcher: Dispatcher::new(
                form,
                hooks,
                event_tx.clone(),
                config.speech.confirm_missing_targets,
            ),
            config,
            input,
            output,
            status: Arc::clone(&status),
            event_tx,
            cmd_rx,
            recognition_rx: None,
            stream: None,
            armed: false,
            pending_speech: None,
            restart_at: None,
            reinit_at: None,
        };
        let handle = AssistantHandle { cmd_tx, status };
        (assistant, handle, event_rx)
    }

    /// Event loop. Returns on `shutdown` or when every handle is dropped.
    pub async fn run(mut self) {
        loop {
            let speech_deadline = self.pending_speech.as_ref().map(|(_, at)| *at);
            let restart_deadline = self.restart_at;
            let reinit_deadline = self.reinit_at;
            let asleep_deadline = if self.status.is_awake() {
                self.gate.asleep_at()
            } else {
                None
            };

            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Start) => self.arm(),
                        Some(SessionCommand::UserInteraction) => self.on_user_interaction(),
                        Some(SessionCommand::Stop) => self.stop(),
                        Some(SessionCommand::Shutdown) | None => {
                            self.stop();
                            break;
                        }
                    }
                }

                event = recv_event(self.recognition_rx.as_ref()), if self.recognition_rx.is_some() => {
                    match event {
                        Ok(event) => self.handle_recognition(event),
                        Err(_) => {
                            tracing::debug!("recognition stream dropped its sender");
                            self.recognition_rx = None;
                        }
                    }
                }

                _ = sleep_until_opt(speech_deadline), if speech_deadline.is_some() => {
                    self.flush_speech();
                }

                _ = sleep_until_opt(restart_deadline), if restart_deadline.is_some() => {
                    self.restart_stream();
                }

                _ = sleep_until_opt(reinit_deadline), if reinit_deadline.is_some() => {
                    self.init_recognition();
                }

                _ = sleep_until_opt(asleep_deadline), if asleep_deadline.is_some() => {
                    let awake = self.gate.is_awake(Instant::now());
                    if !awake {
                        tracing::info!("wake window lapsed");
                    }
                    self.status.set_awake(awake);
                }
            }
        }
    }

    fn arm(&mut self) {
        match self.status.lifecycle() {
            Lifecycle::Uninitialized | Lifecycle::Stopped => {
                self.armed = true;
                self.status.set_lifecycle(Lifecycle::Armed);
                tracing::debug!("armed, waiting for user interaction");
            }
            _ => {}
        }
    }

    fn on_user_interaction(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        self.init_recognition();
    }

    fn init_recognition(&mut self) {
        self.reinit_at = None;
        self.restart_at = None;
        self.status.set_lifecycle(Lifecycle::Starting);
        self.status.record_init_attempt();

        let (events_tx, events_rx) = flume::unbounded();
        let mut stream = match self.input.open(&self.config.lang, events_tx) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "speech recognition unavailable, retrying");
                self.schedule_reinit();
                return;
            }
        };
        if let Err(e) = stream.start() {
            tracing::error!(error = %e, "speech recognition failed to start, retrying");
            self.schedule_reinit();
            return;
        }

        self.stream = Some(stream);
        self.recognition_rx = Some(events_rx);
        self.status.set_lifecycle(Lifecycle::Listening);
        let _ = self.event_tx.send(AssistantEvent::Listening);
        tracing::info!(wake_word = self.gate.word(), "listening");
        self.greet_once();
    }

    fn greet_once(&mut self) {
        if self.status.has_greeted() {
            return;
        }
        self.status.mark_greeted();
        if !self.config.speech.greet || self.output.is_speaking() {
            return;
        }

        let hour = chrono::Local::now().hour();
        let text = greeting(hour, &self.config.name, &self.config.product);
        let utterance = self.utterance(text);
        self.deliver(utterance);
    }

    fn handle_recognition(&mut self, event: RecognitionEvent) {
        if !self.status.lifecycle().is_running() {
            return;
        }
        match event {
            RecognitionEvent::Started => tracing::debug!("recognition stream started"),
            RecognitionEvent::Result(raw) => self.handle_transcript(&raw),
            RecognitionEvent::Error(error) => self.handle_error(error),
            RecognitionEvent::End => {
                if self.stream.is_some() {
                    tracing::debug!("recognition stream ended");
                    self.schedule_restart();
                }
            }
        }
    }

    fn handle_transcript(&mut self, raw: &str) {
        let transcript = normalize_transcript(raw);
        if transcript.is_empty() {
            return;
        }
        tracing::debug!(transcript = %transcript, "heard");
        let _ = self.event_tx.send(AssistantEvent::Heard(transcript.clone()));

        let now = Instant::now();
        match self.gate.observe(&transcript, now) {
            Gate::Ignored => {}
            Gate::Woke { remainder } => {
                tracing::info!("wake word heard");
                let _ = self.event_tx.send(AssistantEvent::Woke);
                self.say(ACKNOWLEDGEMENT);
                if let Some(command) = remainder {
                    self.handle_command(&command, now);
                }
            }
            Gate::Forward => self.handle_command(&transcript, now),
        }
        self.status.set_awake(self.gate.is_awake(now));
    }

    fn handle_command(&mut self, text: &str, now: Instant) {
        let intent = self.classifier.classify(text);
        tracing::info!(intent = %intent, "dispatching");
        let feedback = self.dispatcher.dispatch(&intent);
        self.say(&feedback);
        self.gate.command_dispatched(now);
    }

    fn handle_error(&mut self, error: RecognitionError) {
        if error.is_recoverable() {
            tracing::warn!(code = %error, "recoverable recognition error, restarting");
            self.schedule_restart();
            return;
        }

        // Unrecoverable: the stream is discarded and a new one opened later
        tracing::error!(code = %error, "recognition error, re-creating session");
        self.discard_stream();
        self.schedule_reinit();
    }

    fn discard_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.recognition_rx = None;
    }

    /// At most one restart is pending, so an error followed by an end restarts once
    fn schedule_restart(&mut self) {
        if self.restart_at.is_some() || self.reinit_at.is_some() {
            return;
        }
        self.restart_at = Some(Instant::now() + self.timings.restart_delay);
        self.status.set_lifecycle(Lifecycle::Restarting);
    }

    fn schedule_reinit(&mut self) {
        self.restart_at = None;
        self.reinit_at = Some(Instant::now() + self.timings.init_retry);
        self.status.set_lifecycle(Lifecycle::Restarting);
    }

    fn restart_stream(&mut self) {
        self.restart_at = None;
        let Some(stream) = self.stream.as_mut() else {
            if self.status.lifecycle().is_running() {
                self.schedule_reinit();
            }
            return;
        };

        self.status.record_restart();
        match stream.start() {
            Ok(()) => {
                self.status.set_lifecycle(Lifecycle::Listening);
                let _ = self.event_tx.send(AssistantEvent::Listening);
                tracing::debug!(restarts = self.status.restarts(), "recognition restarted");
            }
            Err(e) => {
                tracing::warn!(error = %e, "restart failed, re-creating session");
                self.discard_stream();
                self.schedule_reinit();
            }
        }
    }

    fn utterance(&self, text: String) -> Utterance {
        Utterance {
            text,
            lang: self.config.lang.clone(),
            rate: self.config.speech.rate,
            pitch: self.config.speech.pitch,
        }
    }

    /// Cancel current speech and queue `text` after the speak delay.
    /// A newer call replaces a queued utterance that has not started yet.
    fn say(&mut self, text: &str) {
        self.output.cancel();
        let utterance = self.utterance(text.to_string());
        self.pending_speech = Some((utterance, Instant::now() + self.timings.speak_delay));
    }

    fn flush_speech(&mut self) {
        if let Some((utterance, _)) = self.pending_speech.take() {
            self.deliver(utterance);
        }
    }

    fn deliver(&mut self, utterance: Utterance) {
        match self.output.speak(&utterance) {
            Ok(()) => {
                tracing::info!(text = %utterance.text, "speaking");
                let _ = self.event_tx.send(AssistantEvent::Said(utterance.text));
            }
            Err(e) => tracing::warn!(error = %e, "speech synthesis failed"),
        }
    }

    fn stop(&mut self) {
        if self.status.lifecycle() == Lifecycle::Stopped {
            return;
        }
        self.discard_stream();
        self.armed = false;
        self.output.cancel();
        self.pending_speech = None;
        self.restart_at = None;
        self.reinit_at = None;
        self.status.set_lifecycle(Lifecycle::Stopped);
        let _ = self.event_tx.send(AssistantEvent::Stopped);
        tracing::info!("assistant stopped");
    }
}
