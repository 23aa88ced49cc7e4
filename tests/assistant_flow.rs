//! End-to-end behavior of the assistant loop against fake speech engines.
//!
//! All tests run on a paused clock, so fixed delays elapse instantly and
//! deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nogen::config::WakePolicyConfig;
use nogen::dispatch::ADVANCED_MODE_TOGGLE;
use nogen::session::ACKNOWLEDGEMENT;
use nogen::{
    Assistant, AssistantEvent, AssistantHandle, Config, FieldHandle, FormAdapter, Hooks, Intent,
    Lifecycle, RecognitionError, RecognitionEvent, RecognitionSender, RecognitionStream,
    SpeechError, SpeechInput, SpeechOutput, Utterance,
};
use tokio::sync::mpsc;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct InputState {
    sender: Option<RecognitionSender>,
    opens: usize,
    starts: usize,
    stops: usize,
    failing_opens: usize,
    /// Report `aborted` when stopped, as browsers do for a live stream
    abort_on_stop: bool,
}

#[derive(Clone, Default)]
struct FakeInput(Arc<Mutex<InputState>>);

impl FakeInput {
    fn failing(opens: usize) -> Self {
        let input = Self::default();
        input.0.lock().unwrap().failing_opens = opens;
        input
    }

    fn aborting_on_stop() -> Self {
        let input = Self::default();
        input.0.lock().unwrap().abort_on_stop = true;
        input
    }

    /// Sender of the most recently opened stream
    fn sender(&self) -> RecognitionSender {
        self.0.lock().unwrap().sender.clone().expect("no stream opened")
    }

    /// Events sent after the assistant dropped the stream are lost
    fn emit(&self, event: RecognitionEvent) {
        let _ = self.sender().send(event);
    }

    fn say(&self, text: &str) {
        self.emit(RecognitionEvent::Result(text.to_string()));
    }

    fn opens(&self) -> usize {
        self.0.lock().unwrap().opens
    }

    fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }
}

impl SpeechInput for FakeInput {
    fn open(
        &mut self,
        _lang: &str,
        events: RecognitionSender,
    ) -> Result<Box<dyn RecognitionStream>, SpeechError> {
        let mut state = self.0.lock().unwrap();
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(SpeechError::Init("no microphone".into()));
        }
        state.sender = Some(events.clone());
        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.0),
            events,
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<InputState>>,
    events: RecognitionSender,
}

impl RecognitionStream for FakeStream {
    fn start(&mut self) -> Result<(), SpeechError> {
        self.state.lock().unwrap().starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let abort = {
            let mut state = self.state.lock().unwrap();
            state.stops += 1;
            state.abort_on_stop
        };
        if abort {
            let _ = self
                .events
                .send(RecognitionEvent::Error(RecognitionError::Aborted));
        }
    }
}

/// Records every utterance that reaches the engine
#[derive(Clone, Default)]
struct FakeOutput {
    spoken: Arc<Mutex<Vec<String>>>,
    cancels: Arc<Mutex<usize>>,
}

impl FakeOutput {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechOutput for FakeOutput {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(utterance.text.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        *self.cancels.lock().unwrap() += 1;
    }

    fn is_speaking(&self) -> bool {
        false
    }
}

#[derive(Clone, Default)]
struct FakeForm {
    present: Vec<String>,
    values: Arc<Mutex<HashMap<String, String>>>,
    checked: Arc<Mutex<Option<bool>>>,
}

impl FakeForm {
    fn with_fields(fields: &[&str]) -> Self {
        Self {
            present: fields.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    fn value(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }
}

impl FormAdapter for FakeForm {
    fn field(&mut self, name: &str) -> Option<FieldHandle> {
        self.present
            .iter()
            .any(|f| f == name)
            .then(|| FieldHandle(name.to_string()))
    }

    fn set_field(&mut self, handle: &FieldHandle, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(handle.0.clone(), value.to_string());
    }

    fn set_checked(&mut self, _handle: &FieldHandle, checked: bool) {
        *self.checked.lock().unwrap() = Some(checked);
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    input: FakeInput,
    output: FakeOutput,
    form: FakeForm,
    handle: AssistantHandle,
    events: mpsc::UnboundedReceiver<AssistantEvent>,
    navigations: Arc<Mutex<Vec<String>>>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn spawn(config: Config, input: FakeInput, form: FakeForm) -> Self {
        let output = FakeOutput::default();
        let navigations = Arc::new(Mutex::new(Vec::new()));
        let downloads = Arc::new(Mutex::new(Vec::new()));

        let nav_sink = Arc::clone(&navigations);
        let download_sink = Arc::clone(&downloads);
        let hooks = Hooks::new()
            .on_navigate(move |path| nav_sink.lock().unwrap().push(path.to_string()))
            .on_download_requested(move |format| {
                download_sink.lock().unwrap().push(format.to_string())
            });

        let (assistant, handle, events) = Assistant::new(
            config,
            Box::new(input.clone()),
            Box::new(output.clone()),
            Box::new(form.clone()),
            hooks,
        );
        tokio::spawn(assistant.run());

        Self {
            input,
            output,
            form,
            handle,
            events,
            navigations,
            downloads,
        }
    }

    /// Spawn, start and open the microphone
    async fn listening(config: Config, form: FakeForm) -> Self {
        Self::listening_with(config, FakeInput::default(), form).await
    }

    async fn listening_with(config: Config, input: FakeInput, form: FakeForm) -> Self {
        let harness = Self::spawn(config, input, form);
        harness.handle.start();
        harness.handle.user_interaction();
        settle(10).await;
        harness
    }

    async fn awake(config: Config, form: FakeForm) -> Self {
        let harness = Self::listening(config, form).await;
        harness.input.say("nogen");
        settle(400).await;
        harness
    }

    fn drain_events(&mut self) -> Vec<AssistantEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.speech.greet = false;
    config
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Wake word gate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn commands_are_ignored_until_wake_word() {
    let mut harness = Harness::listening(quiet_config(), FakeForm::default()).await;

    harness.input.say("open ai assistant");
    harness.input.say("download as word file");
    settle(1000).await;

    assert!(harness.output.spoken().is_empty());
    assert!(harness.navigations.lock().unwrap().is_empty());
    assert!(harness.downloads.lock().unwrap().is_empty());
    assert!(!harness.handle.status().is_awake());
    assert!(
        !harness
            .drain_events()
            .iter()
            .any(|e| matches!(e, AssistantEvent::Intent(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn wake_word_alone_is_only_acknowledged() {
    let mut harness = Harness::listening(quiet_config(), FakeForm::default()).await;

    harness.input.say("Hey Nogen");
    settle(400).await;

    assert_eq!(harness.output.spoken(), vec![ACKNOWLEDGEMENT.to_string()]);
    assert!(harness.handle.status().is_awake());

    let events = harness.drain_events();
    assert_eq!(events.iter().filter(|e| **e == AssistantEvent::Woke).count(), 1);
    assert!(!events.iter().any(|e| matches!(e, AssistantEvent::Intent(_))));
}

#[tokio::test(start_paused = true)]
async fn wake_then_navigate() {
    let harness = Harness::listening(quiet_config(), FakeForm::default()).await;

    harness.input.say("nogen");
    settle(400).await;
    assert_eq!(harness.output.spoken(), vec![ACKNOWLEDGEMENT.to_string()]);

    harness.input.say("open ai assistant");
    settle(400).await;
    assert_eq!(
        harness.output.spoken(),
        vec![
            ACKNOWLEDGEMENT.to_string(),
            "Taking you to the Ai Assistant page.".to_string()
        ]
    );
    assert_eq!(*harness.navigations.lock().unwrap(), vec!["/AiAssistant".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn inline_command_after_wake_word() {
    let mut config = quiet_config();
    config.wake.inline_commands = true;
    let harness = Harness::listening(config, FakeForm::default()).await;

    harness.input.say("nogen, open ai assistant");
    settle(400).await;

    // The acknowledgement is superseded before it reaches the engine
    assert_eq!(
        harness.output.spoken(),
        vec!["Taking you to the Ai Assistant page.".to_string()]
    );
    assert_eq!(*harness.navigations.lock().unwrap(), vec!["/AiAssistant".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn timeout_policy_lapses_without_transcripts() {
    let mut config = quiet_config();
    config.wake.policy = WakePolicyConfig::Timeout;
    config.wake.timeout_secs = 5;
    let harness = Harness::awake(config, FakeForm::default()).await;
    assert!(harness.handle.status().is_awake());

    settle(4000).await;
    assert!(harness.handle.status().is_awake());

    settle(1000).await;
    assert!(!harness.handle.status().is_awake());
}

#[tokio::test(start_paused = true)]
async fn single_command_policy_sleeps_after_dispatch() {
    let mut config = quiet_config();
    config.wake.policy = WakePolicyConfig::SingleCommand;
    let harness = Harness::awake(config, FakeForm::default()).await;

    harness.input.say("open ai assistant");
    settle(400).await;
    assert!(!harness.handle.status().is_awake());

    harness.input.say("open ai assistant");
    settle(400).await;
    assert_eq!(harness.navigations.lock().unwrap().len(), 1);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fill_multiple_fields_in_one_utterance() {
    let form = FakeForm::with_fields(&["subject", "year"]);
    let harness = Harness::awake(quiet_config(), form).await;

    harness.input.say("subject physics year 2024");
    settle(400).await;

    assert_eq!(harness.form.value("subject").as_deref(), Some("physics year 2024"));
    assert_eq!(harness.form.value("year").as_deref(), Some("2024"));
    assert_eq!(
        harness.output.spoken().last().map(String::as_str),
        Some("Filled subject with physics year 2024. Filled year with 2024.")
    );
}

#[tokio::test(start_paused = true)]
async fn fill_extracts_text_after_keyword() {
    let form = FakeForm::with_fields(&["subject"]);
    let harness = Harness::awake(quiet_config(), form).await;

    harness.input.say("please set subject computer networks");
    settle(400).await;

    assert_eq!(harness.form.value("subject").as_deref(), Some("computer networks"));
}

#[tokio::test(start_paused = true)]
async fn unrecognized_command_gets_spoken_reply() {
    let harness = Harness::awake(quiet_config(), FakeForm::default()).await;

    harness.input.say("what is the weather");
    settle(400).await;

    assert_eq!(
        harness.output.spoken().last().map(String::as_str),
        Some("I didn't understand that command. Please try again.")
    );
}

#[tokio::test(start_paused = true)]
async fn advanced_mode_toggle() {
    let form = FakeForm::with_fields(&[ADVANCED_MODE_TOGGLE]);
    let harness = Harness::awake(quiet_config(), form).await;

    harness.input.say("turn on advanced mode");
    settle(400).await;

    assert_eq!(*harness.form.checked.lock().unwrap(), Some(true));
    assert!(
        harness
            .output
            .spoken()
            .last()
            .is_some_and(|s| s.starts_with("Advanced mode activated"))
    );
}

#[tokio::test(start_paused = true)]
async fn download_requests_are_not_deduplicated() {
    let mut harness = Harness::awake(quiet_config(), FakeForm::default()).await;

    harness.input.say("download as word file");
    settle(400).await;
    harness.input.say("download as word file");
    settle(400).await;

    assert_eq!(
        *harness.downloads.lock().unwrap(),
        vec!["word".to_string(), "word".to_string()]
    );
    let download_events = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, AssistantEvent::Download { event, .. } if event == "downloadWord"))
        .count();
    assert_eq!(download_events, 2);
}

#[tokio::test(start_paused = true)]
async fn navigation_without_router_requests_page_load() {
    let output = FakeOutput::default();
    let input = FakeInput::default();
    let (assistant, handle, mut events) = Assistant::new(
        quiet_config(),
        Box::new(input.clone()),
        Box::new(output.clone()),
        Box::new(FakeForm::default()),
        Hooks::new(),
    );
    tokio::spawn(assistant.run());
    handle.start();
    handle.user_interaction();
    settle(10).await;

    input.say("nogen");
    settle(400).await;
    input.say("go to ai assistant");
    settle(400).await;

    let events: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(events.contains(&AssistantEvent::PageLoad("/AiAssistant".into())));
    assert!(events.contains(&AssistantEvent::Intent(Intent::Navigate("/AiAssistant".into()))));
}

// ============================================================================
// Speech output
// ============================================================================

#[tokio::test(start_paused = true)]
async fn newer_speech_replaces_queued_speech() {
    let harness = Harness::awake(quiet_config(), FakeForm::default()).await;
    let before = harness.output.spoken().len();

    harness.input.say("turn on advanced mode");
    harness.input.say("download as word file");
    settle(400).await;

    let spoken = harness.output.spoken();
    assert_eq!(spoken.len(), before + 1);
    assert_eq!(spoken.last().map(String::as_str), Some("Preparing your word file for download."));
    assert!(*harness.output.cancels.lock().unwrap() >= 2);
}

#[tokio::test(start_paused = true)]
async fn speech_waits_for_the_delay() {
    let harness = Harness::listening(quiet_config(), FakeForm::default()).await;

    harness.input.say("nogen");
    settle(100).await;
    assert!(harness.output.spoken().is_empty());
    settle(300).await;
    assert_eq!(harness.output.spoken().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn greeting_is_spoken_once() {
    let harness = Harness::listening(Config::default(), FakeForm::default()).await;

    let greetings = |spoken: Vec<String>| {
        spoken
            .iter()
            .filter(|s| s.contains("Welcome to Quick Notes AI"))
            .count()
    };
    assert_eq!(greetings(harness.output.spoken()), 1);
    assert!(harness.handle.status().has_greeted());

    // A re-created session does not greet again
    harness.input.emit(RecognitionEvent::Error(RecognitionError::NotAllowed));
    settle(1500).await;
    assert_eq!(harness.input.opens(), 2);
    assert_eq!(greetings(harness.output.spoken()), 1);
}

// ============================================================================
// Recognition lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn recognition_is_deferred_until_interaction() {
    let harness = Harness::spawn(quiet_config(), FakeInput::default(), FakeForm::default());

    harness.handle.user_interaction();
    settle(10).await;
    assert_eq!(harness.input.opens(), 0);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Uninitialized);

    harness.handle.start();
    harness.handle.start();
    settle(10).await;
    assert_eq!(harness.input.opens(), 0);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Armed);

    harness.handle.user_interaction();
    harness.handle.user_interaction();
    settle(10).await;
    assert_eq!(harness.input.opens(), 1);
    assert_eq!(harness.input.starts(), 1);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
}

#[tokio::test(start_paused = true)]
async fn no_speech_error_restarts_once() {
    let harness = Harness::awake(quiet_config(), FakeForm::default()).await;
    assert_eq!(harness.input.starts(), 1);

    // Engines report the error and then end the stream
    harness.input.emit(RecognitionEvent::Error(RecognitionError::NoSpeech));
    harness.input.emit(RecognitionEvent::End);
    settle(100).await;
    assert_eq!(harness.input.starts(), 1);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Restarting);

    settle(500).await;
    assert_eq!(harness.input.starts(), 2);
    assert_eq!(harness.handle.status().restarts(), 1);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
    assert!(harness.handle.status().is_awake());

    settle(2000).await;
    assert_eq!(harness.input.starts(), 2);
    assert_eq!(harness.input.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_end_restarts_while_running() {
    let harness = Harness::listening(quiet_config(), FakeForm::default()).await;

    harness.input.emit(RecognitionEvent::End);
    settle(600).await;
    assert_eq!(harness.input.starts(), 2);

    // Still usable after the restart
    harness.input.say("nogen");
    settle(400).await;
    assert_eq!(harness.output.spoken(), vec![ACKNOWLEDGEMENT.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_error_recreates_session() {
    let harness = Harness::awake(quiet_config(), FakeForm::default()).await;

    harness.input.emit(RecognitionEvent::Error(RecognitionError::AudioCapture));
    harness.input.emit(RecognitionEvent::End);
    settle(600).await;
    assert_eq!(harness.input.opens(), 1);
    assert_eq!(harness.input.stops(), 1);

    settle(500).await;
    assert_eq!(harness.input.opens(), 2);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
    assert!(harness.handle.status().is_awake());
}

#[tokio::test(start_paused = true)]
async fn failed_initialization_is_retried() {
    let harness = Harness::spawn(quiet_config(), FakeInput::failing(2), FakeForm::default());
    harness.handle.start();
    harness.handle.user_interaction();
    settle(10).await;

    assert_eq!(harness.input.opens(), 1);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Restarting);

    settle(1000).await;
    assert_eq!(harness.input.opens(), 2);

    settle(1000).await;
    assert_eq!(harness.input.opens(), 3);
    assert_eq!(harness.input.starts(), 1);
    assert_eq!(harness.handle.status().init_attempts(), 3);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_waits_for_interaction() {
    let harness = Harness::listening_with(
        quiet_config(),
        FakeInput::aborting_on_stop(),
        FakeForm::default(),
    )
    .await;
    assert_eq!(harness.input.opens(), 1);

    // The stopped stream reports `aborted` after the assistant was re-armed
    harness.handle.stop();
    harness.handle.start();
    settle(3000).await;
    assert_eq!(harness.input.opens(), 1);
    assert_eq!(harness.input.starts(), 1);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Armed);

    harness.handle.user_interaction();
    settle(10).await;
    assert_eq!(harness.input.opens(), 2);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
}

#[tokio::test(start_paused = true)]
async fn discarded_stream_cannot_restart_its_replacement() {
    let harness = Harness::awake(quiet_config(), FakeForm::default()).await;
    let discarded = harness.input.sender();

    harness.input.emit(RecognitionEvent::Error(RecognitionError::AudioCapture));
    settle(1100).await;
    assert_eq!(harness.input.opens(), 2);
    assert_eq!(harness.input.starts(), 2);

    let _ = discarded.send(RecognitionEvent::End);
    let _ = discarded.send(RecognitionEvent::Result("open ai assistant".into()));
    settle(1000).await;
    assert_eq!(harness.input.starts(), 2);
    assert_eq!(harness.handle.status().restarts(), 0);
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Listening);
    assert!(harness.navigations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_silences_the_assistant() {
    let mut harness = Harness::awake(quiet_config(), FakeForm::default()).await;
    let spoken_before = harness.output.spoken().len();

    harness.handle.stop();
    settle(10).await;
    assert_eq!(harness.handle.status().lifecycle(), Lifecycle::Stopped);
    assert_eq!(harness.input.stops(), 1);

    harness.input.say("open ai assistant");
    harness.input.emit(RecognitionEvent::End);
    settle(1000).await;
    assert_eq!(harness.output.spoken().len(), spoken_before);
    assert_eq!(harness.input.starts(), 1);
    assert!(harness.drain_events().contains(&AssistantEvent::Stopped));
}
