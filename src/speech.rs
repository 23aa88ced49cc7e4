//! Speech engine seams - recognition in, synthesis out
//!
//! Concrete engines live outside the crate (browser bindings, console,
//! test doubles). The assistant only talks to these traits.

use std::fmt;
use std::str::FromStr;

use crate::error::SpeechError;

/// One utterance handed to the synthesizer
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

pub trait SpeechOutput: Send {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError>;

    /// Drop whatever is playing or queued
    fn cancel(&mut self);

    fn is_speaking(&self) -> bool;
}

/// Events a recognition stream reports back to the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    /// Final transcript of one utterance, as recognized
    Result(String),
    Error(RecognitionError),
    /// The stream stopped delivering results
    End,
}

pub type RecognitionSender = flume::Sender<RecognitionEvent>;

/// Opens recognition streams. Each call yields a fresh stream that reports on `events`.
pub trait SpeechInput: Send {
    fn open(
        &mut self,
        lang: &str,
        events: RecognitionSender,
    ) -> Result<Box<dyn RecognitionStream>, SpeechError>;
}

/// A continuous, final-results-only recognition stream
pub trait RecognitionStream: Send {
    fn start(&mut self) -> Result<(), SpeechError>;
    fn stop(&mut self);
}

/// Error codes reported by a recognition stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    Aborted,
    NoSpeech,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    BadGrammar,
    LanguageNotSupported,
    Other(String),
}

impl RecognitionError {
    /// Transient failures that warrant restarting the same stream
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RecognitionError::Aborted | RecognitionError::NoSpeech | RecognitionError::Network
        )
    }

    pub fn code(&self) -> &str {
        match self {
            RecognitionError::Aborted => "aborted",
            RecognitionError::NoSpeech => "no-speech",
            RecognitionError::Network => "network",
            RecognitionError::NotAllowed => "not-allowed",
            RecognitionError::ServiceNotAllowed => "service-not-allowed",
            RecognitionError::AudioCapture => "audio-capture",
            RecognitionError::BadGrammar => "bad-grammar",
            RecognitionError::LanguageNotSupported => "language-not-supported",
            RecognitionError::Other(code) => code,
        }
    }
}

impl FromStr for RecognitionError {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "aborted" => RecognitionError::Aborted,
            "no-speech" => RecognitionError::NoSpeech,
            "network" => RecognitionError::Network,
            "not-allowed" => RecognitionError::NotAllowed,
            "service-not-allowed" => RecognitionError::ServiceNotAllowed,
            "audio-capture" => RecognitionError::AudioCapture,
            "bad-grammar" => RecognitionError::BadGrammar,
            "language-not-supported" => RecognitionError::LanguageNotSupported,
            other => RecognitionError::Other(other.to_string()),
        })
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lower-cased, trimmed text of one recognition result
pub fn normalize_transcript(raw: &str) -> String {
    raw.trim().to_lowercase()
}
