//! Nogen voice assistant
//!
//! Listens for a wake word on a continuous recognition stream, classifies
//! the following utterances into intents and dispatches them to host
//! callbacks, answering through speech synthesis.
//!
//! Speech engines, forms and navigation are injected through the traits in
//! [`speech`] and [`dispatch`], so the state machine runs the same against a
//! browser binding, the console adapters in [`console`] or test doubles.

pub mod command;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod fuzzy;
pub mod session;
pub mod speech;
pub mod state;
pub mod wake;

pub use command::{CommandClassifier, FieldFill, Intent};
pub use config::Config;
pub use dispatch::{FieldHandle, FormAdapter, Hooks, NoForm};
pub use error::{ConfigError, SpeechError};
pub use session::{Assistant, AssistantEvent, AssistantHandle};
pub use speech::{
    RecognitionError, RecognitionEvent, RecognitionSender, RecognitionStream, SpeechInput,
    SpeechOutput, Utterance,
};
pub use state::Lifecycle;
