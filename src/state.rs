//! Shared assistant status - read from any thread, written only by the assistant loop

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Recognition lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// Constructed, `start` not called yet
    Uninitialized = 0,
    /// Waiting for the first user interaction
    Armed = 1,
    /// Opening the recognition stream
    Starting = 2,
    Listening = 3,
    /// Stream ended or failed, a restart or re-initialization is scheduled
    Restarting = 4,
    Stopped = 5,
}

impl From<u8> for Lifecycle {
    fn from(v: u8) -> Self {
        match v {
            1 => Lifecycle::Armed,
            2 => Lifecycle::Starting,
            3 => Lifecycle::Listening,
            4 => Lifecycle::Restarting,
            5 => Lifecycle::Stopped,
            _ => Lifecycle::Uninitialized,
        }
    }
}

impl Lifecycle {
    /// A stream is open or about to be (re)opened
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Lifecycle::Starting | Lifecycle::Listening | Lifecycle::Restarting
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Uninitialized => write!(f, "Uninitialized"),
            Lifecycle::Armed => write!(f, "Armed"),
            Lifecycle::Starting => write!(f, "Starting"),
            Lifecycle::Listening => write!(f, "Listening"),
            Lifecycle::Restarting => write!(f, "Restarting"),
            Lifecycle::Stopped => write!(f, "Stopped"),
        }
    }
}

pub struct AssistantStatus {
    lifecycle: AtomicU8,
    /// Wake word heard and the gate is still open
    awake: AtomicBool,
    /// Greeting already spoken
    greeted: AtomicBool,
    /// Stream restarts after an end or recoverable error
    restarts: AtomicU64,
    /// Calls to open a recognition stream, failed ones included
    init_attempts: AtomicU64,
}

impl AssistantStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: AtomicU8::new(Lifecycle::Uninitialized as u8),
            awake: AtomicBool::new(false),
            greeted: AtomicBool::new(false),
            restarts: AtomicU64::new(0),
            init_attempts: AtomicU64::new(0),
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from(self.lifecycle.load(Ordering::SeqCst))
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::SeqCst);
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::SeqCst)
    }

    pub(crate) fn set_awake(&self, awake: bool) {
        self.awake.store(awake, Ordering::SeqCst);
    }

    pub fn has_greeted(&self) -> bool {
        self.greeted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_greeted(&self) {
        self.greeted.store(true, Ordering::SeqCst);
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn init_attempts(&self) -> u64 {
        self.init_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn record_init_attempt(&self) {
        self.init_attempts.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for AssistantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantStatus")
            .field("lifecycle", &self.lifecycle())
            .field("awake", &self.is_awake())
            .field("greeted", &self.has_greeted())
            .field("restarts", &self.restarts())
            .field("init_attempts", &self.init_attempts())
            .finish()
    }
}

pub type SharedStatus = Arc<AssistantStatus>;
