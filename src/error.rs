//! Error taxonomy for the proctoring client.
//!
//! Only [`ExhaustionError`] is terminal. Everything else is logged or
//! surfaced to the operator and the test keeps running.

use crate::platform::MediaKind;
use thiserror::Error;

/// Camera or microphone access failed during a probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("{0} permission denied")]
    Denied(MediaKind),
    #[error("no {0} device found")]
    NotFound(MediaKind),
    #[error("{kind} probe failed: {message}")]
    Probe { kind: MediaKind, message: String },
}

impl PermissionError {
    pub fn kind(&self) -> MediaKind {
        match self {
            PermissionError::Denied(kind) | PermissionError::NotFound(kind) => *kind,
            PermissionError::Probe { kind, .. } => *kind,
        }
    }
}

/// The browser refused or cannot do fullscreen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FullscreenError {
    #[error("fullscreen API not supported")]
    Unsupported,
    #[error("fullscreen request denied: {0}")]
    Denied(String),
}

/// Delivering a record to the backend failed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportingError {
    #[error("report queue is full")]
    QueueFull,
    #[error("report worker has stopped")]
    WorkerStopped,
    #[error("backend config error: {0}")]
    Config(String),
    #[error("backend network error: {0}")]
    Network(String),
    #[error("backend server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("backend serialization error: {0}")]
    Serialization(String),
}

/// An external classifier could not produce a reading this tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("no frame captured")]
    NoFrame,
}

/// The warning budget reached zero. Raised exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("warning budget exhausted for session {session_id}")]
pub struct ExhaustionError {
    pub session_id: String,
}

/// Misuse of the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("warning budget must be at least 1")]
    InvalidWarningBudget,
    #[error("no active session")]
    NotActive,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A replay script line could not be used.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: at_ms {at_ms} is earlier than the previous step")]
    OutOfOrder { line: usize, at_ms: u64 },
}
