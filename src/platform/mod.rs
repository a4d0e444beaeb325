//! The browser environment the proctoring client runs in.
//!
//! The reactor never talks to the DOM directly. Everything it needs from the
//! page (fullscreen, listeners, media probes) goes through [`BrowserPlatform`],
//! and classifier output arrives through [`FaceCounter`] and [`Classifier`].

pub mod simulated;
pub mod types;

pub use simulated::{FullscreenPolicy, SensorFeed, SimulatedPlatform};
pub use types::{BrowserEvent, BrowserInfo, KeyEvent, ListenerKind, MediaKind};

use crate::error::{ClassifierError, FullscreenError, PermissionError};
use serde::{Deserialize, Serialize};

/// Browser capabilities consumed by monitors and the lifecycle controller.
pub trait BrowserPlatform {
    /// Whether the document currently has a fullscreen element.
    fn is_fullscreen(&self) -> bool;

    /// Request fullscreen on the document element, trying vendor variants.
    fn request_fullscreen(&mut self) -> Result<(), FullscreenError>;

    /// Leave fullscreen.
    fn exit_fullscreen(&mut self) -> Result<(), FullscreenError>;

    fn add_listener(&mut self, kind: ListenerKind);

    fn remove_listener(&mut self, kind: ListenerKind);

    /// Grab a media stream of the given kind and release it immediately.
    fn probe_media(&mut self, kind: MediaKind) -> Result<(), PermissionError>;

    /// Short description of the client device for permission logs.
    fn device_info(&self) -> String;

    /// Browser name, version and user agent, checked once at start.
    fn browser_info(&self) -> BrowserInfo;
}

/// Output of a face-counting pass over one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceReading {
    pub count: u32,
    pub confidence: f64,
}

/// External face counter invoked on each snapshot tick.
pub trait FaceCounter {
    fn count_faces(&mut self) -> Result<FaceReading, ClassifierError>;
}

/// Output of an audio, gaze or lighting classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    /// Raw measurement behind the label, e.g. mean brightness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            value: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// External classifier sampled on a fixed cadence.
pub trait Classifier {
    fn classify(&mut self) -> Result<Classification, ClassifierError>;
}
