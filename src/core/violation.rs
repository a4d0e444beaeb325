//! Normalized violation events.

use crate::platform::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Every integrity breach the client can detect.
///
/// Serialized names identify the category inside the client (config, logs,
/// cooldown table). The backend's `violation_type` is [`Self::wire_name`],
/// which folds the lighting conditions into one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    FullscreenExit,
    TabSwitch,
    WindowBlur,
    KeyboardShortcut,
    EscapeKey,
    InspectElement,
    CameraPermissionDenied,
    MicrophonePermissionDenied,
    MultipleFaces,
    NoFace,
    LightingTooDark,
    LightingTooBright,
    LightingSuddenChange,
    GazeAway,
    AudioSuspicious,
    BrowserCompatibilityIssue,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 16] = [
        ViolationCategory::FullscreenExit,
        ViolationCategory::TabSwitch,
        ViolationCategory::WindowBlur,
        ViolationCategory::KeyboardShortcut,
        ViolationCategory::EscapeKey,
        ViolationCategory::InspectElement,
        ViolationCategory::CameraPermissionDenied,
        ViolationCategory::MicrophonePermissionDenied,
        ViolationCategory::MultipleFaces,
        ViolationCategory::NoFace,
        ViolationCategory::LightingTooDark,
        ViolationCategory::LightingTooBright,
        ViolationCategory::LightingSuddenChange,
        ViolationCategory::GazeAway,
        ViolationCategory::AudioSuspicious,
        ViolationCategory::BrowserCompatibilityIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCategory::FullscreenExit => "fullscreen_exit",
            ViolationCategory::TabSwitch => "tab_switch",
            ViolationCategory::WindowBlur => "window_blur",
            ViolationCategory::KeyboardShortcut => "keyboard_shortcut",
            ViolationCategory::EscapeKey => "escape_key",
            ViolationCategory::InspectElement => "inspect_element",
            ViolationCategory::CameraPermissionDenied => "camera_permission_denied",
            ViolationCategory::MicrophonePermissionDenied => "microphone_permission_denied",
            ViolationCategory::MultipleFaces => "multiple_faces",
            ViolationCategory::NoFace => "no_face",
            ViolationCategory::LightingTooDark => "lighting_too_dark",
            ViolationCategory::LightingTooBright => "lighting_too_bright",
            ViolationCategory::LightingSuddenChange => "lighting_sudden_change",
            ViolationCategory::GazeAway => "gaze_away",
            ViolationCategory::AudioSuspicious => "audio_suspicious",
            ViolationCategory::BrowserCompatibilityIssue => "browser_compatibility_issue",
        }
    }

    /// The `violation_type` the backend stores and queries.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ViolationCategory::LightingTooDark
            | ViolationCategory::LightingTooBright
            | ViolationCategory::LightingSuddenChange => "lighting_issue",
            other => other.as_str(),
        }
    }

    /// Backend `lighting_condition` for the lighting categories.
    pub fn lighting_condition(&self) -> Option<&'static str> {
        match self {
            ViolationCategory::LightingTooDark => Some("dark"),
            ViolationCategory::LightingTooBright => Some("bright"),
            ViolationCategory::LightingSuddenChange => Some("sudden_change"),
            _ => None,
        }
    }

    /// Operator-facing description.
    pub fn description(&self) -> &'static str {
        match self {
            ViolationCategory::FullscreenExit => "User exited fullscreen mode",
            ViolationCategory::TabSwitch => "User switched away from the test tab",
            ViolationCategory::WindowBlur => "Test window lost focus",
            ViolationCategory::KeyboardShortcut => "Restricted keyboard shortcut was attempted",
            ViolationCategory::EscapeKey => "Escape key was pressed",
            ViolationCategory::InspectElement => "Developer tools shortcut was attempted",
            ViolationCategory::CameraPermissionDenied => "Camera permission was denied or revoked",
            ViolationCategory::MicrophonePermissionDenied => {
                "Microphone permission was denied or revoked"
            }
            ViolationCategory::MultipleFaces => "Multiple faces detected in camera feed",
            ViolationCategory::NoFace => "No face detected in camera feed",
            ViolationCategory::LightingTooDark => "Lighting is too dark",
            ViolationCategory::LightingTooBright => "Lighting is too bright",
            ViolationCategory::LightingSuddenChange => "Lighting changed suddenly",
            ViolationCategory::GazeAway => "User gaze was away from screen for extended period",
            ViolationCategory::AudioSuspicious => "Suspicious audio activity detected",
            ViolationCategory::BrowserCompatibilityIssue => "Browser compatibility check failed",
        }
    }

    pub fn permission_denied(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Camera => ViolationCategory::CameraPermissionDenied,
            MediaKind::Microphone => ViolationCategory::MicrophonePermissionDenied,
        }
    }

    /// The cooldown bucket this category is counted in.
    ///
    /// Blur and tab switch share a bucket: one alt-tab fires both.
    pub fn bucket(&self) -> CooldownBucket {
        match self {
            ViolationCategory::TabSwitch | ViolationCategory::WindowBlur => {
                CooldownBucket::FocusLoss
            }
            other => CooldownBucket::Category(*other),
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key into the cooldown registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CooldownBucket {
    FocusLoss,
    Category(ViolationCategory),
}

impl fmt::Display for CooldownBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownBucket::FocusLoss => f.write_str("focus_loss"),
            CooldownBucket::Category(category) => write!(f, "{category}"),
        }
    }
}

/// One detected breach, produced by a monitor. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    category: ViolationCategory,
    timestamp: DateTime<Utc>,
    details: Map<String, Value>,
}

impl ViolationEvent {
    pub fn new(category: ViolationCategory, timestamp: DateTime<Utc>) -> Self {
        Self {
            category,
            timestamp,
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn category(&self) -> ViolationCategory {
        self.category
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}
