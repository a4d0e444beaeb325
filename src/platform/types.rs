//! Browser signal types delivered to the proctoring reactor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media device whose permission is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Camera,
    Microphone,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Camera => "camera",
            MediaKind::Microphone => "microphone",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DOM listener slots a monitor can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    FullscreenChange,
    VisibilityChange,
    Blur,
    Focus,
    KeyDown,
}

/// A keydown as seen by the capture-phase listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// `KeyboardEvent.key`, e.g. `"c"`, `"Escape"`, `"F12"`
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    /// Cmd on macOS
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
    /// Option on macOS
    #[serde(default)]
    pub alt: bool,
    #[serde(skip)]
    default_prevented: bool,
    #[serde(skip)]
    claimed: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
            shift: false,
            alt: false,
            default_prevented: false,
            claimed: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Ctrl on Windows/Linux or Cmd on macOS.
    pub fn command_modifier(&self) -> bool {
        self.ctrl || self.meta
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Mark the event as handled by a guard. Returns false if another guard
    /// got there first.
    pub fn claim(&mut self) -> bool {
        if self.claimed {
            return false;
        }
        self.claimed = true;
        true
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Human-readable combination such as `Ctrl+Shift+I`.
    pub fn combination(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.meta {
            parts.push("Cmd");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        let key = if self.key.chars().count() == 1 {
            self.key.to_uppercase()
        } else {
            self.key.clone()
        };
        let mut combo = parts.join("+");
        if !combo.is_empty() {
            combo.push('+');
        }
        combo.push_str(&key);
        combo
    }
}

/// What the page knows about the browser it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub browser_name: String,
    #[serde(default)]
    pub browser_version: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl BrowserInfo {
    pub fn new(browser_name: impl Into<String>) -> Self {
        Self {
            browser_name: browser_name.into(),
            browser_version: None,
            user_agent: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.browser_version = Some(version.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Browser signal fed into the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    FullscreenChange { is_fullscreen: bool },
    VisibilityChange { hidden: bool },
    WindowBlur,
    WindowFocus,
    KeyDown(KeyEvent),
}

impl BrowserEvent {
    /// The listener slot this event is delivered through.
    pub fn listener(&self) -> ListenerKind {
        match self {
            BrowserEvent::FullscreenChange { .. } => ListenerKind::FullscreenChange,
            BrowserEvent::VisibilityChange { .. } => ListenerKind::VisibilityChange,
            BrowserEvent::WindowBlur => ListenerKind::Blur,
            BrowserEvent::WindowFocus => ListenerKind::Focus,
            BrowserEvent::KeyDown(_) => ListenerKind::KeyDown,
        }
    }

    pub fn default_prevented(&self) -> bool {
        match self {
            BrowserEvent::KeyDown(key) => key.default_prevented(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_combination_format() {
        let event = KeyEvent::new("i").with_ctrl().with_shift();
        assert_eq!(event.combination(), "Ctrl+Shift+I");

        let event = KeyEvent::new("F12");
        assert_eq!(event.combination(), "F12");

        let event = KeyEvent::new("c").with_meta();
        assert_eq!(event.combination(), "Cmd+C");
    }

    #[test]
    fn test_claim_only_once() {
        let mut event = KeyEvent::new("Escape");
        assert!(event.claim());
        assert!(!event.claim());
        assert!(event.is_claimed());
    }

    #[test]
    fn test_browser_event_json() {
        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"key_down","key":"u","ctrl":true}"#).unwrap();
        match event {
            BrowserEvent::KeyDown(ref key) => {
                assert!(key.ctrl);
                assert!(!key.is_claimed());
            }
            _ => panic!("expected key_down"),
        }
        assert_eq!(event.listener(), ListenerKind::KeyDown);

        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"fullscreen_change","is_fullscreen":false}"#).unwrap();
        assert_eq!(
            event,
            BrowserEvent::FullscreenChange {
                is_fullscreen: false
            }
        );
    }
}
