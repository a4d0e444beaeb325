//! Restricted key handling.
//!
//! The guard cancels the browser default of every restricted key, then
//! reports it. Events already claimed by another guard are left alone so a
//! keystroke is counted once.

use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserEvent, BrowserPlatform, KeyEvent, ListenerKind};
use std::any::Any;

const DEVTOOLS_LETTERS: [&str; 4] = ["i", "j", "c", "k"];
const MAC_DEVTOOLS_LETTERS: [&str; 3] = ["i", "j", "c"];
const EDITING_LETTERS: [&str; 9] = ["c", "v", "x", "a", "p", "s", "u", "o", "n"];

/// Map a keystroke to the violation it represents, if any.
pub fn classify_key(key: &KeyEvent) -> Option<ViolationCategory> {
    let name = key.key.as_str();
    let letter = name.to_ascii_lowercase();

    if name == "Escape" {
        return Some(ViolationCategory::EscapeKey);
    }

    if name == "F12"
        || (key.command_modifier() && key.shift && DEVTOOLS_LETTERS.contains(&letter.as_str()))
        || (key.meta && key.alt && MAC_DEVTOOLS_LETTERS.contains(&letter.as_str()))
    {
        return Some(ViolationCategory::InspectElement);
    }

    if is_function_key(name)
        || name == "PrintScreen"
        || (key.alt && name == "Tab")
        || (key.command_modifier() && EDITING_LETTERS.contains(&letter.as_str()))
    {
        return Some(ViolationCategory::KeyboardShortcut);
    }

    None
}

/// F1 through F11. F12 is classified separately.
fn is_function_key(name: &str) -> bool {
    name.strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=11).contains(&n))
}

pub struct KeyboardGuard {
    handle: MonitorHandle,
    blocked: u32,
}

impl KeyboardGuard {
    pub fn new() -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Keyboard),
            blocked: 0,
        }
    }

    /// Keystrokes whose default was cancelled since attach.
    pub fn blocked(&self) -> u32 {
        self.blocked
    }
}

impl Default for KeyboardGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalMonitor for KeyboardGuard {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Keyboard
    }

    fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut MonitorHandle {
        &mut self.handle
    }

    fn listeners(&self) -> &'static [ListenerKind] {
        &[ListenerKind::KeyDown]
    }

    fn on_attach(&mut self, _platform: &mut dyn BrowserPlatform) {
        self.blocked = 0;
    }

    fn on_event(
        &mut self,
        event: &mut BrowserEvent,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        let BrowserEvent::KeyDown(key) = event else {
            return Ok(());
        };
        let Some(category) = classify_key(key) else {
            return Ok(());
        };
        if !key.claim() {
            return Ok(());
        }

        key.prevent_default();
        self.blocked += 1;
        let violation = ctx
            .violation(category)
            .with_detail("key_combination", key.combination());
        ctx.submit(violation)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(key: KeyEvent) -> Option<ViolationCategory> {
        classify_key(&key)
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            classify(KeyEvent::new("Escape")),
            Some(ViolationCategory::EscapeKey)
        );
    }

    #[test]
    fn test_devtools_shortcuts() {
        let inspect = Some(ViolationCategory::InspectElement);
        assert_eq!(classify(KeyEvent::new("F12")), inspect);
        assert_eq!(classify(KeyEvent::new("I").with_ctrl().with_shift()), inspect);
        assert_eq!(classify(KeyEvent::new("j").with_meta().with_shift()), inspect);
        assert_eq!(classify(KeyEvent::new("K").with_ctrl().with_shift()), inspect);
        assert_eq!(classify(KeyEvent::new("i").with_meta().with_alt()), inspect);
    }

    #[test]
    fn test_restricted_shortcuts() {
        let shortcut = Some(ViolationCategory::KeyboardShortcut);
        assert_eq!(classify(KeyEvent::new("c").with_ctrl()), shortcut);
        assert_eq!(classify(KeyEvent::new("v").with_meta()), shortcut);
        assert_eq!(classify(KeyEvent::new("F5")), shortcut);
        assert_eq!(classify(KeyEvent::new("F1")), shortcut);
        assert_eq!(classify(KeyEvent::new("PrintScreen")), shortcut);
        assert_eq!(classify(KeyEvent::new("Tab").with_alt()), shortcut);
    }

    #[test]
    fn test_ordinary_typing_passes() {
        assert_eq!(classify(KeyEvent::new("a")), None);
        assert_eq!(classify(KeyEvent::new("Tab")), None);
        assert_eq!(classify(KeyEvent::new("I").with_shift()), None);
        assert_eq!(classify(KeyEvent::new("F13")), None);
        assert_eq!(classify(KeyEvent::new("z").with_ctrl()), None);
    }
}
