//! Fullscreen exit detection.

use crate::core::retry::RetryStop;
use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserEvent, BrowserPlatform, ListenerKind};
use std::any::Any;

/// Counts every exit from fullscreen and starts the re-acquire loop.
pub struct FullscreenMonitor {
    handle: MonitorHandle,
    exits: u32,
}

impl FullscreenMonitor {
    pub fn new() -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Fullscreen),
            exits: 0,
        }
    }

    /// Exits observed since attach.
    pub fn exits(&self) -> u32 {
        self.exits
    }
}

impl Default for FullscreenMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalMonitor for FullscreenMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Fullscreen
    }

    fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut MonitorHandle {
        &mut self.handle
    }

    fn listeners(&self) -> &'static [ListenerKind] {
        &[ListenerKind::FullscreenChange]
    }

    fn on_attach(&mut self, _platform: &mut dyn BrowserPlatform) {
        self.exits = 0;
    }

    fn on_event(
        &mut self,
        event: &mut BrowserEvent,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        let BrowserEvent::FullscreenChange { is_fullscreen } = *event else {
            return Ok(());
        };
        if !ctx.session_active() {
            return Ok(());
        }

        if is_fullscreen {
            ctx.retry.stop(RetryStop::Regained);
            return Ok(());
        }

        self.exits += 1;
        ctx.retry.begin(ctx.now);
        let event = ctx
            .violation(ViolationCategory::FullscreenExit)
            .with_detail("exit_count", self.exits);
        ctx.submit(event)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
