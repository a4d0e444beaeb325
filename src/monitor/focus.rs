use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserEvent, ListenerKind};
use std::any::Any;

/// Flags window blur. On refocus, asks for fullscreen again if it was lost.
pub struct WindowFocusMonitor {
    handle: MonitorHandle,
}

impl WindowFocusMonitor {
    pub fn new() -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::WindowFocus),
        }
    }
}

impl Default for WindowFocusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalMonitor for WindowFocusMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::WindowFocus
    }

    fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut MonitorHandle {
        &mut self.handle
    }

    fn listeners(&self) -> &'static [ListenerKind] {
        &[ListenerKind::Blur, ListenerKind::Focus]
    }

    fn on_event(
        &mut self,
        event: &mut BrowserEvent,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        match event {
            BrowserEvent::WindowBlur => {
                let event = ctx.violation(ViolationCategory::WindowBlur);
                ctx.submit(event)?;
            }
            BrowserEvent::WindowFocus => {
                if ctx.session_active() && !ctx.platform.is_fullscreen() {
                    // Focus may carry user activation; failure is not a violation
                    if let Err(e) = ctx.platform.request_fullscreen() {
                        tracing::debug!(error = %e, "fullscreen request on refocus failed");
                    } else {
                        ctx.dispatcher.audit().record_fullscreen_request();
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
