use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserEvent, ListenerKind};
use std::any::Any;

/// Flags the test tab becoming hidden.
pub struct VisibilityMonitor {
    handle: MonitorHandle,
}

impl VisibilityMonitor {
    pub fn new() -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Visibility),
        }
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalMonitor for VisibilityMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Visibility
    }

    fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut MonitorHandle {
        &mut self.handle
    }

    fn listeners(&self) -> &'static [ListenerKind] {
        &[ListenerKind::VisibilityChange]
    }

    fn on_event(
        &mut self,
        event: &mut BrowserEvent,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        if let BrowserEvent::VisibilityChange { hidden: true } = *event {
            let event = ctx.violation(ViolationCategory::TabSwitch);
            ctx.submit(event)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
