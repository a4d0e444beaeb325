use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserPlatform, FaceCounter, FaceReading};
use std::any::Any;
use std::time::Duration;

/// Snapshot-based face counting.
///
/// No face and more than one face are separate categories with separate
/// cooldowns. A frame the counter cannot read is skipped.
pub struct FaceCountMonitor {
    handle: MonitorHandle,
    counter: Box<dyn FaceCounter>,
    interval: Duration,
    last_reading: Option<FaceReading>,
}

impl FaceCountMonitor {
    pub fn new(counter: Box<dyn FaceCounter>, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::FaceCount),
            counter,
            interval,
            last_reading: None,
        }
    }

    pub fn last_reading(&self) -> Option<FaceReading> {
        self.last_reading
    }

    /// Whether the latest frame showed anything other than one face.
    pub fn is_suspicious(&self) -> bool {
        self.last_reading.is_some_and(|r| r.count != 1)
    }
}

impl SignalMonitor for FaceCountMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::FaceCount
    }

    fn handle(&self) -> &MonitorHandle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut MonitorHandle {
        &mut self.handle
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn on_attach(&mut self, _platform: &mut dyn BrowserPlatform) {
        self.last_reading = None;
    }

    fn on_tick(&mut self, ctx: &mut MonitorContext<'_>) -> Result<(), ExhaustionError> {
        if !ctx.session_active() {
            return Ok(());
        }
        let reading = match self.counter.count_faces() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(error = %e, "face check skipped");
                return Ok(());
            }
        };
        self.last_reading = Some(reading);

        let category = match reading.count {
            0 => ViolationCategory::NoFace,
            1 => return Ok(()),
            _ => ViolationCategory::MultipleFaces,
        };
        let event = ctx
            .violation(category)
            .with_detail("face_count", reading.count)
            .with_detail("confidence", reading.confidence);
        ctx.submit(event)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
