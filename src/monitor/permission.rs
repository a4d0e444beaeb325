//! Camera and microphone permission polling.
//!
//! Each poll probes the device and releases it at once. Only transitions are
//! acted on: granted to denied counts a violation and logs the permission
//! change, denied to granted only logs it.

use crate::core::violation::ViolationCategory;
use crate::error::{ExhaustionError, PermissionError};
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserPlatform, MediaKind};
use crate::reporter::PermissionLogRecord;
use std::any::Any;
use std::time::Duration;

pub struct PermissionMonitor {
    handle: MonitorHandle,
    media: MediaKind,
    interval: Duration,
    last_granted: bool,
    last_error: Option<PermissionError>,
}

impl PermissionMonitor {
    pub fn new(media: MediaKind, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::permission(media)),
            media,
            interval,
            last_granted: true,
            last_error: None,
        }
    }

    pub fn media(&self) -> MediaKind {
        self.media
    }

    pub fn is_granted(&self) -> bool {
        self.last_granted
    }

    /// Most recent probe failure, shown to the operator.
    pub fn last_error(&self) -> Option<&PermissionError> {
        self.last_error.as_ref()
    }
}

impl SignalMonitor for PermissionMonitor {
    fn kind(&self) -> MonitorKind {
        self.handle.kind()
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

    // Access was granted before the test could start
    fn on_attach(&mut self, _platform: &mut dyn BrowserPlatform) {
        self.last_granted = true;
        self.last_error = None;
    }

    fn on_tick(&mut self, ctx: &mut MonitorContext<'_>) -> Result<(), ExhaustionError> {
        if !ctx.session_active() {
            return Ok(());
        }
        let probe = ctx.platform.probe_media(self.media);
        let granted = probe.is_ok();
        self.last_error = probe.err();

        if granted == self.last_granted {
            return Ok(());
        }
        self.last_granted = granted;

        if let Some(session_id) = ctx.session_id() {
            ctx.dispatcher.report_permission(PermissionLogRecord {
                session_id,
                permission_type: self.media,
                granted,
                device_info: ctx.platform.device_info(),
                error_message: self.last_error.as_ref().map(|e| e.to_string()),
            });
        }

        if granted {
            tracing::info!(media = %self.media, "permission restored");
            return Ok(());
        }

        tracing::warn!(
            media = %self.media,
            error = ?self.last_error,
            "permission revoked"
        );
        let mut event = ctx.violation(ViolationCategory::permission_denied(self.media));
        if let Some(ref e) = self.last_error {
            event = event.with_detail("error", e.to_string());
        }
        ctx.submit(event)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
