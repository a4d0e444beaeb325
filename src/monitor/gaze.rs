//! Gaze tracking on the camera feed.
//!
//! A single "away" reading is not a violation: the candidate has to keep
//! looking away for the policy's threshold. Each uninterrupted away streak
//! counts at most once.

use crate::config::{interval_delta, GazePolicy};
use crate::core::dispatcher::Disposition;
use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{BrowserPlatform, Classification, Classifier};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::any::Any;
use std::time::Duration;

pub const LABEL_AWAY: &str = "away";
pub const LABEL_TOWARDS: &str = "towards";
pub const LABEL_UNKNOWN: &str = "unknown";

/// Direction of a reading under `policy`. Low-confidence readings are unknown.
pub fn gaze_direction(reading: &Classification, policy: &GazePolicy) -> &'static str {
    if reading.confidence < policy.min_confidence {
        LABEL_UNKNOWN
    } else if reading.label.eq_ignore_ascii_case(LABEL_AWAY) {
        LABEL_AWAY
    } else {
        LABEL_TOWARDS
    }
}

pub struct GazeMonitor {
    handle: MonitorHandle,
    classifier: Box<dyn Classifier>,
    policy: GazePolicy,
    interval: Duration,
    away_since: Option<DateTime<Utc>>,
    streak_counted: bool,
}

impl GazeMonitor {
    pub fn new(classifier: Box<dyn Classifier>, policy: GazePolicy, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Gaze),
            classifier,
            policy,
            interval,
            away_since: None,
            streak_counted: false,
        }
    }

    /// Start of the current away streak.
    pub fn away_since(&self) -> Option<DateTime<Utc>> {
        self.away_since
    }

    pub fn is_looking_away(&self) -> bool {
        self.away_since.is_some()
    }
}

impl SignalMonitor for GazeMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Gaze
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
        self.away_since = None;
        self.streak_counted = false;
    }

    fn on_tick(&mut self, ctx: &mut MonitorContext<'_>) -> Result<(), ExhaustionError> {
        if !ctx.session_active() {
            return Ok(());
        }
        let reading = match self.classifier.classify() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(error = %e, "gaze sample skipped");
                return Ok(());
            }
        };

        match gaze_direction(&reading, &self.policy) {
            LABEL_UNKNOWN => return Ok(()),
            LABEL_TOWARDS => {
                self.away_since = None;
                self.streak_counted = false;
                return Ok(());
            }
            _ => {}
        }

        let since = *self.away_since.get_or_insert(ctx.now);
        let away_for = ctx.now - since;
        if self.streak_counted || away_for < interval_delta(self.policy.away_threshold) {
            return Ok(());
        }

        let event = ctx.violation(ViolationCategory::GazeAway).with_detail(
            "gaze_analysis",
            json!({
                "gaze_direction": LABEL_AWAY,
                "duration_seconds": away_for.num_milliseconds() as f64 / 1000.0,
                "confidence_level": reading.confidence,
                "is_looking_away": true,
            }),
        );
        if let Disposition::Counted { .. } = ctx.submit(event)? {
            self.streak_counted = true;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
