//! Signal monitors.
//!
//! Each monitor owns one browser signal source. While attached it turns raw
//! signals into [`ViolationEvent`]s and hands them to the dispatcher through
//! the [`MonitorContext`] it is given per callback. Monitors never hold a
//! reference to the session or the ledger between callbacks.

pub mod audio;
pub mod browser;
pub mod face;
pub mod focus;
pub mod fullscreen;
pub mod gaze;
pub mod keyboard;
pub mod lighting;
pub mod permission;
pub mod visibility;

pub use audio::AudioMonitor;
pub use face::FaceCountMonitor;
pub use focus::WindowFocusMonitor;
pub use fullscreen::FullscreenMonitor;
pub use gaze::GazeMonitor;
pub use keyboard::KeyboardGuard;
pub use lighting::{BrightnessClassifier, BrightnessThresholds, LightingMonitor};
pub use permission::PermissionMonitor;
pub use visibility::VisibilityMonitor;

use crate::config::ProctorConfig;
use crate::core::dispatcher::{Disposition, ViolationDispatcher};
use crate::core::retry::FullscreenRetryController;
use crate::core::scheduler::{Scheduler, TimerId};
use crate::core::violation::{ViolationCategory, ViolationEvent};
use crate::error::ExhaustionError;
use crate::platform::{
    BrowserEvent, BrowserPlatform, Classifier, FaceCounter, ListenerKind, MediaKind, SensorFeed,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Identifies a monitor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    Fullscreen,
    Visibility,
    WindowFocus,
    Keyboard,
    CameraPermission,
    MicrophonePermission,
    FaceCount,
    Audio,
    Gaze,
    Lighting,
}

impl MonitorKind {
    pub fn permission(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Camera => MonitorKind::CameraPermission,
            MediaKind::Microphone => MonitorKind::MicrophonePermission,
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorKind::Fullscreen => "fullscreen",
            MonitorKind::Visibility => "visibility",
            MonitorKind::WindowFocus => "window_focus",
            MonitorKind::Keyboard => "keyboard",
            MonitorKind::CameraPermission => "camera_permission",
            MonitorKind::MicrophonePermission => "microphone_permission",
            MonitorKind::FaceCount => "face_count",
            MonitorKind::Audio => "audio",
            MonitorKind::Gaze => "gaze",
            MonitorKind::Lighting => "lighting",
        };
        f.write_str(name)
    }
}

/// Live listeners and timers of one monitor.
///
/// Detaching removes exactly what attaching registered, once.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    kind: MonitorKind,
    attached: bool,
    listeners: Vec<ListenerKind>,
    timers: Vec<TimerId>,
}

impl MonitorHandle {
    pub fn new(kind: MonitorKind) -> Self {
        Self {
            kind,
            attached: false,
            listeners: Vec::new(),
            timers: Vec::new(),
        }
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn listeners(&self) -> &[ListenerKind] {
        &self.listeners
    }

    pub fn timers(&self) -> &[TimerId] {
        &self.timers
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timers.contains(&id)
    }

    /// Register listeners and the poll timer. Returns false if already attached.
    pub fn attach(
        &mut self,
        listeners: &[ListenerKind],
        poll_interval: Option<Duration>,
        platform: &mut dyn BrowserPlatform,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
    ) -> bool {
        if self.attached {
            return false;
        }
        for &listener in listeners {
            platform.add_listener(listener);
            self.listeners.push(listener);
        }
        if let Some(interval) = poll_interval {
            self.timers
                .push(scheduler.schedule_every(self.kind, interval, now));
        }
        self.attached = true;
        true
    }

    /// Remove listeners and cancel timers. Returns false if not attached.
    pub fn detach(&mut self, platform: &mut dyn BrowserPlatform, scheduler: &mut Scheduler) -> bool {
        if !self.attached {
            return false;
        }
        for listener in self.listeners.drain(..) {
            platform.remove_listener(listener);
        }
        for timer in self.timers.drain(..) {
            scheduler.cancel(timer);
        }
        self.attached = false;
        true
    }
}

/// What a monitor callback may touch.
pub struct MonitorContext<'a> {
    pub now: DateTime<Utc>,
    pub platform: &'a mut dyn BrowserPlatform,
    pub dispatcher: &'a mut ViolationDispatcher,
    pub retry: &'a mut FullscreenRetryController,
}

impl<'a> MonitorContext<'a> {
    pub fn session_active(&self) -> bool {
        self.dispatcher.ledger().is_active()
    }

    pub fn session_id(&self) -> Option<String> {
        self.dispatcher.session_id()
    }

    /// Start a violation stamped with the current reactor time.
    pub fn violation(&self, category: ViolationCategory) -> ViolationEvent {
        ViolationEvent::new(category, self.now)
    }

    pub fn submit(&mut self, event: ViolationEvent) -> Result<Disposition, ExhaustionError> {
        self.dispatcher.submit(event)
    }
}

/// One browser signal source.
pub trait SignalMonitor {
    fn kind(&self) -> MonitorKind;

    fn handle(&self) -> &MonitorHandle;

    fn handle_mut(&mut self) -> &mut MonitorHandle;

    /// DOM listeners this monitor needs while attached.
    fn listeners(&self) -> &'static [ListenerKind] {
        &[]
    }

    /// Cadence of the monitor's poll timer, if it polls.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Reset per-session state. Called right after the handle attaches.
    fn on_attach(&mut self, _platform: &mut dyn BrowserPlatform) {}

    fn on_event(
        &mut self,
        _event: &mut BrowserEvent,
        _ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        Ok(())
    }

    fn on_tick(&mut self, _ctx: &mut MonitorContext<'_>) -> Result<(), ExhaustionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// External classifiers the media monitors sample.
#[derive(Default)]
pub struct Sensors {
    pub faces: Option<Box<dyn FaceCounter>>,
    pub audio: Option<Box<dyn Classifier>>,
    pub gaze: Option<Box<dyn Classifier>>,
    pub lighting: Option<Box<dyn Classifier>>,
}

impl Sensors {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_feed(feed: &SensorFeed, thresholds: BrightnessThresholds) -> Self {
        Self {
            faces: Some(feed.face_counter()),
            audio: Some(feed.audio_classifier()),
            gaze: Some(feed.gaze_classifier()),
            lighting: Some(feed.lighting_classifier(thresholds)),
        }
    }
}

/// The monitors of one lifecycle controller.
#[derive(Default)]
pub struct MonitorSet {
    monitors: Vec<Box<dyn SignalMonitor>>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the monitors the configuration selects.
    pub fn from_config(config: &ProctorConfig, sensors: Sensors) -> Self {
        let selection = &config.monitors;
        let cadence = &config.cadence;
        let mut set = Self::new();

        if selection.fullscreen {
            set.push(Box::new(FullscreenMonitor::new()));
        }
        if selection.visibility {
            set.push(Box::new(VisibilityMonitor::new()));
        }
        if selection.focus {
            set.push(Box::new(WindowFocusMonitor::new()));
        }
        if selection.keyboard {
            set.push(Box::new(KeyboardGuard::new()));
        }
        if selection.camera {
            set.push(Box::new(PermissionMonitor::new(
                MediaKind::Camera,
                cadence.permission_poll,
            )));
        }
        if selection.microphone {
            set.push(Box::new(PermissionMonitor::new(
                MediaKind::Microphone,
                cadence.permission_poll,
            )));
        }

        let Sensors {
            faces,
            audio,
            gaze,
            lighting,
        } = sensors;
        match (selection.faces, faces) {
            (true, Some(counter)) => set.push(Box::new(FaceCountMonitor::new(
                counter,
                cadence.face_check,
            ))),
            (true, None) => tracing::warn!("face monitor selected but no face counter supplied"),
            _ => {}
        }
        match (selection.audio, audio) {
            (true, Some(classifier)) => set.push(Box::new(AudioMonitor::new(
                classifier,
                config.audio.clone(),
                cadence.audio_sample,
            ))),
            (true, None) => tracing::warn!("audio monitor selected but no classifier supplied"),
            _ => {}
        }
        match (selection.gaze, gaze) {
            (true, Some(classifier)) => set.push(Box::new(GazeMonitor::new(
                classifier,
                config.gaze.clone(),
                cadence.gaze_sample,
            ))),
            (true, None) => tracing::warn!("gaze monitor selected but no classifier supplied"),
            _ => {}
        }
        match (selection.lighting, lighting) {
            (true, Some(classifier)) => set.push(Box::new(LightingMonitor::new(
                classifier,
                cadence.lighting_sample,
            ))),
            (true, None) => tracing::warn!("lighting monitor selected but no classifier supplied"),
            _ => {}
        }

        set
    }

    pub fn push(&mut self, monitor: Box<dyn SignalMonitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SignalMonitor> {
        self.monitors.iter().map(|m| m.as_ref())
    }

    /// First monitor of concrete type `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.monitors
            .iter()
            .find_map(|m| m.as_any().downcast_ref::<T>())
    }

    pub fn attached_count(&self) -> usize {
        self.monitors
            .iter()
            .filter(|m| m.handle().is_attached())
            .count()
    }

    pub fn all_detached(&self) -> bool {
        self.attached_count() == 0
    }

    /// Attach every monitor that is not attached yet.
    pub fn attach_all(
        &mut self,
        platform: &mut dyn BrowserPlatform,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
    ) -> usize {
        let mut attached = 0;
        for monitor in self.monitors.iter_mut() {
            let listeners = monitor.listeners();
            let interval = monitor.poll_interval();
            if monitor
                .handle_mut()
                .attach(listeners, interval, platform, scheduler, now)
            {
                monitor.on_attach(platform);
                tracing::debug!(monitor = %monitor.kind(), "monitor attached");
                attached += 1;
            }
        }
        attached
    }

    /// Detach every attached monitor.
    pub fn detach_all(
        &mut self,
        platform: &mut dyn BrowserPlatform,
        scheduler: &mut Scheduler,
    ) -> usize {
        let mut detached = 0;
        for monitor in self.monitors.iter_mut() {
            if monitor.handle_mut().detach(platform, scheduler) {
                tracing::debug!(monitor = %monitor.kind(), "monitor detached");
                detached += 1;
            }
        }
        detached
    }

    /// Deliver a browser event to every attached monitor listening for it.
    pub fn deliver(
        &mut self,
        event: &mut BrowserEvent,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        let listener = event.listener();
        let mut exhausted = None;
        for monitor in self.monitors.iter_mut() {
            if !monitor.handle().is_attached() || !monitor.handle().listeners().contains(&listener)
            {
                continue;
            }
            if let Err(e) = monitor.on_event(event, ctx) {
                exhausted.get_or_insert(e);
            }
        }
        exhausted.map_or(Ok(()), Err)
    }

    /// Run the monitor that owns `timer`.
    pub fn fire(
        &mut self,
        timer: TimerId,
        ctx: &mut MonitorContext<'_>,
    ) -> Result<(), ExhaustionError> {
        let Some(monitor) = self
            .monitors
            .iter_mut()
            .find(|m| m.handle().owns_timer(timer))
        else {
            return Ok(());
        };
        // A timer can be collected in the same turn its monitor detaches
        if !monitor.handle().is_attached() {
            return Ok(());
        }
        monitor.on_tick(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    #[test]
    fn test_handle_attach_detach_idempotent() {
        let mut platform = SimulatedPlatform::new();
        let mut scheduler = Scheduler::new();
        let mut handle = MonitorHandle::new(MonitorKind::WindowFocus);
        let now = Utc::now();

        let listeners = [ListenerKind::Blur, ListenerKind::Focus];
        assert!(handle.attach(&listeners, None, &mut platform, &mut scheduler, now));
        assert!(!handle.attach(&listeners, None, &mut platform, &mut scheduler, now));
        assert_eq!(platform.listener_count(ListenerKind::Blur), 1);

        assert!(handle.detach(&mut platform, &mut scheduler));
        assert!(!handle.detach(&mut platform, &mut scheduler));
        assert_eq!(platform.total_listeners(), 0);
        assert_eq!(platform.spurious_removals(), 0);
    }

    #[test]
    fn test_handle_owns_its_timer() {
        let mut platform = SimulatedPlatform::new();
        let mut scheduler = Scheduler::new();
        let mut handle = MonitorHandle::new(MonitorKind::Audio);
        let now = Utc::now();

        handle.attach(
            &[],
            Some(Duration::from_secs(2)),
            &mut platform,
            &mut scheduler,
            now,
        );
        let timer = handle.timers()[0];
        assert!(scheduler.is_scheduled(timer));

        handle.detach(&mut platform, &mut scheduler);
        assert!(!scheduler.is_scheduled(timer));
        assert!(handle.timers().is_empty());
    }

    #[test]
    fn test_set_from_config_respects_selection() {
        let config = ProctorConfig {
            monitors: crate::config::MonitorSelection::browser_only(),
            ..ProctorConfig::default()
        };
        let set = MonitorSet::from_config(&config, Sensors::none());
        assert_eq!(set.len(), 4);
        assert!(set.get::<KeyboardGuard>().is_some());
        assert!(set.get::<PermissionMonitor>().is_none());
    }

    #[test]
    fn test_full_set_with_sensors() {
        let config = ProctorConfig::default();
        let feed = SensorFeed::new();
        let set = MonitorSet::from_config(
            &config,
            Sensors::from_feed(&feed, config.lighting.clone()),
        );
        assert_eq!(set.len(), 10);
        assert!(set.get::<GazeMonitor>().is_some());
        assert!(set.all_detached());
    }
}
