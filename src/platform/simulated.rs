//! In-process browser and sensor stand-ins.
//!
//! Used by the replay CLI and by tests. The platform records every listener
//! registration and fullscreen request so teardown can be audited.

use crate::error::{ClassifierError, FullscreenError, PermissionError};
use crate::monitor::lighting::{BrightnessClassifier, BrightnessThresholds};
use crate::platform::types::{BrowserEvent, BrowserInfo, ListenerKind, MediaKind};
use crate::platform::{BrowserPlatform, Classification, Classifier, FaceCounter, FaceReading};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// How the simulated browser answers `requestFullscreen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullscreenPolicy {
    /// Enter fullscreen immediately.
    Grant,
    /// Accept the call but stay windowed.
    Ignore,
    /// Reject: the call did not come from a user gesture.
    RequireGesture,
    /// No fullscreen API at all.
    Unsupported,
}

#[derive(Debug, Clone, Copy)]
struct MediaState {
    granted: bool,
    present: bool,
}

/// A scriptable browser.
#[derive(Debug)]
pub struct SimulatedPlatform {
    fullscreen: bool,
    policy: FullscreenPolicy,
    fullscreen_requests: u32,
    listeners: BTreeMap<ListenerKind, u32>,
    spurious_removals: u32,
    media: HashMap<MediaKind, MediaState>,
    probes: u32,
    device: String,
    browser: BrowserInfo,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let mut media = HashMap::new();
        for kind in [MediaKind::Camera, MediaKind::Microphone] {
            media.insert(
                kind,
                MediaState {
                    granted: true,
                    present: true,
                },
            );
        }

        Self {
            fullscreen: false,
            policy: FullscreenPolicy::Grant,
            fullscreen_requests: 0,
            listeners: BTreeMap::new(),
            spurious_removals: 0,
            media,
            probes: 0,
            device: format!("simulated-browser on {hostname}"),
            browser: BrowserInfo::new("Chrome")
                .with_version("120.0")
                .with_user_agent(
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                     Chrome/120.0.0.0 Safari/537.36",
                ),
        }
    }

    pub fn set_browser(&mut self, browser: BrowserInfo) {
        self.browser = browser;
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    pub fn set_fullscreen_policy(&mut self, policy: FullscreenPolicy) {
        self.policy = policy;
    }

    pub fn set_permission(&mut self, kind: MediaKind, granted: bool) {
        if let Some(state) = self.media.get_mut(&kind) {
            state.granted = granted;
        }
    }

    pub fn set_device_present(&mut self, kind: MediaKind, present: bool) {
        if let Some(state) = self.media.get_mut(&kind) {
            state.present = present;
        }
    }

    /// Mirror the state change an incoming browser event implies.
    pub fn apply(&mut self, event: &BrowserEvent) {
        if let BrowserEvent::FullscreenChange { is_fullscreen } = event {
            self.fullscreen = *is_fullscreen;
        }
    }

    pub fn fullscreen_requests(&self) -> u32 {
        self.fullscreen_requests
    }

    pub fn listener_count(&self, kind: ListenerKind) -> u32 {
        self.listeners.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_listeners(&self) -> u32 {
        self.listeners.values().sum()
    }

    /// Removals of a listener that was never registered.
    pub fn spurious_removals(&self) -> u32 {
        self.spurious_removals
    }

    pub fn probe_count(&self) -> u32 {
        self.probes
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserPlatform for SimulatedPlatform {
    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn request_fullscreen(&mut self) -> Result<(), FullscreenError> {
        self.fullscreen_requests += 1;
        match self.policy {
            FullscreenPolicy::Grant => {
                self.fullscreen = true;
                Ok(())
            }
            FullscreenPolicy::Ignore => Ok(()),
            FullscreenPolicy::RequireGesture => Err(FullscreenError::Denied(
                "request not triggered by user gesture".to_string(),
            )),
            FullscreenPolicy::Unsupported => Err(FullscreenError::Unsupported),
        }
    }

    fn exit_fullscreen(&mut self) -> Result<(), FullscreenError> {
        if self.policy == FullscreenPolicy::Unsupported {
            return Err(FullscreenError::Unsupported);
        }
        self.fullscreen = false;
        Ok(())
    }

    fn add_listener(&mut self, kind: ListenerKind) {
        *self.listeners.entry(kind).or_insert(0) += 1;
    }

    fn remove_listener(&mut self, kind: ListenerKind) {
        match self.listeners.get_mut(&kind) {
            Some(count) if *count > 0 => *count -= 1,
            _ => self.spurious_removals += 1,
        }
    }

    fn probe_media(&mut self, kind: MediaKind) -> Result<(), PermissionError> {
        self.probes += 1;
        let state = self
            .media
            .get(&kind)
            .copied()
            .ok_or(PermissionError::NotFound(kind))?;
        if !state.present {
            return Err(PermissionError::NotFound(kind));
        }
        if !state.granted {
            return Err(PermissionError::Denied(kind));
        }
        Ok(())
    }

    fn device_info(&self) -> String {
        self.device.clone()
    }

    fn browser_info(&self) -> BrowserInfo {
        self.browser.clone()
    }
}

#[derive(Debug, Clone)]
struct FeedState {
    faces: Option<FaceReading>,
    audio: Option<Classification>,
    gaze: Option<Classification>,
    brightness: Option<f64>,
}

/// Shared, settable classifier outputs.
///
/// Cloning the feed shares the underlying readings, so the handle kept by a
/// script or test controls the classifiers owned by the monitors.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    state: Rc<RefCell<FeedState>>,
}

impl SensorFeed {
    /// One face, silence, gaze on screen and neutral lighting.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FeedState {
                faces: Some(FaceReading {
                    count: 1,
                    confidence: 0.9,
                }),
                audio: Some(Classification::new("silence", 0.9)),
                gaze: Some(Classification::new("towards", 0.9)),
                brightness: Some(0.5),
            })),
        }
    }

    pub fn set_faces(&self, count: u32) {
        self.state.borrow_mut().faces = Some(FaceReading {
            count,
            confidence: 0.9,
        });
    }

    pub fn set_audio(&self, label: impl Into<String>, confidence: f64) {
        self.state.borrow_mut().audio = Some(Classification::new(label, confidence));
    }

    pub fn set_gaze(&self, label: impl Into<String>, confidence: f64) {
        self.state.borrow_mut().gaze = Some(Classification::new(label, confidence));
    }

    pub fn set_brightness(&self, level: f64) {
        self.state.borrow_mut().brightness = Some(level);
    }

    /// Make every classifier fail until readings are set again.
    pub fn blackout(&self) {
        let mut state = self.state.borrow_mut();
        state.faces = None;
        state.audio = None;
        state.gaze = None;
        state.brightness = None;
    }

    pub fn face_counter(&self) -> Box<dyn FaceCounter> {
        Box::new(FeedFaces(self.clone()))
    }

    pub fn audio_classifier(&self) -> Box<dyn Classifier> {
        Box::new(FeedAudio(self.clone()))
    }

    pub fn gaze_classifier(&self) -> Box<dyn Classifier> {
        Box::new(FeedGaze(self.clone()))
    }

    pub fn lighting_classifier(&self, thresholds: BrightnessThresholds) -> Box<dyn Classifier> {
        let feed = self.clone();
        Box::new(BrightnessClassifier::new(thresholds, move || {
            feed.state.borrow().brightness.ok_or(ClassifierError::NoFrame)
        }))
    }
}

impl Default for SensorFeed {
    fn default() -> Self {
        Self::new()
    }
}

struct FeedFaces(SensorFeed);

impl FaceCounter for FeedFaces {
    fn count_faces(&mut self) -> Result<FaceReading, ClassifierError> {
        self.0.state.borrow().faces.ok_or(ClassifierError::NoFrame)
    }
}

struct FeedAudio(SensorFeed);

impl Classifier for FeedAudio {
    fn classify(&mut self) -> Result<Classification, ClassifierError> {
        self.0
            .state
            .borrow()
            .audio
            .clone()
            .ok_or(ClassifierError::NoFrame)
    }
}

struct FeedGaze(SensorFeed);

impl Classifier for FeedGaze {
    fn classify(&mut self) -> Result<Classification, ClassifierError> {
        self.0
            .state
            .borrow()
            .gaze
            .clone()
            .ok_or(ClassifierError::NoFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_bookkeeping() {
        let mut platform = SimulatedPlatform::new();
        platform.add_listener(ListenerKind::Blur);
        platform.add_listener(ListenerKind::Blur);
        assert_eq!(platform.listener_count(ListenerKind::Blur), 2);

        platform.remove_listener(ListenerKind::Blur);
        platform.remove_listener(ListenerKind::Blur);
        platform.remove_listener(ListenerKind::Blur);
        assert_eq!(platform.total_listeners(), 0);
        assert_eq!(platform.spurious_removals(), 1);
    }

    #[test]
    fn test_fullscreen_policies() {
        let mut platform = SimulatedPlatform::new();
        assert!(platform.request_fullscreen().is_ok());
        assert!(platform.is_fullscreen());

        platform.set_fullscreen(false);
        platform.set_fullscreen_policy(FullscreenPolicy::Ignore);
        assert!(platform.request_fullscreen().is_ok());
        assert!(!platform.is_fullscreen());

        platform.set_fullscreen_policy(FullscreenPolicy::RequireGesture);
        assert!(matches!(
            platform.request_fullscreen(),
            Err(FullscreenError::Denied(_))
        ));
        assert_eq!(platform.fullscreen_requests(), 3);
    }

    #[test]
    fn test_media_access_results() {
        let mut platform = SimulatedPlatform::new();
        assert!(platform.probe_media(MediaKind::Camera).is_ok());

        platform.set_permission(MediaKind::Camera, false);
        assert_eq!(
            platform.probe_media(MediaKind::Camera),
            Err(PermissionError::Denied(MediaKind::Camera))
        );

        platform.set_device_present(MediaKind::Microphone, false);
        assert_eq!(
            platform.probe_media(MediaKind::Microphone),
            Err(PermissionError::NotFound(MediaKind::Microphone))
        );
        assert_eq!(platform.probe_count(), 3);
    }

    #[test]
    fn test_sensor_feed_shared() {
        let feed = SensorFeed::new();
        let mut faces = feed.face_counter();
        assert_eq!(faces.count_faces().unwrap().count, 1);

        feed.set_faces(2);
        assert_eq!(faces.count_faces().unwrap().count, 2);

        feed.blackout();
        assert_eq!(faces.count_faces(), Err(ClassifierError::NoFrame));
    }
}
