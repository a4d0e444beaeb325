//! Configuration for the proctoring client.

use crate::core::violation::{CooldownBucket, ViolationCategory};
use crate::error::ConfigError;
use crate::monitor::lighting::BrightnessThresholds;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for every cadence and cooldown.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Convert a configured interval to reactor time, clamped to [`MAX_INTERVAL`].
pub(crate) fn interval_delta(interval: Duration) -> TimeDelta {
    TimeDelta::from_std(interval.min(MAX_INTERVAL)).unwrap_or_else(|_| TimeDelta::days(1))
}

/// Main configuration for the proctoring client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    /// Warnings a candidate gets before the test is auto-submitted
    pub max_warnings: u32,

    /// Which signal monitors to attach
    pub monitors: MonitorSelection,

    /// Minimum spacing between two counted violations, per bucket
    pub cooldowns: CooldownConfig,

    /// Timer cadences
    pub cadence: CadenceConfig,

    /// Audio classifier decision policy
    pub audio: AudioPolicy,

    /// Gaze classifier decision policy
    pub gaze: GazePolicy,

    /// Brightness score cut-offs for the lighting classifier
    pub lighting: BrightnessThresholds,

    /// Backend base URL (violations, permission logs, sessions)
    pub backend_url: String,

    /// Optional bearer token for the backend
    pub backend_token: Option<String>,

    /// Capacity of the outbound report queue
    pub report_queue_capacity: usize,

    /// Path for audit statistics
    pub data_path: PathBuf,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-guard");

        Self {
            max_warnings: 3,
            monitors: MonitorSelection::default(),
            cooldowns: CooldownConfig::default(),
            cadence: CadenceConfig::default(),
            audio: AudioPolicy::default(),
            gaze: GazePolicy::default(),
            lighting: BrightnessThresholds::default(),
            backend_url: "http://127.0.0.1:8000/api".to_string(),
            backend_token: None,
            report_queue_capacity: 1_000,
            data_path: data_dir,
        }
    }
}

impl ProctorConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: ProctorConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-guard")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject values the state machine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_warnings == 0 {
            return Err(ConfigError::Invalid(
                "max_warnings must be at least 1".to_string(),
            ));
        }
        for (name, interval) in self.cadence.named() {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} interval must be non-zero")));
            }
            if interval > MAX_INTERVAL {
                return Err(ConfigError::Invalid(format!(
                    "{name} interval must be at most {}ms",
                    MAX_INTERVAL.as_millis()
                )));
            }
        }
        for (name, cooldown) in self.cooldowns.named() {
            if cooldown > MAX_INTERVAL {
                return Err(ConfigError::Invalid(format!(
                    "{name} cooldown must be at most {}ms",
                    MAX_INTERVAL.as_millis()
                )));
            }
        }
        if self.gaze.away_threshold > MAX_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "gaze away_threshold must be at most {}ms",
                MAX_INTERVAL.as_millis()
            )));
        }
        if self.lighting.too_dark >= self.lighting.too_bright {
            return Err(ConfigError::Invalid(
                "lighting too_dark threshold must be below too_bright".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.lighting.sudden_change) {
            return Err(ConfigError::Invalid(
                "lighting sudden_change must be in [0, 1)".to_string(),
            ));
        }
        if self.report_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "report_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit.json")
    }
}

/// Which signal monitors to attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSelection {
    pub fullscreen: bool,
    pub visibility: bool,
    pub focus: bool,
    pub keyboard: bool,
    pub camera: bool,
    pub microphone: bool,
    pub faces: bool,
    pub audio: bool,
    pub gaze: bool,
    pub lighting: bool,
    /// Check the browser against the supported list at start
    pub browser_check: bool,
}

impl Default for MonitorSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl MonitorSelection {
    pub fn all() -> Self {
        Self {
            fullscreen: true,
            visibility: true,
            focus: true,
            keyboard: true,
            camera: true,
            microphone: true,
            faces: true,
            audio: true,
            gaze: true,
            lighting: true,
            browser_check: true,
        }
    }

    /// Browser signals only, no media devices.
    pub fn browser_only() -> Self {
        Self {
            camera: false,
            microphone: false,
            faces: false,
            audio: false,
            gaze: false,
            lighting: false,
            ..Self::all()
        }
    }

    /// Parse a monitor selection from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |name: &str| names.iter().any(|s| s == name || s == "all");

        Self {
            fullscreen: has("fullscreen"),
            visibility: has("visibility"),
            focus: has("focus"),
            keyboard: has("keyboard"),
            camera: has("camera"),
            microphone: has("microphone"),
            faces: has("faces"),
            audio: has("audio"),
            gaze: has("gaze"),
            lighting: has("lighting"),
            browser_check: has("browser"),
        }
    }

    /// Check if at least one monitor is enabled.
    pub fn any_enabled(&self) -> bool {
        self.fullscreen
            || self.visibility
            || self.focus
            || self.keyboard
            || self.camera
            || self.microphone
            || self.faces
            || self.audio
            || self.gaze
            || self.lighting
            || self.browser_check
    }
}

/// Per-bucket cooldowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    #[serde(with = "duration_ms")]
    pub fullscreen_exit: Duration,
    /// Shared by window blur and tab switch
    #[serde(with = "duration_ms")]
    pub focus_loss: Duration,
    #[serde(with = "duration_ms")]
    pub keyboard: Duration,
    #[serde(with = "duration_ms")]
    pub permission: Duration,
    #[serde(with = "duration_ms")]
    pub face: Duration,
    #[serde(with = "duration_ms")]
    pub lighting: Duration,
    #[serde(with = "duration_ms")]
    pub audio: Duration,
    #[serde(with = "duration_ms")]
    pub gaze: Duration,
    #[serde(with = "duration_ms")]
    pub browser: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            fullscreen_exit: Duration::from_millis(300),
            focus_loss: Duration::from_millis(300),
            keyboard: Duration::ZERO,
            permission: Duration::ZERO,
            face: Duration::from_secs(5),
            lighting: Duration::from_secs(10),
            audio: Duration::from_secs(5),
            gaze: Duration::from_secs(5),
            browser: Duration::ZERO,
        }
    }
}

impl CooldownConfig {
    fn named(&self) -> [(&'static str, Duration); 9] {
        [
            ("fullscreen_exit", self.fullscreen_exit),
            ("focus_loss", self.focus_loss),
            ("keyboard", self.keyboard),
            ("permission", self.permission),
            ("face", self.face),
            ("lighting", self.lighting),
            ("audio", self.audio),
            ("gaze", self.gaze),
            ("browser", self.browser),
        ]
    }

    pub fn for_bucket(&self, bucket: CooldownBucket) -> Duration {
        match bucket {
            CooldownBucket::FocusLoss => self.focus_loss,
            CooldownBucket::Category(category) => match category {
                ViolationCategory::FullscreenExit => self.fullscreen_exit,
                ViolationCategory::TabSwitch | ViolationCategory::WindowBlur => self.focus_loss,
                ViolationCategory::KeyboardShortcut
                | ViolationCategory::EscapeKey
                | ViolationCategory::InspectElement => self.keyboard,
                ViolationCategory::CameraPermissionDenied
                | ViolationCategory::MicrophonePermissionDenied => self.permission,
                ViolationCategory::MultipleFaces | ViolationCategory::NoFace => self.face,
                ViolationCategory::LightingTooDark
                | ViolationCategory::LightingTooBright
                | ViolationCategory::LightingSuddenChange => self.lighting,
                ViolationCategory::GazeAway => self.gaze,
                ViolationCategory::AudioSuspicious => self.audio,
                ViolationCategory::BrowserCompatibilityIssue => self.browser,
            },
        }
    }
}

/// Timer cadences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    #[serde(with = "duration_ms")]
    pub fullscreen_retry: Duration,
    #[serde(with = "duration_ms")]
    pub permission_poll: Duration,
    #[serde(with = "duration_ms")]
    pub face_check: Duration,
    #[serde(with = "duration_ms")]
    pub audio_sample: Duration,
    #[serde(with = "duration_ms")]
    pub gaze_sample: Duration,
    #[serde(with = "duration_ms")]
    pub lighting_sample: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            fullscreen_retry: Duration::from_secs(1),
            permission_poll: Duration::from_secs(3),
            face_check: Duration::from_secs(5),
            audio_sample: Duration::from_secs(3),
            gaze_sample: Duration::from_secs(1),
            lighting_sample: Duration::from_secs(2),
        }
    }
}

impl CadenceConfig {
    fn named(&self) -> [(&'static str, Duration); 6] {
        [
            ("fullscreen_retry", self.fullscreen_retry),
            ("permission_poll", self.permission_poll),
            ("face_check", self.face_check),
            ("audio_sample", self.audio_sample),
            ("gaze_sample", self.gaze_sample),
            ("lighting_sample", self.lighting_sample),
        ]
    }
}

/// Which audio labels count as normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioPolicy {
    pub normal_labels: Vec<String>,
    /// Readings below this confidence are ignored
    pub min_confidence: f64,
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            normal_labels: vec![
                "silence".to_string(),
                "normal".to_string(),
                "unknown".to_string(),
            ],
            min_confidence: 0.5,
        }
    }
}

impl AudioPolicy {
    pub fn is_normal(&self, label: &str) -> bool {
        self.normal_labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

/// When a gaze reading counts as looking away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazePolicy {
    /// Readings below this confidence are treated as unknown
    pub min_confidence: f64,
    /// How long gaze must stay away before it counts
    #[serde(with = "duration_ms")]
    pub away_threshold: Duration,
}

impl Default for GazePolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            away_threshold: Duration::from_secs(2),
        }
    }
}

/// Serde support for Duration as milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_selection_parsing() {
        let selection = MonitorSelection::from_csv("fullscreen, keyboard");
        assert!(selection.fullscreen);
        assert!(selection.keyboard);
        assert!(!selection.camera);
        assert!(!selection.focus);

        let selection = MonitorSelection::from_csv("all");
        assert_eq!(selection, MonitorSelection::all());

        let selection = MonitorSelection::from_csv("nothing");
        assert!(!selection.any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = ProctorConfig::default();
        assert_eq!(config.max_warnings, 3);
        assert_eq!(config.cadence.fullscreen_retry, Duration::from_secs(1));
        assert_eq!(config.cadence.permission_poll, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cooldown_table() {
        let cooldowns = CooldownConfig::default();
        assert_eq!(
            cooldowns.for_bucket(ViolationCategory::WindowBlur.bucket()),
            Duration::from_millis(300)
        );
        assert_eq!(
            cooldowns.for_bucket(ViolationCategory::EscapeKey.bucket()),
            Duration::ZERO
        );
        assert_eq!(
            cooldowns.for_bucket(ViolationCategory::NoFace.bucket()),
            Duration::from_secs(5)
        );
        assert_eq!(
            cooldowns.for_bucket(ViolationCategory::LightingTooDark.bucket()),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = ProctorConfig {
            max_warnings: 0,
            ..ProctorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_bounds_intervals() {
        let mut config = ProctorConfig::default();
        config.cadence.lighting_sample = Duration::from_millis(u64::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ProctorConfig::default();
        config.cooldowns.face = Duration::from_millis(u64::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ProctorConfig::default();
        config.cadence.gaze_sample = MAX_INTERVAL;
        config.cooldowns.audio = MAX_INTERVAL;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_delta_clamps() {
        assert_eq!(interval_delta(Duration::from_millis(300)), TimeDelta::milliseconds(300));
        assert_eq!(interval_delta(Duration::from_millis(u64::MAX)), TimeDelta::days(1));
        assert_eq!(interval_delta(Duration::MAX), TimeDelta::days(1));
    }

    #[test]
    fn test_selection_names_gaze_and_browser() {
        let selection = MonitorSelection::from_csv("gaze,browser");
        assert!(selection.gaze);
        assert!(selection.browser_check);
        assert!(!selection.lighting);
        assert!(MonitorSelection::browser_only().browser_check);
        assert!(!MonitorSelection::browser_only().gaze);
    }

    #[test]
    fn test_partial_config_json() {
        let json = r#"{"max_warnings": 5, "cooldowns": {"face": 2000}}"#;
        let config: ProctorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_warnings, 5);
        assert_eq!(config.cooldowns.face, Duration::from_secs(2));
        assert_eq!(config.cooldowns.lighting, Duration::from_secs(10));
        assert!(config.monitors.keyboard);
    }
}
