//! Lighting checks on the camera feed.

use crate::core::violation::ViolationCategory;
use crate::error::{ClassifierError, ExhaustionError};
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{Classification, Classifier};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::time::Duration;

pub const LABEL_TOO_DARK: &str = "too_dark";
pub const LABEL_TOO_BRIGHT: &str = "too_bright";
pub const LABEL_SUDDEN_CHANGE: &str = "sudden_change";
pub const LABEL_NORMAL: &str = "normal";

/// Mean-brightness bounds, on a 0.0 (black) to 1.0 (white) scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessThresholds {
    pub too_dark: f64,
    pub too_bright: f64,
    /// Largest jump between two consecutive samples that still counts as normal
    pub sudden_change: f64,
}

impl Default for BrightnessThresholds {
    fn default() -> Self {
        Self {
            too_dark: 0.3,
            too_bright: 0.8,
            sudden_change: 0.2,
        }
    }
}

/// Label a mean brightness level, given the previous sample if any.
///
/// Dark and bright take precedence over a sudden change. Confidence grows
/// with the distance past the crossed threshold. The clamped level is kept
/// as the reading's value.
pub fn classify_brightness(
    level: f64,
    previous: Option<f64>,
    thresholds: &BrightnessThresholds,
) -> Classification {
    let level = level.clamp(0.0, 1.0);
    let reading = if level < thresholds.too_dark {
        let span = thresholds.too_dark.max(f64::EPSILON);
        Classification::new(LABEL_TOO_DARK, 0.5 + 0.5 * (thresholds.too_dark - level) / span)
    } else if level > thresholds.too_bright {
        let span = (1.0 - thresholds.too_bright).max(f64::EPSILON);
        Classification::new(
            LABEL_TOO_BRIGHT,
            0.5 + 0.5 * (level - thresholds.too_bright) / span,
        )
    } else {
        match previous.map(|p| (level - p.clamp(0.0, 1.0)).abs()) {
            Some(delta) if delta > thresholds.sudden_change => {
                let span = (1.0 - thresholds.sudden_change).max(f64::EPSILON);
                let excess = ((delta - thresholds.sudden_change) / span).min(1.0);
                Classification::new(LABEL_SUDDEN_CHANGE, 0.5 + 0.5 * excess)
            }
            _ => Classification::new(LABEL_NORMAL, 1.0),
        }
    };
    reading.with_value(level)
}

/// Classifier over a brightness source. Remembers the last sample to spot
/// sudden changes.
pub struct BrightnessClassifier<F> {
    thresholds: BrightnessThresholds,
    sample: F,
    previous: Option<f64>,
}

impl<F> BrightnessClassifier<F>
where
    F: FnMut() -> Result<f64, ClassifierError>,
{
    pub fn new(thresholds: BrightnessThresholds, sample: F) -> Self {
        Self {
            thresholds,
            sample,
            previous: None,
        }
    }
}

impl<F> Classifier for BrightnessClassifier<F>
where
    F: FnMut() -> Result<f64, ClassifierError>,
{
    fn classify(&mut self) -> Result<Classification, ClassifierError> {
        let level = (self.sample)()?;
        let reading = classify_brightness(level, self.previous, &self.thresholds);
        self.previous = reading.value;
        Ok(reading)
    }
}

pub struct LightingMonitor {
    handle: MonitorHandle,
    classifier: Box<dyn Classifier>,
    interval: Duration,
}

impl LightingMonitor {
    pub fn new(classifier: Box<dyn Classifier>, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Lighting),
            classifier,
            interval,
        }
    }
}

impl SignalMonitor for LightingMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Lighting
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

    fn on_tick(&mut self, ctx: &mut MonitorContext<'_>) -> Result<(), ExhaustionError> {
        if !ctx.session_active() {
            return Ok(());
        }
        let reading = match self.classifier.classify() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(error = %e, "lighting sample skipped");
                return Ok(());
            }
        };
        let category = match reading.label.as_str() {
            LABEL_TOO_DARK => ViolationCategory::LightingTooDark,
            LABEL_TOO_BRIGHT => ViolationCategory::LightingTooBright,
            LABEL_SUDDEN_CHANGE => ViolationCategory::LightingSuddenChange,
            _ => return Ok(()),
        };
        let event = ctx
            .violation(category)
            .with_detail("error_type", "poor_lighting")
            .with_detail(
                "lighting_analysis",
                json!({
                    "brightness_level": reading.value,
                    "lighting_condition": category.lighting_condition(),
                }),
            )
            .with_detail("confidence", reading.confidence);
        ctx.submit(event)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_brightness_bands() {
        let thresholds = BrightnessThresholds::default();
        assert_eq!(classify_brightness(0.1, None, &thresholds).label, LABEL_TOO_DARK);
        assert_eq!(classify_brightness(0.5, None, &thresholds).label, LABEL_NORMAL);
        assert_eq!(classify_brightness(0.95, None, &thresholds).label, LABEL_TOO_BRIGHT);
        assert_eq!(classify_brightness(0.3, None, &thresholds).label, LABEL_NORMAL);
        assert_eq!(classify_brightness(0.1, None, &thresholds).value, Some(0.1));
    }

    #[test]
    fn test_sudden_change_against_previous_sample() {
        let thresholds = BrightnessThresholds::default();
        assert_eq!(
            classify_brightness(0.75, Some(0.4), &thresholds).label,
            LABEL_SUDDEN_CHANGE
        );
        assert_eq!(
            classify_brightness(0.55, Some(0.4), &thresholds).label,
            LABEL_NORMAL
        );
        // out-of-band levels keep their own label
        assert_eq!(
            classify_brightness(0.1, Some(0.6), &thresholds).label,
            LABEL_TOO_DARK
        );
    }

    #[test]
    fn test_classifier_remembers_previous_level() {
        let mut levels = vec![0.7, 0.4, 0.5].into_iter();
        let mut classifier = BrightnessClassifier::new(BrightnessThresholds::default(), move || {
            levels.next().ok_or(ClassifierError::NoFrame)
        });
        assert_eq!(classifier.classify().unwrap().label, LABEL_NORMAL);
        assert_eq!(classifier.classify().unwrap().label, LABEL_SUDDEN_CHANGE);
        assert_eq!(classifier.classify().unwrap().label, LABEL_NORMAL);
    }

    #[test]
    fn test_confidence_grows_with_distance() {
        let thresholds = BrightnessThresholds::default();
        let near = classify_brightness(0.29, None, &thresholds).confidence;
        let far = classify_brightness(0.0, None, &thresholds).confidence;
        assert!(far > near);
        assert!((far - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_classifier_propagates_missing_frame() {
        let mut classifier =
            BrightnessClassifier::new(BrightnessThresholds::default(), || {
                Err(ClassifierError::NoFrame)
            });
        assert!(classifier.classify().is_err());
    }
}
