use crate::config::AudioPolicy;
use crate::core::violation::ViolationCategory;
use crate::error::ExhaustionError;
use crate::monitor::{MonitorContext, MonitorHandle, MonitorKind, SignalMonitor};
use crate::platform::{Classification, Classifier};
use std::any::Any;
use std::time::Duration;

/// Periodic audio classification. Any confident label outside the policy's
/// normal set is suspicious.
pub struct AudioMonitor {
    handle: MonitorHandle,
    classifier: Box<dyn Classifier>,
    policy: AudioPolicy,
    interval: Duration,
    last: Option<Classification>,
}

impl AudioMonitor {
    pub fn new(classifier: Box<dyn Classifier>, policy: AudioPolicy, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle::new(MonitorKind::Audio),
            classifier,
            policy,
            interval,
            last: None,
        }
    }

    pub fn last_classification(&self) -> Option<&Classification> {
        self.last.as_ref()
    }

    fn is_suspicious(&self, reading: &Classification) -> bool {
        reading.confidence >= self.policy.min_confidence && !self.policy.is_normal(&reading.label)
    }
}

impl SignalMonitor for AudioMonitor {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Audio
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
                tracing::debug!(error = %e, "audio sample skipped");
                return Ok(());
            }
        };
        let suspicious = self.is_suspicious(&reading);
        let event = ctx
            .violation(ViolationCategory::AudioSuspicious)
            .with_detail("label", reading.label.clone())
            .with_detail("confidence", reading.confidence);
        self.last = Some(reading);

        if suspicious {
            ctx.submit(event)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;

    struct Fixed(Classification);

    impl Classifier for Fixed {
        fn classify(&mut self) -> Result<Classification, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    fn monitor() -> AudioMonitor {
        AudioMonitor::new(
            Box::new(Fixed(Classification::new("silence", 1.0))),
            AudioPolicy::default(),
            Duration::from_secs(3),
        )
    }

    #[test]
    fn test_normal_labels_pass() {
        let monitor = monitor();
        assert!(!monitor.is_suspicious(&Classification::new("silence", 0.9)));
        assert!(!monitor.is_suspicious(&Classification::new("Normal", 0.9)));
    }

    #[test]
    fn test_confident_speech_is_suspicious() {
        let monitor = monitor();
        assert!(monitor.is_suspicious(&Classification::new("speech", 0.8)));
        assert!(!monitor.is_suspicious(&Classification::new("speech", 0.2)));
    }
}
