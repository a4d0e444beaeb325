//! Per-bucket cooldown registry.
//!
//! A bucket's timestamp only moves when an occurrence is accepted, so a burst
//! of suppressed events never extends the window.

use crate::config::{interval_delta, CooldownConfig};
use crate::core::violation::{CooldownBucket, ViolationCategory};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Last accepted occurrence of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownEntry {
    pub bucket: CooldownBucket,
    pub last_accepted_at: DateTime<Utc>,
}

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Accepted,
    /// Still inside the window; `remaining` until the bucket reopens
    Suppressed { remaining: Duration },
}

#[derive(Debug, Clone)]
pub struct CooldownRegistry {
    table: CooldownConfig,
    entries: HashMap<CooldownBucket, CooldownEntry>,
}

impl CooldownRegistry {
    pub fn new(table: CooldownConfig) -> Self {
        Self {
            table,
            entries: HashMap::new(),
        }
    }

    pub fn cooldown(&self, bucket: CooldownBucket) -> Duration {
        self.table.for_bucket(bucket)
    }

    /// Decide whether `category` may count at `now`, recording it if so.
    pub fn try_accept(
        &mut self,
        category: ViolationCategory,
        now: DateTime<Utc>,
    ) -> CooldownDecision {
        let bucket = category.bucket();
        let cooldown = self.cooldown(bucket);

        if let Some(entry) = self.entries.get(&bucket) {
            if !cooldown.is_zero() {
                let window = interval_delta(cooldown);
                let elapsed = now - entry.last_accepted_at;
                if elapsed < window {
                    let remaining = (window - elapsed).to_std().unwrap_or(cooldown);
                    return CooldownDecision::Suppressed { remaining };
                }
            }
        }

        self.entries.insert(
            bucket,
            CooldownEntry {
                bucket,
                last_accepted_at: now,
            },
        );
        CooldownDecision::Accepted
    }

    pub fn entry(&self, bucket: CooldownBucket) -> Option<&CooldownEntry> {
        self.entries.get(&bucket)
    }

    /// Forget every bucket. Called when a session starts.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        base + TimeDelta::milliseconds(millis)
    }

    #[test]
    fn test_focus_pair_deduped_within_window() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let base = Utc::now();

        assert_eq!(
            registry.try_accept(ViolationCategory::WindowBlur, base),
            CooldownDecision::Accepted
        );
        assert!(matches!(
            registry.try_accept(ViolationCategory::TabSwitch, at(base, 120)),
            CooldownDecision::Suppressed { .. }
        ));
        assert_eq!(
            registry.try_accept(ViolationCategory::TabSwitch, at(base, 300)),
            CooldownDecision::Accepted
        );
    }

    #[test]
    fn test_zero_cooldown_always_accepts() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let base = Utc::now();
        for _ in 0..5 {
            assert_eq!(
                registry.try_accept(ViolationCategory::KeyboardShortcut, base),
                CooldownDecision::Accepted
            );
        }
    }

    #[test]
    fn test_suppression_does_not_extend_window() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let base = Utc::now();

        registry.try_accept(ViolationCategory::NoFace, base);
        registry.try_accept(ViolationCategory::NoFace, at(base, 4_000));
        let entry = registry.entry(ViolationCategory::NoFace.bucket()).unwrap();
        assert_eq!(entry.last_accepted_at, base);

        match registry.try_accept(ViolationCategory::NoFace, at(base, 4_500)) {
            CooldownDecision::Suppressed { remaining } => {
                assert_eq!(remaining, Duration::from_millis(500))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            registry.try_accept(ViolationCategory::NoFace, at(base, 5_000)),
            CooldownDecision::Accepted
        );
    }

    #[test]
    fn test_oversized_cooldown_still_suppresses() {
        let table = CooldownConfig {
            face: Duration::from_millis(u64::MAX),
            ..CooldownConfig::default()
        };
        let mut registry = CooldownRegistry::new(table);
        let base = Utc::now();

        registry.try_accept(ViolationCategory::NoFace, base);
        assert!(matches!(
            registry.try_accept(ViolationCategory::NoFace, at(base, 60_000)),
            CooldownDecision::Suppressed { .. }
        ));
    }

    #[test]
    fn test_buckets_are_independent() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let base = Utc::now();
        registry.try_accept(ViolationCategory::NoFace, base);
        assert_eq!(
            registry.try_accept(ViolationCategory::MultipleFaces, at(base, 10)),
            CooldownDecision::Accepted
        );
    }

    #[test]
    fn test_clock_going_backwards_is_suppressed() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let base = Utc::now();
        registry.try_accept(ViolationCategory::FullscreenExit, base);
        assert!(matches!(
            registry.try_accept(ViolationCategory::FullscreenExit, at(base, -50)),
            CooldownDecision::Suppressed { .. }
        ));
    }
}
