//! Interval timers for the single-threaded reactor.
//!
//! This is the reactor's `setInterval`: timers fire when the host advances
//! the clock, never on their own. Missed periods coalesce into one firing.

use crate::config::interval_delta;
use crate::monitor::MonitorKind;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Handle to a scheduled interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer {
    owner: MonitorKind,
    period: TimeDelta,
    next_due: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: BTreeMap<TimerId, Timer>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every `period`, first at `now + period`.
    pub fn schedule_every(
        &mut self,
        owner: MonitorKind,
        period: Duration,
        now: DateTime<Utc>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let period = interval_delta(period).max(TimeDelta::milliseconds(1));
        self.timers.insert(
            id,
            Timer {
                owner,
                period,
                next_due: now + period,
            },
        );
        id
    }

    /// Returns false if the timer was not scheduled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Collect the timers due at `now`, earliest first, and re-arm them.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<(TimerId, MonitorKind)> {
        let mut fired: Vec<(DateTime<Utc>, TimerId, MonitorKind)> = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            if timer.next_due > now {
                continue;
            }
            fired.push((timer.next_due, *id, timer.owner));
            while timer.next_due <= now {
                timer.next_due += timer.period;
            }
        }
        fired.sort();
        fired.into_iter().map(|(_, id, owner)| (id, owner)).collect()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.values().map(|t| t.next_due).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_fires_each_period() {
        let mut scheduler = Scheduler::new();
        let base = Utc::now();
        let id = scheduler.schedule_every(MonitorKind::Lighting, Duration::from_secs(2), base);

        assert!(scheduler.due(base + TimeDelta::seconds(1)).is_empty());
        assert_eq!(
            scheduler.due(base + TimeDelta::seconds(2)),
            vec![(id, MonitorKind::Lighting)]
        );
        assert!(scheduler.due(base + TimeDelta::milliseconds(3_999)).is_empty());
        assert_eq!(scheduler.due(base + TimeDelta::seconds(4)).len(), 1);
    }

    #[test]
    fn test_missed_periods_coalesce() {
        let mut scheduler = Scheduler::new();
        let base = Utc::now();
        scheduler.schedule_every(MonitorKind::FaceCount, Duration::from_secs(1), base);

        assert_eq!(scheduler.due(base + TimeDelta::seconds(10)).len(), 1);
        assert_eq!(
            scheduler.next_deadline(),
            Some(base + TimeDelta::seconds(11))
        );
    }

    #[test]
    fn test_oversized_period_is_clamped() {
        let mut scheduler = Scheduler::new();
        let base = Utc::now();
        scheduler.schedule_every(MonitorKind::Lighting, Duration::from_millis(u64::MAX), base);

        assert_eq!(scheduler.next_deadline(), Some(base + TimeDelta::days(1)));
        assert!(scheduler.due(base + TimeDelta::milliseconds(100)).is_empty());
        assert_eq!(scheduler.due(base + TimeDelta::days(1)).len(), 1);
        assert_eq!(scheduler.next_deadline(), Some(base + TimeDelta::days(2)));
    }

    #[test]
    fn test_cancel_is_single_shot() {
        let mut scheduler = Scheduler::new();
        let base = Utc::now();
        let id = scheduler.schedule_every(MonitorKind::Audio, Duration::from_secs(1), base);

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.due(base + TimeDelta::seconds(5)).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_due_ordering_by_deadline() {
        let mut scheduler = Scheduler::new();
        let base = Utc::now();
        let slow = scheduler.schedule_every(MonitorKind::Audio, Duration::from_secs(3), base);
        let fast =
            scheduler.schedule_every(MonitorKind::CameraPermission, Duration::from_secs(1), base);

        let fired = scheduler.due(base + TimeDelta::seconds(3));
        assert_eq!(
            fired,
            vec![
                (fast, MonitorKind::CameraPermission),
                (slow, MonitorKind::Audio)
            ]
        );
    }
}
