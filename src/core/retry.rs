//! Fullscreen re-acquisition loop.
//!
//! Entered when fullscreen is lost mid-test. The loop ends when fullscreen
//! comes back, when the session stops being active, or on the first request
//! the browser rejects. It never outlives the session: every tick checks
//! liveness before touching the platform.

use crate::config::interval_delta;
use crate::error::FullscreenError;
use crate::platform::BrowserPlatform;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Retrying {
        started_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
        attempts: u32,
    },
}

/// Why a retry loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStop {
    Regained,
    SessionEnded,
    RequestFailed(FullscreenError),
}

/// Result of one retry tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryTick {
    Idle,
    Waiting,
    Requested { attempt: u32 },
    Stopped(RetryStop),
}

#[derive(Debug)]
pub struct FullscreenRetryController {
    interval: TimeDelta,
    state: RetryState,
    last_stop: Option<RetryStop>,
}

impl FullscreenRetryController {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval_delta(interval).max(TimeDelta::milliseconds(1)),
            state: RetryState::Idle,
            last_stop: None,
        }
    }

    /// Enter `Retrying`. No-op if a loop is already running.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        if self.is_retrying() {
            return;
        }
        tracing::info!("fullscreen lost, starting re-acquire loop");
        self.state = RetryState::Retrying {
            started_at: now,
            next_attempt_at: now + self.interval,
            attempts: 0,
        };
    }

    /// Force the loop back to `Idle`. Returns whether it was running.
    pub fn stop(&mut self, reason: RetryStop) -> bool {
        if !self.is_retrying() {
            return false;
        }
        match reason {
            RetryStop::RequestFailed(ref e) => {
                tracing::error!(error = %e, "fullscreen request failed, stopping re-acquire loop");
            }
            ref other => {
                tracing::info!(reason = ?other, "fullscreen re-acquire loop stopped");
            }
        }
        self.state = RetryState::Idle;
        self.last_stop = Some(reason);
        true
    }

    /// Advance the loop to `now`.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        platform: &mut dyn BrowserPlatform,
        session_active: bool,
    ) -> RetryTick {
        let RetryState::Retrying {
            started_at,
            next_attempt_at,
            attempts,
        } = self.state
        else {
            return RetryTick::Idle;
        };

        if !session_active {
            self.stop(RetryStop::SessionEnded);
            return RetryTick::Stopped(RetryStop::SessionEnded);
        }
        if platform.is_fullscreen() {
            self.stop(RetryStop::Regained);
            return RetryTick::Stopped(RetryStop::Regained);
        }
        if now < next_attempt_at {
            return RetryTick::Waiting;
        }

        let attempt = attempts + 1;
        match platform.request_fullscreen() {
            Ok(()) => {
                tracing::debug!(attempt, "fullscreen re-request issued");
                if platform.is_fullscreen() {
                    self.stop(RetryStop::Regained);
                } else {
                    let mut next = next_attempt_at + self.interval;
                    while next <= now {
                        next += self.interval;
                    }
                    self.state = RetryState::Retrying {
                        started_at,
                        next_attempt_at: next,
                        attempts: attempt,
                    };
                }
                RetryTick::Requested { attempt }
            }
            Err(e) => {
                self.stop(RetryStop::RequestFailed(e.clone()));
                RetryTick::Stopped(RetryStop::RequestFailed(e))
            }
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_retrying(&self) -> bool {
        matches!(self.state, RetryState::Retrying { .. })
    }

    pub fn last_stop(&self) -> Option<&RetryStop> {
        self.last_stop.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{FullscreenPolicy, SimulatedPlatform};

    fn at(base: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        base + TimeDelta::milliseconds(millis)
    }

    fn windowed(policy: FullscreenPolicy) -> SimulatedPlatform {
        let mut platform = SimulatedPlatform::new();
        platform.set_fullscreen(false);
        platform.set_fullscreen_policy(policy);
        platform
    }

    #[test]
    fn test_retries_on_interval_until_regained() {
        let mut platform = windowed(FullscreenPolicy::Ignore);
        let mut retry = FullscreenRetryController::new(Duration::from_secs(1));
        let base = Utc::now();
        retry.begin(base);

        assert_eq!(retry.tick(at(base, 500), &mut platform, true), RetryTick::Waiting);
        assert_eq!(
            retry.tick(at(base, 1_000), &mut platform, true),
            RetryTick::Requested { attempt: 1 }
        );
        assert_eq!(
            retry.tick(at(base, 2_000), &mut platform, true),
            RetryTick::Requested { attempt: 2 }
        );

        platform.set_fullscreen(true);
        assert_eq!(
            retry.tick(at(base, 3_000), &mut platform, true),
            RetryTick::Stopped(RetryStop::Regained)
        );
        assert_eq!(retry.tick(at(base, 4_000), &mut platform, true), RetryTick::Idle);
        assert_eq!(platform.fullscreen_requests(), 2);
    }

    #[test]
    fn test_oversized_interval_waits() {
        let mut platform = windowed(FullscreenPolicy::Ignore);
        let mut retry = FullscreenRetryController::new(Duration::from_millis(u64::MAX));
        let base = Utc::now();
        retry.begin(base);

        assert_eq!(retry.tick(at(base, 1_000), &mut platform, true), RetryTick::Waiting);
        assert_eq!(platform.fullscreen_requests(), 0);
    }

    #[test]
    fn test_granted_request_ends_loop_immediately() {
        let mut platform = windowed(FullscreenPolicy::Grant);
        let mut retry = FullscreenRetryController::new(Duration::from_secs(1));
        let base = Utc::now();
        retry.begin(base);

        assert_eq!(
            retry.tick(at(base, 1_000), &mut platform, true),
            RetryTick::Requested { attempt: 1 }
        );
        assert!(!retry.is_retrying());
        assert_eq!(retry.last_stop(), Some(&RetryStop::Regained));
    }

    #[test]
    fn test_failed_request_halts_loop() {
        let mut platform = windowed(FullscreenPolicy::RequireGesture);
        let mut retry = FullscreenRetryController::new(Duration::from_secs(1));
        let base = Utc::now();
        retry.begin(base);

        assert!(matches!(
            retry.tick(at(base, 1_000), &mut platform, true),
            RetryTick::Stopped(RetryStop::RequestFailed(_))
        ));
        for step in 2..10 {
            assert_eq!(
                retry.tick(at(base, step * 1_000), &mut platform, true),
                RetryTick::Idle
            );
        }
        assert_eq!(platform.fullscreen_requests(), 1);
    }

    #[test]
    fn test_no_request_once_session_inactive() {
        let mut platform = windowed(FullscreenPolicy::Ignore);
        let mut retry = FullscreenRetryController::new(Duration::from_secs(1));
        let base = Utc::now();
        retry.begin(base);

        assert_eq!(
            retry.tick(at(base, 5_000), &mut platform, false),
            RetryTick::Stopped(RetryStop::SessionEnded)
        );
        assert_eq!(platform.fullscreen_requests(), 0);
    }

    #[test]
    fn test_begin_is_idempotent() {
        let mut retry = FullscreenRetryController::new(Duration::from_secs(1));
        let base = Utc::now();
        retry.begin(base);
        retry.begin(at(base, 900));

        match retry.state() {
            RetryState::Retrying {
                next_attempt_at, ..
            } => assert_eq!(next_attempt_at, at(base, 1_000)),
            RetryState::Idle => panic!("expected retrying"),
        }
    }
}
