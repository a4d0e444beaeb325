//! Test lifecycle controller.
//!
//! The controller owns every piece of per-test state: the platform, the
//! monitors, their timers, the retry loop and (through the dispatcher) the
//! ledger. It is the only thing that attaches or detaches monitors and the
//! only teardown path.
//!
//! ```text
//! NotStarted -> RequestingFullscreen -> Active -+-> Exhausted -> AutoSubmitting -+-> Ended
//!                                               +-> ManualSubmit ----------------+
//! ```

use crate::audit::SharedAuditLog;
use crate::config::ProctorConfig;
use crate::core::dispatcher::ViolationDispatcher;
use crate::core::ledger::{LedgerEvent, Subscription};
use crate::core::retry::{FullscreenRetryController, RetryState, RetryStop, RetryTick};
use crate::core::scheduler::Scheduler;
use crate::core::session::Session;
use crate::error::{ExhaustionError, LifecycleError};
use crate::monitor::browser::compatibility_violation;
use crate::monitor::{MonitorContext, MonitorSet};
use crate::platform::{BrowserEvent, BrowserPlatform};
use crate::reporter::ViolationReporter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    NotStarted,
    RequestingFullscreen,
    Active,
    Exhausted,
    AutoSubmitting,
    ManualSubmit,
    Ended,
}

impl LifecyclePhase {
    /// Whether `start` may be called in this phase.
    pub fn is_idle(&self) -> bool {
        matches!(self, LifecyclePhase::NotStarted | LifecyclePhase::Ended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionReason {
    /// The candidate submitted.
    Manual,
    /// The warning budget ran out.
    Exhausted,
}

/// Delivered to submission observers when a test is handed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionNotice {
    pub session_id: String,
    pub test_id: String,
    pub reason: SubmissionReason,
    pub warnings_used: u32,
    pub at: DateTime<Utc>,
}

type SubmissionObserver = Box<dyn FnMut(&SubmissionNotice)>;

pub struct LifecycleController<P: BrowserPlatform> {
    platform: P,
    dispatcher: ViolationDispatcher,
    monitors: MonitorSet,
    scheduler: Scheduler,
    retry: FullscreenRetryController,
    browser_check: bool,
    phase: LifecyclePhase,
    audit: SharedAuditLog,
    observers: Vec<(Subscription, SubmissionObserver)>,
    next_subscription: u64,
    last_submission: Option<SubmissionNotice>,
}

impl<P: BrowserPlatform> LifecycleController<P> {
    pub fn new(
        config: &ProctorConfig,
        platform: P,
        monitors: MonitorSet,
        reporter: Box<dyn ViolationReporter>,
        audit: SharedAuditLog,
    ) -> Self {
        Self {
            platform,
            dispatcher: ViolationDispatcher::new(config.cooldowns.clone(), reporter, audit.clone()),
            monitors,
            scheduler: Scheduler::new(),
            retry: FullscreenRetryController::new(config.cadence.fullscreen_retry),
            browser_check: config.monitors.browser_check,
            phase: LifecyclePhase::NotStarted,
            audit,
            observers: Vec::new(),
            next_subscription: 0,
            last_submission: None,
        }
    }

    /// Begin a proctored test.
    ///
    /// An unsupported browser counts as a violation right away, so with a
    /// budget of one the test is auto-submitted before `start` returns.
    pub fn start(
        &mut self,
        session_id: impl Into<String>,
        test_id: impl Into<String>,
        max_warnings: u32,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if !self.phase.is_idle() {
            return Err(LifecycleError::AlreadyRunning);
        }
        if max_warnings == 0 {
            return Err(LifecycleError::InvalidWarningBudget);
        }
        let session = Session::new(session_id, test_id, max_warnings);

        self.phase = LifecyclePhase::RequestingFullscreen;
        self.audit.record_fullscreen_request();
        if let Err(e) = self.platform.request_fullscreen() {
            tracing::warn!(error = %e, "initial fullscreen request failed");
        }

        let attached = self
            .monitors
            .attach_all(&mut self.platform, &mut self.scheduler, now);
        self.dispatcher.reset_cooldowns();
        self.last_submission = None;

        tracing::info!(
            session_id = %session.id,
            test_id = %session.test_id,
            max_warnings,
            monitors = attached,
            fullscreen = self.platform.is_fullscreen(),
            "proctored session started"
        );
        self.dispatcher.ledger_mut().start(session);
        self.audit.record_session_started();
        self.phase = LifecyclePhase::Active;

        if self.browser_check {
            self.check_browser(now);
        }
        Ok(())
    }

    fn check_browser(&mut self, now: DateTime<Utc>) {
        let info = self.platform.browser_info();
        let Some(event) = compatibility_violation(&info, now) else {
            tracing::debug!(browser = %info.browser_name, "browser supported");
            return;
        };
        tracing::warn!(browser = %info.browser_name, "unsupported browser");
        if let Err(exhausted) = self.dispatcher.submit(event) {
            self.auto_submit(exhausted, now);
        }
    }

    /// Feed one browser event. Returns whether its default action was
    /// cancelled.
    pub fn handle_event(&mut self, mut event: BrowserEvent, now: DateTime<Utc>) -> bool {
        if self.phase != LifecyclePhase::Active {
            return false;
        }
        let result = {
            let mut ctx = MonitorContext {
                now,
                platform: &mut self.platform,
                dispatcher: &mut self.dispatcher,
                retry: &mut self.retry,
            };
            self.monitors.deliver(&mut event, &mut ctx)
        };
        if let Err(exhausted) = result {
            self.auto_submit(exhausted, now);
        }
        event.default_prevented()
    }

    /// Move the reactor clock to `now`: fire due timers, then tick the
    /// fullscreen retry loop.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        if self.phase != LifecyclePhase::Active {
            return;
        }

        for (timer, owner) in self.scheduler.due(now) {
            // An earlier timer in this batch may have ended the session
            if self.phase != LifecyclePhase::Active {
                break;
            }
            tracing::trace!(monitor = %owner, "timer fired");
            let result = {
                let mut ctx = MonitorContext {
                    now,
                    platform: &mut self.platform,
                    dispatcher: &mut self.dispatcher,
                    retry: &mut self.retry,
                };
                self.monitors.fire(timer, &mut ctx)
            };
            if let Err(exhausted) = result {
                self.auto_submit(exhausted, now);
            }
        }

        if self.phase != LifecyclePhase::Active {
            return;
        }
        let active = self.dispatcher.ledger().is_active();
        if let RetryTick::Requested { .. } = self.retry.tick(now, &mut self.platform, active) {
            self.audit.record_fullscreen_request();
        }
    }

    /// The candidate hands in the test.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<SubmissionNotice, LifecycleError> {
        if self.phase != LifecyclePhase::Active {
            return Err(LifecycleError::NotActive);
        }
        self.phase = LifecyclePhase::ManualSubmit;
        let notice = self.notice(SubmissionReason::Manual, now);
        tracing::info!(
            session_id = %notice.session_id,
            warnings_used = notice.warnings_used,
            "test submitted"
        );
        self.notify(&notice);
        self.end();
        Ok(notice)
    }

    fn auto_submit(&mut self, exhausted: ExhaustionError, now: DateTime<Utc>) {
        if self.phase != LifecyclePhase::Active {
            return;
        }
        self.phase = LifecyclePhase::Exhausted;
        tracing::warn!(
            session_id = %exhausted.session_id,
            "warning budget exhausted, auto-submitting"
        );

        self.phase = LifecyclePhase::AutoSubmitting;
        self.dispatcher.request_termination(&exhausted.session_id);
        self.audit.record_auto_submission();
        let notice = self.notice(SubmissionReason::Exhausted, now);
        self.notify(&notice);
        self.end();
    }

    /// Tear everything down. Safe to call any number of times; returns
    /// whether this call did the teardown.
    pub fn end(&mut self) -> bool {
        if self.phase.is_idle() {
            return false;
        }
        let detached = self
            .monitors
            .detach_all(&mut self.platform, &mut self.scheduler);
        self.retry.stop(RetryStop::SessionEnded);
        let session_id = self.dispatcher.session_id();
        self.dispatcher.ledger_mut().end();

        if self.platform.is_fullscreen() {
            if let Err(e) = self.platform.exit_fullscreen() {
                tracing::debug!(error = %e, "could not leave fullscreen");
            }
        }
        if let Err(e) = self.audit.save() {
            tracing::warn!(error = %e, "failed to persist audit stats");
        }

        self.phase = LifecyclePhase::Ended;
        tracing::info!(session_id = ?session_id, monitors = detached, "proctored session ended");
        true
    }

    fn notice(&self, reason: SubmissionReason, now: DateTime<Utc>) -> SubmissionNotice {
        let session = self.dispatcher.ledger().session();
        SubmissionNotice {
            session_id: session.map(|s| s.id.clone()).unwrap_or_default(),
            test_id: session.map(|s| s.test_id.clone()).unwrap_or_default(),
            reason,
            warnings_used: session.map(|s| s.warnings_used()).unwrap_or(0),
            at: now,
        }
    }

    fn notify(&mut self, notice: &SubmissionNotice) {
        for (_, observer) in self.observers.iter_mut() {
            observer(notice);
        }
        self.last_submission = Some(notice.clone());
    }

    /// Observe test submissions, manual or automatic.
    pub fn subscribe_submission(
        &mut self,
        observer: impl FnMut(&SubmissionNotice) + 'static,
    ) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((subscription, Box::new(observer)));
        subscription
    }

    pub fn unsubscribe_submission(&mut self, subscription: Subscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(s, _)| *s != subscription);
        self.observers.len() != before
    }

    /// Observe warning consumption, e.g. to drive a warning banner.
    pub fn subscribe_ledger(
        &mut self,
        observer: impl FnMut(&LedgerEvent) + 'static,
    ) -> Subscription {
        self.dispatcher.ledger_mut().subscribe(observer)
    }

    pub fn unsubscribe_ledger(&mut self, subscription: Subscription) -> bool {
        self.dispatcher.ledger_mut().unsubscribe(subscription)
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn warnings_remaining(&self) -> u32 {
        self.dispatcher.ledger().warnings_remaining()
    }

    pub fn session(&self) -> Option<&Session> {
        self.dispatcher.ledger().session()
    }

    pub fn last_submission(&self) -> Option<&SubmissionNotice> {
        self.last_submission.as_ref()
    }

    pub fn dispatcher(&self) -> &ViolationDispatcher {
        &self.dispatcher
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn monitors(&self) -> &MonitorSet {
        &self.monitors
    }

    pub fn retry(&self) -> &FullscreenRetryController {
        &self.retry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Earliest instant at which `advance` has work to do.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let retry = match self.retry.state() {
            RetryState::Retrying {
                next_attempt_at, ..
            } => Some(next_attempt_at),
            RetryState::Idle => None,
        };
        match (self.scheduler.next_deadline(), retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

impl<P: BrowserPlatform> Drop for LifecycleController<P> {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::create_shared_log;
    use crate::config::MonitorSelection;
    use crate::monitor::Sensors;
    use crate::platform::{KeyEvent, SimulatedPlatform};
    use crate::reporter::MemoryReporter;
    use chrono::TimeDelta;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn controller() -> (LifecycleController<SimulatedPlatform>, MemoryReporter) {
        let config = ProctorConfig {
            monitors: MonitorSelection::browser_only(),
            ..ProctorConfig::default()
        };
        let reporter = MemoryReporter::new();
        let controller = LifecycleController::new(
            &config,
            SimulatedPlatform::new(),
            MonitorSet::from_config(&config, Sensors::none()),
            Box::new(reporter.clone()),
            create_shared_log(),
        );
        (controller, reporter)
    }

    #[test]
    fn test_start_enters_active_fullscreen() {
        let (mut controller, _) = controller();
        controller.start("S-1", "T-1", 3, Utc::now()).unwrap();

        assert_eq!(controller.phase(), LifecyclePhase::Active);
        assert!(controller.platform().is_fullscreen());
        assert_eq!(controller.warnings_remaining(), 3);
    }

    #[test]
    fn test_start_rejects_misuse() {
        let (mut controller, _) = controller();
        assert_eq!(
            controller.start("S-1", "T-1", 0, Utc::now()),
            Err(LifecycleError::InvalidWarningBudget)
        );
        controller.start("S-1", "T-1", 3, Utc::now()).unwrap();
        assert_eq!(
            controller.start("S-2", "T-1", 3, Utc::now()),
            Err(LifecycleError::AlreadyRunning)
        );
    }

    #[test]
    fn test_restricted_key_is_cancelled() {
        let (mut controller, reporter) = controller();
        let now = Utc::now();
        controller.start("S-1", "T-1", 3, now).unwrap();

        let blocked = controller.handle_event(
            BrowserEvent::KeyDown(KeyEvent::new("c").with_ctrl()),
            now + TimeDelta::seconds(1),
        );
        let typed = controller.handle_event(
            BrowserEvent::KeyDown(KeyEvent::new("c")),
            now + TimeDelta::seconds(2),
        );

        assert!(blocked);
        assert!(!typed);
        assert_eq!(reporter.violations()[0].details["key_combination"], "Ctrl+C");
    }

    #[test]
    fn test_manual_submit_notifies_and_ends() {
        let (mut controller, reporter) = controller();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        controller.subscribe_submission(move |notice| sink.borrow_mut().push(notice.reason));

        let now = Utc::now();
        controller.start("S-1", "T-1", 3, now).unwrap();
        let notice = controller.submit(now).unwrap();

        assert_eq!(notice.reason, SubmissionReason::Manual);
        assert_eq!(*seen.borrow(), vec![SubmissionReason::Manual]);
        assert_eq!(controller.phase(), LifecyclePhase::Ended);
        assert_eq!(reporter.terminations(), 0);
        assert_eq!(controller.submit(now), Err(LifecycleError::NotActive));
    }

    #[test]
    fn test_supported_browser_passes_start_check() {
        let (mut controller, reporter) = controller();
        controller.start("S-1", "T-1", 3, Utc::now()).unwrap();
        assert!(reporter.violations().is_empty());
        assert_eq!(controller.warnings_remaining(), 3);
    }

    #[test]
    fn test_controller_is_reusable_after_end() {
        let (mut controller, _) = controller();
        let now = Utc::now();
        controller.start("S-1", "T-1", 2, now).unwrap();
        assert!(controller.end());
        assert!(!controller.end());

        controller.start("S-2", "T-1", 2, now).unwrap();
        assert_eq!(controller.phase(), LifecyclePhase::Active);
        assert_eq!(controller.session().map(|s| s.id.as_str()), Some("S-2"));
        assert_eq!(controller.platform().listener_count(crate::platform::ListenerKind::Blur), 1);
    }
}
