//! Violation dispatcher: the single entry point for every monitor.
//!
//! `submit` is synchronous and the reactor is single-threaded, so violations
//! reach the ledger in exactly the order they were submitted.

use crate::audit::SharedAuditLog;
use crate::config::CooldownConfig;
use crate::core::cooldown::{CooldownDecision, CooldownRegistry};
use crate::core::ledger::WarningLedger;
use crate::core::violation::ViolationEvent;
use crate::error::ExhaustionError;
use crate::reporter::{Outbound, PermissionLogRecord, ViolationRecord, ViolationReporter};
use std::time::Duration;

/// What happened to a submitted violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No active session; dropped.
    Ignored,
    /// Inside the bucket's cooldown; dropped.
    Suppressed { remaining: Duration },
    /// Counted; `remaining` warnings left.
    Counted { remaining: u32 },
}

pub struct ViolationDispatcher {
    cooldowns: CooldownRegistry,
    ledger: WarningLedger,
    reporter: Box<dyn ViolationReporter>,
    audit: SharedAuditLog,
}

impl ViolationDispatcher {
    pub fn new(
        cooldowns: CooldownConfig,
        reporter: Box<dyn ViolationReporter>,
        audit: SharedAuditLog,
    ) -> Self {
        Self {
            cooldowns: CooldownRegistry::new(cooldowns),
            ledger: WarningLedger::new(),
            reporter,
            audit,
        }
    }

    /// Apply cooldown, count, and report one violation.
    ///
    /// Returns `Err` on the one submission that exhausts the warning budget.
    pub fn submit(&mut self, event: ViolationEvent) -> Result<Disposition, ExhaustionError> {
        let category = event.category();
        let session_id = match self.ledger.session() {
            Some(session) if self.ledger.is_active() => session.id.clone(),
            _ => {
                tracing::debug!(%category, "violation ignored, no active session");
                return Ok(Disposition::Ignored);
            }
        };

        if let CooldownDecision::Suppressed { remaining } =
            self.cooldowns.try_accept(category, event.timestamp())
        {
            tracing::debug!(
                %category,
                remaining_ms = remaining.as_millis() as u64,
                "violation suppressed by cooldown"
            );
            return Ok(Disposition::Suppressed { remaining });
        }

        self.audit.record_violation_accepted();
        let counted = self.ledger.register_violation();
        tracing::warn!(
            %category,
            session_id = %session_id,
            remaining = self.ledger.warnings_remaining(),
            "violation counted"
        );

        self.send(Outbound::Violation(ViolationRecord::from_event(
            &session_id,
            &event,
        )));

        match counted? {
            Some(remaining) => Ok(Disposition::Counted { remaining }),
            None => Ok(Disposition::Ignored),
        }
    }

    /// Log a permission transition. Never touches the ledger.
    pub fn report_permission(&mut self, record: PermissionLogRecord) {
        self.send(Outbound::Permission(record));
    }

    /// Queue the backend side of an auto-submission.
    pub fn request_termination(&mut self, session_id: &str) {
        self.send(Outbound::Terminate {
            session_id: session_id.to_string(),
        });
    }

    fn send(&self, record: Outbound) {
        let label = record.label();
        if let Err(e) = self.reporter.send(record) {
            self.audit.record_report_failed();
            tracing::warn!(kind = label, error = %e, "could not queue report");
        }
    }

    pub fn ledger(&self) -> &WarningLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut WarningLedger {
        &mut self.ledger
    }

    pub fn cooldowns(&self) -> &CooldownRegistry {
        &self.cooldowns
    }

    /// Forget cooldown history, e.g. when a new session starts.
    pub fn reset_cooldowns(&mut self) {
        self.cooldowns.clear();
    }

    pub fn audit(&self) -> &SharedAuditLog {
        &self.audit
    }

    /// Current session id, if any.
    pub fn session_id(&self) -> Option<String> {
        self.ledger.session().map(|s| s.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::create_shared_log;
    use crate::core::session::Session;
    use crate::core::violation::ViolationCategory;
    use crate::error::ReportingError;
    use crate::reporter::MemoryReporter;
    use chrono::{DateTime, TimeDelta, Utc};

    fn dispatcher(max: u32) -> (ViolationDispatcher, MemoryReporter) {
        let reporter = MemoryReporter::new();
        let mut dispatcher = ViolationDispatcher::new(
            CooldownConfig::default(),
            Box::new(reporter.clone()),
            create_shared_log(),
        );
        dispatcher.ledger_mut().start(Session::new("S-9", "T-1", max));
        (dispatcher, reporter)
    }

    fn event(category: ViolationCategory, at: DateTime<Utc>) -> ViolationEvent {
        ViolationEvent::new(category, at)
    }

    #[test]
    fn test_accepted_violation_counts_and_reports() {
        let (mut dispatcher, reporter) = dispatcher(3);
        let now = Utc::now();

        let result = dispatcher.submit(event(ViolationCategory::TabSwitch, now));
        assert_eq!(result, Ok(Disposition::Counted { remaining: 2 }));

        let violations = reporter.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].session_id, "S-9");
        assert_eq!(violations[0].category, Some(ViolationCategory::TabSwitch));
        assert_eq!(violations[0].violation_type, "tab_switch");
    }

    #[test]
    fn test_suppressed_violation_is_fully_dropped() {
        let (mut dispatcher, reporter) = dispatcher(3);
        let now = Utc::now();

        dispatcher
            .submit(event(ViolationCategory::WindowBlur, now))
            .unwrap();
        let second = dispatcher
            .submit(event(
                ViolationCategory::TabSwitch,
                now + TimeDelta::milliseconds(40),
            ))
            .unwrap();

        assert!(matches!(second, Disposition::Suppressed { .. }));
        assert_eq!(dispatcher.ledger().warnings_remaining(), 2);
        assert_eq!(reporter.violations().len(), 1);
    }

    #[test]
    fn test_exhaustion_propagates_once() {
        let (mut dispatcher, reporter) = dispatcher(1);
        let now = Utc::now();

        let result = dispatcher.submit(event(ViolationCategory::EscapeKey, now));
        assert!(result.is_err());

        let after = dispatcher.submit(event(ViolationCategory::EscapeKey, now));
        assert_eq!(after, Ok(Disposition::Ignored));
        assert_eq!(reporter.violations().len(), 1);
    }

    #[test]
    fn test_no_session_ignores() {
        let reporter = MemoryReporter::new();
        let mut dispatcher = ViolationDispatcher::new(
            CooldownConfig::default(),
            Box::new(reporter.clone()),
            create_shared_log(),
        );
        let result = dispatcher.submit(event(ViolationCategory::NoFace, Utc::now()));
        assert_eq!(result, Ok(Disposition::Ignored));
        assert!(reporter.records().is_empty());
    }

    struct BrokenReporter;

    impl ViolationReporter for BrokenReporter {
        fn send(&self, _record: Outbound) -> Result<(), ReportingError> {
            Err(ReportingError::QueueFull)
        }
    }

    #[test]
    fn test_reporting_failure_never_blocks_ledger() {
        let audit = create_shared_log();
        let mut dispatcher = ViolationDispatcher::new(
            CooldownConfig::default(),
            Box::new(BrokenReporter),
            audit.clone(),
        );
        dispatcher.ledger_mut().start(Session::new("S-1", "T-1", 2));

        let result = dispatcher.submit(event(ViolationCategory::InspectElement, Utc::now()));
        assert_eq!(result, Ok(Disposition::Counted { remaining: 1 }));
        assert_eq!(audit.stats().reports_failed, 1);
    }
}
