//! Warning ledger: the countdown state machine.
//!
//! The ledger owns the [`Session`] and is the only place `warnings_remaining`
//! changes. It is not internally synchronized; the dispatcher is its only
//! caller and the reactor is single-threaded.

use crate::core::session::{Session, SessionStatus};
use crate::error::ExhaustionError;
use std::fmt;

/// Notification delivered to ledger observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    WarningConsumed {
        session_id: String,
        remaining: u32,
        max_warnings: u32,
    },
    Exhausted {
        session_id: String,
    },
}

/// Unsubscribe handle returned by [`WarningLedger::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(pub(crate) u64);

type Observer = Box<dyn FnMut(&LedgerEvent)>;

pub struct WarningLedger {
    session: Option<Session>,
    exhaustion_handled: bool,
    observers: Vec<(Subscription, Observer)>,
    next_subscription: u64,
}

impl WarningLedger {
    pub fn new() -> Self {
        Self {
            session: None,
            exhaustion_handled: false,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Begin counting for `session` with its full budget.
    pub fn start(&mut self, mut session: Session) {
        session.warnings_remaining = session.max_warnings;
        session.status = SessionStatus::Active;
        self.exhaustion_handled = false;
        self.session = Some(session);
    }

    /// Consume one warning.
    ///
    /// Returns the remaining budget, `Ok(None)` when nothing was consumed
    /// (not active, already exhausted), or `Err` on the single call that
    /// brings the budget to zero.
    pub fn register_violation(&mut self) -> Result<Option<u32>, ExhaustionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.status != SessionStatus::Active || session.warnings_remaining == 0 {
            return Ok(None);
        }

        session.warnings_remaining -= 1;
        let remaining = session.warnings_remaining;
        let consumed = LedgerEvent::WarningConsumed {
            session_id: session.id.clone(),
            remaining,
            max_warnings: session.max_warnings,
        };

        if remaining > 0 {
            self.notify(&consumed);
            return Ok(Some(remaining));
        }

        session.status = SessionStatus::Exhausted;
        let session_id = session.id.clone();
        self.notify(&consumed);

        if self.exhaustion_handled {
            return Ok(Some(0));
        }
        self.exhaustion_handled = true;
        self.notify(&LedgerEvent::Exhausted {
            session_id: session_id.clone(),
        });
        Err(ExhaustionError { session_id })
    }

    /// Drop the session and return to `NotStarted`.
    pub fn end(&mut self) {
        self.session = None;
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::NotStarted)
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    pub fn warnings_remaining(&self) -> u32 {
        self.session
            .as_ref()
            .map(|s| s.warnings_remaining)
            .unwrap_or(0)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&LedgerEvent) + 'static) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((subscription, Box::new(observer)));
        subscription
    }

    /// Returns false if the subscription was already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(id, _)| *id != subscription);
        self.observers.len() != before
    }

    fn notify(&mut self, event: &LedgerEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(event);
        }
    }
}

impl Default for WarningLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WarningLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarningLedger")
            .field("session", &self.session)
            .field("exhaustion_handled", &self.exhaustion_handled)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn started(max: u32) -> WarningLedger {
        let mut ledger = WarningLedger::new();
        ledger.start(Session::new("S-1", "T-1", max));
        ledger
    }

    #[test]
    fn test_countdown_to_exhaustion() {
        let mut ledger = started(3);
        assert_eq!(ledger.register_violation(), Ok(Some(2)));
        assert_eq!(ledger.register_violation(), Ok(Some(1)));
        assert_eq!(
            ledger.register_violation(),
            Err(ExhaustionError {
                session_id: "S-1".to_string()
            })
        );
        assert_eq!(ledger.status(), SessionStatus::Exhausted);
        assert_eq!(ledger.warnings_remaining(), 0);
    }

    #[test]
    fn test_exhaustion_fires_once() {
        let mut ledger = started(1);
        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        ledger.subscribe(move |event| {
            if matches!(event, LedgerEvent::Exhausted { .. }) {
                *counter.borrow_mut() += 1;
            }
        });

        assert!(ledger.register_violation().is_err());
        for _ in 0..5 {
            assert_eq!(ledger.register_violation(), Ok(None));
        }
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(ledger.warnings_remaining(), 0);
    }

    #[test]
    fn test_inactive_ledger_ignores_violations() {
        let mut ledger = WarningLedger::new();
        assert_eq!(ledger.register_violation(), Ok(None));
        assert_eq!(ledger.status(), SessionStatus::NotStarted);
    }

    #[test]
    fn test_end_resets_and_restart_rearms() {
        let mut ledger = started(1);
        assert!(ledger.register_violation().is_err());
        ledger.end();
        assert_eq!(ledger.status(), SessionStatus::NotStarted);

        ledger.start(Session::new("S-2", "T-1", 2));
        assert_eq!(ledger.warnings_remaining(), 2);
        assert_eq!(ledger.register_violation(), Ok(Some(1)));
        assert!(ledger.register_violation().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut ledger = started(3);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = ledger.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        ledger.register_violation().unwrap();
        assert!(ledger.unsubscribe(subscription));
        assert!(!ledger.unsubscribe(subscription));
        ledger.register_violation().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![LedgerEvent::WarningConsumed {
                session_id: "S-1".to_string(),
                remaining: 2,
                max_warnings: 3,
            }]
        );
    }
}
