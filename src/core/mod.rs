//! Core state machine of the proctoring client.
//!
//! This module contains:
//! - The session value and the warning ledger that counts it down
//! - Cooldown bookkeeping and the violation dispatcher
//! - The interval scheduler and the fullscreen retry loop
//! - The lifecycle controller that wires it all together

pub mod cooldown;
pub mod dispatcher;
pub mod ledger;
pub mod lifecycle;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod violation;

// Re-export commonly used types
pub use cooldown::{CooldownDecision, CooldownEntry, CooldownRegistry};
pub use dispatcher::{Disposition, ViolationDispatcher};
pub use ledger::{LedgerEvent, Subscription, WarningLedger};
pub use lifecycle::{LifecycleController, LifecyclePhase, SubmissionNotice, SubmissionReason};
pub use retry::{FullscreenRetryController, RetryState, RetryStop, RetryTick};
pub use scheduler::{Scheduler, TimerId};
pub use session::{Session, SessionStatus};
pub use violation::{CooldownBucket, ViolationCategory, ViolationEvent};
