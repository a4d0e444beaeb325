//! Proctor Guard - violation detection and warning state machine for
//! browser-based exams.
//!
//! This library turns many independent browser signals into one warning
//! counter that counts down once per distinct breach and auto-submits the
//! test exactly once when it reaches zero.
//!
//! # Integrity Guarantees
//!
//! - **One action, one warning**: an alt-tab that fires both blur and
//!   visibility change is counted once
//! - **Monotonic**: the counter only moves down, and only the ledger moves it
//! - **Single submission**: exhaustion is raised once per session
//! - **Clean teardown**: no monitor callback runs after the session ends
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Proctor Guard                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Signal    │──▶│ Dispatcher  │──▶│   Warning   │──▶ submit   │
//! │  │  Monitors   │   │ (cooldowns) │   │   Ledger    │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │         ▲                 │                                      │
//! │         │                 ▼                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Lifecycle  │   │  Reporter   │──▶│   Backend   │             │
//! │  │ Controller  │   │  (queue)    │   │   worker    │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use proctor_guard::{
//!     create_shared_log, BrowserEvent, LifecycleController, MemoryReporter, MonitorSet,
//!     ProctorConfig, Sensors, SimulatedPlatform,
//! };
//!
//! let config = ProctorConfig::default();
//! let reporter = MemoryReporter::new();
//! let mut controller = LifecycleController::new(
//!     &config,
//!     SimulatedPlatform::new(),
//!     MonitorSet::from_config(&config, Sensors::none()),
//!     Box::new(reporter.clone()),
//!     create_shared_log(),
//! );
//!
//! let now = chrono::Utc::now();
//! controller.start("session-1", "test-1", 3, now).expect("start");
//! controller.handle_event(BrowserEvent::WindowBlur, now);
//! assert_eq!(controller.warnings_remaining(), 2);
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod platform;
pub mod replay;
pub mod reporter;

// Re-export key types at crate root for convenience
pub use audit::{create_shared_log, AuditLog, AuditStats, SharedAuditLog};
pub use config::{
    AudioPolicy, CadenceConfig, CooldownConfig, GazePolicy, MonitorSelection, ProctorConfig,
};
pub use core::{
    Disposition, LifecycleController, LifecyclePhase, Session, SessionStatus, SubmissionNotice,
    SubmissionReason, ViolationCategory, ViolationEvent, WarningLedger,
};
pub use error::{
    ClassifierError, ConfigError, ExhaustionError, FullscreenError, LifecycleError,
    PermissionError, ReportingError, ScriptError,
};
pub use monitor::{GazeMonitor, MonitorKind, MonitorSet, Sensors, SignalMonitor};
pub use platform::{
    BrowserEvent, BrowserInfo, BrowserPlatform, KeyEvent, SensorFeed, SimulatedPlatform,
};
pub use reporter::{MemoryReporter, Outbound, ViolationReporter};

// Backend re-exports (when enabled)
#[cfg(feature = "backend")]
pub use reporter::{BackendClient, BackendConfig, BlockingBackendClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Integrity notice that can be displayed to candidates.
pub const INTEGRITY_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              PROCTOR GUARD - EXAM INTEGRITY NOTICE               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This test is proctored. The following count as warnings:        ║
║                                                                  ║
║  ✗ LEAVING THE TEST:                                             ║
║    • Exiting fullscreen                                          ║
║    • Switching tabs or windows                                   ║
║    • Copy, paste, print, developer tools and similar shortcuts   ║
║    • Taking the test in an unsupported browser                   ║
║                                                                  ║
║  ✗ CAMERA AND MICROPHONE:                                        ║
║    • Revoking camera or microphone access                        ║
║    • No face, or more than one face, in view                     ║
║    • Lighting too dark, too bright or changing suddenly          ║
║    • Looking away from the screen for more than two seconds      ║
║    • Sustained speech or other suspicious audio                  ║
║                                                                  ║
║  One action counts once. When your warnings run out the test     ║
║  is submitted automatically with the answers given so far.       ║
║                                                                  ║
║  You can view the current policy anytime with:                   ║
║    proctor-guard policy                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_notice_contents() {
        assert!(INTEGRITY_NOTICE.contains("INTEGRITY"));
        assert!(INTEGRITY_NOTICE.contains("submitted automatically"));
        assert!(INTEGRITY_NOTICE.contains("Exiting fullscreen"));
    }
}
