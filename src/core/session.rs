//! The proctored session value.

use serde::{Deserialize, Serialize};

/// Ledger status of a session.
///
/// Ending a session drops it from the ledger, which then reads `NotStarted`
/// again. The ended state is tracked by `LifecyclePhase::Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Active,
    Exhausted,
}

/// One candidate's attempt at one test.
///
/// Only the warning ledger mutates `warnings_remaining` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub test_id: String,
    pub max_warnings: u32,
    pub(crate) warnings_remaining: u32,
    pub(crate) status: SessionStatus,
}

impl Session {
    pub fn new(id: impl Into<String>, test_id: impl Into<String>, max_warnings: u32) -> Self {
        Self {
            id: id.into(),
            test_id: test_id.into(),
            max_warnings,
            warnings_remaining: max_warnings,
            status: SessionStatus::NotStarted,
        }
    }

    pub fn warnings_remaining(&self) -> u32 {
        self.warnings_remaining
    }

    pub fn warnings_used(&self) -> u32 {
        self.max_warnings - self.warnings_remaining
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }
}
