//! Outbound reporting to the proctoring backend.
//!
//! The reactor hands records to a [`ViolationReporter`] and moves on. Delivery
//! happens elsewhere (a worker thread for the real backend), is attempted once,
//! and failures are only logged.

#[cfg(feature = "backend")]
pub mod backend;
pub mod types;
pub mod worker;

pub use types::{Outbound, PermissionLogRecord, ViolationRecord};
pub use worker::{ChannelReporter, ReportSink, ReportWorker};

#[cfg(feature = "backend")]
pub use backend::{BackendClient, BackendConfig, BlockingBackendClient, SessionInfo};

use crate::error::ReportingError;
use std::sync::{Arc, Mutex};

/// Non-blocking hand-off of records to the backend.
pub trait ViolationReporter {
    fn send(&self, record: Outbound) -> Result<(), ReportingError>;
}

/// Reporter that keeps records in memory.
///
/// Used for dry runs and tests. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    records: Arc<Mutex<Vec<Outbound>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Outbound> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn violations(&self) -> Vec<ViolationRecord> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Outbound::Violation(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn permission_logs(&self) -> Vec<PermissionLogRecord> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Outbound::Permission(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn terminations(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, Outbound::Terminate { .. }))
            .count()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Outbound> {
        self.records
            .lock()
            .map(|mut records| std::mem::take(&mut *records))
            .unwrap_or_default()
    }
}

impl ViolationReporter for MemoryReporter {
    fn send(&self, record: Outbound) -> Result<(), ReportingError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ReportingError::WorkerStopped)?;
        records.push(record);
        Ok(())
    }
}
