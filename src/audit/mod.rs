//! Audit statistics for the proctoring client.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditLog, AuditStats, PersistedStats,
    SharedAuditLog,
};
