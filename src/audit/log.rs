//! Audit counters for proctoring activity.
//!
//! Counts what the client did (sessions, accepted violations, backend
//! deliveries) without keeping any violation payloads. The report worker
//! thread updates the same counters as the reactor, hence the atomics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct AuditLog {
    /// Sessions started
    sessions_started: AtomicU64,
    /// Violations that passed cooldown and consumed a warning
    violations_accepted: AtomicU64,
    /// Records delivered to the backend
    reports_delivered: AtomicU64,
    /// Records the backend or queue rejected
    reports_failed: AtomicU64,
    /// Fullscreen requests issued by the retry loop
    fullscreen_requests: AtomicU64,
    /// Sessions terminated because the budget ran out
    auto_submissions: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            violations_accepted: AtomicU64::new(0),
            reports_delivered: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            fullscreen_requests: AtomicU64::new(0),
            auto_submissions: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an audit log that accumulates on top of the persisted totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous audit stats");
        }

        log
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation_accepted(&self) {
        self.violations_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_delivered(&self) {
        self.reports_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_failed(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fullscreen_request(&self) {
        self.fullscreen_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_submission(&self) {
        self.auto_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            violations_accepted: self.violations_accepted.load(Ordering::Relaxed),
            reports_delivered: self.reports_delivered.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            fullscreen_requests: self.fullscreen_requests.load(Ordering::Relaxed),
            auto_submissions: self.auto_submissions.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Proctoring Statistics:\n\
             - Sessions started: {}\n\
             - Violations counted: {}\n\
             - Reports delivered: {}\n\
             - Reports failed: {}\n\
             - Fullscreen retry requests: {}\n\
             - Auto-submissions: {}\n\
             - Uptime: {} seconds",
            stats.sessions_started,
            stats.violations_accepted,
            stats.reports_delivered,
            stats.reports_failed,
            stats.fullscreen_requests,
            stats.auto_submissions,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sessions_started: stats.sessions_started,
                violations_accepted: stats.violations_accepted,
                reports_delivered: stats.reports_delivered,
                reports_failed: stats.reports_failed,
                fullscreen_requests: stats.fullscreen_requests,
                auto_submissions: stats.auto_submissions,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.violations_accepted
                    .store(persisted.violations_accepted, Ordering::Relaxed);
                self.reports_delivered
                    .store(persisted.reports_delivered, Ordering::Relaxed);
                self.reports_failed
                    .store(persisted.reports_failed, Ordering::Relaxed);
                self.fullscreen_requests
                    .store(persisted.fullscreen_requests, Ordering::Relaxed);
                self.auto_submissions
                    .store(persisted.auto_submissions, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of audit statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub sessions_started: u64,
    pub violations_accepted: u64,
    pub reports_delivered: u64,
    pub reports_failed: u64,
    pub fullscreen_requests: u64,
    pub auto_submissions: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// On-disk format, also read by `proctor-guard status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub sessions_started: u64,
    pub violations_accepted: u64,
    pub reports_delivered: u64,
    pub reports_failed: u64,
    pub fullscreen_requests: u64,
    pub auto_submissions: u64,
    pub last_updated: DateTime<Utc>,
}

/// Audit log shared between the reactor and the report worker.
pub type SharedAuditLog = Arc<AuditLog>;

pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}
