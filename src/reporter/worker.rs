//! Background delivery of outbound records.
//!
//! The reactor pushes onto a bounded channel and never waits. A single worker
//! thread drains the channel in order and hands each record to a
//! [`ReportSink`] exactly once.

use crate::audit::SharedAuditLog;
use crate::error::ReportingError;
use crate::reporter::types::Outbound;
use crate::reporter::ViolationReporter;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Destination for records, called from the worker thread.
pub trait ReportSink: Send + 'static {
    fn deliver(&mut self, record: &Outbound) -> Result<(), ReportingError>;
}

/// Reporter half handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: Sender<Outbound>,
}

impl ViolationReporter for ChannelReporter {
    fn send(&self, record: Outbound) -> Result<(), ReportingError> {
        self.sender.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => ReportingError::QueueFull,
            TrySendError::Disconnected(_) => ReportingError::WorkerStopped,
        })
    }
}

/// Owns the worker thread.
pub struct ReportWorker {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReportWorker {
    /// Start a worker delivering into `sink`.
    pub fn spawn<S: ReportSink>(
        sink: S,
        capacity: usize,
        audit: SharedAuditLog,
    ) -> (ChannelReporter, ReportWorker) {
        // Bounded so a dead backend cannot grow memory without limit
        let (sender, receiver) = bounded(capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            run_delivery_loop(sink, receiver, thread_running, audit);
        });

        (
            ChannelReporter { sender },
            ReportWorker {
                running,
                thread_handle: Some(handle),
            },
        )
    }

    /// Stop the worker after it has attempted everything already queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("report worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ReportWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_delivery_loop<S: ReportSink>(
    mut sink: S,
    receiver: Receiver<Outbound>,
    running: Arc<AtomicBool>,
    audit: SharedAuditLog,
) {
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(record) => deliver(&mut sink, &record, &audit),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    while let Ok(record) = receiver.try_recv() {
        deliver(&mut sink, &record, &audit);
    }
    tracing::debug!("report worker stopped");
}

fn deliver<S: ReportSink>(sink: &mut S, record: &Outbound, audit: &SharedAuditLog) {
    match sink.deliver(record) {
        Ok(()) => {
            audit.record_report_delivered();
            tracing::debug!(
                kind = record.label(),
                session_id = record.session_id(),
                "record delivered"
            );
        }
        Err(e) => {
            audit.record_report_failed();
            tracing::warn!(
                kind = record.label(),
                session_id = record.session_id(),
                error = %e,
                "record delivery failed, not retrying"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::create_shared_log;
    use std::sync::Mutex;

    struct CollectingSink {
        delivered: Arc<Mutex<Vec<Outbound>>>,
        fail_terminations: bool,
    }

    impl ReportSink for CollectingSink {
        fn deliver(&mut self, record: &Outbound) -> Result<(), ReportingError> {
            if self.fail_terminations && matches!(record, Outbound::Terminate { .. }) {
                return Err(ReportingError::Network("connection refused".to_string()));
            }
            self.delivered.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn terminate(id: &str) -> Outbound {
        Outbound::Terminate {
            session_id: id.to_string(),
        }
    }

    #[test]
    fn test_worker_delivers_in_order_and_drains_on_stop() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let audit = create_shared_log();
        let sink = CollectingSink {
            delivered: delivered.clone(),
            fail_terminations: false,
        };
        let (reporter, mut worker) = ReportWorker::spawn(sink, 16, audit.clone());

        for id in ["a", "b", "c"] {
            reporter.send(terminate(id)).unwrap();
        }
        worker.stop();
        assert!(!worker.is_running());

        let ids: Vec<String> = delivered
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.session_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(audit.stats().reports_delivered, 3);
    }

    #[test]
    fn test_failures_are_counted_not_retried() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let audit = create_shared_log();
        let sink = CollectingSink {
            delivered: delivered.clone(),
            fail_terminations: true,
        };
        let (reporter, mut worker) = ReportWorker::spawn(sink, 16, audit.clone());

        reporter.send(terminate("x")).unwrap();
        worker.stop();

        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(audit.stats().reports_failed, 1);
    }

    #[test]
    fn test_send_after_stop_reports_worker_stopped() {
        let sink = CollectingSink {
            delivered: Arc::new(Mutex::new(Vec::new())),
            fail_terminations: false,
        };
        let (reporter, mut worker) = ReportWorker::spawn(sink, 1, create_shared_log());
        worker.stop();

        assert_eq!(
            reporter.send(terminate("late")),
            Err(ReportingError::WorkerStopped)
        );
    }
}
