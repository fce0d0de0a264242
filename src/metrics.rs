use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-process counters describing dispatch activity. No HTTP serving or
/// Prometheus encoding lives here; a host process decides how (or whether) to
/// expose a snapshot.
#[derive(Default)]
pub struct Metrics {
    invocation_count: Mutex<HashMap<String, u64>>,
    sync_count: AtomicU64,
    sync_failure_count: AtomicU64,
    last_sync_unix_millis: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub invocation_count: HashMap<String, u64>,
    pub sync_count: u64,
    pub sync_failure_count: u64,
    pub last_sync_unix_millis: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&self, function: &str) {
        let mut counts = self.invocation_count.lock().unwrap();
        *counts.entry(function.to_string()).or_insert(0) += 1;
    }

    pub fn record_sync_success(&self, at_unix_millis: u64) {
        self.sync_count.fetch_add(1, Ordering::Relaxed);
        self.last_sync_unix_millis
            .store(at_unix_millis, Ordering::Relaxed);
    }

    pub fn record_sync_failure(&self) {
        self.sync_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invocation_count: self.invocation_count.lock().unwrap().clone(),
            sync_count: self.sync_count.load(Ordering::Relaxed),
            sync_failure_count: self.sync_failure_count.load(Ordering::Relaxed),
            last_sync_unix_millis: self.last_sync_unix_millis.load(Ordering::Relaxed),
        }
    }
}
