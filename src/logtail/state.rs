use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::classify::{LogEntry, Severity};

/// Aggregates maintained by the tail worker and read at scrape time.
///
/// Only the tail worker writes; each write holds the lock for a single
/// increment, so scrapes never wait longer than one map update.
#[derive(Debug, Default)]
pub struct LogTailState {
    // severity -> number of lines
    totals: RwLock<HashMap<Severity, u64>>,
    // severity -> normalized message -> number of lines
    messages: RwLock<HashMap<Severity, HashMap<String, u64>>>,
    current: RwLock<Option<PathBuf>>,
    active_tails: AtomicUsize,
}

impl LogTailState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one classified line.
    ///
    /// The total and the message bucket are updated under separate locks, so
    /// a concurrent reader may briefly see a total one ahead of its bucket.
    pub async fn record(&self, entry: LogEntry) {
        {
            let mut totals = self.totals.write().await;
            *totals.entry(entry.severity).or_insert(0) += 1;
        }

        if let Some(message) = entry.message {
            let mut messages = self.messages.write().await;
            *messages
                .entry(entry.severity)
                .or_default()
                .entry(message)
                .or_insert(0) += 1;
        }
    }

    /// Line count for one severity
    pub async fn total(&self, severity: Severity) -> u64 {
        self.totals.read().await.get(&severity).copied().unwrap_or(0)
    }

    /// Line counts for every severity, zero when nothing was seen
    pub async fn totals(&self) -> Vec<(Severity, u64)> {
        let totals = self.totals.read().await;
        Severity::ALL
            .iter()
            .map(|s| (*s, totals.get(s).copied().unwrap_or(0)))
            .collect()
    }

    /// Normalized message buckets of one severity, sorted by message
    pub async fn messages(&self, severity: Severity) -> Vec<(String, u64)> {
        let messages = self.messages.read().await;
        let mut buckets: Vec<(String, u64)> = messages
            .get(&severity)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        buckets.sort();
        buckets
    }

    /// Count of one normalized message bucket
    pub async fn message_count(&self, severity: Severity, message: &str) -> u64 {
        self.messages
            .read()
            .await
            .get(&severity)
            .and_then(|m| m.get(message))
            .copied()
            .unwrap_or(0)
    }

    /// File currently being tailed, if any
    pub async fn current_logfile(&self) -> Option<PathBuf> {
        self.current.read().await.clone()
    }

    pub(crate) async fn set_current_logfile(&self, path: Option<&Path>) {
        *self.current.write().await = path.map(Path::to_path_buf);
    }

    /// Number of tail workers currently running; never more than one
    pub fn active_tails(&self) -> usize {
        self.active_tails.load(Ordering::SeqCst)
    }

    pub(crate) fn tail_guard(self: &Arc<Self>) -> ActiveTailGuard {
        self.active_tails.fetch_add(1, Ordering::SeqCst);
        ActiveTailGuard {
            state: Arc::clone(self),
        }
    }
}

/// Keeps the active-tail counter raised for as long as a worker runs
pub(crate) struct ActiveTailGuard {
    state: Arc<LogTailState>,
}

impl Drop for ActiveTailGuard {
    fn drop(&mut self) {
        self.state.active_tails.fetch_sub(1, Ordering::SeqCst);
    }
}
