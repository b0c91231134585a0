//! Per-handle usage counters.
//!
//! A [`HandleMetrics`] block is shared between the registry entry and the
//! running operation: the operation records triggers, errors, retries, and
//! bytes as it runs; leak heuristics and status reporting read a point-in-time
//! [`MetricsSnapshot`]. All counters are atomics so recording never takes the
//! registry lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic usage counters for one tracked resource.
#[derive(Debug, Default)]
pub struct HandleMetrics {
    triggers: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    bytes_transferred: AtomicU64,
    /// Epoch millis of the most recent trigger; zero means never triggered.
    last_trigger_ms: AtomicU64,
}

impl HandleMetrics {
    /// Creates a zeroed counter block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one trigger (timer fire, frame, message, delivered event).
    pub fn record_trigger(&self, now_ms: u64) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        self.last_trigger_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Records one error observed by the operation.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one retry attempt.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the byte counter (socket traffic, stream payloads).
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_trigger_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            triggers: self.triggers.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            last_trigger_ms: (last != 0).then_some(last),
        }
    }
}

/// Point-in-time copy of a resource's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total trigger count.
    pub triggers: u64,
    /// Total error count.
    pub errors: u64,
    /// Total retry count.
    pub retries: u64,
    /// Total bytes moved by the operation.
    pub bytes_transferred: u64,
    /// Epoch millis of the most recent trigger, if any.
    pub last_trigger_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let metrics = HandleMetrics::new();
        metrics.record_trigger(1_000);
        metrics.record_trigger(2_000);
        metrics.record_error();
        metrics.add_bytes(512);

        let snap = metrics.snapshot();
        assert_eq!(snap.triggers, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.retries, 0);
        assert_eq!(snap.bytes_transferred, 512);
        assert_eq!(snap.last_trigger_ms, Some(2_000));
    }

    #[test]
    fn untouched_metrics_report_no_last_trigger() {
        let snap = HandleMetrics::new().snapshot();
        assert_eq!(snap.triggers, 0);
        assert_eq!(snap.last_trigger_ms, None);
    }
}
