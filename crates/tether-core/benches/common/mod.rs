//! Shared bench helpers.

#![allow(dead_code)]

use tether_core::{MetricsSnapshot, ResourceKind, ResourceSnapshot};

/// Builds a synthetic snapshot of `n` healthy interval resources.
pub fn synthetic_snapshot(n: usize, now_ms: u64) -> Vec<ResourceSnapshot> {
    (0..n)
        .map(|i| ResourceSnapshot {
            id: format!("interval_{i}_{now_ms}"),
            kind: ResourceKind::Interval,
            created_at_ms: now_ms.saturating_sub(5_000),
            age_ms: 5_000,
            description: None,
            parent: None,
            metrics: MetricsSnapshot {
                triggers: 10,
                errors: 0,
                retries: 0,
                bytes_transferred: 0,
                last_trigger_ms: Some(now_ms.saturating_sub(100)),
            },
        })
        .collect()
}
