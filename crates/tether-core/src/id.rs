//! Resource id generation.
//!
//! Ids are collision-resistant and sortable by creation:
//! `{prefix}_{counter}_{epochMillis}`. The counter is scope-local and
//! monotonic, so two ids minted in the same millisecond still differ.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
///
/// Clamps to zero if the system clock reports a time before the epoch.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Generator for registry-unique resource ids.
///
/// Each [`LifecycleScope`](crate::scope::LifecycleScope) owns one generator;
/// the counter is never shared across scopes.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator with the counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Produces the next id for the given kind prefix.
    ///
    /// The counter increments on every call regardless of prefix, so ids are
    /// totally ordered by creation within a scope.
    #[must_use]
    pub fn generate(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n}_{}", epoch_millis())
    }
}
