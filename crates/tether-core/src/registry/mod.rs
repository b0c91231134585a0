//! Registry store: id → handle mapping for one lifecycle scope.
//!
//! The store is the single source of truth for which resources are live.
//! Mutations go through [`Registry`] methods only; application code reaches
//! the store through its owning [`LifecycleScope`](crate::scope::LifecycleScope),
//! never directly. Draining for a bulk sweep always copies entries out under
//! the lock and tears them down after release, so teardown callbacks can
//! never deadlock against the store.
//!
//! # Invariants
//!
//! - Every live entry has exactly one id and one armed cancel function.
//! - Removing an entry (cancel, discard, drain) unindexes it atomically;
//!   there is no "canceled but still indexed" state.
//! - Inserting under a live id first removes the old entry; the displaced
//!   handle is returned to the caller, which must tear it down.
//! - A closed registry rejects inserts. The closed flag is flipped under the
//!   store lock, so no insert can slip between close and the final drain.

mod error;

pub use error::RegistryError;

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handle::{MetricsSnapshot, ResourceHandle, ResourceKind};
use crate::id::{IdGenerator, epoch_millis};

/// Age past which a resource appears in [`RegistryStatus::long_running`].
const LONG_RUNNING_AGE_MS: u64 = 30_000;

/// The id → handle store for one scope.
///
/// Crate-internal: the public surface is [`LifecycleScope`](crate::scope::LifecycleScope).
pub(crate) struct Registry {
    scope_id: String,
    entries: Mutex<HashMap<String, ResourceHandle>>,
    closed: AtomicBool,
    ids: IdGenerator,
}

impl Registry {
    pub(crate) fn new(scope_id: String) -> Self {
        Self {
            scope_id,
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            ids: IdGenerator::new(),
        }
    }

    pub(crate) fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Mints the next id for a resource of `kind`.
    pub(crate) fn next_id(&self, kind: ResourceKind) -> String {
        self.ids.generate(kind.as_str())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the registry closed. Returns `true` on the first close.
    pub(crate) fn close(&self) -> bool {
        let _guard = self.lock();
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Inserts a handle, displacing any live entry under the same id.
    ///
    /// The displaced handle is returned so the caller can run its teardown;
    /// storing the replacement and unindexing the old entry happen under one
    /// lock acquisition, so the two are never simultaneously tracked.
    pub(crate) fn insert(
        &self,
        handle: ResourceHandle,
    ) -> Result<Option<ResourceHandle>, RegistryError> {
        let mut entries = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(RegistryError::ScopeClosed {
                scope_id: self.scope_id.clone(),
            });
        }
        Ok(entries.insert(handle.id().to_string(), handle))
    }

    /// Removes one entry for teardown by the cancellation engine.
    pub(crate) fn remove(&self, id: &str) -> Option<ResourceHandle> {
        self.lock().remove(id)
    }

    /// Removes every cascade child of `parent_id`.
    pub(crate) fn remove_children(&self, parent_id: &str) -> Vec<ResourceHandle> {
        let mut entries = self.lock();
        let child_ids: Vec<String> = entries
            .values()
            .filter(|h| h.parent() == Some(parent_id))
            .map(|h| h.id().to_string())
            .collect();
        child_ids
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    /// Drops one entry without running its teardown.
    ///
    /// Used by one-shot operations on natural completion: the work already
    /// finished, so only the index entry remains to clean up.
    pub(crate) fn discard(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Drains every entry for a bulk sweep.
    pub(crate) fn drain(&self) -> Vec<ResourceHandle> {
        let mut entries = self.lock();
        entries.drain().map(|(_, handle)| handle).collect()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Copies one entry's metadata out, if it is live.
    pub(crate) fn get(&self, id: &str) -> Option<ResourceSnapshot> {
        let now_ms = epoch_millis();
        self.lock().get(id).map(|h| ResourceSnapshot::of(h, now_ms))
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the live population out as plain data.
    pub(crate) fn snapshot(&self) -> Vec<ResourceSnapshot> {
        let now_ms = epoch_millis();
        let entries = self.lock();
        let mut rows: Vec<ResourceSnapshot> = entries
            .values()
            .map(|h| ResourceSnapshot::of(h, now_ms))
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    /// Builds the status report exposed by the scope.
    pub(crate) fn status(&self) -> RegistryStatus {
        let details = self.snapshot();
        let mut by_kind = BTreeMap::new();
        for row in &details {
            *by_kind.entry(row.kind.as_str().to_string()).or_insert(0) += 1;
        }
        let long_running = details
            .iter()
            .filter(|row| row.age_ms >= LONG_RUNNING_AGE_MS)
            .cloned()
            .collect();
        RegistryStatus {
            generated_at: Utc::now(),
            scope_id: self.scope_id.clone(),
            total: details.len(),
            by_kind,
            long_running,
            details,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResourceHandle>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            // Map mutations never panic mid-update, so a poisoned lock still
            // guards a consistent map.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("scope_id", &self.scope_id)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Plain-data copy of one live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// The resource id.
    pub id: String,
    /// The wrapped primitive's kind.
    pub kind: ResourceKind,
    /// Creation time, epoch millis.
    pub created_at_ms: u64,
    /// Age at snapshot time, millis.
    pub age_ms: u64,
    /// Free-form diagnostic label.
    pub description: Option<String>,
    /// Cascade parent id, if any.
    pub parent: Option<String>,
    /// Usage counters at snapshot time.
    pub metrics: MetricsSnapshot,
}

impl ResourceSnapshot {
    fn of(handle: &ResourceHandle, now_ms: u64) -> Self {
        Self {
            id: handle.id().to_string(),
            kind: handle.kind(),
            created_at_ms: handle.created_at_ms(),
            age_ms: now_ms.saturating_sub(handle.created_at_ms()),
            description: handle.description().map(str::to_string),
            parent: handle.parent().map(str::to_string),
            metrics: handle.metrics().snapshot(),
        }
    }
}

/// Structured status report for logging/telemetry sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// The owning scope's id.
    pub scope_id: String,
    /// Live resource count.
    pub total: usize,
    /// Live count per kind string.
    pub by_kind: BTreeMap<String, usize>,
    /// Resources alive longer than the long-running cutoff.
    pub long_running: Vec<ResourceSnapshot>,
    /// Every live resource.
    pub details: Vec<ResourceSnapshot>,
}
