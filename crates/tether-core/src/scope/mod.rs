//! Lifecycle binding: the scope that owns a registry.
//!
//! A [`LifecycleScope`] is created when a feature comes up and dropped when
//! it tears down. Dropping the scope (or calling [`shutdown`]) closes the
//! registry and runs one bulk-cancel sweep — exactly once, non-reentrant; a
//! second invocation finds an empty store and reports zero. After shutdown
//! the scope refuses new registrations.
//!
//! Scopes are explicit values, never process-wide singletons; a feature that
//! needs several independent lifecycles creates several scopes. Cross-cutting
//! "force cleanup everything" lives in [`ScopeHub`](crate::hub::ScopeHub).
//!
//! # Resource state machine
//!
//! ```text
//!                  ┌─────────┐
//!   create*() ───► │ active  │
//!                  └────┬────┘
//!          ┌────────────┼──────────────────┐
//!          │                               │
//!   cancel(id) / shutdown          natural completion
//!          │                        (one-shot kinds)
//!          ▼                               ▼
//!     ┌──────────┐              ┌───────────────────────┐
//!     │ canceled │              │ completed-auto-removed │
//!     └──────────┘              └───────────────────────┘
//! ```
//!
//! Neither terminal state transitions back; a new operation always gets a
//! new id.
//!
//! [`shutdown`]: LifecycleScope::shutdown

use std::sync::Arc;

use crate::cancel::{self, SweepReport};
use crate::handle::{CancelFn, ResourceHandle, ResourceKind};
use crate::id::epoch_millis;
use crate::leak::{LeakFinding, LeakThresholds};
use crate::registry::{Registry, RegistryError, RegistryStatus, ResourceSnapshot};

/// One component-scoped resource lifecycle.
///
/// All resource creation goes through the scope; callers never reach the
/// underlying store. The scope is `Send + Sync` — creation and cancellation
/// may be called from any thread; the store serializes mutations internally.
pub struct LifecycleScope {
    registry: Arc<Registry>,
    runtime: tokio::runtime::Handle,
}

impl LifecycleScope {
    /// Creates a scope bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`with_handle`](Self::with_handle) to bind an explicit handle.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(tokio::runtime::Handle::current())
    }

    /// Creates a scope that spawns its driving tasks on `runtime`.
    #[must_use]
    pub fn with_handle(runtime: tokio::runtime::Handle) -> Self {
        static SCOPE_IDS: crate::id::IdGenerator = crate::id::IdGenerator::new();
        Self {
            registry: Arc::new(Registry::new(SCOPE_IDS.generate("scope"))),
            runtime,
        }
    }

    /// The scope's own id (used in status reports and hub listings).
    #[must_use]
    pub fn scope_id(&self) -> &str {
        self.registry.scope_id()
    }

    /// Live resource count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// True when no resources are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// True once the scope has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Registers a caller-supplied cancelable with no driving task.
    ///
    /// The escape hatch for primitives the built-in adapters do not cover. A
    /// resource that cannot be cooperatively stopped is not a valid
    /// candidate for tracking; wrap it so the teardown at least suppresses
    /// its post-cancellation side effects.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn register_custom(
        &self,
        description: impl Into<String>,
        cancel: impl FnOnce() -> Result<(), crate::cancel::CancelError> + Send + 'static,
    ) -> Result<String, RegistryError> {
        let id = self.registry.next_id(ResourceKind::Custom);
        let handle = ResourceHandle::new(
            id.clone(),
            ResourceKind::Custom,
            epoch_millis(),
            Box::new(cancel),
        )
        .with_description(description);
        self.register(handle)?;
        Ok(id)
    }

    /// Registers a caller-supplied cancelable under an explicit id.
    ///
    /// Re-registering under a live id first cancels the displaced entry, so
    /// the old teardown reference is never silently dropped and the id is
    /// never double-tracked.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn register_custom_as(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
        cancel: impl FnOnce() -> Result<(), crate::cancel::CancelError> + Send + 'static,
    ) -> Result<String, RegistryError> {
        let id = id.into();
        let handle = ResourceHandle::new(
            id.clone(),
            ResourceKind::Custom,
            epoch_millis(),
            Box::new(cancel),
        )
        .with_description(description);
        self.register(handle)?;
        Ok(id)
    }

    /// Cancels one resource, cascading over its children.
    ///
    /// Returns whether an entry was found; canceling an id no longer present
    /// is a no-op, not an error.
    pub fn cancel(&self, id: &str) -> bool {
        self.registry.cancel_one(id)
    }

    /// Cancels every tracked resource without closing the scope.
    ///
    /// The scope stays usable afterwards; a second consecutive call reports
    /// zero.
    pub fn cancel_all(&self) -> SweepReport {
        self.registry.cancel_all()
    }

    /// Closes the scope and runs the final sweep.
    ///
    /// Idempotent: the registry is drained once; repeat calls (or the `Drop`
    /// that follows) find an empty store and report zero.
    pub fn shutdown(&self) -> SweepReport {
        self.registry.close();
        self.registry.cancel_all()
    }

    /// Builds the structured status report.
    #[must_use]
    pub fn status(&self) -> RegistryStatus {
        self.registry.status()
    }

    /// Copies the live population out as plain data.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        self.registry.snapshot()
    }

    /// Looks up one live resource's metadata.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ResourceSnapshot> {
        self.registry.get(id)
    }

    /// Runs the leak scan against the current population.
    #[must_use]
    pub fn find_leaks(&self, thresholds: &LeakThresholds) -> Vec<LeakFinding> {
        crate::leak::scan(&self.registry.snapshot(), thresholds, epoch_millis())
    }

    /// Inserts a handle, tearing down any entry displaced from the same id.
    pub(crate) fn register(&self, handle: ResourceHandle) -> Result<(), RegistryError> {
        if let Some(displaced) = self.registry.insert(handle)? {
            tracing::debug!(
                resource_id = %displaced.id(),
                kind = %displaced.kind(),
                "re-registered id; canceling the displaced entry"
            );
            cancel::teardown(displaced);
        }
        Ok(())
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    /// Mints an id without registering anything. Creation adapters use this
    /// so the id exists before the driving task is spawned.
    pub(crate) fn next_id(&self, kind: ResourceKind) -> String {
        self.registry.next_id(kind)
    }

    /// Fails fast when the scope is closed, before any side effects.
    pub(crate) fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.registry.is_closed() {
            return Err(RegistryError::ScopeClosed {
                scope_id: self.scope_id().to_string(),
            });
        }
        Ok(())
    }

    /// Registers an already-built handle under an explicit kind, returning
    /// its id. Shared by the adapter modules.
    pub(crate) fn track(
        &self,
        kind: ResourceKind,
        id: String,
        cancel: CancelFn,
        description: Option<String>,
        parent: Option<String>,
        metrics: Arc<crate::handle::HandleMetrics>,
    ) -> Result<String, RegistryError> {
        let mut handle =
            ResourceHandle::new(id.clone(), kind, epoch_millis(), cancel).with_metrics(metrics);
        if let Some(description) = description {
            handle = handle.with_description(description);
        }
        if let Some(parent) = parent {
            handle = handle.with_parent(parent);
        }
        self.register(handle)?;
        Ok(id)
    }
}

impl Default for LifecycleScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleScope {
    fn drop(&mut self) {
        let report = self.shutdown();
        if report.canceled > 0 {
            tracing::debug!(
                scope_id = %self.scope_id(),
                canceled = report.canceled,
                teardown_errors = report.errors.len(),
                "scope dropped; swept remaining resources"
            );
        }
    }
}

impl std::fmt::Debug for LifecycleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleScope")
            .field("scope_id", &self.scope_id())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
