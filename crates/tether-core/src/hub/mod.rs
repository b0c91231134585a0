//! Registry of registries.
//!
//! Some hosts need a cross-cutting "force cleanup everything" switch (app
//! shutdown, hard memory pressure). That capability is modeled as an
//! explicit hub the top-level owner creates and registers scopes with —
//! never as implicit process-wide state. The hub holds weak references:
//! registering a scope does not extend its life, and scopes dropped
//! normally simply disappear from the hub.

use std::sync::{Mutex, Weak};

use crate::cancel::SweepReport;
use crate::registry::Registry;
use crate::scope::LifecycleScope;

struct HubEntry {
    scope_id: String,
    registry: Weak<Registry>,
}

/// Explicit registry-of-registries owned by the top-level application.
#[derive(Default)]
pub struct ScopeHub {
    entries: Mutex<Vec<HubEntry>>,
}

impl ScopeHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scope for cross-cutting cleanup.
    pub fn register(&self, scope: &LifecycleScope) {
        self.lock().push(HubEntry {
            scope_id: scope.scope_id().to_string(),
            registry: std::sync::Arc::downgrade(scope.registry()),
        });
    }

    /// Ids of scopes still alive, pruning dead entries.
    #[must_use]
    pub fn live_scopes(&self) -> Vec<String> {
        let mut entries = self.lock();
        entries.retain(|entry| entry.registry.strong_count() > 0);
        entries.iter().map(|entry| entry.scope_id.clone()).collect()
    }

    /// Closes and sweeps every live scope.
    ///
    /// Each scope is shut down exactly as its own teardown would: closed
    /// first, then bulk-canceled. Returns one report per scope that was
    /// still alive; dead entries are pruned.
    pub fn force_cleanup_all(&self) -> Vec<(String, SweepReport)> {
        let mut entries = self.lock();
        let mut reports = Vec::new();
        entries.retain(|entry| {
            let Some(registry) = entry.registry.upgrade() else {
                return false;
            };
            registry.close();
            let report = registry.cancel_all();
            tracing::info!(
                scope_id = %entry.scope_id,
                canceled = report.canceled,
                teardown_errors = report.errors.len(),
                "forced scope cleanup"
            );
            reports.push((entry.scope_id.clone(), report));
            true
        });
        reports
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HubEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ScopeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHub")
            .field("entries", &self.lock().len())
            .finish()
    }
}
