//! Periodic leak monitoring.
//!
//! The monitor is an ordinary tracked interval resource that samples its own
//! registry, runs the pure leak scan, and publishes the resulting
//! [`LeakReport`] on a watch channel. It surfaces findings as structured
//! data plus log lines; acting on them is the caller's job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::TetherConfig;
use crate::id::epoch_millis;
use crate::leak::{self, LeakFinding, LeakThresholds, Severity};
use crate::registry::RegistryError;
use crate::scope::LifecycleScope;

/// One periodic scan's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakReport {
    /// When the scan ran.
    pub generated_at: DateTime<Utc>,
    /// The scanned scope's id.
    pub scope_id: String,
    /// Live population at scan time (the monitor counts itself).
    pub population: usize,
    /// Findings, empty when the population looks healthy.
    pub findings: Vec<LeakFinding>,
}

impl LeakReport {
    fn empty(scope_id: String) -> Self {
        Self {
            generated_at: Utc::now(),
            scope_id,
            population: 0,
            findings: Vec::new(),
        }
    }

    /// True when the scan flagged nothing.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }
}

impl LifecycleScope {
    /// Starts periodic leak scanning on this scope.
    ///
    /// Returns the monitor's resource id (cancel it like any other resource)
    /// and the receiving end of the report channel. The monitor dies with
    /// the scope's final sweep like everything else it watches.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_leak_monitor(
        &self,
        cadence: Duration,
        thresholds: LeakThresholds,
    ) -> Result<(String, watch::Receiver<LeakReport>), RegistryError> {
        self.ensure_open()?;
        let (tx, rx) = watch::channel(LeakReport::empty(self.scope_id().to_string()));
        let registry = Arc::downgrade(self.registry());
        let scope_id = self.scope_id().to_string();

        let id = self.interval_resource(
            cadence,
            Some("leak-monitor".to_string()),
            None,
            move || {
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                let snapshot = registry.snapshot();
                let findings = leak::scan(&snapshot, &thresholds, epoch_millis());
                log_findings(&scope_id, snapshot.len(), &findings);
                let report = LeakReport {
                    generated_at: Utc::now(),
                    scope_id: scope_id.clone(),
                    population: snapshot.len(),
                    findings,
                };
                let _ = tx.send(report);
            },
        )?;
        Ok((id, rx))
    }

    /// Starts the monitor described by a [`TetherConfig`].
    ///
    /// Returns `Ok(None)` without registering anything when monitoring is
    /// disabled in the config.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_configured_monitor(
        &self,
        config: &TetherConfig,
    ) -> Result<Option<(String, watch::Receiver<LeakReport>)>, RegistryError> {
        if !config.monitor.enabled {
            return Ok(None);
        }
        self.spawn_leak_monitor(config.monitor.cadence, config.leak.clone())
            .map(Some)
    }
}

fn log_findings(scope_id: &str, population: usize, findings: &[LeakFinding]) {
    if findings.is_empty() {
        return;
    }
    let high = findings
        .iter()
        .filter(|f| f.severity == Severity::High)
        .count();
    if high > 0 {
        tracing::warn!(
            scope_id = %scope_id,
            population,
            findings = findings.len(),
            high_severity = high,
            "leak scan flagged resources"
        );
    } else {
        tracing::info!(
            scope_id = %scope_id,
            population,
            findings = findings.len(),
            "leak scan flagged resources"
        );
    }
}
