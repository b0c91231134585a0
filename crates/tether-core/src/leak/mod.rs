//! Leak heuristics: a pure scan over a registry snapshot.
//!
//! The scan classifies resources as suspicious by age, trigger pattern, or
//! total population against configurable thresholds, and returns structured
//! findings. It never mutates the store and has no side effects, so it is
//! unit-testable against synthetic snapshots. Findings are advisory data for
//! the caller to act on or ignore — they are never raised as errors.
//!
//! # Rules
//!
//! | Condition | Finding | Severity |
//! |-----------|---------|----------|
//! | population > `max_population` | one aggregate `HighPopulation` | Medium |
//! | zero triggers after `stale_age` | `NeverTriggered` | Medium |
//! | trigger or error count > `runaway_ceiling` | `Runaway` | High |
//! | previously triggered, idle past `dormant_grace` | `CleanupNeeded` | Low |
//!
//! The population rule emits exactly one aggregate finding, never one per
//! resource over the limit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::handle::ResourceKind;
use crate::registry::ResourceSnapshot;

/// Thresholds the scan classifies against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakThresholds {
    /// Live-population ceiling before the aggregate high-count finding.
    #[serde(default = "default_max_population")]
    pub max_population: usize,

    /// Age after which a never-triggered resource is suspicious.
    #[serde(default = "default_stale_age")]
    #[serde(with = "humantime_serde")]
    pub stale_age: Duration,

    /// Trigger/error count above which a resource is considered runaway.
    #[serde(default = "default_runaway_ceiling")]
    pub runaway_ceiling: u64,

    /// Idle window after the last trigger before cleanup is suggested.
    #[serde(default = "default_dormant_grace")]
    #[serde(with = "humantime_serde")]
    pub dormant_grace: Duration,
}

const fn default_max_population() -> usize {
    50
}

const fn default_stale_age() -> Duration {
    Duration::from_secs(5 * 60)
}

const fn default_runaway_ceiling() -> u64 {
    10_000
}

const fn default_dormant_grace() -> Duration {
    Duration::from_secs(10 * 60)
}

impl Default for LeakThresholds {
    fn default() -> Self {
        Self {
            max_population: default_max_population(),
            stale_age: default_stale_age(),
            runaway_ceiling: default_runaway_ceiling(),
            dormant_grace: default_dormant_grace(),
        }
    }
}

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory; cleanup would be tidy but nothing is misbehaving.
    Low,
    /// Worth investigating.
    Medium,
    /// Likely an active defect (runaway loop, unbounded growth).
    High,
}

/// What the scan flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LeakIssue {
    /// The live population exceeds the configured ceiling.
    HighPopulation {
        /// Live resource count at scan time.
        total: usize,
        /// The configured ceiling.
        limit: usize,
    },
    /// Alive past the stale age with no recorded trigger.
    NeverTriggered {
        /// Resource age at scan time, millis.
        age_ms: u64,
    },
    /// Trigger or error count exceeded the runaway ceiling.
    Runaway {
        /// Trigger count at scan time.
        triggers: u64,
        /// Error count at scan time.
        errors: u64,
        /// The configured ceiling.
        ceiling: u64,
    },
    /// Previously active, now idle past the grace window.
    CleanupNeeded {
        /// Millis since the last trigger.
        idle_ms: u64,
    },
}

/// One heuristic finding.
///
/// `resource_id` and `kind` are `None` for the aggregate population finding,
/// which describes the registry as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakFinding {
    /// The flagged resource, or `None` for an aggregate finding.
    pub resource_id: Option<String>,
    /// The flagged resource's kind, or `None` for an aggregate finding.
    pub kind: Option<ResourceKind>,
    /// What was flagged.
    pub issue: LeakIssue,
    /// How urgent the finding is.
    pub severity: Severity,
    /// Suggested operator action.
    pub recommendation: String,
}

/// Scans a snapshot against thresholds.
///
/// Pure: same snapshot, thresholds, and clock reading produce the same
/// findings, and the snapshot is read only.
#[must_use]
pub fn scan(
    snapshot: &[ResourceSnapshot],
    thresholds: &LeakThresholds,
    now_ms: u64,
) -> Vec<LeakFinding> {
    let mut findings = Vec::new();

    if snapshot.len() > thresholds.max_population {
        findings.push(LeakFinding {
            resource_id: None,
            kind: None,
            issue: LeakIssue::HighPopulation {
                total: snapshot.len(),
                limit: thresholds.max_population,
            },
            severity: Severity::Medium,
            recommendation: "cancel unused resources or raise max_population".to_string(),
        });
    }

    let stale_ms = millis(thresholds.stale_age);
    let grace_ms = millis(thresholds.dormant_grace);

    for row in snapshot {
        let triggers = row.metrics.triggers;
        let errors = row.metrics.errors;

        if triggers.max(errors) > thresholds.runaway_ceiling {
            findings.push(per_resource(
                row,
                LeakIssue::Runaway {
                    triggers,
                    errors,
                    ceiling: thresholds.runaway_ceiling,
                },
                Severity::High,
                "check for a re-arm loop without backoff; cancel the resource",
            ));
            continue;
        }

        if triggers == 0 {
            if row.age_ms > stale_ms {
                findings.push(per_resource(
                    row,
                    LeakIssue::NeverTriggered { age_ms: row.age_ms },
                    Severity::Medium,
                    "verify the operation is still expected; cancel it if stale",
                ));
            }
            continue;
        }

        if let Some(last_ms) = row.metrics.last_trigger_ms {
            let idle_ms = now_ms.saturating_sub(last_ms);
            if idle_ms > grace_ms {
                findings.push(per_resource(
                    row,
                    LeakIssue::CleanupNeeded { idle_ms },
                    Severity::Low,
                    "resource went dormant; cancel it or record expected dormancy",
                ));
            }
        }
    }

    findings
}

fn per_resource(
    row: &ResourceSnapshot,
    issue: LeakIssue,
    severity: Severity,
    recommendation: &str,
) -> LeakFinding {
    LeakFinding {
        resource_id: Some(row.id.clone()),
        kind: Some(row.kind),
        issue,
        severity,
        recommendation: recommendation.to_string(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
