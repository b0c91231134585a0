//! Scoped tracking, cancellation, and auditing of ephemeral async resources.
//!
//! Components hold short-lived asynchronous handles — timers, frame loops,
//! in-flight operations, event listeners, socket connections — and the bugs
//! all look the same: a handle outlives the thing that created it. This
//! crate consolidates the bookkeeping into one engine:
//!
//! - a [`LifecycleScope`] owns a registry of every resource it created;
//! - every resource gets a collision-resistant id and a normalized cancel;
//! - dropping the scope (or calling [`LifecycleScope::shutdown`]) sweeps
//!   everything exactly once, isolating teardown failures per resource;
//! - the [`leak`] scan audits the live population against thresholds and
//!   returns structured findings.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`id`] | Sortable, collision-resistant resource ids |
//! | [`handle`] | Kinds, metrics, and the normalized cancel contract |
//! | [`registry`] | The id → handle store and status reporting |
//! | [`cancel`] | Single/bulk cancellation with error isolation |
//! | [`leak`] | Pure heuristic scan over population snapshots |
//! | [`scope`] | Lifecycle binding: sweep-on-drop, fail-closed when closed |
//! | [`timer`] | Timeout, interval, immediate, frame-loop adapters |
//! | [`task`] | Tracked futures, abortable operations, consumers |
//! | [`listener`] | Event targets with ranked detach strategies |
//! | [`socket`] | Connections with cascading dependents |
//! | [`monitor`] | Periodic leak scanning over a watch channel |
//! | [`hub`] | Explicit registry-of-registries for forced cleanup |
//! | [`config`] | TOML configuration with fail-closed validation |
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tether_core::LifecycleScope;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//! runtime.block_on(async {
//!     let scope = LifecycleScope::new();
//!
//!     let id = scope
//!         .set_timeout(Duration::from_secs(5), || println!("fired"))
//!         .unwrap();
//!     assert!(scope.cancel(&id));
//!
//!     // Dropping the scope would do the same; shutdown reports the sweep.
//!     let report = scope.shutdown();
//!     assert_eq!(report.canceled, 0);
//!     assert!(report.is_clean());
//! });
//! ```

#![warn(missing_docs)]

pub mod cancel;
pub mod config;
pub mod handle;
pub mod hub;
pub mod id;
pub mod leak;
pub mod listener;
pub mod monitor;
pub mod registry;
pub mod scope;
pub mod socket;
pub mod task;
pub mod timer;

pub use cancel::{CancelError, SweepError, SweepReport};
pub use config::{ConfigError, MonitorConfig, SocketDefaults, TetherConfig};
pub use handle::{HandleMetrics, MetricsSnapshot, ResourceKind};
pub use hub::ScopeHub;
pub use id::IdGenerator;
pub use leak::{LeakFinding, LeakIssue, LeakThresholds, Severity, scan};
pub use listener::{
    DetachAll, DetachByToken, Event, EventTarget, ListenerCallback, ListenerError,
    ListenerLocality, ListenerToken, LocalEmitter,
};
pub use monitor::LeakReport;
pub use registry::{RegistryError, RegistryStatus, ResourceSnapshot};
pub use scope::LifecycleScope;
pub use socket::{
    CloseCode, HeartbeatConfig, SocketError, SocketOptions, SocketSession, SocketTransport,
    SubscriptionCallback,
};
pub use timer::{FrameLoopPhase, FrameScheduler, IntervalFrameScheduler};

/// Re-exported so abortable operations can name their signal type without a
/// direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
