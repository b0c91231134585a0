//! Handle wrapping: the normalized cancel contract.
//!
//! Every tracked resource, whatever primitive drives it, is stored as a
//! [`ResourceHandle`]: an id, a [`ResourceKind`], creation metadata, shared
//! [`HandleMetrics`], and exactly one [`CancelFn`]. The cancel function is
//! consumed at most once by the cancellation engine; adapters build it so
//! that invoking it is always safe after the underlying operation has already
//! finished (cancelling a completed token is a no-op, closing a closed
//! transport is the transport's problem and surfaces as a recorded teardown
//! error, never a panic out of the engine).

mod metrics;

pub use metrics::{HandleMetrics, MetricsSnapshot};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelError;

/// Teardown callback for one resource. Consumed at most once.
pub type CancelFn = Box<dyn FnOnce() -> Result<(), CancelError> + Send + 'static>;

/// The kind of primitive a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ResourceKind {
    /// One-shot timer; auto-removes after firing.
    Timeout,
    /// Repeating timer.
    Interval,
    /// Self-rescheduling frame loop.
    FrameLoop,
    /// Next-tick callback; auto-removes after running.
    Immediate,
    /// One-shot tracked future; auto-removes on completion.
    Task,
    /// Long-lived stream/consumer loop.
    #[serde(rename = "stream")]
    AsyncStream,
    /// Caller-supplied cancelable with no driving task.
    Custom,
    /// Listener attached to an external host target.
    HostListener,
    /// Listener attached to an in-process emitter.
    EmitterListener,
    /// Socket connection; cascade parent of its heartbeat, reconnect timer,
    /// and subscriptions.
    #[serde(rename = "socket")]
    SocketConnection,
    /// Subscription scoped to a socket connection.
    #[serde(rename = "socket_sub")]
    SocketSubscription,
}

impl ResourceKind {
    /// Returns all kinds, in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Timeout,
            Self::Interval,
            Self::FrameLoop,
            Self::Immediate,
            Self::Task,
            Self::AsyncStream,
            Self::Custom,
            Self::HostListener,
            Self::EmitterListener,
            Self::SocketConnection,
            Self::SocketSubscription,
        ]
    }

    /// Stable string form, also used as the id prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Interval => "interval",
            Self::FrameLoop => "frame_loop",
            Self::Immediate => "immediate",
            Self::Task => "task",
            Self::AsyncStream => "stream",
            Self::Custom => "custom",
            Self::HostListener => "host_listener",
            Self::EmitterListener => "emitter_listener",
            Self::SocketConnection => "socket",
            Self::SocketSubscription => "socket_sub",
        }
    }

    /// True for kinds that remove themselves on natural completion.
    #[must_use]
    pub const fn is_one_shot(self) -> bool {
        matches!(self, Self::Timeout | Self::Immediate | Self::Task)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked resource as stored in the registry.
pub struct ResourceHandle {
    id: String,
    kind: ResourceKind,
    created_at_ms: u64,
    description: Option<String>,
    /// Cascade parent (a subscription stores its connection's id; it
    /// references the parent, it does not own it).
    parent: Option<String>,
    metrics: Arc<HandleMetrics>,
    cancel: Option<CancelFn>,
}

impl ResourceHandle {
    /// Builds a handle around a normalized cancel function.
    #[must_use]
    pub(crate) fn new(id: String, kind: ResourceKind, created_at_ms: u64, cancel: CancelFn) -> Self {
        Self {
            id,
            kind,
            created_at_ms,
            description: None,
            parent: None,
            metrics: Arc::new(HandleMetrics::new()),
            cancel: Some(cancel),
        }
    }

    /// Sets the free-form diagnostic label.
    #[must_use]
    pub(crate) fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks this handle as a cascade child of `parent_id`.
    #[must_use]
    pub(crate) fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent = Some(parent_id.into());
        self
    }

    /// Shares an externally created metrics block instead of a fresh one.
    #[must_use]
    pub(crate) fn with_metrics(mut self, metrics: Arc<HandleMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The registry-unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The wrapped primitive's kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Creation time, epoch millis.
    #[must_use]
    pub const fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// The diagnostic label, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The cascade parent id, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// The shared counter block.
    #[must_use]
    pub fn metrics(&self) -> &Arc<HandleMetrics> {
        &self.metrics
    }

    /// Takes the cancel function, leaving the handle inert.
    ///
    /// Returns `None` if teardown was already taken; the engine treats that
    /// as an already-resolved entry.
    pub(crate) fn take_cancel(&mut self) -> Option<CancelFn> {
        self.cancel.take()
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at_ms", &self.created_at_ms)
            .field("description", &self.description)
            .field("parent", &self.parent)
            .field("armed", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}
