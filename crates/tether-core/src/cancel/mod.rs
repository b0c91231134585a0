//! Cancellation engine: single and bulk teardown with error isolation.
//!
//! One broken resource must never block release of the rest. Every teardown
//! runs inside a panic boundary; failures are attributed to the resource id,
//! logged, and collected into the [`SweepReport`] — they are data for the
//! caller to inspect, never exceptions out of the engine.
//!
//! # Ordering
//!
//! No ordering is guaranteed between independent resources. The one mandated
//! order is the cascade: a connection's children (subscriptions, heartbeat,
//! pending reconnect timer) are torn down before the connection itself, in
//! the same operation, so a subscription callback can never fire after its
//! connection has begun closing.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::{ResourceHandle, ResourceKind};
use crate::listener::ListenerError;
use crate::registry::Registry;
use crate::socket::SocketError;

/// Failure raised by a resource's teardown callback.
///
/// These never propagate past the engine; they are caught, attributed, and
/// recorded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CancelError {
    /// The teardown callback panicked.
    #[error("teardown panicked: {message}")]
    Panicked {
        /// Panic payload rendered to text.
        message: String,
    },

    /// Socket close failed.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Listener detach failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// Caller-supplied teardown failure.
    #[error("{message}")]
    Failed {
        /// What went wrong.
        message: String,
    },
}

impl CancelError {
    /// Builds a caller-supplied teardown failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// One teardown failure attributed to its resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepError {
    /// The resource whose teardown failed.
    pub resource_id: String,
    /// Its kind.
    pub kind: ResourceKind,
    /// The failure rendered to text.
    pub message: String,
}

/// Outcome of a bulk cancellation sweep.
///
/// `canceled` is the number of entries actually removed and torn down;
/// entries whose teardown failed still count (they are out of the store).
/// A second consecutive sweep reports zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Entries removed and torn down by this sweep.
    pub canceled: usize,
    /// Teardown failures, attributed per resource.
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    /// True when every teardown in the sweep succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs one handle's teardown inside the panic boundary.
///
/// Returns the attributed failure, if any. A handle whose cancel was already
/// taken is treated as resolved and produces nothing.
pub(crate) fn teardown(mut handle: ResourceHandle) -> Option<SweepError> {
    let cancel = handle.take_cancel()?;
    let outcome = catch_unwind(AssertUnwindSafe(move || cancel()));
    let error = match outcome {
        Ok(Ok(())) => return None,
        Ok(Err(err)) => err,
        Err(payload) => CancelError::Panicked {
            message: panic_message(payload.as_ref()),
        },
    };
    tracing::warn!(
        resource_id = %handle.id(),
        kind = %handle.kind(),
        error = %error,
        "resource teardown failed; sweep continues"
    );
    Some(SweepError {
        resource_id: handle.id().to_string(),
        kind: handle.kind(),
        message: error.to_string(),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Registry {
    /// Cancels one resource, cascading over its children first.
    ///
    /// Returns whether an entry was found. Teardown failures are logged and
    /// swallowed here; single-resource callers that need failure details use
    /// the bulk sweep.
    pub(crate) fn cancel_one(&self, id: &str) -> bool {
        let Some(parent) = self.remove(id) else {
            return false;
        };
        // Children leave the store in the same operation as the parent, so a
        // dispatch racing this cancel finds neither.
        let children = self.remove_children(id);
        for child in children {
            teardown(child);
        }
        teardown(parent);
        true
    }

    /// Cancels every resource in the store.
    ///
    /// Operates on a drained snapshot, never a live view: the store is empty
    /// before the first teardown runs, which also makes the sweep
    /// non-reentrant and idempotent. Children are torn down before their
    /// parents; the cascade has exactly one level.
    pub(crate) fn cancel_all(&self) -> SweepReport {
        let drained = self.drain();
        let (children, parents): (Vec<ResourceHandle>, Vec<ResourceHandle>) =
            drained.into_iter().partition(|h| h.parent().is_some());

        let mut report = SweepReport::default();
        for handle in children.into_iter().chain(parents) {
            report.canceled += 1;
            if let Some(error) = teardown(handle) {
                report.errors.push(error);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests;
