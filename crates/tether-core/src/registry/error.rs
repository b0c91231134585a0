//! Registration-surface error types.

use thiserror::Error;

use crate::listener::ListenerError;

/// Errors returned by resource creation calls.
///
/// Registration errors are fatal to the call: no partial entry is ever left
/// behind. Teardown failures are a different taxonomy and never surface
/// here; see [`SweepReport`](crate::cancel::SweepReport).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The owning scope has already been shut down.
    #[error("scope {scope_id} is closed; no new resources may be registered")]
    ScopeClosed {
        /// The closed scope's id.
        scope_id: String,
    },

    /// A cascade child referenced a parent that is not live in the registry.
    #[error("parent resource not found: {id}")]
    ParentNotFound {
        /// The missing parent id.
        id: String,
    },

    /// Listener registration failed (no removal capability, attach rejected).
    #[error(transparent)]
    Listener(#[from] ListenerError),
}
