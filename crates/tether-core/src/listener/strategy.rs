//! Ranked detach strategies.
//!
//! Each strategy is a named probe over one removal convention. Selection
//! walks [`RANKED_STRATEGIES`] in order and takes the first capability the
//! target exposes; the chosen strategy is recorded in the resource's
//! teardown at registration time. The chain is data, not reflection — every
//! strategy is individually testable against a stub target.

use super::{EventTarget, ListenerError, ListenerToken};

/// The removal convention a strategy drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetachMethod {
    RemoveListener,
    Off,
    NamedRemove,
    RemoveAll,
}

/// One named removal convention.
#[derive(Debug, Clone, Copy)]
pub struct DetachStrategy {
    /// Stable strategy name (diagnostics, tests).
    pub name: &'static str,
    method: DetachMethod,
}

/// Removal conventions in probe order: token-based removal first, the broad
/// remove-all fallback last.
pub const RANKED_STRATEGIES: &[DetachStrategy] = &[
    DetachStrategy {
        name: "remove_listener",
        method: DetachMethod::RemoveListener,
    },
    DetachStrategy {
        name: "off",
        method: DetachMethod::Off,
    },
    DetachStrategy {
        name: "named_remove",
        method: DetachMethod::NamedRemove,
    },
    DetachStrategy {
        name: "remove_all_listeners",
        method: DetachMethod::RemoveAll,
    },
];

impl DetachStrategy {
    /// True when `target` exposes this strategy's capability for `event`.
    #[must_use]
    pub fn probe(&self, target: &dyn EventTarget, event: &str) -> bool {
        match self.method {
            DetachMethod::RemoveListener => target.remove_listener().is_some(),
            DetachMethod::Off => target.off().is_some(),
            DetachMethod::NamedRemove => target.named_remove(event).is_some(),
            DetachMethod::RemoveAll => target.remove_all_listeners().is_some(),
        }
    }

    /// Runs the detach through this strategy's capability.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DetachFailed`] when the capability has
    /// vanished since registration or the target cannot honor the removal.
    pub(crate) fn detach(
        &self,
        target: &dyn EventTarget,
        event: &str,
        token: ListenerToken,
    ) -> Result<(), ListenerError> {
        let vanished = || ListenerError::DetachFailed {
            event: event.to_string(),
            reason: format!("{} capability vanished after registration", self.name),
        };
        match self.method {
            DetachMethod::RemoveListener => target
                .remove_listener()
                .ok_or_else(vanished)?
                .detach(event, token),
            DetachMethod::Off => target.off().ok_or_else(vanished)?.detach(event, token),
            DetachMethod::NamedRemove => target
                .named_remove(event)
                .ok_or_else(vanished)?
                .detach(event, token),
            DetachMethod::RemoveAll => target
                .remove_all_listeners()
                .ok_or_else(vanished)?
                .detach_all(event),
        }
    }
}

/// Selects the first supported strategy in rank order.
#[must_use]
pub fn select_strategy(
    target: &dyn EventTarget,
    event: &str,
) -> Option<&'static DetachStrategy> {
    RANKED_STRATEGIES
        .iter()
        .find(|strategy| strategy.probe(target, event))
}
