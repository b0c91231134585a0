//! Listener adapters: attach/detach over heterogeneous event targets.
//!
//! Event targets differ in how listeners come off: some expose a
//! `remove_listener`-style method, some an `off`-style method, some only a
//! per-event named remover, some nothing but a broad remove-all. Instead of
//! probing properties at cancel time, the wrapper selects a detach strategy
//! from an explicit ranked list **at registration**; a target supporting no
//! known convention fails the creation call immediately and nothing is
//! registered.
//!
//! Delivered events are additionally gated by a suppression flag, so a
//! target whose removal is broken or delayed still stops invoking the
//! caller's callback the moment the resource is canceled.

pub(crate) mod strategy;

pub use strategy::{DetachStrategy, RANKED_STRATEGIES, select_strategy};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cancel::CancelError;
use crate::handle::{HandleMetrics, ResourceKind};
use crate::id::epoch_millis;
use crate::registry::RegistryError;
use crate::scope::LifecycleScope;

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The event name it was emitted under.
    pub name: String,
    /// Free-form payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Builds an event.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Callback invoked per delivered event.
pub type ListenerCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Opaque attachment token minted by a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub u64);

/// Whether a target is an external host surface or an in-process emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerLocality {
    /// External host target.
    Host,
    /// In-process emitter.
    Emitter,
}

impl ListenerLocality {
    pub(crate) const fn kind(self) -> ResourceKind {
        match self {
            Self::Host => ResourceKind::HostListener,
            Self::Emitter => ResourceKind::EmitterListener,
        }
    }
}

/// Listener registration and detach errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListenerError {
    /// The target supports no known removal convention.
    #[error("target {target} supports no known listener-removal convention")]
    NoRemovalCapability {
        /// The target's diagnostic name.
        target: String,
    },

    /// The target refused the attachment.
    #[error("target {target} rejected listener for {event}: {reason}")]
    AttachRejected {
        /// The target's diagnostic name.
        target: String,
        /// The event name.
        event: String,
        /// Target-supplied reason.
        reason: String,
    },

    /// Detach failed at teardown time.
    #[error("detach for {event} failed: {reason}")]
    DetachFailed {
        /// The event name.
        event: String,
        /// Target-supplied reason.
        reason: String,
    },
}

/// Token-based removal capability.
pub trait DetachByToken: Send + Sync {
    /// Removes one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DetachFailed`] when the target cannot honor
    /// the removal.
    fn detach(&self, event: &str, token: ListenerToken) -> Result<(), ListenerError>;
}

/// Broad remove-all removal capability.
pub trait DetachAll: Send + Sync {
    /// Removes every attachment for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DetachFailed`] when the target cannot honor
    /// the removal.
    fn detach_all(&self, event: &str) -> Result<(), ListenerError>;
}

/// An object listeners can be attached to.
///
/// Capability accessors return `None` when the convention is unsupported;
/// the ranked strategy list consults them at registration.
pub trait EventTarget: Send + Sync + 'static {
    /// Diagnostic name for error attribution.
    fn target_name(&self) -> &str;

    /// Whether the target is a host surface or an in-process emitter.
    fn locality(&self) -> ListenerLocality {
        ListenerLocality::Emitter
    }

    /// Attaches a callback under `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::AttachRejected`] when the target refuses.
    fn attach(&self, event: &str, callback: ListenerCallback)
    -> Result<ListenerToken, ListenerError>;

    /// `remove_listener`-style capability.
    fn remove_listener(&self) -> Option<&dyn DetachByToken> {
        None
    }

    /// `off`-style capability.
    fn off(&self) -> Option<&dyn DetachByToken> {
        None
    }

    /// Event-name-derived removal capability (`remove_<event>_listener`).
    fn named_remove(&self, _event: &str) -> Option<&dyn DetachByToken> {
        None
    }

    /// Broad remove-all fallback.
    fn remove_all_listeners(&self) -> Option<&dyn DetachAll> {
        None
    }
}

impl LifecycleScope {
    /// Attaches a tracked listener to `target` for `event`.
    ///
    /// A detach strategy is selected from the ranked list before anything is
    /// attached; teardown later uses exactly that strategy. Delivered events
    /// stop reaching `callback` the moment the resource is canceled, even if
    /// the target's removal lags.
    ///
    /// # Errors
    ///
    /// [`ListenerError::NoRemovalCapability`] when the target supports no
    /// removal convention, [`ListenerError::AttachRejected`] when the target
    /// refuses the attachment, [`RegistryError::ScopeClosed`] after
    /// shutdown.
    pub fn add_listener<F>(
        &self,
        target: Arc<dyn EventTarget>,
        event: &str,
        callback: F,
    ) -> Result<String, RegistryError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.ensure_open()?;

        // Registration-time selection: no strategy, no resource.
        let strategy =
            select_strategy(target.as_ref(), event).ok_or_else(|| ListenerError::NoRemovalCapability {
                target: target.target_name().to_string(),
            })?;

        let kind = target.locality().kind();
        let id = self.next_id(kind);
        let suppress = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let gate = suppress.clone();
        let delivery_metrics = Arc::clone(&metrics);
        let wrapped: ListenerCallback = Arc::new(move |delivered: &Event| {
            if gate.is_cancelled() {
                return;
            }
            delivery_metrics.record_trigger(epoch_millis());
            callback(delivered);
        });

        let token = target.attach(event, wrapped).map_err(RegistryError::from)?;

        let event_name = event.to_string();
        let description = format!("{event} @ {}", target.target_name());
        let cancel_target = Arc::clone(&target);
        let cancel_gate = suppress.clone();
        let tracked = self.track(
            kind,
            id.clone(),
            Box::new(move || {
                cancel_gate.cancel();
                strategy
                    .detach(cancel_target.as_ref(), &event_name, token)
                    .map_err(CancelError::from)
            }),
            Some(description),
            None,
            metrics,
        );
        if let Err(error) = tracked {
            // The scope closed between the open check and the insert; the
            // listener is already attached, so detach it before failing.
            suppress.cancel();
            if let Err(detach_error) = strategy.detach(target.as_ref(), event, token) {
                tracing::warn!(
                    target_name = %target.target_name(),
                    event = %event,
                    error = %detach_error,
                    "failed to detach listener after rejected registration"
                );
            }
            return Err(error);
        }
        Ok(id)
    }
}

/// A minimal in-process emitter.
///
/// The reference [`EventTarget`] used in tests and by hosts that have no
/// native emitter of their own. Supports the `remove_listener` convention.
pub struct LocalEmitter {
    name: String,
    listeners: Mutex<HashMap<String, Vec<(ListenerToken, ListenerCallback)>>>,
    next_token: AtomicU64,
}

impl LocalEmitter {
    /// Creates an emitter with a diagnostic name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Emits an event, returning the number of callbacks invoked.
    pub fn emit(&self, name: &str, payload: serde_json::Value) -> usize {
        let event = Event::new(name, payload);
        let callbacks: Vec<ListenerCallback> = {
            let listeners = self.lock();
            listeners
                .get(name)
                .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(&event);
        }
        callbacks.len()
    }

    /// Number of attachments for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerToken, ListenerCallback)>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EventTarget for LocalEmitter {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn attach(
        &self,
        event: &str,
        callback: ListenerCallback,
    ) -> Result<ListenerToken, ListenerError> {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push((token, callback));
        Ok(token)
    }

    fn remove_listener(&self) -> Option<&dyn DetachByToken> {
        Some(self)
    }
}

impl DetachByToken for LocalEmitter {
    fn detach(&self, event: &str, token: ListenerToken) -> Result<(), ListenerError> {
        if let Some(entries) = self.lock().get_mut(event) {
            entries.retain(|(t, _)| *t != token);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
