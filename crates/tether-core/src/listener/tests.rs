//! Listener tests: strategy selection, registration-time failure, detach,
//! and post-cancel suppression.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde_json::json;

use super::*;

// ============================================================================
// Stub targets, one per capability shape
// ============================================================================

/// Counts detaches through a token-based capability.
#[derive(Default)]
struct TokenDetachLog {
    detaches: AtomicU32,
}

impl DetachByToken for TokenDetachLog {
    fn detach(&self, _event: &str, _token: ListenerToken) -> Result<(), ListenerError> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct OffOnlyTarget {
    off: TokenDetachLog,
    next_token: AtomicU64,
}

impl OffOnlyTarget {
    fn new() -> Self {
        Self {
            off: TokenDetachLog::default(),
            next_token: AtomicU64::new(1),
        }
    }
}

impl EventTarget for OffOnlyTarget {
    fn target_name(&self) -> &str {
        "off-only"
    }

    fn attach(&self, _event: &str, _cb: ListenerCallback) -> Result<ListenerToken, ListenerError> {
        Ok(ListenerToken(self.next_token.fetch_add(1, Ordering::SeqCst)))
    }

    fn off(&self) -> Option<&dyn DetachByToken> {
        Some(&self.off)
    }
}

struct NamedOnlyTarget {
    named: TokenDetachLog,
    next_token: AtomicU64,
}

impl NamedOnlyTarget {
    fn new() -> Self {
        Self {
            named: TokenDetachLog::default(),
            next_token: AtomicU64::new(1),
        }
    }
}

impl EventTarget for NamedOnlyTarget {
    fn target_name(&self) -> &str {
        "named-only"
    }

    fn attach(&self, _event: &str, _cb: ListenerCallback) -> Result<ListenerToken, ListenerError> {
        Ok(ListenerToken(self.next_token.fetch_add(1, Ordering::SeqCst)))
    }

    fn named_remove(&self, event: &str) -> Option<&dyn DetachByToken> {
        // Only derives a remover for events it knows about.
        (event == "scroll").then_some(&self.named as &dyn DetachByToken)
    }
}

#[derive(Default)]
struct RemoveAllOnlyTarget {
    detach_alls: AtomicU32,
}

impl EventTarget for RemoveAllOnlyTarget {
    fn target_name(&self) -> &str {
        "remove-all-only"
    }

    fn attach(&self, _event: &str, _cb: ListenerCallback) -> Result<ListenerToken, ListenerError> {
        Ok(ListenerToken(1))
    }

    fn remove_all_listeners(&self) -> Option<&dyn DetachAll> {
        Some(self)
    }
}

impl DetachAll for RemoveAllOnlyTarget {
    fn detach_all(&self, _event: &str) -> Result<(), ListenerError> {
        self.detach_alls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Supports no removal convention at all.
struct UnremovableTarget;

impl EventTarget for UnremovableTarget {
    fn target_name(&self) -> &str {
        "unremovable"
    }

    fn attach(&self, _event: &str, _cb: ListenerCallback) -> Result<ListenerToken, ListenerError> {
        Ok(ListenerToken(1))
    }
}

/// Attaches fine but its removal silently does nothing.
struct StickyTarget {
    callbacks: std::sync::Mutex<Vec<ListenerCallback>>,
    broken_remove: TokenDetachLog,
}

impl StickyTarget {
    fn new() -> Self {
        Self {
            callbacks: std::sync::Mutex::new(Vec::new()),
            broken_remove: TokenDetachLog::default(),
        }
    }

    fn emit(&self, event: &Event) {
        let callbacks: Vec<ListenerCallback> = self
            .callbacks
            .lock()
            .expect("callback list")
            .iter()
            .map(Arc::clone)
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl EventTarget for StickyTarget {
    fn target_name(&self) -> &str {
        "sticky"
    }

    fn attach(&self, _event: &str, cb: ListenerCallback) -> Result<ListenerToken, ListenerError> {
        self.callbacks.lock().expect("callback list").push(cb);
        Ok(ListenerToken(1))
    }

    fn remove_listener(&self) -> Option<&dyn DetachByToken> {
        Some(&self.broken_remove)
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

#[test]
fn selection_walks_the_ranked_list_in_order() {
    assert_eq!(
        select_strategy(&LocalEmitter::new("emitter"), "message")
            .expect("emitter supports remove_listener")
            .name,
        "remove_listener"
    );
    assert_eq!(
        select_strategy(&OffOnlyTarget::new(), "message")
            .expect("off capability")
            .name,
        "off"
    );
    assert_eq!(
        select_strategy(&NamedOnlyTarget::new(), "scroll")
            .expect("named capability")
            .name,
        "named_remove"
    );
    assert_eq!(
        select_strategy(&RemoveAllOnlyTarget::default(), "message")
            .expect("remove-all fallback")
            .name,
        "remove_all_listeners"
    );
    assert!(select_strategy(&UnremovableTarget, "message").is_none());
}

#[test]
fn named_strategy_is_per_event() {
    let target = NamedOnlyTarget::new();
    assert!(select_strategy(&target, "scroll").is_some());
    assert!(select_strategy(&target, "resize").is_none());
}

// ============================================================================
// Registration and teardown through the scope
// ============================================================================

#[tokio::test]
async fn unremovable_target_fails_at_registration() {
    let scope = LifecycleScope::new();
    let err = scope
        .add_listener(Arc::new(UnremovableTarget), "message", |_event| {})
        .expect_err("no removal convention");
    assert!(matches!(
        err,
        RegistryError::Listener(ListenerError::NoRemovalCapability { ref target })
            if target == "unremovable"
    ));
    assert_eq!(scope.len(), 0, "nothing was registered");
}

#[tokio::test]
async fn emitter_listener_delivers_and_detaches() {
    let scope = LifecycleScope::new();
    let emitter = Arc::new(LocalEmitter::new("bus"));
    let seen = Arc::new(AtomicU32::new(0));
    let seen_in = Arc::clone(&seen);

    let id = scope
        .add_listener(Arc::clone(&emitter) as Arc<dyn EventTarget>, "message", move |_event| {
            seen_in.fetch_add(1, Ordering::SeqCst);
        })
        .expect("open scope");

    assert_eq!(emitter.emit("message", json!({"n": 1})), 1);
    assert_eq!(emitter.emit("other", json!({})), 0);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(scope.cancel(&id));
    assert_eq!(emitter.listener_count("message"), 0);
    assert_eq!(emitter.emit("message", json!({"n": 2})), 0);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn off_style_target_detaches_through_its_capability() {
    let scope = LifecycleScope::new();
    let target = Arc::new(OffOnlyTarget::new());
    let id = scope
        .add_listener(Arc::clone(&target) as Arc<dyn EventTarget>, "message", |_event| {})
        .expect("open scope");

    assert!(scope.cancel(&id));
    assert_eq!(target.off.detaches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remove_all_fallback_is_used_when_nothing_else_exists() {
    let scope = LifecycleScope::new();
    let target = Arc::new(RemoveAllOnlyTarget::default());
    scope
        .add_listener(Arc::clone(&target) as Arc<dyn EventTarget>, "message", |_event| {})
        .expect("open scope");

    scope.shutdown();
    assert_eq!(target.detach_alls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn suppression_gates_deliveries_even_when_removal_is_broken() {
    let scope = LifecycleScope::new();
    let target = Arc::new(StickyTarget::new());
    let seen = Arc::new(AtomicU32::new(0));
    let seen_in = Arc::clone(&seen);

    let id = scope
        .add_listener(Arc::clone(&target) as Arc<dyn EventTarget>, "message", move |_event| {
            seen_in.fetch_add(1, Ordering::SeqCst);
        })
        .expect("open scope");

    target.emit(&Event::new("message", json!({})));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // The sticky target never actually removes the callback; the wrapper's
    // gate still silences it.
    assert!(scope.cancel(&id));
    target.emit(&Event::new("message", json!({})));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn listener_metrics_count_deliveries() {
    let scope = LifecycleScope::new();
    let emitter = Arc::new(LocalEmitter::new("bus"));
    let id = scope
        .add_listener(Arc::clone(&emitter) as Arc<dyn EventTarget>, "tick", |_event| {})
        .expect("open scope");

    for _ in 0..3 {
        emitter.emit("tick", json!({}));
    }
    let snapshot = scope.snapshot();
    let row = snapshot.iter().find(|r| r.id == id).expect("listener row");
    assert_eq!(row.kind, ResourceKind::EmitterListener);
    assert_eq!(row.metrics.triggers, 3);
    assert_eq!(row.description.as_deref(), Some("tick @ bus"));
}
