//! Cancellation-engine tests: error isolation, idempotent sweeps, and
//! cascade ordering.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::handle::ResourceHandle;
use crate::id::epoch_millis;

fn handle_with(
    registry: &Registry,
    kind: ResourceKind,
    cancel: CancelFnForTest,
) -> ResourceHandle {
    ResourceHandle::new(registry.next_id(kind), kind, epoch_millis(), cancel)
}

type CancelFnForTest = Box<dyn FnOnce() -> Result<(), CancelError> + Send + 'static>;

#[test]
fn cancel_one_unknown_id_returns_false() {
    let registry = Registry::new("scope_engine".to_string());
    assert!(!registry.cancel_one("timeout_0_0"));
}

#[test]
fn cancel_one_tears_down_and_unindexes() {
    let registry = Registry::new("scope_engine".to_string());
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = Arc::clone(&calls);
    let handle = handle_with(
        &registry,
        ResourceKind::Timeout,
        Box::new(move || {
            calls_in.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    let id = handle.id().to_string();
    registry.insert(handle).expect("open registry");

    assert!(registry.cancel_one(&id));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!registry.contains(&id));
    // Double-cancel is a no-op, not an error.
    assert!(!registry.cancel_one(&id));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn sweep_is_idempotent() {
    let registry = Registry::new("scope_engine".to_string());
    for _ in 0..3 {
        let handle = handle_with(&registry, ResourceKind::Interval, Box::new(|| Ok(())));
        registry.insert(handle).expect("open registry");
    }

    assert_eq!(registry.cancel_all().canceled, 3);
    assert_eq!(registry.cancel_all().canceled, 0);
}

#[test]
fn failing_teardown_does_not_stop_the_sweep() {
    let registry = Registry::new("scope_engine".to_string());
    let ok_calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&ok_calls);
        let handle = handle_with(
            &registry,
            ResourceKind::Timeout,
            Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        registry.insert(handle).expect("open registry");
    }
    let failing = handle_with(
        &registry,
        ResourceKind::Custom,
        Box::new(|| Err(CancelError::failed("device wedged"))),
    );
    let failing_id = failing.id().to_string();
    registry.insert(failing).expect("open registry");

    let report = registry.cancel_all();
    assert_eq!(report.canceled, 3);
    assert_eq!(registry.len(), 0);
    assert_eq!(ok_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].resource_id, failing_id);
    assert_eq!(report.errors[0].kind, ResourceKind::Custom);
    assert!(report.errors[0].message.contains("device wedged"));
}

#[test]
fn panicking_teardown_is_caught_and_attributed() {
    let registry = Registry::new("scope_engine".to_string());
    let survivor_calls = Arc::new(AtomicU32::new(0));

    let panicking = handle_with(
        &registry,
        ResourceKind::Custom,
        Box::new(|| panic!("teardown exploded")),
    );
    let panicking_id = panicking.id().to_string();
    registry.insert(panicking).expect("open registry");

    let calls = Arc::clone(&survivor_calls);
    let survivor = handle_with(
        &registry,
        ResourceKind::Timeout,
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    registry.insert(survivor).expect("open registry");

    let report = registry.cancel_all();
    assert_eq!(report.canceled, 2);
    assert_eq!(registry.len(), 0);
    assert_eq!(survivor_calls.load(Ordering::SeqCst), 1);

    let attributed: Vec<&SweepError> = report
        .errors
        .iter()
        .filter(|e| e.resource_id == panicking_id)
        .collect();
    assert_eq!(attributed.len(), 1);
    assert!(attributed[0].message.contains("teardown exploded"));
}

#[test]
fn cancel_one_cascades_children_before_the_parent() {
    let registry = Registry::new("scope_engine".to_string());
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    let parent = handle_with(
        &registry,
        ResourceKind::SocketConnection,
        Box::new(move || {
            log.lock().expect("order log").push("parent");
            Ok(())
        }),
    );
    let parent_id = parent.id().to_string();
    registry.insert(parent).expect("open registry");

    for name in ["child_a", "child_b"] {
        let log = Arc::clone(&order);
        let child = handle_with(
            &registry,
            ResourceKind::SocketSubscription,
            Box::new(move || {
                log.lock().expect("order log").push(name);
                Ok(())
            }),
        )
        .with_parent(parent_id.clone());
        registry.insert(child).expect("open registry");
    }

    assert!(registry.cancel_one(&parent_id));
    assert_eq!(registry.len(), 0);

    let seen = order.lock().expect("order log");
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], "parent", "parent closes after its children");
}

#[test]
fn sweep_orders_children_before_parents() {
    let registry = Registry::new("scope_engine".to_string());
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    let parent = handle_with(
        &registry,
        ResourceKind::SocketConnection,
        Box::new(move || {
            log.lock().expect("order log").push("parent".to_string());
            Ok(())
        }),
    );
    let parent_id = parent.id().to_string();
    registry.insert(parent).expect("open registry");

    let log = Arc::clone(&order);
    let child = handle_with(
        &registry,
        ResourceKind::SocketSubscription,
        Box::new(move || {
            log.lock().expect("order log").push("child".to_string());
            Ok(())
        }),
    )
    .with_parent(parent_id);
    registry.insert(child).expect("open registry");

    let report = registry.cancel_all();
    assert_eq!(report.canceled, 2);

    let seen = order.lock().expect("order log");
    assert_eq!(seen.as_slice(), ["child".to_string(), "parent".to_string()]);
}

#[test]
fn sweep_report_serializes_for_telemetry() {
    let report = SweepReport {
        canceled: 2,
        errors: vec![SweepError {
            resource_id: "socket_1_99".to_string(),
            kind: ResourceKind::SocketConnection,
            message: "close failed".to_string(),
        }],
    };
    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["canceled"], 2);
    assert_eq!(json["errors"][0]["kind"], "socket");
}
