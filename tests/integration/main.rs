//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)
#![expect(
    clippy::tests_outside_test_module,
    reason = "This is the integration test binary, so it's expected that tests are outside of a test module"
)]
#![expect(clippy::indexing_slicing, reason = "This is not problematic in tests")]
#![expect(clippy::unwrap_used, reason = "Using unwrap in tests is fine")]

extern crate alloc;
extern crate core;

mod actions;
mod common;
mod listener;

use core::sync::atomic::Ordering;

use kumo_bridge::{ConnectionStatus, NameKind};

use common::{FakeKumo, ready_manager};

#[tokio::test]
async fn test_sync_fetches_whole_crosspoint() {
    let fake = FakeKumo::start().await;
    fake.device.set_route(2, 4);
    let manager = ready_manager(fake.config(3, 4)).await;

    // 3 * 3 + 2 * 4 + 8
    assert_eq!(fake.device.gets.load(Ordering::SeqCst), 25);
    assert_eq!(fake.device.connects.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status(), ConnectionStatus::Ready);

    assert_eq!(manager.route(1), Some(1));
    assert_eq!(manager.route(2), Some(4));
    assert_eq!(manager.variable("destination_2").as_deref(), Some("4"));
    assert_eq!(manager.name(NameKind::Source, 2), vec!["SRC 2".to_owned(), String::new()]);
    assert_eq!(
        manager.variable("destination_label_3").as_deref(),
        Some("3\nDST 3")
    );
    assert_eq!(manager.salvo_name(8).as_deref(), Some("Salvo 8"));
    assert_eq!(manager.variable("salvo_1").as_deref(), Some("Salvo 1"));
    manager.teardown();
}

#[tokio::test]
async fn test_sync_with_empty_crosspoint_reads_salvos_only() {
    let fake = FakeKumo::start().await;
    let manager = ready_manager(fake.config(0, 0)).await;
    assert_eq!(fake.device.gets.load(Ordering::SeqCst), 8);
    assert!(manager.snapshot().routes.is_empty(), "no destinations to read");
    manager.teardown();
}

#[tokio::test]
async fn test_status_snapshot_serializes() {
    let fake = FakeKumo::start().await;
    fake.device.set_route(1, 2);
    let manager = ready_manager(fake.config(1, 2)).await;

    let json = serde_json::to_value(manager.snapshot()).unwrap();
    assert_eq!(json["routes"]["1"], 2);
    assert_eq!(json["sources"]["2"][0], "SRC 2");
    assert_eq!(json["salvos"]["3"], "Salvo 3");
    assert!(json["selection"]["destination"].is_null(), "nothing selected");
    manager.teardown();
}
