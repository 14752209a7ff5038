use core::time::Duration;

use kumo_bridge::{
    ActionError, KumoConfig, SessionManager,
    config::{DeviceConfig, TimingConfig},
};
use kumo_common::ParamId;

use crate::common::{FakeKumo, ready_manager, wait_for};

#[tokio::test]
async fn test_swap_exchanges_sources() {
    let fake = FakeKumo::start().await;
    fake.device.set_route(1, 5);
    fake.device.set_route(2, 9);
    let manager = ready_manager(fake.config(2, 10)).await;

    manager.swap_destinations(1, 2).await.unwrap();
    assert_eq!(
        fake.device.sets(),
        vec![
            (ParamId::DestinationStatus(1), "9".to_owned()),
            (ParamId::DestinationStatus(2), "5".to_owned()),
        ]
    );
    // the router reports both changes back through the event stream
    assert!(
        wait_for(2000, || manager.route(1) == Some(9) && manager.route(2) == Some(5)).await,
        "mirror did not follow the swap"
    );
    manager.teardown();
}

#[tokio::test]
async fn test_route_writes_destination_status() {
    let fake = FakeKumo::start().await;
    let manager = kumo_bridge::SessionManager::new(fake.config(4, 16)).unwrap();

    manager.route_source_to_destination(3, 12).await.unwrap();
    assert_eq!(
        fake.device.sets(),
        vec![(ParamId::DestinationStatus(3), "12".to_owned())]
    );
}

#[tokio::test]
async fn test_send_source_without_selection_sends_nothing() {
    let fake = FakeKumo::start().await;
    let manager = ready_manager(fake.config(2, 2)).await;

    let res = manager.send_source_to_selected_destination(2).await;
    assert!(matches!(res, Err(ActionError::NoDestinationSelected)));
    assert!(fake.device.sets().is_empty(), "no set without a destination");
    manager.teardown();
}

#[tokio::test]
async fn test_send_source_to_selected_destination() {
    let fake = FakeKumo::start().await;
    let manager = ready_manager(fake.config(2, 4)).await;

    manager.select_destination(2).unwrap();
    manager.send_source_to_selected_destination(4).await.unwrap();
    assert_eq!(
        fake.device.sets(),
        vec![(ParamId::DestinationStatus(2), "4".to_owned())]
    );
    assert_eq!(manager.variable("source").as_deref(), Some("4"));
    manager.teardown();
}

#[tokio::test]
async fn test_take_salvo() {
    let fake = FakeKumo::start().await;
    let manager = kumo_bridge::SessionManager::new(fake.config(1, 1)).unwrap();

    manager.take_salvo(3).await.unwrap();
    assert!(
        matches!(
            manager.take_salvo(9).await,
            Err(ActionError::OutOfRange { .. })
        ),
        "only eight salvos exist"
    );
    assert_eq!(
        fake.device.sets(),
        vec![(ParamId::TakeSalvo, "3".to_owned())]
    );
}

#[tokio::test]
async fn test_selection_survives_reconnect() {
    let fake = FakeKumo::start().await;
    let manager = ready_manager(fake.config(2, 2)).await;
    manager.select_destination(1).unwrap();

    manager.disconnect(false);
    manager.connect();
    assert!(
        manager.wait_until_ready(Duration::from_secs(5)).await,
        "second session did not become ready"
    );
    assert_eq!(manager.selection().destination, Some(1));
    manager.teardown();
}

#[tokio::test]
async fn test_route_to_silent_router_times_out() {
    // Accepts connections through the backlog but never answers.
    let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let manager = SessionManager::new(KumoConfig {
        device: DeviceConfig {
            ip: silent.local_addr().unwrap().to_string(),
            source_count: Some(4),
            destination_count: Some(4),
            ..DeviceConfig::default()
        },
        timing: TimingConfig {
            action_timeout_ms: 300,
            ..TimingConfig::default()
        },
    })
    .unwrap();

    let res = tokio::time::timeout(
        Duration::from_secs(3),
        manager.route_source_to_destination(1, 1),
    )
    .await
    .expect("write to a silent router must give up on its own");
    assert!(matches!(res, Err(ActionError::Device(_))), "{res:?}");
    drop(silent);
}
