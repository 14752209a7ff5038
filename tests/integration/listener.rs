use core::sync::atomic::Ordering;
use core::time::Duration;

use kumo_bridge::{BridgeEvent, ConnectionStatus, Feedback, FeedbackKind};
use kumo_common::ConfigEvent;

use crate::common::{FakeKumo, ready_manager, wait_for};

fn route_event(destination: u32, source: i64) -> ConfigEvent {
    ConfigEvent {
        param_id: Some(format!("eParamID_XPT_Destination{destination}_Status")),
        int_value: Some(source),
        str_value: None,
    }
}

#[tokio::test]
async fn test_route_event_updates_mirror_and_repolls_once() {
    let fake = FakeKumo::start().await;
    fake.device.push_events(vec![route_event(3, 7)]);
    let manager = ready_manager(fake.config(4, 8)).await;

    assert!(
        wait_for(2000, || manager.route(3) == Some(7)).await,
        "route event was not applied"
    );
    assert!(manager.evaluate(Feedback::DestinationMatch {
        destination: 3,
        source: 7
    }));
    assert!(
        wait_for(2000, || fake.device.polls.load(Ordering::SeqCst) == 2).await,
        "listener did not re-poll"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fake.device.polls.load(Ordering::SeqCst), 2, "polls never overlap");
    manager.teardown();
}

#[tokio::test]
async fn test_name_events_update_labels() {
    let fake = FakeKumo::start().await;
    let manager = ready_manager(fake.config(2, 2)).await;
    let mut events = manager.subscribe();

    fake.device.push_events(vec![
        ConfigEvent {
            param_id: Some("eParamID_XPT_Destination2_Line_2".to_owned()),
            int_value: None,
            str_value: Some("Stage".to_owned()),
        },
        ConfigEvent {
            param_id: Some("eParamID_Temperature".to_owned()),
            int_value: Some(41),
            str_value: None,
        },
    ]);
    assert!(
        wait_for(2000, || manager.variable("destination_label_2").as_deref()
            == Some("2\nDST 2\nStage"))
        .await,
        "label was not republished"
    );

    let mut saw_variable = false;
    while let Ok(event) = events.try_recv() {
        if let BridgeEvent::VariableChanged { ref name, .. } = event
            && name == "destination_label_2"
        {
            saw_variable = true;
        }
    }
    assert!(saw_variable, "variable change was not published");
    manager.teardown();
}

#[tokio::test]
async fn test_repeated_route_event_is_silent() {
    let fake = FakeKumo::start().await;
    fake.device.set_route(1, 5);
    let manager = ready_manager(fake.config(1, 8)).await;
    let mut events = manager.subscribe();

    fake.device.push_events(vec![route_event(1, 5)]);
    fake.device.push_events(vec![route_event(1, 6)]);
    assert!(
        wait_for(2000, || manager.route(1) == Some(6)).await,
        "second event was not applied"
    );

    let mut route_changes = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            BridgeEvent::RouteChanged {
                destination,
                source,
            } => route_changes.push((destination, source)),
            BridgeEvent::FeedbackRecheck(kind) => {
                assert_eq!(kind, FeedbackKind::DestinationMatch);
            }
            _ => {}
        }
    }
    assert_eq!(route_changes, vec![(1, 6)], "unchanged route must not notify");
    manager.teardown();
}

#[tokio::test]
async fn test_poll_failure_reconnects() {
    let fake = FakeKumo::start().await;
    fake.device.fail_polls.store(true, Ordering::SeqCst);
    let manager = ready_manager(fake.config(1, 1)).await;
    let mut status = manager.watch_status();

    assert!(
        tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|&s| s == ConnectionStatus::ConnectionFailure)
        )
        .await
        .is_ok(),
        "poll failure was not reported"
    );
    assert_eq!(manager.connection_id(), None);

    fake.device.fail_polls.store(false, Ordering::SeqCst);
    assert!(
        wait_for(3000, || fake.device.connects.load(Ordering::SeqCst) >= 2).await,
        "no reconnect after poll failure"
    );
    assert!(
        manager.wait_until_ready(Duration::from_secs(3)).await,
        "reconnected session did not become ready"
    );
    manager.teardown();
}

#[tokio::test]
async fn test_unusable_event_batch_reconnects() {
    let fake = FakeKumo::start().await;
    fake.device.set_route(1, 2);
    fake.device
        .push_events(vec![route_event(2, 3), route_event(1, 0)]);
    let manager = ready_manager(fake.config(2, 4)).await;

    assert!(
        wait_for(3000, || fake.device.connects.load(Ordering::SeqCst) >= 2).await,
        "session did not reconnect after a bad batch"
    );
    assert!(
        manager.wait_until_ready(Duration::from_secs(5)).await,
        "second session did not become ready"
    );
    assert_eq!(manager.route(1), Some(2));
    assert_eq!(manager.route(2), Some(1), "mirror follows the resync");
    manager.teardown();
}
