mod common;

use std::time::Duration;

use bluedeck_core::{
    Address, BondState, CoreError, DeviceRegistry, Operation, PermissionState, Power, Progress, RadioError,
    ScanEvent, SessionState, StopReason,
};
use common::{adapter, gate, record, session, FakePermissions, FakeRadio, SCAN_TIMEOUT};

async fn discover_grant() -> PermissionState {
    let permissions = FakePermissions::granted().into_arc();
    gate(&permissions, 33).check_operation(Operation::Discover).await.unwrap()
}

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

#[tokio::test]
async fn paired_devices_are_listed_before_the_scan_runs() {
    let radio = FakeRadio::new()
        .with_bonded(vec![record("AA:BB:CC:DD:EE:01", "Headphones"), record("AA:BB:CC:DD:EE:02", "Keyboard")])
        .into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let report = discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();

    assert!(report.scanning);
    assert_eq!(report.paired.added, 2);
    assert_eq!(discovery.state(), SessionState::Active);
    assert!(controller.state().scanning);
    assert_eq!(registry.paired_count(), 2);
    assert_eq!(radio.calls().start_discovery, 1);
}

#[tokio::test]
async fn invalid_bonded_records_are_dropped() {
    let radio = FakeRadio::new()
        .with_bonded(vec![record("not-an-address", "Ghost"), record("aa-bb-cc-dd-ee-03", "Mouse")])
        .into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();

    assert_eq!(registry.len(), 1);
    let mouse = registry.get(&addr("AA:BB:CC:DD:EE:03")).unwrap();
    assert_eq!(mouse.bond_state, BondState::Paired);
}

#[tokio::test]
async fn a_second_start_is_refused_while_scanning() {
    let radio = FakeRadio::new().with_bonded(vec![record("AA:BB:CC:DD:EE:01", "Headphones")]).into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();
    let grant = discover_grant().await;

    discovery.start(&mut controller, &grant, &mut registry).await.unwrap();
    let before = registry.snapshot();

    let again = discovery.start(&mut controller, &grant, &mut registry).await;

    assert_eq!(again, Err(CoreError::AlreadyInProgress));
    assert_eq!(registry.snapshot(), before);
    assert_eq!(radio.calls().bonded, 1);
    assert_eq!(discovery.state(), SessionState::Active);
}

#[tokio::test]
async fn scan_results_are_merged_when_the_radio_ends_the_scan() {
    let radio = FakeRadio::new().with_bonded(vec![record("AA:BB:CC:DD:EE:01", "Headphones")]).into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();

    radio.found(record("AA:BB:CC:DD:EE:10", "Speaker"));
    radio.found(record("AA:BB:CC:DD:EE:01", "Headphones Pro"));
    let progress = discovery.pump(&mut controller, &mut registry).await.unwrap();
    assert_eq!(progress, Progress::Scanning { pending: 2 });
    assert_eq!(registry.len(), 1);

    radio.end_scan();
    let progress = discovery.run(&mut controller, &mut registry).await.unwrap();

    match progress {
        Progress::Finished { merged, reason } => {
            assert_eq!(reason, StopReason::Completed);
            assert_eq!(merged.added, 1);
            assert_eq!(merged.updated, 1);
        }
        other => panic!("unexpected progress {:?}", other),
    }
    assert_eq!(discovery.state(), SessionState::Idle);
    assert!(!controller.state().scanning);
    assert_eq!(registry.len(), 2);

    let headphones = registry.get(&addr("AA:BB:CC:DD:EE:01")).unwrap();
    assert_eq!(headphones.display_name(), "Headphones Pro");
    // first-seen order survives the update
    assert_eq!(registry.devices()[0].address, addr("AA:BB:CC:DD:EE:01"));
}

#[tokio::test]
async fn stopping_keeps_what_was_found() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();
    radio.found(record("AA:BB:CC:DD:EE:10", "Speaker"));
    discovery.pump(&mut controller, &mut registry).await.unwrap();

    let progress = discovery.stop(&mut controller, &mut registry).await.unwrap();

    assert!(matches!(
        progress,
        Progress::Finished {
            reason: StopReason::Cancelled,
            ..
        }
    ));
    assert_eq!(registry.len(), 1);
    assert_eq!(discovery.state(), SessionState::Idle);
    assert_eq!(radio.calls().cancel_discovery, 1);
}

#[tokio::test]
async fn stopping_keeps_results_that_were_never_pumped() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();
    radio.found(record("AA:BB:CC:DD:EE:10", "Speaker"));
    radio.found(record("not-an-address", "Ghost"));

    let progress = discovery.stop(&mut controller, &mut registry).await.unwrap();

    match progress {
        Progress::Finished { merged, reason } => {
            assert_eq!(reason, StopReason::Cancelled);
            assert_eq!(merged.added, 1);
        }
        other => panic!("unexpected progress {:?}", other),
    }
    assert!(registry.get(&addr("AA:BB:CC:DD:EE:10")).is_some());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn stopping_an_idle_session_does_nothing() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let progress = discovery.stop(&mut controller, &mut registry).await.unwrap();

    assert_eq!(progress, Progress::Idle);
    assert_eq!(discovery.state(), SessionState::Idle);
    assert_eq!(radio.calls().cancel_discovery, 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn an_oversized_scan_timeout_still_starts() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, Duration::from_secs(u64::MAX));
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();
    assert_eq!(discovery.state(), SessionState::Active);
    assert_eq!(
        discovery.pump(&mut controller, &mut registry).await.unwrap(),
        Progress::Scanning { pending: 0 }
    );

    discovery.stop(&mut controller, &mut registry).await.unwrap();
    assert_eq!(discovery.state(), SessionState::Idle);
}

#[tokio::test]
async fn the_scan_window_is_bounded() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, Duration::from_millis(40));
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();
    radio.found(record("AA:BB:CC:DD:EE:10", "Speaker"));

    let progress = discovery.run(&mut controller, &mut registry).await.unwrap();

    assert!(matches!(
        progress,
        Progress::Finished {
            reason: StopReason::TimedOut,
            ..
        }
    ));
    assert_eq!(registry.len(), 1);
    assert_eq!(radio.calls().cancel_discovery, 1);
}

#[tokio::test]
async fn the_cancel_handle_interrupts_a_waiting_run() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await
        .unwrap();

    let cancel = discovery.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let progress = discovery.run(&mut controller, &mut registry).await.unwrap();
    assert!(matches!(
        progress,
        Progress::Finished {
            reason: StopReason::Cancelled,
            ..
        }
    ));

    // a fresh token is handed out for the next session
    assert!(!discovery.cancel_handle().is_cancelled());
}

#[tokio::test]
async fn power_loss_aborts_and_discards_pending_results() {
    let radio = FakeRadio::new().with_bonded(vec![record("AA:BB:CC:DD:EE:01", "Headphones")]).into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();
    let grant = discover_grant().await;

    discovery.start(&mut controller, &grant, &mut registry).await.unwrap();
    radio.found(record("AA:BB:CC:DD:EE:10", "Speaker"));
    radio.emit(ScanEvent::PoweredOff);

    let result = discovery.pump(&mut controller, &mut registry).await;

    assert_eq!(result, Err(CoreError::DiscoveryAborted));
    assert_eq!(discovery.state(), SessionState::Aborted);
    assert_eq!(controller.state().power, Power::Off);
    assert!(!controller.state().scanning);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&addr("AA:BB:CC:DD:EE:10")).is_none());

    // power comes back and a new session may start from Aborted
    radio.set_enabled_externally(true);
    controller.get_power().await.unwrap();
    discovery.start(&mut controller, &grant, &mut registry).await.unwrap();
    assert_eq!(discovery.state(), SessionState::Active);
}

#[tokio::test]
async fn power_lost_outside_a_scan_is_quiet() {
    let radio = FakeRadio::new().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);

    assert_eq!(discovery.power_lost(&mut controller).await, Ok(()));
    assert_eq!(discovery.state(), SessionState::Idle);
}

#[tokio::test]
async fn scanning_needs_a_scan_grant() {
    let radio = FakeRadio::new().into_arc();
    let permissions = FakePermissions::declining().into_arc();
    let denied = gate(&permissions, 33).check_operation(Operation::Discover).await.unwrap();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let result = discovery.start(&mut controller, &denied, &mut registry).await;

    assert_eq!(result, Err(CoreError::PermissionDenied { blocked: false }));
    assert_eq!(radio.calls().bonded, 0);
    assert_eq!(radio.calls().start_discovery, 0);
    assert_eq!(discovery.state(), SessionState::Idle);
}

#[tokio::test]
async fn a_power_toggle_grant_does_not_cover_scanning() {
    let radio = FakeRadio::new().into_arc();
    let permissions = FakePermissions::granted().into_arc();
    let toggle = gate(&permissions, 33).check_operation(Operation::TogglePower).await.unwrap();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let result = discovery.start(&mut controller, &toggle, &mut registry).await;
    assert!(matches!(result, Err(CoreError::PermissionDenied { .. })));
}

#[tokio::test]
async fn a_radio_that_is_off_cannot_scan() {
    let radio = FakeRadio::new().powered_off().into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let result = discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await;

    assert_eq!(result, Err(CoreError::AdapterOff));
    assert_eq!(radio.calls().start_discovery, 0);
}

#[tokio::test]
async fn a_failed_enumeration_settles_back_to_idle() {
    let radio = FakeRadio::new()
        .failing_bonded(RadioError::Backend("bus gone".into()))
        .into_arc();
    let mut controller = adapter(&radio).await;
    let mut discovery = session(&radio, SCAN_TIMEOUT);
    let mut registry = DeviceRegistry::new();

    let result = discovery
        .start(&mut controller, &discover_grant().await, &mut registry)
        .await;

    assert_eq!(result, Err(CoreError::Radio(RadioError::Backend("bus gone".into()))));
    assert_eq!(discovery.state(), SessionState::Idle);
    assert!(!controller.state().scanning);
    assert_eq!(radio.calls().start_discovery, 0);
}
