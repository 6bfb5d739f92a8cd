//! Bus manager behavior: configuration mutators, persistence, and the queued data path.
#[allow(dead_code)]
mod helpers {
    include!("../../helpers/mod.rs");
}

use cangate::core::CanSettings;
use cangate::error::TransportError;
use cangate::protocol::transport::{
    can_frame::CanFrame, can_id::CanId, traits::settings_store::SettingsKey, CAN_QUEUE_SIZE,
    MAX_BITRATE,
};
use helpers::{enabled_rig, rig};

fn request() -> CanFrame {
    CanFrame::new(CanId::standard(0x7DF), &[0x02, 0x01, 0x05, 0, 0, 0, 0, 0])
}

#[tokio::test]
async fn test_enable_then_disable_every_bus() {
    let (manager, rig) = rig();
    manager.set_num_busses(3).await.unwrap();

    for (bus, bitrate) in [(0u8, 500_000u32), (1, 250_000), (2, 125_000)] {
        manager.enable(bus, bitrate).await.unwrap();
        assert!(manager.is_enabled(bus));
        assert_eq!(manager.get_bitrate(bus), Some(bitrate));
        assert!(rig.controllers[bus as usize].is_running());
    }
    for bus in 0..3 {
        manager.disable(bus).await.unwrap();
        assert!(!manager.is_enabled(bus));
        assert!(!rig.controllers[bus as usize].is_running());
    }
}

#[tokio::test]
async fn test_enable_restarts_and_clamps_bitrate() {
    let (manager, rig) = rig();
    manager.enable(0, 500_000).await.unwrap();
    manager.enable(0, 2_000_000).await.unwrap();

    assert_eq!(manager.get_bitrate(0), Some(MAX_BITRATE));
    assert_eq!(rig.controllers[0].starts(), vec![500_000, MAX_BITRATE]);
    let log = rig.controllers[0].log.lock().unwrap();
    assert_eq!(log.interrupts_installed, 1, "interrupt installed once per bus lifetime");
    assert_eq!(log.stops, 1);
}

#[tokio::test]
async fn test_controller_start_failure_leaves_bus_disabled() {
    let (manager, rig) = rig();
    rig.controllers[0].log.lock().unwrap().fail_start = true;

    assert_eq!(
        manager.enable(0, 500_000).await,
        Err(TransportError::ControllerFault { bus: 0 })
    );
    assert!(!manager.is_enabled(0));
    assert_eq!(rig.store.writes_of(SettingsKey::CanSettings), 0);
}

#[tokio::test]
async fn test_failed_restart_disables_running_bus() {
    let (manager, rig) = enabled_rig(1).await;
    rig.controllers[0].log.lock().unwrap().fail_start = true;

    assert_eq!(
        manager.set_bitrate(0, 250_000).await,
        Err(TransportError::ControllerFault { bus: 0 })
    );
    assert!(!manager.is_enabled(0));
    assert!(!rig.controllers[0].is_running());
    assert_eq!(manager.send(0, &request()).await, Err(TransportError::BusDisabled { bus: 0 }));
    assert_eq!(rig.store.record(SettingsKey::CanSettings).unwrap()[1], 0, "stored as disabled");

    assert_eq!(
        manager.enable(0, 125_000).await,
        Err(TransportError::ControllerFault { bus: 0 })
    );
    assert!(!manager.is_enabled(0));
    assert_eq!(manager.tx_buffered_frames(0), 0);
}

#[tokio::test]
async fn test_invalid_bus_is_rejected() {
    let (manager, _rig) = rig();
    assert_eq!(manager.enable(1, 500_000).await, Err(TransportError::InvalidBus { bus: 1 }));
    assert_eq!(manager.send(7, &request()).await, Err(TransportError::InvalidBus { bus: 7 }));
    assert_eq!(manager.set_num_busses(0).await, Err(TransportError::InvalidBusCount { count: 0 }));
    assert_eq!(manager.set_num_busses(4).await, Err(TransportError::InvalidBusCount { count: 4 }));
}

#[tokio::test]
async fn test_send_refused_on_disabled_or_listen_only_bus() {
    let (manager, _rig) = rig();
    assert_eq!(manager.send(0, &request()).await, Err(TransportError::BusDisabled { bus: 0 }));
    assert_eq!(manager.tx_buffered_frames(0), 0);

    manager.enable(0, 500_000).await.unwrap();
    manager.set_listen_only(0, true).await.unwrap();
    assert_eq!(manager.send(0, &request()).await, Err(TransportError::ListenOnly { bus: 0 }));
    assert_eq!(manager.tx_buffered_frames(0), 0);

    manager.set_listen_only(0, false).await.unwrap();
    manager.send(0, &request()).await.unwrap();
    assert_eq!(manager.tx_buffered_frames(0), 1);
}

#[tokio::test]
async fn test_full_tx_queue_drops_and_counts() {
    let (manager, _rig) = enabled_rig(1).await;
    for _ in 0..CAN_QUEUE_SIZE {
        manager.send(0, &request()).await.unwrap();
    }
    assert_eq!(manager.send(0, &request()).await, Err(TransportError::QueueFull { bus: 0 }));
    assert_eq!(manager.tx_overflow_count(0), 1);
    assert_eq!(manager.tx_buffered_frames(0), CAN_QUEUE_SIZE);
}

#[tokio::test]
async fn test_receive_reports_remaining_frames() {
    let (manager, _rig) = enabled_rig(1).await;
    assert_eq!(manager.receive(0).await, Err(TransportError::QueueEmpty { bus: 0 }));

    let response = CanFrame::new(CanId::standard(0x7E8), &[0x03, 0x41, 0x05, 0x3C]);
    assert!(manager.on_frame_received(0, response));
    assert!(manager.on_frame_received(0, response));

    assert_eq!(manager.receive(0).await, Ok((response, 1)));
    assert_eq!(manager.receive(0).await, Ok((response, 0)));
}

#[tokio::test]
async fn test_listen_only_persists_once_per_change() {
    let (manager, rig) = enabled_rig(1).await;
    let before = rig.store.writes_of(SettingsKey::CanSettings);

    manager.set_listen_only(0, true).await.unwrap();
    manager.set_listen_only(0, true).await.unwrap();
    assert_eq!(rig.store.writes_of(SettingsKey::CanSettings), before + 1);
    assert!(manager.is_listen_only(0));
    assert!(rig.controllers[0].is_running(), "listen-only does not restart the controller");
}

#[tokio::test]
async fn test_disable_and_bitrate_persist_only_on_change() {
    let (manager, rig) = enabled_rig(1).await;
    let before = rig.store.writes_of(SettingsKey::CanSettings);

    manager.set_bitrate(0, 500_000).await.unwrap();
    assert_eq!(rig.store.writes_of(SettingsKey::CanSettings), before);
    manager.set_bitrate(0, 250_000).await.unwrap();
    assert_eq!(rig.store.writes_of(SettingsKey::CanSettings), before + 1);
    assert_eq!(rig.controllers[0].starts().last(), Some(&250_000));

    manager.disable(0).await.unwrap();
    manager.disable(0).await.unwrap();
    assert_eq!(rig.store.writes_of(SettingsKey::CanSettings), before + 2);
}

#[tokio::test]
async fn test_persisted_settings_reload_identically() {
    let (manager, rig) = rig();
    manager.set_num_busses(3).await.unwrap();
    manager.enable(0, 500_000).await.unwrap();
    manager.enable(2, 125_000).await.unwrap();
    manager.set_listen_only(2, true).await.unwrap();
    let written = manager.settings();

    let stored = rig.store.record(SettingsKey::CanSettings).unwrap();
    assert_eq!(stored, written.to_bytes().to_vec());

    let (reloaded, reloaded_rig) = helpers::rig();
    reloaded_rig.store.preload(SettingsKey::CanSettings, &stored);
    reloaded.load_settings().await;

    assert_eq!(reloaded.settings(), written);
    assert!(reloaded_rig.controllers[0].is_running());
    assert!(!reloaded_rig.controllers[1].is_running());
    assert_eq!(reloaded_rig.controllers[2].starts(), vec![125_000]);
}

#[tokio::test]
async fn test_load_without_record_uses_defaults() {
    let (manager, rig) = rig();
    rig.store.preload(SettingsKey::CanSettings, &[0u8; 3]);
    manager.load_settings().await;
    assert_eq!(manager.settings(), CanSettings::new());
    assert_eq!(manager.num_busses(), 1);
    assert!(!rig.controllers[0].is_running());
}

#[tokio::test]
async fn test_failed_persistence_keeps_memory_state() {
    let (manager, rig) = rig();
    rig.store.state.lock().unwrap().fail_writes = true;

    manager.enable(0, 250_000).await.unwrap();
    assert!(manager.is_enabled(0));
    assert_eq!(manager.get_bitrate(0), Some(250_000));
    assert_eq!(rig.store.record(SettingsKey::CanSettings), None);
}

#[tokio::test]
async fn test_shrinking_bus_count_stops_extra_buses() {
    let (manager, rig) = enabled_rig(3).await;
    manager.set_num_busses(1).await.unwrap();

    assert_eq!(manager.num_busses(), 1);
    assert!(rig.controllers[0].is_running());
    assert!(!rig.controllers[1].is_running());
    assert!(!rig.controllers[2].is_running());
    assert_eq!(manager.bus_config(2), None);
}

#[tokio::test]
async fn test_bitrate_lockout_blocks_requests_only() {
    let (manager, rig) = enabled_rig(1).await;
    manager.set_baudrate_lockout(true).await;
    assert!(manager.baudrate_lockout());
    assert_eq!(rig.store.record(SettingsKey::BaudLockout), Some(vec![1]));

    assert_eq!(manager.request_bitrate(0, 250_000).await, Err(TransportError::BitrateLocked));
    assert_eq!(manager.get_bitrate(0), Some(500_000));

    manager.set_bitrate(0, 250_000).await.unwrap();
    assert_eq!(manager.get_bitrate(0), Some(250_000));
}

#[tokio::test]
async fn test_statistics_come_from_the_controller() {
    let (manager, _rig) = enabled_rig(1).await;
    let stats = manager.statistics(0).await.unwrap();
    assert_eq!(stats.tx_total, 0);
    assert_eq!(manager.statistics(2).await, Err(TransportError::InvalidBus { bus: 2 }));
}
