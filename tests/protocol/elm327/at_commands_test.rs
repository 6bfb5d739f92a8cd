//! AT/ST command answers and their effect on the session.
#[allow(dead_code)]
mod helpers {
    include!("../../helpers/mod.rs");
}

use cangate::error::ElmError;
use cangate::protocol::elm327::{
    emulator::Elm327,
    session::{ElmSession, Protocol},
    OBD2_29BIT_BROADCAST,
};
use cangate::protocol::transport::{can_frame::CanFrame, can_id::CanId, runner::TxRunner};
use helpers::{enabled_rig, CaptureSink};

#[tokio::test]
async fn test_identity_commands() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());

    elm.handle("ATZ").await.unwrap();
    assert_eq!(sink.take(), "ELM327 v1.3a\r\r>");
    elm.handle("ati").await.unwrap();
    assert_eq!(sink.take(), "ELM327 v1.3a\r\r>");
    elm.handle("AT@1").await.unwrap();
    assert_eq!(sink.take(), "OBDLink MX\r\r>");
    elm.handle("ATDESC").await.unwrap();
    assert_eq!(sink.take(), "cangate ELM327 Emulator\rOK\r\r>");
    elm.handle("STDI").await.unwrap();
    assert_eq!(sink.take(), "cangate ELM327 Emulator\r\r>");
    elm.handle("ATRV").await.unwrap();
    assert_eq!(sink.take(), "13.4V \rOK\r\r>");
    elm.handle("ATS0").await.unwrap();
    sink.take();
    elm.handle("ATRV").await.unwrap();
    assert_eq!(sink.take(), "13.4V\rOK\r\r>");
}

#[tokio::test]
async fn test_linefeed_changes_terminators() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());

    elm.handle("ATL1").await.unwrap();
    assert_eq!(sink.take(), "\r\nOK\r\n>");
    elm.handle("ATI").await.unwrap();
    assert_eq!(sink.take(), "ELM327 v1.3a\r\n>");
    elm.handle("ATL0").await.unwrap();
    assert_eq!(sink.take(), "\rOK\r\r>");
}

#[tokio::test]
async fn test_toggles_update_the_session() {
    let (manager, _rig) = enabled_rig(1).await;
    let elm = Elm327::new(&manager, 0, CaptureSink::default());

    for command in ["ATE1", "ATS0", "ATH1", "ATD1", "ATM1", "ATAT0"] {
        elm.handle(command).await.unwrap();
    }
    let session = elm.status().await.unwrap().session;
    assert!(session.echo);
    assert!(!session.whitespace);
    assert!(session.headers);
    assert!(session.show_dlc);
    assert!(session.memory);
    assert!(!session.adaptive);

    elm.handle("ATZ").await.unwrap();
    assert_eq!(elm.status().await.unwrap().session, ElmSession::new());
}

#[tokio::test]
async fn test_unknown_commands_answer_question_mark() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());
    let before = elm.status().await.unwrap().session;

    for command in ["ATXYZ", "STFAC", "HELLO", "010", "01050607"] {
        assert_eq!(elm.handle(command).await, Err(ElmError::InvalidCommand), "{command}");
        assert_eq!(sink.take(), "?\r\r>", "{command}");
    }
    assert_eq!(elm.status().await.unwrap().session, before);
    assert_eq!(manager.tx_buffered_frames(0), 0);
}

#[tokio::test]
async fn test_ignored_commands_answer_ok() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());

    for command in ["ATCRA7E8", "ATCP18", "ATAR", "ATV1", "ATPP2CSV01", "ATPC"] {
        elm.handle(command).await.unwrap();
        assert_eq!(sink.take(), "\rOK\r\r>", "{command}");
    }
}

#[tokio::test]
async fn test_set_protocol_selects_addressing_and_bitrate() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());

    elm.handle("ATSP9").await.unwrap();
    let session = elm.status().await.unwrap().session;
    assert_eq!(session.protocol, Protocol::Can29Bit250k);
    assert_eq!(session.header, OBD2_29BIT_BROADCAST);
    assert!(session.extended);
    assert_eq!(manager.get_bitrate(0), Some(250_000));
    sink.take();

    elm.handle("ATDPN").await.unwrap();
    assert_eq!(sink.take(), "9\rOK\r\r>");
    elm.handle("ATDP").await.unwrap();
    assert_eq!(sink.take(), "ISO 15765-4 (CAN 29/250)\rOK\r\r>");
}

#[tokio::test]
async fn test_bitrate_lockout_keeps_bus_speed() {
    let (manager, _rig) = enabled_rig(1).await;
    manager.set_baudrate_lockout(true).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());

    elm.handle("ATSP8").await.unwrap();
    assert_eq!(sink.take(), "\rOK\r\r>");
    assert_eq!(manager.get_bitrate(0), Some(500_000));
    assert_eq!(elm.status().await.unwrap().session.protocol, Protocol::Can11Bit250k);
}

#[tokio::test]
async fn test_set_header_addresses_requests() {
    let (manager, rig) = enabled_rig(1).await;
    let elm = Elm327::new(&manager, 0, CaptureSink::default());

    elm.handle("ATSH7E0").await.unwrap();
    elm.handle("0100").await.unwrap();
    elm.handle("ATSHDA10F1").await.unwrap();
    elm.handle("0100").await.unwrap();
    TxRunner::new(&manager).pump_once().await;

    let sent = rig.controllers[0].transmitted();
    assert_eq!(sent[0].id, CanId::standard(0x7E0));
    assert_eq!(sent[1].id, CanId::extended(0x18DA_10F1));
    assert!(elm.status().await.unwrap().session.extended);
}

#[tokio::test]
async fn test_set_timeout_rules() {
    let (manager, _rig) = enabled_rig(1).await;
    let elm = Elm327::new(&manager, 0, CaptureSink::default());
    let timeout = || async { elm.status().await.unwrap().session.timeout_ms };

    elm.handle("ATST19").await.unwrap();
    assert_eq!(timeout().await, 100);
    elm.handle("ATST05").await.unwrap();
    assert_eq!(timeout().await, 60);
    elm.handle("ATST00").await.unwrap();
    assert_eq!(timeout().await, 250);

    elm.handle("ATST32").await.unwrap();
    let status = elm.status().await.unwrap();
    assert_eq!(status.session.timeout_ms, 200);
    assert_eq!(status.estimator.average_ms(), 50, "estimator restarts from the new timeout");
}

#[tokio::test]
async fn test_headers_and_dlc_shape_output() {
    let (manager, _rig) = enabled_rig(1).await;
    let sink = CaptureSink::default();
    let elm = Elm327::new(&manager, 0, sink.clone());
    let frame = CanFrame::new(CanId::standard(0x7E8), &[0x03, 0x41, 0x05, 0x3C, 0, 0, 0, 0]);

    elm.handle("ATH1").await.unwrap();
    sink.take();
    elm.handle_can_frame(&frame).await;
    assert_eq!(sink.take(), "7E8 03 41 05 3C\r");

    elm.handle("ATH0").await.unwrap();
    elm.handle("ATD1").await.unwrap();
    elm.handle("ATS0").await.unwrap();
    sink.take();
    elm.handle_can_frame(&frame).await;
    assert_eq!(sink.take(), "341053C\r");
}
