//! # ELM327 session walkthrough
//!
//! Hosted run of the gateway core: one bus, a simulated ECU answering OBD-II
//! requests, and a scripted host typing commands into the ELM327 emulator.
//!
//! ```bash
//! cargo run --example elm_session
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use cangate::core::ControllerStats;
use cangate::protocol::elm327::emulator::{Elm327, ElmRunner};
use cangate::protocol::transport::{
    bus_manager::BusManager,
    can_frame::CanFrame,
    can_id::CanId,
    runner::{RxDispatcher, TxRunner},
    traits::{
        can_controller::CanController,
        clock::Clock,
        host_sink::HostSink,
        settings_store::{SettingsKey, SettingsStore},
    },
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant};
use static_cell::StaticCell;

static HOST_INPUT: StaticCell<Channel<CriticalSectionRawMutex, u8, 64>> = StaticCell::new();

/// Frames on the simulated wire, shared between controllers and the ECU.
type Wire = Arc<Mutex<VecDeque<CanFrame>>>;

//==================================================================================COLLABORATORS
#[derive(Clone)]
struct WireController {
    wire: Wire,
}

impl CanController for WireController {
    type Error = ();

    fn install_interrupt(&mut self, bus: u8) {
        println!("   [bus {bus}] interrupt installed");
    }

    fn start(&mut self, bitrate: u32) -> Result<(), ()> {
        println!("   controller started at {bitrate} bit/s");
        Ok(())
    }

    fn stop(&mut self) {}

    async fn transmit<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), ()> {
        self.wire.lock().map_err(|_| ())?.push_back(*frame);
        Ok(())
    }

    fn statistics(&self) -> ControllerStats {
        ControllerStats::default()
    }
}

#[derive(Default)]
struct RamStore {
    records: std::collections::HashMap<SettingsKey, Vec<u8>>,
}

impl SettingsStore for RamStore {
    type Error = ();

    fn load(&mut self, key: SettingsKey, buf: &mut [u8]) -> Result<usize, ()> {
        let record = self.records.get(&key).ok_or(())?;
        let len = record.len().min(buf.len());
        buf[..len].copy_from_slice(&record[..len]);
        Ok(len)
    }

    fn store(&mut self, key: SettingsKey, data: &[u8]) -> Result<(), ()> {
        self.records.insert(key, data.to_vec());
        Ok(())
    }
}

struct TokioClock {
    origin: std::time::Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.origin.elapsed().as_millis() as u64)
    }

    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(std::time::Duration::from_millis(duration.as_millis())).await;
    }
}

/// Prints emulator output, making carriage returns visible.
struct Terminal;

impl HostSink for Terminal {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match byte {
                b'\r' => print!("\\r\n      "),
                b'\n' => print!("\\n"),
                other => print!("{}", other as char),
            }
        }
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

//==================================================================================ECU
/// Engine ECU: coolant temperature on 0105, a 17-character VIN on 0902.
fn ecu_answer(request: &CanFrame) -> Vec<CanFrame> {
    if request.id != CanId::standard(0x7DF) && request.id != CanId::standard(0x7E0) {
        return Vec::new();
    }
    let reply = |data: &[u8]| CanFrame::new(CanId::standard(0x7E8), data);
    match request.data[..3] {
        [0x02, 0x01, 0x05] => vec![reply(&[0x03, 0x41, 0x05, 0x3C, 0, 0, 0, 0])],
        [0x02, 0x09, 0x02] => vec![
            reply(&[0x10, 0x14, 0x49, 0x02, 0x01, b'1', b'G', b'1']),
            reply(&[0x21, b'J', b'C', b'5', b'4', b'4', b'4', b'R']),
            reply(&[0x22, b'7', b'2', b'5', b'2', b'3', b'6', b'7']),
        ],
        _ => Vec::new(),
    }
}

//==================================================================================MAIN
#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== cangate ELM327 session ===\n");

    let wire = Wire::default();
    let controller = WireController { wire: wire.clone() };
    let manager = BusManager::new(
        [controller.clone(), controller.clone(), controller],
        RamStore::default(),
        TokioClock {
            origin: std::time::Instant::now(),
        },
    );

    println!("1. Bringing up bus 0");
    manager.load_settings().await;
    manager.enable(0, 500_000).await.expect("bus 0 enabled");

    let elm = Elm327::new(&manager, 0, Terminal);
    let input = HOST_INPUT.init(Channel::new());
    let mut host = ElmRunner::new(&elm, input.receiver());
    let tx = TxRunner::new(&manager);
    let rx = RxDispatcher::new(&manager, &elm);

    let ecu = async {
        loop {
            let request = wire.lock().expect("wire").pop_front();
            match request {
                Some(frame) => {
                    for answer in ecu_answer(&frame) {
                        manager.on_frame_received(0, answer);
                    }
                }
                None => tokio::time::sleep(std::time::Duration::from_millis(2)).await,
            }
        }
    };

    let script = async {
        println!("\n2. Host session");
        for command in ["ATZ", "ATE0", "ATSP6", "0105", "0902", "ATH1", "0105", "22F190"] {
            print!("\n   > {command}\n      ");
            for &byte in command.as_bytes() {
                input.send(byte).await;
            }
            input.send(b'\r').await;
            tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        }
        println!();
    };

    tokio::select! {
        _ = script => {}
        _ = host.drive() => {}
        _ = tx.drive() => {}
        _ = rx.drive() => {}
        _ = ecu => {}
    }

    println!("\n3. Counters");
    println!("   RX overflow: {}", manager.rx_overflow_count(0));
    println!("   TX overflow: {}", manager.tx_overflow_count(0));
    match elm.status().await {
        Some(status) => println!("   adaptive timeout: {} ms", status.session.timeout_ms),
        None => println!("   session busy"),
    }
}
