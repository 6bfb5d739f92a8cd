/// Test doubles for the controller, settings store, clock and host sink used by the
/// integration tests.
use cangate::core::ControllerStats;
use cangate::protocol::transport::{
    bus_manager::BusManager,
    can_frame::CanFrame,
    traits::{
        can_controller::CanController,
        clock::Clock,
        host_sink::HostSink,
        settings_store::{SettingsKey, SettingsStore},
    },
};
use embassy_time::{Duration, Instant};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

//==================================================================================CONTROLLER
#[derive(Debug, Default)]
/// Everything a mock controller was asked to do.
pub struct ControllerLog {
    pub interrupts_installed: u32,
    pub starts: Vec<u32>,
    pub stops: u32,
    pub running: bool,
    pub transmitted: Vec<CanFrame>,
    pub fail_start: bool,
}

#[derive(Clone, Default)]
/// Controller recording its calls; clones share the same log.
pub struct MockController {
    pub log: Arc<Mutex<ControllerLog>>,
}

impl MockController {
    pub fn transmitted(&self) -> Vec<CanFrame> {
        self.log.lock().unwrap().transmitted.clone()
    }

    pub fn starts(&self) -> Vec<u32> {
        self.log.lock().unwrap().starts.clone()
    }

    pub fn is_running(&self) -> bool {
        self.log.lock().unwrap().running
    }
}

impl CanController for MockController {
    type Error = ();

    fn install_interrupt(&mut self, _bus: u8) {
        self.log.lock().unwrap().interrupts_installed += 1;
    }

    fn start(&mut self, bitrate: u32) -> Result<(), ()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_start {
            return Err(());
        }
        log.starts.push(bitrate);
        log.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.running = false;
    }

    async fn transmit<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), ()> {
        self.log.lock().unwrap().transmitted.push(*frame);
        Ok(())
    }

    fn statistics(&self) -> ControllerStats {
        let log = self.log.lock().unwrap();
        ControllerStats {
            tx_total: log.transmitted.len() as u32,
            tx_attempt: log.transmitted.len() as u32,
            ..ControllerStats::default()
        }
    }
}

//==================================================================================STORE
#[derive(Debug, Default)]
pub struct StoreState {
    pub records: HashMap<SettingsKey, Vec<u8>>,
    pub writes: Vec<SettingsKey>,
    pub fail_writes: bool,
}

#[derive(Clone, Default)]
/// In-memory settings store counting every write.
pub struct MemoryStore {
    pub state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn writes_of(&self, key: SettingsKey) -> usize {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|k| **k == key)
            .count()
    }

    pub fn record(&self, key: SettingsKey) -> Option<Vec<u8>> {
        self.state.lock().unwrap().records.get(&key).cloned()
    }

    pub fn preload(&self, key: SettingsKey, data: &[u8]) {
        self.state.lock().unwrap().records.insert(key, data.to_vec());
    }
}

impl SettingsStore for MemoryStore {
    type Error = ();

    fn load(&mut self, key: SettingsKey, buf: &mut [u8]) -> Result<usize, ()> {
        let state = self.state.lock().unwrap();
        let record = state.records.get(&key).ok_or(())?;
        let len = record.len().min(buf.len());
        buf[..len].copy_from_slice(&record[..len]);
        Ok(len)
    }

    fn store(&mut self, key: SettingsKey, data: &[u8]) -> Result<(), ()> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(key);
        if state.fail_writes {
            return Err(());
        }
        state.records.insert(key, data.to_vec());
        Ok(())
    }
}

//==================================================================================CLOCK
#[derive(Clone, Default)]
/// Manually advanced clock. Delays yield once to the runtime and then elapse, so
/// bounded waits on a pending future time out immediately.
pub struct MockClock {
    now_ms: Arc<AtomicU64>,
}

impl MockClock {
    pub fn advance(&self, millis: u64) {
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    async fn delay(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

//==================================================================================SINK
#[derive(Clone, Default)]
/// Host sink capturing every byte written by the emulator.
pub struct CaptureSink {
    out: Arc<Mutex<Vec<u8>>>,
}

impl CaptureSink {
    /// Output written since the previous call.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.out.lock().unwrap());
        String::from_utf8(bytes).unwrap()
    }
}

impl HostSink for CaptureSink {
    fn write(&mut self, bytes: &[u8]) {
        self.out.lock().unwrap().extend_from_slice(bytes);
    }
}

//==================================================================================RIG
pub type TestManager = BusManager<MockController, MemoryStore, MockClock>;

/// Handles sharing state with the collaborators moved into a manager.
pub struct Rig {
    pub controllers: [MockController; 3],
    pub store: MemoryStore,
    pub clock: MockClock,
}

/// Fresh manager over mock collaborators, configuration not yet loaded.
pub fn rig() -> (TestManager, Rig) {
    let rig = Rig {
        controllers: Default::default(),
        store: MemoryStore::default(),
        clock: MockClock::default(),
    };
    let manager = BusManager::new(rig.controllers.clone(), rig.store.clone(), rig.clock.clone());
    (manager, rig)
}

/// Manager with `count` buses configured and every one enabled at 500 kbit/s.
pub async fn enabled_rig(count: u8) -> (TestManager, Rig) {
    let (manager, rig) = rig();
    manager.set_num_busses(count).await.unwrap();
    for bus in 0..count {
        manager.enable(bus, 500_000).await.unwrap();
    }
    (manager, rig)
}
