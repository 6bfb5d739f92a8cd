//! Bus manager: owns one software CAN controller per physical bus and turns its
//! interrupt-driven frame events into a safe, queryable, bus-addressable resource.
//!
//! * Interrupt context only calls [`BusManager::on_frame_received`]: a non-blocking
//!   enqueue on the bus RX queue, with an overflow counter when the queue is full.
//! * Tasks enqueue outbound frames with [`BusManager::send`]; the
//!   [`TxRunner`](crate::protocol::transport::runner::TxRunner) drains them.
//! * Configuration mutators update the in-memory [`CanSettings`] copy first, then
//!   rewrite the full persisted record under the bounded settings lock. A failed write
//!   is logged and never rolled back.
//!
//! Firmware provides the controllers, the settings store, and the clock. No allocation
//! is performed by the library.
use core::cell::Cell;

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex as BlockingMutex},
    channel::Channel,
    mutex::{Mutex, MutexGuard},
};

use crate::core::{clamp_bitrate, BusConfig, CanSettings, ControllerStats, CAN_SETTINGS_BYTES};
use crate::error::TransportError;
use crate::infra::bounded::within;
use crate::protocol::transport::{
    can_frame::CanFrame,
    traits::{
        can_controller::CanController,
        clock::Clock,
        settings_store::{SettingsKey, SettingsStore},
    },
    CAN_QUEUE_SIZE, CONTROLLER_LOCK_TIMEOUT_MS, MAX_BUSSES, RX_POLL_TIMEOUT_MS,
    SETTINGS_LOCK_TIMEOUT_MS, TX_ENQUEUE_TIMEOUT_MS,
};

type FrameQueue = Channel<CriticalSectionRawMutex, CanFrame, CAN_QUEUE_SIZE>;
type Counter = BlockingMutex<CriticalSectionRawMutex, Cell<u32>>;

/// Controller plus its lifetime flags.
struct BusSlot<C> {
    controller: C,
    interrupt_installed: bool,
    running: bool,
}

/// Transport core shared by every task of the gateway.
pub struct BusManager<C: CanController, S: SettingsStore, K: Clock> {
    slots: [Mutex<CriticalSectionRawMutex, BusSlot<C>>; MAX_BUSSES],
    rx_queues: [FrameQueue; MAX_BUSSES],
    tx_queues: [FrameQueue; MAX_BUSSES],
    rx_overflow: [Counter; MAX_BUSSES],
    tx_overflow: [Counter; MAX_BUSSES],
    config: BlockingMutex<CriticalSectionRawMutex, Cell<CanSettings>>,
    baud_lockout: BlockingMutex<CriticalSectionRawMutex, Cell<bool>>,
    store: Mutex<CriticalSectionRawMutex, S>,
    clock: K,
}

impl<C, S, K> BusManager<C, S, K>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
{
    /// Wrap the controllers (indexed by bus), the settings store, and the clock.
    ///
    /// The configuration starts at defaults; call [`BusManager::load_settings`] once at
    /// startup to restore the persisted record.
    pub fn new(controllers: [C; MAX_BUSSES], store: S, clock: K) -> Self {
        Self {
            slots: controllers.map(|controller| {
                Mutex::new(BusSlot {
                    controller,
                    interrupt_installed: false,
                    running: false,
                })
            }),
            rx_queues: core::array::from_fn(|_| Channel::new()),
            tx_queues: core::array::from_fn(|_| Channel::new()),
            rx_overflow: core::array::from_fn(|_| BlockingMutex::new(Cell::new(0))),
            tx_overflow: core::array::from_fn(|_| BlockingMutex::new(Cell::new(0))),
            config: BlockingMutex::new(Cell::new(CanSettings::new())),
            baud_lockout: BlockingMutex::new(Cell::new(false)),
            store: Mutex::new(store),
            clock,
        }
    }

    /// Clock shared with the protocol adapters.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    //==================================================================================STARTUP
    /// Restore the persisted configuration and start every bus stored as enabled.
    ///
    /// A missing or invalid record keeps the defaults (one bus, everything disabled).
    pub async fn load_settings(&self) {
        let mut buf = [0u8; CAN_SETTINGS_BYTES];
        let mut lockout = [0u8; 1];

        let (settings_read, lockout_read) = {
            let Some(mut store) =
                within(&self.clock, SETTINGS_LOCK_TIMEOUT_MS, self.store.lock()).await
            else {
                #[cfg(feature = "defmt")]
                defmt::error!("CAN: settings lock timeout while loading, using defaults");
                return;
            };
            (
                store.load(SettingsKey::CanSettings, &mut buf),
                store.load(SettingsKey::BaudLockout, &mut lockout),
            )
        };

        let stored = match settings_read {
            Ok(len) => match CanSettings::from_bytes(&buf[..len.min(buf.len())]) {
                Ok(settings) => settings,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("CAN: stored settings invalid ({}), using defaults", _err);
                    CanSettings::new()
                }
            },
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("CAN: no stored settings, using defaults");
                CanSettings::new()
            }
        };

        if let Ok(1) = lockout_read {
            self.baud_lockout.lock(|cell| cell.set(lockout[0] != 0));
        }

        // Buses are marked running only once their controller actually started.
        let mut initial = stored;
        for config in initial.bus_config.iter_mut() {
            config.enabled = false;
        }
        self.set_config(initial);

        for bus in 0..stored.bus_count {
            let config = stored.bus_config[bus as usize];
            if config.enabled && self.start_controller(bus, config.bitrate).await.is_ok() {
                self.update_config(|s| s.bus_config[bus as usize].enabled = true);
            }
        }
    }

    //==================================================================================QUERIES
    /// Snapshot of the in-memory configuration.
    pub fn settings(&self) -> CanSettings {
        self.config.lock(|cell| cell.get())
    }

    /// Number of configured buses.
    pub fn num_busses(&self) -> u8 {
        self.settings().bus_count
    }

    /// Configuration of `bus`, `None` when the index is not configured.
    pub fn bus_config(&self, bus: u8) -> Option<BusConfig> {
        let settings = self.settings();
        (bus < settings.bus_count).then(|| settings.bus_config[bus as usize])
    }

    pub fn is_enabled(&self, bus: u8) -> bool {
        self.bus_config(bus).is_some_and(|c| c.enabled)
    }

    pub fn get_bitrate(&self, bus: u8) -> Option<u32> {
        self.bus_config(bus).map(|c| c.bitrate)
    }

    pub fn is_listen_only(&self, bus: u8) -> bool {
        self.bus_config(bus).is_some_and(|c| c.listen_only)
    }

    /// Whether protocol adapters are prevented from changing bitrates.
    pub fn baudrate_lockout(&self) -> bool {
        self.baud_lockout.lock(|cell| cell.get())
    }

    /// Frames waiting on the RX queue of `bus` (0 for an unknown bus).
    pub fn rx_buffered_frames(&self, bus: u8) -> usize {
        self.rx_queues.get(bus as usize).map_or(0, |q| q.len())
    }

    /// Frames waiting on the TX queue of `bus` (0 for an unknown bus).
    pub fn tx_buffered_frames(&self, bus: u8) -> usize {
        self.tx_queues.get(bus as usize).map_or(0, |q| q.len())
    }

    /// Frames dropped in interrupt context because the RX queue was full.
    pub fn rx_overflow_count(&self, bus: u8) -> u32 {
        self.rx_overflow
            .get(bus as usize)
            .map_or(0, |c| c.lock(|cell| cell.get()))
    }

    /// Frames refused by [`BusManager::send`] because the TX queue stayed full.
    pub fn tx_overflow_count(&self, bus: u8) -> u32 {
        self.tx_overflow
            .get(bus as usize)
            .map_or(0, |c| c.lock(|cell| cell.get()))
    }

    /// Controller counters for `bus`.
    pub async fn statistics(&self, bus: u8) -> Result<ControllerStats, TransportError> {
        let index = self.check_bus(bus)?;
        let slot = self.lock_slot(index).await?;
        Ok(slot.controller.statistics())
    }

    //==================================================================================MUTATORS
    /// Start `bus` at `bitrate` and persist. An already enabled bus is restarted at
    /// the new bitrate.
    pub async fn enable(&self, bus: u8, bitrate: u32) -> Result<(), TransportError> {
        let index = self.check_bus(bus)?;
        let bitrate = clamp_bitrate(bitrate);
        self.start_controller(bus, bitrate).await?;

        self.update_config(|s| {
            s.bus_config[index].enabled = true;
            s.bus_config[index].bitrate = bitrate;
        });
        #[cfg(feature = "defmt")]
        defmt::info!("CAN{}: enabled at {} bit/s", bus, bitrate);
        self.persist_settings().await;
        Ok(())
    }

    /// Stop `bus`; persists only when the stored state changes.
    pub async fn disable(&self, bus: u8) -> Result<(), TransportError> {
        let index = self.check_bus(bus)?;
        {
            let mut slot = self.lock_slot(index).await?;
            if slot.running {
                slot.controller.stop();
                slot.running = false;
            }
        }

        let changed = self.update_config(|s| {
            let was_enabled = s.bus_config[index].enabled;
            s.bus_config[index].enabled = false;
            was_enabled
        });
        if changed {
            #[cfg(feature = "defmt")]
            defmt::info!("CAN{}: disabled", bus);
            self.persist_settings().await;
        }
        Ok(())
    }

    /// Change the bitrate of `bus`. A running controller is restarted; the stored rate
    /// is persisted when it changes.
    pub async fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), TransportError> {
        let index = self.check_bus(bus)?;
        let bitrate = clamp_bitrate(bitrate);
        let config = self.settings().bus_config[index];

        if config.enabled {
            self.start_controller(bus, bitrate).await?;
        }
        if config.bitrate != bitrate {
            self.update_config(|s| s.bus_config[index].bitrate = bitrate);
            self.persist_settings().await;
        }
        Ok(())
    }

    /// Bitrate change requested by a protocol adapter; refused while the lockout is on.
    pub async fn request_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), TransportError> {
        if self.baudrate_lockout() {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN{}: bitrate change to {} refused, lockout active", bus, bitrate);
            return Err(TransportError::BitrateLocked);
        }
        self.set_bitrate(bus, bitrate).await
    }

    /// Toggle listen-only mode; persists only on change and leaves the controller running.
    pub async fn set_listen_only(&self, bus: u8, listen_only: bool) -> Result<(), TransportError> {
        let index = self.check_bus(bus)?;
        let changed = self.update_config(|s| {
            let changed = s.bus_config[index].listen_only != listen_only;
            s.bus_config[index].listen_only = listen_only;
            changed
        });
        if changed {
            self.persist_settings().await;
        }
        Ok(())
    }

    /// Change the number of configured buses (`1..=MAX_BUSSES`). Buses beyond the new
    /// count are stopped.
    pub async fn set_num_busses(&self, count: u8) -> Result<(), TransportError> {
        if count == 0 || count as usize > MAX_BUSSES {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN: invalid bus count {}", count);
            return Err(TransportError::InvalidBusCount { count });
        }
        let previous = self.num_busses();
        if previous == count {
            return Ok(());
        }

        for index in count as usize..MAX_BUSSES {
            if let Ok(mut slot) = self.lock_slot(index).await {
                if slot.running {
                    slot.controller.stop();
                    slot.running = false;
                }
            }
        }
        self.update_config(|s| {
            s.bus_count = count;
            for config in s.bus_config[count as usize..].iter_mut() {
                config.enabled = false;
            }
        });
        self.persist_settings().await;
        Ok(())
    }

    /// Enable or disable the bitrate lockout and persist it.
    pub async fn set_baudrate_lockout(&self, locked: bool) {
        let changed = self.baud_lockout.lock(|cell| cell.replace(locked) != locked);
        if changed {
            self.persist_record(SettingsKey::BaudLockout, &[locked as u8])
                .await
                .ok();
        }
    }

    //==================================================================================DATA_PATH
    /// Queue `frame` for transmission on `bus`, waiting a bounded time for room.
    pub async fn send(&self, bus: u8, frame: &CanFrame) -> Result<(), TransportError> {
        let index = self.check_bus(bus)?;
        let config = self.settings().bus_config[index];
        if !config.enabled {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN{}: send refused, bus not enabled", bus);
            return Err(TransportError::BusDisabled { bus });
        }
        if config.listen_only {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN{}: send refused, bus is listen-only", bus);
            return Err(TransportError::ListenOnly { bus });
        }

        let queue = &self.tx_queues[index];
        match within(&self.clock, TX_ENQUEUE_TIMEOUT_MS, queue.send(*frame)).await {
            Some(()) => Ok(()),
            None => {
                self.tx_overflow[index].lock(|c| c.set(c.get().wrapping_add(1)));
                #[cfg(feature = "defmt")]
                defmt::error!("CAN{}: TX queue full, frame dropped", bus);
                Err(TransportError::QueueFull { bus })
            }
        }
    }

    /// Poll the RX queue of `bus` with a short wait; returns the frame and the number
    /// of frames still buffered.
    pub async fn receive(&self, bus: u8) -> Result<(CanFrame, usize), TransportError> {
        let index = self.check_bus(bus)?;
        let queue = &self.rx_queues[index];
        match within(&self.clock, RX_POLL_TIMEOUT_MS, queue.receive()).await {
            Some(frame) => Ok((frame, queue.len())),
            None => Err(TransportError::QueueEmpty { bus }),
        }
    }

    /// Non-blocking variant of [`BusManager::receive`].
    pub fn try_receive(&self, bus: u8) -> Result<(CanFrame, usize), TransportError> {
        let index = self.check_bus(bus)?;
        let queue = &self.rx_queues[index];
        queue
            .try_receive()
            .map(|frame| (frame, queue.len()))
            .map_err(|_| TransportError::QueueEmpty { bus })
    }

    /// Interrupt handler entry point: enqueue one received frame without blocking.
    ///
    /// Returns `false` when the frame was dropped (queue full or unknown bus); the
    /// overflow counter is incremented in that case.
    pub fn on_frame_received(&self, bus: u8, frame: CanFrame) -> bool {
        let index = bus as usize;
        let Some(queue) = self.rx_queues.get(index) else {
            return false;
        };
        if queue.try_send(frame).is_ok() {
            true
        } else {
            self.rx_overflow[index].lock(|c| c.set(c.get().wrapping_add(1)));
            false
        }
    }

    //==================================================================================RUNNER_SUPPORT
    /// Next frame waiting for transmission on `bus`.
    pub(crate) fn next_tx(&self, bus: u8) -> Option<CanFrame> {
        self.tx_queues.get(bus as usize)?.try_receive().ok()
    }

    /// Hand one dequeued frame to the controller of `bus`.
    pub(crate) async fn transmit(&self, bus: u8, frame: &CanFrame) -> Result<(), TransportError> {
        let mut slot = self.lock_slot(bus as usize).await?;
        if !slot.running {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN{}: dropping queued frame, controller stopped", bus);
            return Err(TransportError::BusDisabled { bus });
        }
        slot.controller.transmit(frame).await.map_err(|_err| {
            #[cfg(feature = "defmt")]
            defmt::error!("CAN{}: failed to transmit frame", bus);
            TransportError::ControllerFault { bus }
        })
    }

    //==================================================================================PERSISTENCE
    /// Write `data` under `key` while holding the bounded settings lock.
    pub(crate) async fn persist_record(
        &self,
        key: SettingsKey,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let Some(mut store) =
            within(&self.clock, SETTINGS_LOCK_TIMEOUT_MS, self.store.lock()).await
        else {
            #[cfg(feature = "defmt")]
            defmt::error!("CAN: settings lock timeout, {} not persisted", key);
            return Err(TransportError::LockTimeout);
        };
        store.store(key, data).map_err(|_err| {
            #[cfg(feature = "defmt")]
            defmt::error!("CAN: failed to persist {}", key);
            TransportError::Persist
        })
    }

    /// Read the record stored under `key`.
    pub(crate) async fn load_record(
        &self,
        key: SettingsKey,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let Some(mut store) =
            within(&self.clock, SETTINGS_LOCK_TIMEOUT_MS, self.store.lock()).await
        else {
            return Err(TransportError::LockTimeout);
        };
        store.load(key, buf).map_err(|_| TransportError::Persist)
    }

    /// Rewrite the full CAN settings record. The snapshot is taken under the store
    /// lock so concurrent mutators resolve last-writer-wins.
    async fn persist_settings(&self) {
        let Some(mut store) =
            within(&self.clock, SETTINGS_LOCK_TIMEOUT_MS, self.store.lock()).await
        else {
            #[cfg(feature = "defmt")]
            defmt::error!("CAN: settings lock timeout, configuration not persisted");
            return;
        };
        let bytes = self.settings().to_bytes();
        if store.store(SettingsKey::CanSettings, &bytes).is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("CAN: failed to persist settings");
        }
    }

    //==================================================================================INTERNALS
    fn check_bus(&self, bus: u8) -> Result<usize, TransportError> {
        if bus < self.num_busses() {
            Ok(bus as usize)
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("CAN: invalid bus index {}", bus);
            Err(TransportError::InvalidBus { bus })
        }
    }

    async fn lock_slot(
        &self,
        index: usize,
    ) -> Result<MutexGuard<'_, CriticalSectionRawMutex, BusSlot<C>>, TransportError> {
        within(&self.clock, CONTROLLER_LOCK_TIMEOUT_MS, self.slots[index].lock())
            .await
            .ok_or(TransportError::LockTimeout)
    }

    /// (Re)start the controller: install the interrupt on first use, stop if running,
    /// start at `bitrate`. On failure the bus is marked disabled.
    async fn start_controller(&self, bus: u8, bitrate: u32) -> Result<(), TransportError> {
        let mut slot = self.lock_slot(bus as usize).await?;
        if !slot.interrupt_installed {
            slot.controller.install_interrupt(bus);
            slot.interrupt_installed = true;
        }
        if slot.running {
            slot.controller.stop();
            slot.running = false;
        }
        if slot.controller.start(bitrate).is_ok() {
            slot.running = true;
            return Ok(());
        }
        drop(slot);
        #[cfg(feature = "defmt")]
        defmt::error!("CAN{}: controller failed to start at {} bit/s", bus, bitrate);

        // The controller is down now; an enabled bus must stop accepting frames.
        let was_enabled = self.update_config(|s| {
            let config = &mut s.bus_config[bus as usize];
            core::mem::replace(&mut config.enabled, false)
        });
        if was_enabled {
            self.persist_settings().await;
        }
        Err(TransportError::ControllerFault { bus })
    }

    fn set_config(&self, settings: CanSettings) {
        self.config.lock(|cell| cell.set(settings));
    }

    fn update_config<R>(&self, f: impl FnOnce(&mut CanSettings) -> R) -> R {
        self.config.lock(|cell| {
            let mut settings = cell.get();
            let result = f(&mut settings);
            cell.set(settings);
            result
        })
    }
}
