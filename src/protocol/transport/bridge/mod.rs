//! Symmetric bus-to-bus relay. While a pair of distinct buses is bridged, every frame
//! received on one side is re-queued unmodified on the other side's TX queue.
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::{Mutex, MutexGuard},
};

use crate::error::TransportError;
use crate::infra::bounded::within;
use crate::protocol::transport::{
    bus_manager::BusManager,
    can_frame::CanFrame,
    traits::{
        can_controller::CanController, clock::Clock, frame_consumer::FrameConsumer,
        settings_store::{SettingsKey, SettingsStore},
    },
    BRIDGE_LOCK_TIMEOUT_MS,
};

/// Active bridge pair. Equal indices mean bridging is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgePair(pub u8, pub u8);

impl BridgePair {
    pub const DISABLED: BridgePair = BridgePair(0, 0);

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0 != self.1
    }

    /// Opposite side of `bus`, when `bus` belongs to an active pair.
    pub fn peer(&self, bus: u8) -> Option<u8> {
        if !self.is_active() {
            None
        } else if bus == self.0 {
            Some(self.1)
        } else if bus == self.1 {
            Some(self.0)
        } else {
            None
        }
    }
}

/// Bridge bound to the transport it relays through.
pub struct CanBridge<'a, C: CanController, S: SettingsStore, K: Clock> {
    manager: &'a BusManager<C, S, K>,
    pair: Mutex<CriticalSectionRawMutex, BridgePair>,
}

impl<'a, C, S, K> CanBridge<'a, C, S, K>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
{
    /// Bridge starting disabled.
    pub fn new(manager: &'a BusManager<C, S, K>) -> Self {
        Self {
            manager,
            pair: Mutex::new(BridgePair::DISABLED),
        }
    }

    /// Restore the persisted pair. A missing or out-of-range record leaves bridging off.
    pub async fn load(&self) {
        let mut buf = [0u8; 2];
        let pair = match self.manager.load_record(SettingsKey::Bridge, &mut buf).await {
            Ok(2) => BridgePair(buf[0], buf[1]),
            _ => return,
        };
        let count = self.manager.num_busses();
        if pair.is_active() && (pair.0 >= count || pair.1 >= count) {
            #[cfg(feature = "defmt")]
            defmt::warn!("BRIDGE: stored pair {} out of range, ignored", pair);
            return;
        }
        match self.lock_pair().await {
            Ok(mut guard) => *guard = pair,
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::error!("BRIDGE: lock timeout, stored pair not restored");
            }
        }
    }

    /// Current pair.
    pub async fn bridge(&self) -> Result<BridgePair, TransportError> {
        self.lock_pair().await.map(|guard| *guard)
    }

    /// Replace the active pair and persist it. Any equal pair disables bridging.
    pub async fn set_bridge(&self, bus1: u8, bus2: u8) -> Result<(), TransportError> {
        let pair = BridgePair(bus1, bus2);
        if pair.is_active() {
            let count = self.manager.num_busses();
            for bus in [bus1, bus2] {
                if bus >= count {
                    return Err(TransportError::InvalidBus { bus });
                }
            }
        }

        *self.lock_pair().await? = pair;
        #[cfg(feature = "defmt")]
        if pair.is_active() {
            defmt::info!("BRIDGE: relaying {} <-> {}", bus1, bus2);
        } else {
            defmt::info!("BRIDGE: disabled");
        }
        self.manager
            .persist_record(SettingsKey::Bridge, &[bus1, bus2])
            .await
            .ok();
        Ok(())
    }

    /// Forward `frame` received on `bus` to the other side of the active pair.
    ///
    /// Returns whether the frame was queued on the peer bus.
    pub async fn handle(&self, bus: u8, frame: &CanFrame) -> bool {
        let Ok(pair) = self.bridge().await else {
            return false;
        };
        let Some(peer) = pair.peer(bus) else {
            return false;
        };
        self.manager.send(peer, frame).await.is_ok()
    }

    async fn lock_pair(
        &self,
    ) -> Result<MutexGuard<'_, CriticalSectionRawMutex, BridgePair>, TransportError> {
        match within(self.manager.clock(), BRIDGE_LOCK_TIMEOUT_MS, self.pair.lock()).await {
            Some(guard) => Ok(guard),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("BRIDGE: lock timeout");
                Err(TransportError::LockTimeout)
            }
        }
    }
}

impl<C, S, K> FrameConsumer for CanBridge<'_, C, S, K>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
{
    fn consume<'b>(
        &'b self,
        bus: u8,
        frame: &'b CanFrame,
    ) -> impl core::future::Future<Output = bool> + 'b {
        self.handle(bus, frame)
    }
}
