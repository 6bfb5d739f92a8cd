//! Long-running transport tasks.
//!
//! * [`TxRunner`] owns all outbound draining: one round-robin pass over the TX queues
//!   of every configured bus, handing each frame to its controller.
//! * [`RxDispatcher`] dequeues inbound frames and fans them out to a
//!   [`FrameConsumer`] chain, typically `(bridge, emulator)`.
//!
//! Both expose a single-pass `pump_once` (used by tests and cooperative firmware loops)
//! and a never-returning `drive` meant to be spawned as its own task.
use crate::protocol::transport::{
    bus_manager::BusManager,
    traits::{
        can_controller::CanController, clock::Clock, frame_consumer::FrameConsumer,
        settings_store::SettingsStore,
    },
    RX_IDLE_DELAY_MS, TX_IDLE_DELAY_MS,
};

//==================================================================================TX_RUNNER
/// Transmit task: drains every bus TX queue into its controller.
pub struct TxRunner<'a, C: CanController, S: SettingsStore, K: Clock> {
    manager: &'a BusManager<C, S, K>,
}

impl<'a, C, S, K> TxRunner<'a, C, S, K>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
{
    pub fn new(manager: &'a BusManager<C, S, K>) -> Self {
        Self { manager }
    }

    /// Drain the queued frames of every configured bus once; returns whether any frame
    /// was dequeued.
    pub async fn pump_once(&self) -> bool {
        let mut busy = false;
        for bus in 0..self.manager.num_busses() {
            while let Some(frame) = self.manager.next_tx(bus) {
                busy = true;
                // Failures are logged by the manager; the frame is dropped either way.
                let _ = self.manager.transmit(bus, &frame).await;
            }
        }
        busy
    }

    /// Run forever, sleeping briefly whenever every queue is empty.
    pub async fn drive(&self) {
        #[cfg(feature = "defmt")]
        defmt::info!("CAN: TX runner started");
        loop {
            if !self.pump_once().await {
                self.manager.clock().delay_ms(TX_IDLE_DELAY_MS).await;
            }
        }
    }
}

//==================================================================================RX_DISPATCHER
/// Receive task: hands each inbound frame to the consumer chain.
pub struct RxDispatcher<'a, C: CanController, S: SettingsStore, K: Clock, F: FrameConsumer> {
    manager: &'a BusManager<C, S, K>,
    consumer: F,
}

impl<'a, C, S, K, F> RxDispatcher<'a, C, S, K, F>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    F: FrameConsumer,
{
    pub fn new(manager: &'a BusManager<C, S, K>, consumer: F) -> Self {
        Self { manager, consumer }
    }

    /// Dispatch every frame currently buffered on the configured buses; returns how
    /// many frames were dispatched.
    pub async fn pump_once(&self) -> usize {
        let mut dispatched = 0;
        for bus in 0..self.manager.num_busses() {
            while let Ok((frame, _remaining)) = self.manager.try_receive(bus) {
                self.consumer.consume(bus, &frame).await;
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Run forever, sleeping briefly whenever no frame arrived.
    pub async fn drive(&self) {
        #[cfg(feature = "defmt")]
        defmt::info!("CAN: RX dispatcher started");
        loop {
            if self.pump_once().await == 0 {
                self.manager.clock().delay_ms(RX_IDLE_DELAY_MS).await;
            }
        }
    }
}
