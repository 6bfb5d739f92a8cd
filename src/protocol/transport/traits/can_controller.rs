//! Minimal abstraction for one software CAN controller instance. Allows the
//! transport to plug into various implementations (PIO-driven controller, HAL
//! peripheral, desktop driver, test double).
use crate::core::ControllerStats;
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract between the transport core and the controller of one physical bus.
///
/// The receive path is interrupt-driven: the controller's interrupt handler hands each
/// arrived frame to [`BusManager::on_frame_received`], which never blocks or allocates.
///
/// [`BusManager::on_frame_received`]: super::super::bus_manager::BusManager::on_frame_received
pub trait CanController {
    type Error: core::fmt::Debug;

    /// Register the interrupt handler for `bus`. Called once per bus lifetime, on
    /// first enable, and never undone.
    fn install_interrupt(&mut self, bus: u8);

    /// Start the controller at `bitrate` bits/second.
    fn start(&mut self, bitrate: u32) -> Result<(), Self::Error>;

    /// Stop the controller. Stopping an idle controller is a no-op.
    fn stop(&mut self);

    /// Emit a frame on the bus.
    fn transmit<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;

    /// Snapshot of the controller counters.
    fn statistics(&self) -> ControllerStats;
}
