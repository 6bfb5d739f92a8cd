//! Fan-out abstraction for frames dequeued by the receive dispatcher.
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Component interested in inbound frames (bridge, emulator, other protocol adapters).
pub trait FrameConsumer {
    /// Handle one frame received on `bus`; returns whether the frame was used.
    fn consume<'a>(&'a self, bus: u8, frame: &'a CanFrame) -> impl Future<Output = bool> + 'a;
}

/// Chains two consumers; both always see the frame.
impl<A: FrameConsumer, B: FrameConsumer> FrameConsumer for (A, B) {
    fn consume<'a>(&'a self, bus: u8, frame: &'a CanFrame) -> impl Future<Output = bool> + 'a {
        async move {
            let first = self.0.consume(bus, frame).await;
            let second = self.1.consume(bus, frame).await;
            first || second
        }
    }
}

/// No consumer attached.
impl FrameConsumer for () {
    fn consume<'a>(&'a self, _bus: u8, _frame: &'a CanFrame) -> impl Future<Output = bool> + 'a {
        core::future::ready(false)
    }
}

impl<T: FrameConsumer + ?Sized> FrameConsumer for &T {
    fn consume<'a>(&'a self, bus: u8, frame: &'a CanFrame) -> impl Future<Output = bool> + 'a {
        (**self).consume(bus, frame)
    }
}
