//! CAN transport layer: frame and identifier representations, hardware and
//! collaborator traits, the bus manager owning per-bus queues and persisted
//! configuration, the bus-to-bus bridge, and the TX/RX runners.
//!
//! ## Transport Limits and Timing Constants
//!
//! These constants size the per-bus queues and bound every wait performed by the
//! transport. All waits degrade to "drop and log" once exceeded.

pub mod bridge;
pub mod bus_manager;
pub mod can_frame;
pub mod can_id;
pub mod runner;
pub mod traits;

#[cfg(test)]
pub(crate) mod mocks;

/// Compile-time maximum number of physical buses.
pub const MAX_BUSSES: usize = 3;

/// Depth of each bus's RX and TX queue (frames).
///
/// Excess frames are dropped and counted, never buffered unboundedly.
pub const CAN_QUEUE_SIZE: usize = 64;

/// Highest bitrate the software controller can drive (bits/second).
pub const MAX_BITRATE: u32 = 1_000_000;

/// Bitrate used for buses without a stored configuration (bits/second).
pub const DEFAULT_BITRATE: u32 = 500_000;

/// Bounded wait when enqueueing onto a full TX queue (ms).
///
/// Once elapsed the frame is dropped and the caller receives
/// [`TransportError::QueueFull`](crate::error::TransportError::QueueFull) as backpressure.
pub const TX_ENQUEUE_TIMEOUT_MS: u64 = 10;

/// Short wait applied when polling an empty RX queue (ms).
pub const RX_POLL_TIMEOUT_MS: u64 = 1;

/// Sleep of the TX runner after a full pass without pending output (ms).
///
/// Keeps the transport task from busy-polling the queues.
pub const TX_IDLE_DELAY_MS: u64 = 1;

/// Sleep of the RX dispatcher after a pass without inbound frames (ms).
pub const RX_IDLE_DELAY_MS: u64 = 1;

/// Bound on the settings store lock (ms).
///
/// Persistence is skipped (and logged) when the lock is not acquired in time; the
/// in-memory configuration stays authoritative.
pub const SETTINGS_LOCK_TIMEOUT_MS: u64 = 100;

/// Bound on the bridge pair lock (ms).
pub const BRIDGE_LOCK_TIMEOUT_MS: u64 = 10;

/// Bound on a bus controller lock taken from configuration calls (ms).
pub const CONTROLLER_LOCK_TIMEOUT_MS: u64 = 100;
