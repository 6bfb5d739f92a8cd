//! Abstraction traits used by the transport layer and the protocol adapters
//! (CAN controller, clock, settings store, host byte sink, frame consumers).
pub mod can_controller;
pub mod clock;
pub mod frame_consumer;
pub mod host_sink;
pub mod settings_store;
