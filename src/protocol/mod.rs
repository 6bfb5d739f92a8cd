//! High-level components of the gateway: the CAN transport core and the
//! ELM327/OBD-II emulation engine layered on top of it.
pub mod elm327;
pub mod transport;
