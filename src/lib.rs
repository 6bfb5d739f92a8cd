//! `cangate` library: the core of a multi-bus CAN gateway running in a `no_std`
//! environment. The crate exposes the infrastructure modules (state machine engine,
//! hex helpers), the CAN transport layer (bus queues, persisted configuration, bridge,
//! runners), and the ELM327 OBD-II emulator built on top of it.
#![no_std]
//==================================================================================
/// Plain data types shared across the transport and the protocol adapters.
pub mod core;
/// Errors for the transport, settings, state machine, and emulator layers.
pub mod error;
/// Reusable building blocks: byte-driven state machine engine and hex helpers.
pub mod infra;
/// CAN transport core and the ELM327 emulation engine.
pub mod protocol;
//==================================================================================
