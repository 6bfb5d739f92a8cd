//! Infrastructure shared by the transport and the protocol decoders.
pub mod bounded;
pub mod hex;
pub mod state_machine;
