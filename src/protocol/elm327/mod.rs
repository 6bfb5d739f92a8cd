//! ELM327/OBD-II emulation layered on the CAN transport.
//!
//! The emulator interprets AT commands and hex PID requests typed by a diagnostic
//! application, sends the matching CAN requests, prints every ECU response in the
//! adapter's textual format, emits ISO-TP flow control for multi-frame answers, and
//! times out stalled exchanges with an adaptive estimator.
//!
//! ## Emulator Identity and Timing Constants

pub mod at_commands;
pub mod emulator;
pub mod format;
pub mod input;
pub mod session;
pub mod timing;

/// Functional broadcast header for 11-bit OBD-II requests.
pub const OBD2_11BIT_BROADCAST: u32 = 0x7DF;

/// Functional broadcast header for 29-bit OBD-II requests.
pub const OBD2_29BIT_BROADCAST: u32 = 0x18DB_33F1;

/// Identity printed by `ATZ` and `ATI`.
pub const ELM_ID: &str = "ELM327 v1.3a";

/// Identity printed by `AT@1`.
pub const OBDLINK_DESC: &str = "OBDLink MX";

/// Description printed by `AT@DESC` and `STDI`.
pub const DEVICE_DESC: &str = "cangate ELM327 Emulator";

/// Fixed battery voltage reported by `ATRV`.
pub const REPORTED_VOLTAGE: &str = "13.4V";

/// Response timeout of a fresh session (ms).
pub const DEFAULT_TIMEOUT_MS: u32 = 250;

/// Lower bound of the adaptive timeout (ms).
pub const MIN_TIMEOUT_MS: u32 = 55;

/// Upper bound of the adaptive timeout (ms).
pub const MAX_TIMEOUT_MS: u32 = 1500;

/// Floor applied to an explicit `ATST` timeout (ms).
pub const MIN_EXPLICIT_TIMEOUT_MS: u32 = 60;

/// Wait after the last response before assuming remaining ECUs stay silent (ms).
pub const RESPONSE_GRACE_MS: u64 = 250;

/// Bound on the session lock (ms). Contended frames and commands are dropped.
pub const SESSION_LOCK_TIMEOUT_MS: u64 = 10;

/// Wait for host input before polling the response timeout (ms).
pub const INPUT_POLL_TIMEOUT_MS: u64 = 10;

/// Capacity of the command line buffer (characters).
pub const LINE_CAPACITY: usize = 64;
