//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (bus configuration, persisted
//! record decoding, state machine construction, emulator command handling).
use thiserror_no_std::Error;

//==================================================================================TRANSPORT_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures reported by the CAN transport core.
pub enum TransportError {
    /// Bus index is not below the configured bus count.
    #[error("Invalid bus index {bus}")]
    InvalidBus { bus: u8 },
    /// The bus controller is not running.
    #[error("Bus {bus} is not enabled")]
    BusDisabled { bus: u8 },
    /// The bus only listens; transmission is refused.
    #[error("Bus {bus} is listen-only")]
    ListenOnly { bus: u8 },
    /// TX queue still full after the bounded wait; the frame was dropped.
    #[error("TX queue of bus {bus} is full")]
    QueueFull { bus: u8 },
    /// No frame buffered on the RX queue.
    #[error("RX queue of bus {bus} is empty")]
    QueueEmpty { bus: u8 },
    /// A guarded resource could not be locked within its bound.
    #[error("Lock not acquired in time")]
    LockTimeout,
    /// Bitrate changes requested by protocol adapters are locked out.
    #[error("Bitrate changes are locked")]
    BitrateLocked,
    /// The settings store refused the write. The in-memory state stays authoritative.
    #[error("Settings persistence failed")]
    Persist,
    /// Requested bus count is outside `1..=MAX_BUSSES`.
    #[error("Invalid bus count {count}")]
    InvalidBusCount { count: u8 },
    /// The controller refused to start or to transmit.
    #[error("Controller fault on bus {bus}")]
    ControllerFault { bus: u8 },
}

//==================================================================================SETTINGS_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while decoding a persisted settings record.
pub enum SettingsError {
    /// Stored record is shorter than the fixed layout.
    #[error("Record too short -> asked: {asked}, available: {available}")]
    TooShort { asked: usize, available: usize },
    /// Stored bus count is zero or above the compile-time maximum.
    #[error("Invalid stored bus count {count}")]
    InvalidBusCount { count: u8 },
}

//==================================================================================STATE_MACHINE_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Configuration bugs detected while assembling a state machine.
pub enum StateMachineError {
    /// Two registered states share the same identity.
    #[error("Duplicate state identity")]
    DuplicateState,
    /// The initial identity has no registered state.
    #[error("Initial state is not registered")]
    UnknownInitial,
    /// A state declares a transition target that is not registered.
    #[error("Transition target is not registered")]
    UnknownTarget,
    /// Registry capacity exceeded.
    #[error("Too many states for the registry capacity")]
    Capacity,
}

//==================================================================================ELM_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors surfaced by the ELM327 emulator.
pub enum ElmError {
    /// Command is neither an AT/ST command nor a well-formed PID request.
    #[error("Invalid command")]
    InvalidCommand,
    /// The request frame could not be queued on the bus.
    #[error("CAN send failed: {0}")]
    SendFailed(TransportError),
    /// The session lock was contended past its bound.
    #[error("Session lock not acquired in time")]
    LockTimeout,
}
