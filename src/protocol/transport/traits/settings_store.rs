//! Flash-backed key-value store holding the small persisted records of the
//! transport (bus configuration, bridge pair, bitrate lockout).

/// Identifies one persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsKey {
    /// Fixed-size [`CanSettings`](crate::core::CanSettings) record.
    CanSettings,
    /// Bridged bus pair, two bytes.
    Bridge,
    /// Bitrate lockout flag, one byte.
    BaudLockout,
}

/// Contract with the settings filesystem. Every record is written in full.
pub trait SettingsStore {
    type Error: core::fmt::Debug;

    /// Read the record stored under `key` into `buf`; returns the number of bytes read.
    fn load(&mut self, key: SettingsKey, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Replace the record stored under `key`.
    fn store(&mut self, key: SettingsKey, data: &[u8]) -> Result<(), Self::Error>;
}
