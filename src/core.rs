//! Defines the data contract between the transport core and the flash-backed
//! settings store: per-bus configuration, the fixed-size persisted record, and
//! controller statistics.
//!
//! The record is written in full on every mutation and read once at startup, so its
//! byte layout is fixed:
//!
//! ```text
//! offset 0        bus_count: u8
//! offset 1 + 6*i  enabled: u8 | listen_only: u8 | bitrate: u32 (little-endian)
//! ```
use crate::error::SettingsError;
use crate::protocol::transport::{DEFAULT_BITRATE, MAX_BITRATE, MAX_BUSSES};

/// Encoded size of one [`BusConfig`] entry.
pub const BUS_CONFIG_BYTES: usize = 6;
/// Encoded size of a complete [`CanSettings`] record.
pub const CAN_SETTINGS_BYTES: usize = 1 + MAX_BUSSES * BUS_CONFIG_BYTES;

/// Configuration of one physical bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Controller running.
    pub enabled: bool,
    /// Receive only; transmission is refused.
    pub listen_only: bool,
    /// Bitrate in bits/second, clamped to [`MAX_BITRATE`].
    pub bitrate: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BusConfig {
    /// Disabled bus at the default bitrate.
    pub const fn new() -> Self {
        Self {
            enabled: false,
            listen_only: false,
            bitrate: DEFAULT_BITRATE,
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        out[0] = self.enabled as u8;
        out[1] = self.listen_only as u8;
        out[2..6].copy_from_slice(&self.bitrate.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        let bitrate = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        Self {
            enabled: bytes[0] != 0,
            listen_only: bytes[1] != 0,
            bitrate: clamp_bitrate(bitrate),
        }
    }
}

/// Clamp a requested bitrate to what the software controller can drive.
#[inline]
pub fn clamp_bitrate(bitrate: u32) -> u32 {
    bitrate.min(MAX_BITRATE)
}

/// Persisted CAN settings: configured bus count plus one entry per possible bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanSettings {
    pub bus_count: u8,
    pub bus_config: [BusConfig; MAX_BUSSES],
}

impl Default for CanSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl CanSettings {
    /// One configured bus, every entry disabled at the default bitrate.
    pub const fn new() -> Self {
        Self {
            bus_count: 1,
            bus_config: [BusConfig::new(); MAX_BUSSES],
        }
    }

    /// Serialize into the fixed record layout.
    pub fn to_bytes(&self) -> [u8; CAN_SETTINGS_BYTES] {
        let mut out = [0u8; CAN_SETTINGS_BYTES];
        out[0] = self.bus_count;
        for (i, config) in self.bus_config.iter().enumerate() {
            let start = 1 + i * BUS_CONFIG_BYTES;
            config.write_to(&mut out[start..start + BUS_CONFIG_BYTES]);
        }
        out
    }

    /// Decode a stored record. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SettingsError> {
        if bytes.len() < CAN_SETTINGS_BYTES {
            return Err(SettingsError::TooShort {
                asked: CAN_SETTINGS_BYTES,
                available: bytes.len(),
            });
        }
        let bus_count = bytes[0];
        if bus_count == 0 || bus_count as usize > MAX_BUSSES {
            return Err(SettingsError::InvalidBusCount { count: bus_count });
        }

        let mut settings = Self {
            bus_count,
            ..Self::new()
        };
        for (i, config) in settings.bus_config.iter_mut().enumerate() {
            let start = 1 + i * BUS_CONFIG_BYTES;
            *config = BusConfig::read_from(&bytes[start..start + BUS_CONFIG_BYTES]);
        }
        Ok(settings)
    }
}

/// Counters maintained by the software CAN controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerStats {
    pub rx_total: u32,
    pub tx_total: u32,
    pub tx_attempt: u32,
    pub parse_error: u32,
}
