//! CAN arbitration identifier as carried on the wire by the software controller:
//! an 11- or 29-bit identifier with the extended (EFF) and remote-request (RTR)
//! flags stored in the reserved high bits.
//!
//! Flags must be stripped with [`CanId::raw`] before any arithmetic comparison.

//==================================================================================CAN_ID
/// Extended frame format flag (bit 31).
pub const CAN_ID_EFF: u32 = 1 << 31;
/// Remote transmission request flag (bit 30).
pub const CAN_ID_RTR: u32 = 1 << 30;
/// Mask of the usable 29-bit identifier.
pub const CAN_EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;
/// Mask of a standard 11-bit identifier.
pub const CAN_STANDARD_ID_MASK: u32 = 0x7FF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Wire identifier: 29 usable bits plus EFF/RTR flags in the high bits.
pub struct CanId(pub u32);

impl CanId {
    /// 11-bit identifier; extra bits are masked off.
    pub const fn standard(id: u16) -> Self {
        CanId(id as u32 & CAN_STANDARD_ID_MASK)
    }

    /// 29-bit identifier with the EFF flag set.
    pub const fn extended(id: u32) -> Self {
        CanId((id & CAN_EXTENDED_ID_MASK) | CAN_ID_EFF)
    }

    /// Build from a bare identifier and the extended flag.
    pub const fn new(id: u32, extended: bool) -> Self {
        if extended {
            Self::extended(id)
        } else {
            CanId(id & CAN_STANDARD_ID_MASK)
        }
    }

    /// Identifier with the EFF/RTR flags stripped.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0 & !(CAN_ID_EFF | CAN_ID_RTR)
    }

    /// Extended (29-bit) frame format.
    #[inline]
    pub const fn is_extended(&self) -> bool {
        self.0 & CAN_ID_EFF != 0
    }

    /// Remote transmission request.
    #[inline]
    pub const fn is_remote(&self) -> bool {
        self.0 & CAN_ID_RTR != 0
    }

    /// Same identifier with the RTR flag set.
    pub const fn with_remote(self) -> Self {
        CanId(self.0 | CAN_ID_RTR)
    }
}

//==================================================================================EMBEDDED_CAN
impl From<embedded_can::Id> for CanId {
    fn from(id: embedded_can::Id) -> Self {
        match id {
            embedded_can::Id::Standard(sid) => CanId::standard(sid.as_raw()),
            embedded_can::Id::Extended(eid) => CanId::extended(eid.as_raw()),
        }
    }
}

impl CanId {
    /// HAL identifier for this wire id. Out-of-range bits were masked at construction.
    pub fn to_embedded(&self) -> Option<embedded_can::Id> {
        if self.is_extended() {
            embedded_can::ExtendedId::new(self.raw()).map(embedded_can::Id::Extended)
        } else {
            embedded_can::StandardId::new(self.raw() as u16).map(embedded_can::Id::Standard)
        }
    }
}
