//! In-memory representation of a classic CAN frame as queued by the transport.
use crate::protocol::transport::can_id::CanId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw CAN frame: created at interrupt time or by a protocol decoder, immutable once queued.
pub struct CanFrame {
    /// Wire identifier, flags included.
    pub id: CanId,
    /// Payload buffer. Classic CAN frames carry at most eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Frame with `payload` copied in; anything past eight bytes is cut off.
    pub fn new(id: CanId, payload: &[u8]) -> Self {
        let len = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self { id, data, len }
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(8)]
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<embedded_can::Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        Some(CanFrame::new(CanId::from(id.into()), data))
    }

    fn new_remote(id: impl Into<embedded_can::Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(Self {
            id: CanId::from(id.into()).with_remote(),
            data: [0u8; 8],
            len: dlc,
        })
    }

    fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    fn is_remote_frame(&self) -> bool {
        self.id.is_remote()
    }

    fn id(&self) -> embedded_can::Id {
        // Ids are masked to their width at construction, so conversion cannot fail
        // for frames built through this module.
        self.id
            .to_embedded()
            .unwrap_or(embedded_can::Id::Standard(embedded_can::StandardId::ZERO))
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        if self.id.is_remote() {
            &[]
        } else {
            self.payload()
        }
    }
}
