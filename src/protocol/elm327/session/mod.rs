//! Per-emulator session state: the settings mutated by AT commands and the one
//! outstanding PID request.
use embassy_time::Instant;

use crate::protocol::elm327::{DEFAULT_TIMEOUT_MS, OBD2_11BIT_BROADCAST, OBD2_29BIT_BROADCAST};

//==================================================================================SESSION
/// Adapter settings. Every field maps to one AT command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElmSession {
    /// CAN id used for requests (`ATSH`).
    pub header: u32,
    /// Response timeout in ms (`ATST`, adaptive timing).
    pub timeout_ms: u32,
    /// Terminate lines with CR LF (`ATL`).
    pub linefeed: bool,
    /// Echo host input (`ATE`).
    pub echo: bool,
    /// Separate printed bytes with spaces (`ATS`).
    pub whitespace: bool,
    /// Print the payload length (`ATD`).
    pub show_dlc: bool,
    /// Print every frame on the bus, unfiltered (`ATMA`).
    pub monitor: bool,
    /// Memory flag (`ATM`), stored only.
    pub memory: bool,
    /// Print CAN ids in front of responses (`ATH`).
    pub headers: bool,
    /// 29-bit addressing.
    pub extended: bool,
    /// Adaptive timeout estimation (`ATAT`).
    pub adaptive: bool,
    /// Current OBD protocol digit (`ATSP`, `ATDP`).
    pub protocol: Protocol,
}

impl Default for ElmSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ElmSession {
    pub const fn new() -> Self {
        Self {
            header: OBD2_11BIT_BROADCAST,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            linefeed: false,
            echo: false,
            whitespace: true,
            show_dlc: false,
            monitor: false,
            memory: false,
            headers: false,
            extended: false,
            adaptive: true,
            protocol: Protocol::Can11Bit500k,
        }
    }

    /// `OK` terminator of a configuration command.
    pub fn end_ok(&self) -> &'static str {
        if self.linefeed {
            "\r\nOK\r\n>"
        } else {
            "\rOK\r\r>"
        }
    }

    /// Terminator following identity text and error tokens.
    pub fn end_text(&self) -> &'static str {
        if self.linefeed {
            "\r\n>"
        } else {
            "\r\r>"
        }
    }

    /// Prompt emitted when an exchange closes.
    pub fn prompt(&self) -> &'static str {
        if self.linefeed {
            "\r\n>"
        } else {
            "\r>"
        }
    }
}

//==================================================================================PROTOCOL
/// ISO 15765-4 CAN protocols the adapter can select (`ATSP6..9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Can11Bit500k,
    Can29Bit500k,
    Can11Bit250k,
    Can29Bit250k,
}

impl Protocol {
    /// Protocol selected by an `ATSP` digit.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'6' => Some(Protocol::Can11Bit500k),
            b'7' => Some(Protocol::Can29Bit500k),
            b'8' => Some(Protocol::Can11Bit250k),
            b'9' => Some(Protocol::Can29Bit250k),
            _ => None,
        }
    }

    pub fn digit(&self) -> char {
        match self {
            Protocol::Can11Bit500k => '6',
            Protocol::Can29Bit500k => '7',
            Protocol::Can11Bit250k => '8',
            Protocol::Can29Bit250k => '9',
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Protocol::Can11Bit500k => "ISO 15765-4 (CAN 11/500)",
            Protocol::Can29Bit500k => "ISO 15765-4 (CAN 29/500)",
            Protocol::Can11Bit250k => "ISO 15765-4 (CAN 11/250)",
            Protocol::Can29Bit250k => "ISO 15765-4 (CAN 29/250)",
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Protocol::Can29Bit500k | Protocol::Can29Bit250k)
    }

    /// Bus bitrate of the protocol (bits/second).
    pub fn bitrate(&self) -> u32 {
        match self {
            Protocol::Can11Bit500k | Protocol::Can29Bit500k => 500_000,
            Protocol::Can11Bit250k | Protocol::Can29Bit250k => 250_000,
        }
    }

    /// Broadcast request header of the protocol.
    pub fn broadcast_header(&self) -> u32 {
        if self.is_extended() {
            OBD2_29BIT_BROADCAST
        } else {
            OBD2_11BIT_BROADCAST
        }
    }
}

//==================================================================================PENDING_REQUEST
/// Outstanding PID request awaiting ECU responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub service: u8,
    pub pid: u16,
    /// Moment the request was queued.
    pub start: Instant,
    /// Moment the latest response frame arrived.
    pub last_response: Option<Instant>,
    /// Response frames received so far.
    pub frames: u32,
    /// Complete responses received so far.
    pub responses: u8,
    /// Number of ECU responses after which the exchange closes early.
    pub expected: Option<u8>,
    /// The estimator already saw this exchange.
    pub processed: bool,
    /// Payload bytes still owed by the multi-frame response in progress.
    pub isotp_remaining: usize,
}

impl PendingRequest {
    pub fn new(service: u8, pid: u16, expected: Option<u8>, start: Instant) -> Self {
        Self {
            service,
            pid,
            start,
            last_response: None,
            frames: 0,
            responses: 0,
            expected,
            processed: false,
            isotp_remaining: 0,
        }
    }

    /// Account one response frame, following ISO-TP segmentation. Returns `true` when
    /// the frame completed a response.
    pub fn track_frame(&mut self, payload: &[u8], now: Instant) -> bool {
        self.last_response = Some(now);
        self.frames += 1;

        let Some(&pci) = payload.first() else {
            return false;
        };
        let completed = match pci >> 4 {
            // Single frame.
            0x0 => true,
            // First frame: 12-bit total length, six payload bytes carried.
            0x1 => {
                let low = payload.get(1).copied().unwrap_or(0) as usize;
                let total = (((pci & 0x0F) as usize) << 8) | low;
                self.isotp_remaining = total.saturating_sub(6);
                self.isotp_remaining == 0
            }
            // Consecutive frame: up to seven payload bytes.
            0x2 => {
                if self.isotp_remaining == 0 {
                    false
                } else {
                    self.isotp_remaining = self.isotp_remaining.saturating_sub(7);
                    self.isotp_remaining == 0
                }
            }
            _ => false,
        };
        if completed {
            self.responses = self.responses.saturating_add(1);
        }
        completed
    }

    /// Expected response count reached.
    pub fn is_satisfied(&self) -> bool {
        self.expected.is_some_and(|n| self.responses >= n)
    }
}
