//! Textual rendering of received CAN frames, as an ELM327 prints them.
//!
//! * Single-frame payloads print only the bytes their PCI length declares valid.
//! * Without headers, multi-frame payloads get the ISO-TP layout: the first frame
//!   prints the total length on its own line, then every segment is prefixed with
//!   its sequence digit (`0: `, `1: `, ...).
//! * With headers, the id is printed first and multi-frame payloads are dumped raw.
use heapless::String;

use crate::infra::hex::nibble;
use crate::protocol::elm327::session::ElmSession;
use crate::protocol::transport::can_frame::CanFrame;

/// Widest rendered frame: spaced 29-bit header, eight spaced bytes, and the first
/// frame length line.
pub const FRAME_LINE_CAPACITY: usize = 64;

/// One rendered frame, `\r` terminated.
pub type FrameLine = String<FRAME_LINE_CAPACITY>;

/// Builds a line token by token, inserting a separator when whitespace is on.
struct LineWriter {
    line: FrameLine,
    spaced: bool,
    pending_space: bool,
}

impl LineWriter {
    fn new(spaced: bool) -> Self {
        Self {
            line: String::new(),
            spaced,
            pending_space: false,
        }
    }

    // Capacity covers the widest line; characters past it are dropped.
    fn raw(&mut self, c: char) {
        let _ = self.line.push(c);
    }

    fn text(&mut self, text: &str) {
        let _ = self.line.push_str(text);
    }

    fn separate(&mut self) {
        if self.pending_space && self.spaced {
            self.raw(' ');
        }
        self.pending_space = true;
    }

    fn digit(&mut self, value: u8) {
        self.separate();
        self.raw(nibble(value));
    }

    fn byte(&mut self, value: u8) {
        self.separate();
        self.raw(nibble(value >> 4));
        self.raw(nibble(value));
    }

    fn end_line(&mut self) {
        self.raw('\r');
        self.pending_space = false;
    }

    fn finish(mut self) -> FrameLine {
        self.end_line();
        self.line
    }
}

/// Render `frame` according to the session's header, whitespace and DLC settings.
pub fn format_frame_output(session: &ElmSession, frame: &CanFrame) -> FrameLine {
    let data = frame.payload();
    let dlc = data.len();
    let pci = data.first().copied().unwrap_or(0);
    let multi_frame = pci >= 0x10;

    let mut out = LineWriter::new(session.whitespace);

    if multi_frame && !session.headers {
        if pci >> 4 == 0x1 {
            out.raw(nibble(pci));
            out.byte(data.get(1).copied().unwrap_or(0));
            out.end_line();
        }
        out.raw(nibble(pci));
        out.text(":");
        if session.whitespace {
            out.raw(' ');
        }
    }

    if session.headers {
        let id = frame.id.raw();
        if frame.id.is_extended() {
            for byte in id.to_be_bytes() {
                out.byte(byte);
            }
        } else {
            out.digit((id >> 8) as u8);
            out.raw(nibble((id >> 4) as u8));
            out.raw(nibble(id as u8));
        }
        if !multi_frame {
            out.byte(pci);
        }
    } else if !multi_frame && session.show_dlc {
        out.digit(pci);
    }

    let range = if multi_frame {
        let start = match (session.headers, pci >> 4) {
            (true, _) => 0,
            (false, 0x1) => 2,
            (false, _) => 1,
        };
        start.min(dlc)..dlc
    } else {
        1.min(dlc)..(pci as usize + 1).min(dlc)
    };
    for &byte in &data[range] {
        out.byte(byte);
    }

    out.finish()
}
