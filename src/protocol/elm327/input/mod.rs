//! Line discipline of the host input stream.
use heapless::String;

use crate::protocol::elm327::LINE_CAPACITY;

/// One command line as typed by the host.
pub type CommandLine = String<LINE_CAPACITY>;

/// Accumulates host bytes into command lines.
///
/// CR or LF ends a line; the LF of a CR LF pair is swallowed. Backspace and DEL erase
/// the last character. Only printable ASCII other than space is kept, and characters
/// past the capacity are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: CommandLine,
    after_cr: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            line: String::new(),
            after_cr: false,
        }
    }

    /// Feed one byte; returns the completed line when `byte` terminates it.
    pub fn push(&mut self, byte: u8) -> Option<CommandLine> {
        let after_cr = core::mem::replace(&mut self.after_cr, byte == b'\r');
        match byte {
            b'\n' if after_cr => None,
            b'\r' | b'\n' => Some(core::mem::take(&mut self.line)),
            0x08 | 0x7F => {
                self.line.pop();
                None
            }
            0x21..=0x7E => {
                let _ = self.line.push(byte as char);
                None
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        self.line.as_str()
    }
}
