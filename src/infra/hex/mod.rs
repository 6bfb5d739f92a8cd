//! ASCII hexadecimal helpers used by the text protocols.

/// True when `text` is non-empty and made only of hex digits (either case).
pub fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse up to eight hex digits into a `u32`.
///
/// Unlike `u32::from_str_radix`, a leading sign is rejected.
pub fn parse_u32(text: &str) -> Option<u32> {
    if !is_hex(text) || text.len() > 8 {
        return None;
    }
    text.bytes().try_fold(0u32, |acc, b| {
        let digit = (b as char).to_digit(16)?;
        Some((acc << 4) | digit)
    })
}

/// Parse exactly two hex digits.
pub fn parse_u8(text: &str) -> Option<u8> {
    if text.len() != 2 {
        return None;
    }
    parse_u32(text).map(|v| v as u8)
}

/// Upper-case hex digit for the low nibble of `value`.
#[inline]
pub fn nibble(value: u8) -> char {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    DIGITS[(value & 0x0F) as usize] as char
}
