//! Display width of buffer content in terminal columns.

use crate::primitives::utf8::Decoded;
use unicode_width::UnicodeWidthChar;

/// Width of a raw byte rendered as `<xx>`
pub const HEX_BYTE_WIDTH: usize = 4;

/// Width of a control character rendered as `^X`
pub const CTRL_WIDTH: usize = 2;

/// True for C0 control bytes and DEL
pub fn is_ctrl(byte: u8) -> bool {
    byte < 0x20 || byte == 0x7f
}

/// Columns taken by a character (tabs are the caller's business)
pub fn char_width(ch: char) -> usize {
    let u = ch as u32;
    if u < 0x80 {
        if is_ctrl(u as u8) {
            CTRL_WIDTH
        } else {
            1
        }
    } else if u < 0xa0 {
        // C1 controls have no glyph
        HEX_BYTE_WIDTH
    } else {
        ch.width().unwrap_or(1)
    }
}

/// Columns taken by a decoded unit.
///
/// In UTF-8 mode an undecodable byte is shown in hex. In legacy mode bytes
/// above 0x9f are assumed printable in the terminal's 8-bit charset.
pub fn unit_width(unit: Decoded, utf8: bool) -> usize {
    match unit {
        Decoded::Char(ch) => char_width(ch),
        Decoded::Byte(b) if !utf8 && b > 0x9f => 1,
        Decoded::Byte(_) => HEX_BYTE_WIDTH,
    }
}

/// Advance a display column past a tab stop
pub fn next_tab_stop(col: usize, tab_width: usize) -> usize {
    (col + tab_width) / tab_width * tab_width
}
