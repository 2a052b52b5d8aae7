//! Single-character UTF-8 decoding over raw byte slices.
//!
//! Buffers hold arbitrary bytes, so decoding never fails: a byte that does
//! not start a well-formed sequence comes back as [`Decoded::Byte`] and
//! consumes exactly one byte.

/// One decoded unit of buffer content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A well-formed character (always ASCII in legacy byte mode)
    Char(char),
    /// A raw byte that is not part of a decodable character
    Byte(u8),
}

/// Length of the sequence introduced by `lead`, or `None` if it cannot start one
pub fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7f => Some(1),
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}

pub fn is_continuation(byte: u8) -> bool {
    byte & 0xc0 == 0x80
}

/// Decode the first unit of `bytes`, returning it with the number of bytes consumed
pub fn decode_first(bytes: &[u8]) -> Option<(Decoded, usize)> {
    let &lead = bytes.first()?;
    match sequence_len(lead) {
        Some(1) => Some((Decoded::Char(char::from(lead)), 1)),
        Some(len) if bytes.len() >= len => match std::str::from_utf8(&bytes[..len]) {
            Ok(s) => s.chars().next().map(|ch| (Decoded::Char(ch), len)),
            Err(_) => Some((Decoded::Byte(lead), 1)),
        },
        _ => Some((Decoded::Byte(lead), 1)),
    }
}

/// Decode the last unit of `bytes`, returning it with the number of bytes it spans
pub fn decode_last(bytes: &[u8]) -> Option<(Decoded, usize)> {
    let &last = bytes.last()?;
    if last < 0x80 {
        return Some((Decoded::Char(char::from(last)), 1));
    }
    let end = bytes.len();
    let mut start = end - 1;
    while start > 0 && end - start < 4 && is_continuation(bytes[start]) {
        start -= 1;
    }
    match decode_first(&bytes[start..]) {
        Some((decoded @ Decoded::Char(_), len)) if start + len == end => Some((decoded, len)),
        _ => Some((Decoded::Byte(last), 1)),
    }
}

/// Decode one unit in legacy (non-UTF-8) mode: ASCII is a character, anything else a byte
pub fn decode_byte(byte: u8) -> Decoded {
    if byte < 0x80 {
        Decoded::Char(char::from(byte))
    } else {
        Decoded::Byte(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_first_ascii_and_multibyte() {
        assert_eq!(decode_first(b"abc"), Some((Decoded::Char('a'), 1)));
        assert_eq!(decode_first("é!".as_bytes()), Some((Decoded::Char('é'), 2)));
        assert_eq!(decode_first("世".as_bytes()), Some((Decoded::Char('世'), 3)));
        assert_eq!(decode_first("🦀".as_bytes()), Some((Decoded::Char('🦀'), 4)));
        assert_eq!(decode_first(b""), None);
    }

    #[test]
    fn test_decode_first_invalid() {
        // Lone continuation byte
        assert_eq!(decode_first(&[0x80, b'a']), Some((Decoded::Byte(0x80), 1)));
        // Truncated sequence
        assert_eq!(decode_first(&[0xe4, 0xb8]), Some((Decoded::Byte(0xe4), 1)));
        // Overlong encoding
        assert_eq!(decode_first(&[0xc0, 0x80]), Some((Decoded::Byte(0xc0), 1)));
        // Surrogate
        assert_eq!(
            decode_first(&[0xed, 0xa0, 0x80]),
            Some((Decoded::Byte(0xed), 1))
        );
    }

    #[test]
    fn test_decode_last() {
        assert_eq!(decode_last(b"ab"), Some((Decoded::Char('b'), 1)));
        assert_eq!(decode_last("a世".as_bytes()), Some((Decoded::Char('世'), 3)));
        assert_eq!(decode_last(&[b'a', 0xe4, 0xb8]), Some((Decoded::Byte(0xb8), 1)));
        assert_eq!(decode_last(&[0xe4]), Some((Decoded::Byte(0xe4), 1)));
        assert_eq!(decode_last(b""), None);
    }

    #[test]
    fn test_decode_byte_legacy() {
        assert_eq!(decode_byte(b'x'), Decoded::Char('x'));
        assert_eq!(decode_byte(0xe9), Decoded::Byte(0xe9));
    }
}
