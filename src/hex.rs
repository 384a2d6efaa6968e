//! Single digit hex conversions used by the record wire format.
//!
//! The programmer only ever speaks lowercase hex, uppercase digits are
//! rejected rather than folded.

const DIGITS: &[u8; 16] = b"0123456789abcdef";

#[derive(Copy, Clone, PartialEq, Debug, thiserror::Error)]
#[error("invalid hex digit {0:?}")]
pub struct InvalidHexDigit(pub char);

/// Convert a lowercase hex character to its 4-bit value
pub fn hex_digit_to_value(c: char) -> Result<u8, InvalidHexDigit> {
    match c {
        '0'..='9' => Ok(c as u8 - b'0'),
        'a'..='f' => Ok(c as u8 - b'a' + 10),
        _ => Err(InvalidHexDigit(c)),
    }
}

/// Convert a byte to two lowercase, zero-padded hex characters
pub fn value_to_hex_digits(value: u8) -> [char; 2] {
    [
        DIGITS[(value >> 4) as usize] as char,
        DIGITS[(value & 0x0f) as usize] as char,
    ]
}

pub(crate) fn push_hex(out: &mut String, value: u8) {
    out.extend(value_to_hex_digits(value).iter());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lowercase_digits() {
        for (i, c) in "0123456789abcdef".chars().enumerate() {
            assert_eq!(hex_digit_to_value(c), Ok(i as u8));
        }
    }

    #[test]
    fn rejects_uppercase_and_other_characters() {
        for c in "ABCDEFgG:, H".chars() {
            assert_eq!(hex_digit_to_value(c), Err(InvalidHexDigit(c)));
        }
    }

    #[test]
    fn encodes_zero_padded_lowercase() {
        assert_eq!(value_to_hex_digits(0x00), ['0', '0']);
        assert_eq!(value_to_hex_digits(0x0a), ['0', 'a']);
        assert_eq!(value_to_hex_digits(0xbe), ['b', 'e']);
        assert_eq!(value_to_hex_digits(0xff), ['f', 'f']);
    }

    #[test]
    fn digits_round_trip() {
        for b in 0..=255u8 {
            let [h, l] = value_to_hex_digits(b);
            let v = hex_digit_to_value(h).unwrap() << 4 | hex_digit_to_value(l).unwrap();
            assert_eq!(v, b);
        }
    }
}
