//! Record format and parser.
//!
//! A record line as returned by the programmer looks like
//! `[H]<address>:<data byte pairs>,<checksum>`, for example
//! `0010:deadbeef...,9a`. The checksum is the XOR of every payload byte.

use core::fmt;

use crate::hex::{hex_digit_to_value, push_hex, InvalidHexDigit};

/// Optional marker the programmer may place in the address field
pub const HEADER_MARKER: char = 'H';

/// Separator between the address and data fields
pub const DATA_SEPARATOR: char = ':';

/// Separator between the data and checksum fields
pub const CHECKSUM_SEPARATOR: char = ',';

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    InvalidHexDigit(#[from] InvalidHexDigit),

    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),
}

/// XOR-fold of all bytes in a payload
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// One addressable block of EPROM contents
#[derive(Clone, PartialEq, Debug)]
pub struct Record {
    pub address: u16,
    pub payload: Vec<u8>,
    /// Checksum as received (or as computed, for outbound records)
    pub checksum: u8,
}

impl Record {
    /// Build a record, computing the checksum from the payload
    pub fn new(address: u16, payload: Vec<u8>) -> Self {
        let checksum = checksum(&payload);
        Self { address, payload, checksum }
    }

    /// Checksum calculated over the payload
    pub fn calculated_checksum(&self) -> u8 {
        checksum(&self.payload)
    }

    /// Whether the carried checksum matches the payload
    pub fn is_valid(&self) -> bool {
        self.checksum == self.calculated_checksum()
    }
}

/// Writes the record body, `aaaa:dddd...,cc`, without command prefix or terminator
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::with_capacity(4 + 1 + self.payload.len() * 2 + 3);
        push_hex(&mut s, (self.address >> 8) as u8);
        push_hex(&mut s, self.address as u8);
        s.push(DATA_SEPARATOR);
        for b in &self.payload {
            push_hex(&mut s, *b);
        }
        s.push(CHECKSUM_SEPARATOR);
        push_hex(&mut s, self.checksum);
        f.write_str(&s)
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum State {
    /// Accumulating address digits
    Header,
    /// Accumulating payload byte pairs
    Data,
    /// Accumulating the two checksum digits
    Checksum,
}

/// Single pass record parser, fed one character at a time
#[derive(Clone, PartialEq, Debug)]
pub struct Parser {
    state: State,
    address: u16,
    payload: Vec<u8>,
    checksum: Option<u8>,
    high: Option<u8>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            address: 0,
            payload: Vec::new(),
            checksum: None,
            high: None,
        }
    }

    /// Fetch the parser state
    pub fn state(&self) -> State {
        self.state
    }

    /// Apply one character
    pub fn step(&mut self, c: char) -> Result<(), ParseError> {
        match self.state {
            State::Header => match c {
                DATA_SEPARATOR => self.state = State::Data,
                HEADER_MARKER => (),
                _ => {
                    let v = hex_digit_to_value(c)?;
                    self.address = self
                        .address
                        .checked_mul(16)
                        .ok_or(ParseError::MalformedRecord("address exceeds 16 bits"))?
                        | u16::from(v);
                }
            },
            State::Data => {
                if c == CHECKSUM_SEPARATOR {
                    if self.high.is_some() {
                        return Err(ParseError::MalformedRecord("odd number of data digits"));
                    }
                    self.state = State::Checksum;
                } else if let Some(b) = self.nibble(c)? {
                    self.payload.push(b);
                }
            }
            State::Checksum => {
                if self.checksum.is_some() {
                    return Err(ParseError::MalformedRecord("trailing characters after checksum"));
                }
                self.checksum = self.nibble(c)?;
            }
        }

        Ok(())
    }

    /// Complete parsing, returning the record if the line was whole
    pub fn finish(self) -> Result<Record, ParseError> {
        match (self.state, self.checksum) {
            (State::Header, _) => Err(ParseError::MalformedRecord("missing data separator")),
            (State::Data, _) => Err(ParseError::MalformedRecord("missing checksum separator")),
            (State::Checksum, None) => Err(ParseError::MalformedRecord("incomplete checksum")),
            (State::Checksum, Some(checksum)) => Ok(Record {
                address: self.address,
                payload: self.payload,
                checksum,
            }),
        }
    }

    // Returns a byte once both nibbles have been seen, high nibble first
    fn nibble(&mut self, c: char) -> Result<Option<u8>, ParseError> {
        let v = hex_digit_to_value(c)?;
        Ok(match self.high.take() {
            Some(h) => Some(h << 4 | v),
            None => {
                self.high = Some(v);
                None
            }
        })
    }
}

/// Parse a received record line
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let mut p = Parser::new();
    for c in line.chars() {
        p.step(c)?;
    }
    p.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_line() {
        let r = parse_record("0010:deadbeefcafebabe1122334455667788,3c").unwrap();
        assert_eq!(r.address, 0x0010);
        assert_eq!(
            r.payload,
            vec![
                0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe, 0x11, 0x22, 0x33, 0x44, 0x55,
                0x66, 0x77, 0x88
            ]
        );
        assert_eq!(r.checksum, 0x3c);
        assert_eq!(r.calculated_checksum(), 0x9a);
        assert!(!r.is_valid());
    }

    #[test]
    fn skips_header_marker() {
        let r = parse_record("H07f0:0102,03").unwrap();
        assert_eq!(r.address, 0x07f0);
        assert_eq!(r.payload, vec![0x01, 0x02]);
        assert!(r.is_valid());
    }

    #[test]
    fn checksum_is_xor_fold() {
        assert_eq!(checksum(&[0x55, 0xaa, 0x00]), 0xff);
        assert_eq!(checksum(&[]), 0x00);
        assert_eq!(checksum(&[0x12, 0x12]), 0x00);
    }

    #[test]
    fn rejects_uppercase_hex() {
        assert_eq!(
            parse_record("0010:DEAD,73"),
            Err(ParseError::InvalidHexDigit(InvalidHexDigit('D')))
        );
    }

    #[test]
    fn rejects_foreign_characters() {
        assert!(parse_record("0010:de ad,73").is_err());
        assert!(parse_record("0010:dead;73").is_err());
        assert!(parse_record("OK").is_err());
        // The marker is only meaningful in the address field
        assert_eq!(
            parse_record("0010:dHad,73"),
            Err(ParseError::InvalidHexDigit(InvalidHexDigit('H')))
        );
    }

    #[test]
    fn rejects_incomplete_lines() {
        assert_eq!(parse_record("0010"), Err(ParseError::MalformedRecord("missing data separator")));
        assert_eq!(parse_record("0010:dead"), Err(ParseError::MalformedRecord("missing checksum separator")));
        assert_eq!(parse_record("0010:dead,7"), Err(ParseError::MalformedRecord("incomplete checksum")));
        assert_eq!(parse_record("0010:dea,73"), Err(ParseError::MalformedRecord("odd number of data digits")));
        assert_eq!(
            parse_record("0010:dead,731"),
            Err(ParseError::MalformedRecord("trailing characters after checksum"))
        );
        assert_eq!(parse_record("10000:00,00"), Err(ParseError::MalformedRecord("address exceeds 16 bits")));
    }

    #[test]
    fn parser_states_advance_on_separators() {
        let mut p = Parser::new();
        assert_eq!(p.state(), State::Header);
        p.step('1').unwrap();
        p.step('H').unwrap();
        assert_eq!(p.state(), State::Header);
        p.step(':').unwrap();
        assert_eq!(p.state(), State::Data);
        p.step('a').unwrap();
        p.step('b').unwrap();
        p.step(',').unwrap();
        assert_eq!(p.state(), State::Checksum);
        p.step('a').unwrap();
        p.step('b').unwrap();

        let r = p.finish().unwrap();
        assert_eq!(r, Record { address: 1, payload: vec![0xab], checksum: 0xab });
    }

    #[test]
    fn display_round_trips_every_byte_value() {
        for b in 0..=255u8 {
            let r = Record::new(0x0100, vec![b; 16]);
            let s = r.to_string();
            assert_eq!(parse_record(&s).unwrap(), r);
        }
    }
}
