
use core::fmt;

use crate::record::Record;

/// Total EPROM size in bytes
pub const ROM_SIZE: usize = 2048;

/// Bytes carried by each record
pub const RECORD_SIZE: usize = 16;

/// Records in a whole-memory session
pub const RECORD_COUNT: usize = ROM_SIZE / RECORD_SIZE;

/// Status line acknowledging a read or write
pub const STATUS_OK: &str = "OK";

/// Line terminator for outbound commands
pub const LINE_END: char = '\n';

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Command {
    /// Fetch the programmer firmware version string
    Version = b'V' as isize,

    /// Reads one record starting at the provided address
    Read = b'R' as isize,

    /// Writes one record starting at the provided address
    Write = b'W' as isize,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8 as char)
    }
}

/// Build the version request line, `V\n`
pub fn encode_version_command() -> String {
    format!("{}{}", Command::Version, LINE_END)
}

/// Build a read request line, `Raaaa\n`
pub fn encode_read_command(address: u16) -> String {
    format!("{}{:04x}{}", Command::Read, address, LINE_END)
}

/// Build a write command line, `Waaaa:dddd...,cc\n`, computing the checksum
pub fn encode_write_command(address: u16, payload: &[u8]) -> String {
    let record = Record::new(address, payload.to_vec());
    format!("{}{}{}", Command::Write, record, LINE_END)
}

/// Address of the nth record in a session
pub fn record_address(index: usize) -> u16 {
    (index * RECORD_SIZE) as u16
}
