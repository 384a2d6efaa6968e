//! EPROM programmer client.
//!
//! Talks to a serial EPROM programmer using a newline-delimited text
//! protocol, reading or writing the whole device in 16 byte records.
//! See [`protocol`] for the command set and [`record`] for the record format.

use core::marker::PhantomData;

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod hex;
pub mod protocol;
pub mod record;

#[cfg(test)]
mod mock;

use protocol::*;
use record::{parse_record, ParseError, Record};

/// Duplex byte stream to the programmer
pub trait Transport<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> Transport<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<SerialError: core::fmt::Debug> {
    #[error("serial transport error: {0:?}")]
    Serial(SerialError),

    #[error("timeout awaiting programmer response")]
    ResponseTimeout,

    #[error("record 0x{address:04x}: {source}")]
    Parse { address: u16, source: ParseError },

    #[error("record 0x{address:04x}: unexpected response {line:?}")]
    UnexpectedStatus { address: u16, line: String },

    #[error("local file error: {0:?}")]
    Io(std::io::ErrorKind),
}

impl<SerialError: core::fmt::Debug> Error<SerialError> {
    /// Errors scoped to a single record, after which a session carries on
    pub fn is_record_level(&self) -> bool {
        matches!(self, Error::Parse { .. } | Error::UnexpectedStatus { .. })
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Period to poll for programmer responses
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Give up on a response after this long (waits indefinitely if unset)
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub response_timeout_ms: Option<u32>,

    /// Period to wait after connecting before discarding stale input
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "10"))]
    pub settle_delay_ms: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_delay_ms: 1,
            response_timeout_ms: None,
            settle_delay_ms: 10,
        }
    }
}

/// Outcome of a whole-memory session
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Summary {
    /// Records exchanged with the programmer
    pub records: usize,
    /// Payload bytes written to the output file or sent to the device
    pub bytes: usize,
    /// Records accepted despite a checksum mismatch
    pub checksum_mismatches: usize,
    /// Records reported as failed
    pub failed: usize,
}

pub struct Programmer<P, D, E> {
    options: Options,
    port: P,
    delay: D,
    _err: PhantomData<E>,
}

impl<P, D, E> Programmer<P, D, E>
where
    P: Transport<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Create a new programmer instance
    pub fn new(port: P, delay: D, options: Options) -> Self {
        Self {
            options,
            port,
            delay,
            _err: PhantomData,
        }
    }

    /// Release the underlying transport
    pub fn free(self) -> (P, D) {
        (self.port, self.delay)
    }

    /// Prepare the link for a session, returning the number of stale bytes discarded
    pub fn init(&mut self) -> Result<usize, Error<E>> {
        self.delay.delay_ms(self.options.settle_delay_ms);

        debug!("Flushing stale input");
        self.flush_input()
    }

    /// Drain and discard anything already buffered by the transport
    pub fn flush_input(&mut self) -> Result<usize, Error<E>> {
        let mut n = 0;
        loop {
            match self.port.read() {
                Ok(v) => {
                    debug!("Discarding stale byte: 0x{:02x}", v);
                    n += 1;
                }
                Err(nb::Error::WouldBlock) => return Ok(n),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
            }
        }
    }

    /// Send a complete command line
    pub fn send(&mut self, line: &str) -> Result<(), Error<E>> {
        trace!("Sending: {:?}", line);

        for b in line.bytes() {
            block!(self.port.write(b)).map_err(Error::Serial)?;
        }
        block!(self.port.flush()).map_err(Error::Serial)?;

        Ok(())
    }

    /// Block until a full line is received, dropping carriage returns
    pub fn read_line(&mut self) -> Result<String, Error<E>> {
        let mut line = Vec::new();
        let mut t = 0u32;

        loop {
            match self.port.read() {
                Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
                Ok(b'\r') => {
                    t = 0;
                    continue;
                }
                Ok(b'\n') => break,
                Ok(v) => {
                    line.push(v);
                    t = 0;
                    continue;
                }
            }

            if let Some(timeout) = self.options.response_timeout_ms {
                if t >= timeout {
                    error!("Receive timeout");
                    return Err(Error::ResponseTimeout);
                }
            }

            // Wait for delay period
            self.delay.delay_ms(self.options.poll_delay_ms);
            t = t.saturating_add(self.options.poll_delay_ms.max(1));
        }

        let line = String::from_utf8_lossy(&line).into_owned();
        trace!("Received: {:?}", line);

        Ok(line)
    }

    /// Fetch the programmer firmware version string
    pub fn version(&mut self) -> Result<String, Error<E>> {
        self.send(&encode_version_command())?;
        self.read_line()
    }

    /// Read one record, consuming both the record and status lines
    ///
    /// The record is returned even when its checksum does not match,
    /// callers decide what to do with it via [`Record::is_valid`]. A
    /// payload that is not exactly `RECORD_SIZE` bytes is rejected.
    pub fn read_record(&mut self, address: u16) -> Result<Record, Error<E>> {
        self.send(&encode_read_command(address))?;

        let data = self.read_line()?;
        let parsed = parse_record(&data);

        // The status line always follows, consume it to stay in step
        let status = self.read_line()?;

        let record = parsed.map_err(|source| Error::Parse { address, source })?;

        debug!(
            "<<< ADDR: {:04x} : DATA: {} : CHK, received {:02x}, calculated: {:02x}",
            record.address,
            ::hex::encode(&record.payload),
            record.checksum,
            record.calculated_checksum()
        );

        if !record.is_valid() {
            warn!(
                "Checksum mismatch at 0x{:04x}: received {:02x}, calculated {:02x}",
                address,
                record.checksum,
                record.calculated_checksum()
            );
        }
        if record.address != address {
            warn!(
                "Address mismatch: requested 0x{:04x}, received 0x{:04x}",
                address, record.address
            );
        }

        if status != STATUS_OK {
            return Err(Error::UnexpectedStatus {
                address,
                line: status,
            });
        }

        if record.payload.len() != RECORD_SIZE {
            return Err(Error::Parse {
                address,
                source: ParseError::MalformedRecord("payload length"),
            });
        }

        Ok(record)
    }

    /// Write one record and await the acknowledgement
    pub fn write_record(&mut self, address: u16, payload: &[u8]) -> Result<(), Error<E>> {
        let line = encode_write_command(address, payload);
        debug!(">>> ADDR: {:04x} : DATA: {}", address, line.trim_end());

        self.send(&line)?;

        let status = self.read_line()?;
        debug!("Write response: {}", status);

        if status != STATUS_OK {
            return Err(Error::UnexpectedStatus {
                address,
                line: status,
            });
        }

        Ok(())
    }

    /// Read the whole EPROM into `sink`, record by record
    ///
    /// Checksum mismatches are logged and the payload kept. Records that
    /// fail to parse, carry the wrong number of bytes or are not
    /// acknowledged are logged and skipped.
    pub fn read_rom<W, F>(&mut self, sink: &mut W, mut progress: F) -> Result<Summary, Error<E>>
    where
        W: std::io::Write,
        F: FnMut(u16),
    {
        let mut summary = Summary::default();

        for i in 0..RECORD_COUNT {
            let address = record_address(i);

            let record = match self.read_record(address) {
                Ok(r) => r,
                Err(e) if e.is_record_level() => {
                    error!("{}", e);
                    summary.failed += 1;
                    progress(address);
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.records += 1;

            if !record.is_valid() {
                summary.checksum_mismatches += 1;
            }

            sink.write_all(&record.payload)
                .map_err(|e| Error::Io(e.kind()))?;
            summary.bytes += record.payload.len();

            progress(address);
        }

        Ok(summary)
    }

    /// Write the contents of `source` to the EPROM, record by record
    ///
    /// The session ends quietly at the first short or failed read of
    /// `source`. Records the programmer does not acknowledge are logged
    /// and the session moves on.
    pub fn write_rom<R, F>(&mut self, source: &mut R, mut progress: F) -> Result<Summary, Error<E>>
    where
        R: std::io::Read,
        F: FnMut(u16),
    {
        let mut summary = Summary::default();
        let mut buff = [0u8; RECORD_SIZE];

        for i in 0..RECORD_COUNT {
            let address = record_address(i);

            match source.read_exact(&mut buff) {
                Ok(()) => (),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("End of input at 0x{:04x}", address);
                    return Ok(summary);
                }
                Err(e) => {
                    warn!("Input read failed at 0x{:04x}: {}", address, e);
                    return Ok(summary);
                }
            }

            match self.write_record(address, &buff) {
                Ok(()) => {
                    summary.records += 1;
                    summary.bytes += RECORD_SIZE;
                }
                Err(e) if e.is_record_level() => {
                    error!("{}", e);
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }

            progress(address);
        }

        let mut extra = [0u8; 1];
        if let Ok(1) = source.read(&mut extra) {
            warn!("Input exceeds {} bytes, remainder ignored", ROM_SIZE);
        }

        Ok(summary)
    }
}
