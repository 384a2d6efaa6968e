//! Scripted in-memory programmer for tests

use std::collections::VecDeque;
use std::io::ErrorKind;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

/// Releases one canned reply each time the host completes a line
#[derive(Debug, Default)]
pub struct MockPort {
    /// `None` entries are polls that find no data
    rx: VecDeque<Option<u8>>,
    replies: VecDeque<Vec<u8>>,
    pub tx: Vec<u8>,
    /// Fail every read once the canned input runs dry
    pub fail_when_empty: bool,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already waiting before any command is sent
    pub fn stale(mut self, data: &[u8]) -> Self {
        self.rx.extend(data.iter().map(|b| Some(*b)));
        self
    }

    /// Make the next `polls` reads come back empty
    pub fn silence(mut self, polls: usize) -> Self {
        self.rx.extend(std::iter::repeat(None).take(polls));
        self
    }

    /// Queue the response to the next command line
    pub fn reply(mut self, data: &str) -> Self {
        self.replies.push_back(data.as_bytes().to_vec());
        self
    }

    /// Lines written by the host, terminators removed
    pub fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.tx)
            .split_terminator('\n')
            .map(String::from)
            .collect()
    }
}

impl Read<u8> for MockPort {
    type Error = ErrorKind;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        match self.rx.pop_front() {
            Some(Some(b)) => Ok(b),
            Some(None) => Err(nb::Error::WouldBlock),
            None if self.fail_when_empty => Err(nb::Error::Other(ErrorKind::BrokenPipe)),
            None => Err(nb::Error::WouldBlock),
        }
    }
}

impl Write<u8> for MockPort {
    type Error = ErrorKind;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.tx.push(word);
        if word == b'\n' {
            if let Some(r) = self.replies.pop_front() {
                self.rx.extend(r.into_iter().map(Some));
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

pub struct NoDelay;

impl DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}
