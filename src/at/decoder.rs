//! Incremental AT line decoder
//!
//! Bytes arrive from the channel in arbitrary fragments. The decoder buffers
//! them and hands out complete lines one at a time.

use super::{AtError, AtErrorKind, Line, lossy_line};
use crate::constants::{DECODER_BUFFER_SIZE, MAX_LINE_LENGTH};
use heapless::Vec;

/// Reassembles AT lines from a byte stream
///
/// Callers push each received chunk (at most [`crate::constants::READ_CHUNK_SIZE`]
/// bytes) and then drain [`AtDecoder::next_line`] until it returns `None`.
/// Under that discipline the buffer never holds more than one partial line
/// plus one chunk.
#[derive(Debug, Clone, Default)]
pub struct AtDecoder {
    buffer: Vec<u8, DECODER_BUFFER_SIZE>,
    overflow: Option<Line>,
    discarding: bool,
}

impl AtDecoder {
    /// Create an empty decoder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflow: None,
            discarding: false,
        }
    }

    /// Append received bytes
    ///
    /// If the buffer fills up before a terminator shows up, the buffered
    /// bytes are dropped and reported once as [`AtErrorKind::LineTooLong`].
    pub fn push(&mut self, data: &[u8]) {
        for &byte in data {
            if self.buffer.push(byte).is_err() {
                self.overflow = Some(lossy_line(&self.buffer));
                self.buffer.clear();
                self.discarding = true;
                self.buffer.push(byte).ok();
            }
        }
    }

    /// Next complete line, if any
    ///
    /// Empty lines are skipped. A line that cannot be decoded is returned as
    /// an error and the decoder moves on to the following line.
    pub fn next_line(&mut self) -> Option<Result<Line, AtError>> {
        if let Some(raw) = self.overflow.take() {
            return Some(Err(AtError {
                kind: AtErrorKind::LineTooLong,
                raw,
            }));
        }

        loop {
            let Some(end) = self
                .buffer
                .iter()
                .position(|byte| *byte == b'\r' || *byte == b'\n')
            else {
                if self.buffer.len() >= MAX_LINE_LENGTH {
                    let raw = lossy_line(&self.buffer);
                    self.buffer.clear();
                    if !core::mem::replace(&mut self.discarding, true) {
                        return Some(Err(AtError {
                            kind: AtErrorKind::LineTooLong,
                            raw,
                        }));
                    }
                }
                return None;
            };

            let discarding = core::mem::take(&mut self.discarding);
            let item = if discarding || end == 0 {
                None
            } else {
                Some(Self::decode(&self.buffer[..end]))
            };
            self.consume(end + 1);

            if item.is_some() {
                return item;
            }
        }
    }

    /// Number of buffered bytes not yet returned as a line
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything buffered
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn decode(bytes: &[u8]) -> Result<Line, AtError> {
        if bytes.len() > MAX_LINE_LENGTH {
            return Err(AtError {
                kind: AtErrorKind::LineTooLong,
                raw: lossy_line(bytes),
            });
        }
        let text = core::str::from_utf8(bytes).map_err(|_| AtError {
            kind: AtErrorKind::InvalidUtf8,
            raw: lossy_line(bytes),
        })?;
        Line::try_from(text).map_err(|()| AtError::new(AtErrorKind::LineTooLong, text))
    }

    fn consume(&mut self, count: usize) {
        let remaining = self.buffer.len() - count;
        self.buffer.copy_within(count.., 0);
        self.buffer.truncate(remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut AtDecoder) -> heapless::Vec<Result<Line, AtError>, 8> {
        let mut lines = heapless::Vec::new();
        while let Some(line) = decoder.next_line() {
            lines.push(line).unwrap();
        }
        lines
    }

    #[test]
    fn test_decoder_reassembles_fragments() {
        let mut decoder = AtDecoder::new();
        decoder.push(b"AT+BR");
        assert!(decoder.next_line().is_none());
        decoder.push(b"SF=12");
        assert!(decoder.next_line().is_none());
        decoder.push(b"7\rAT+CIND=?\r");

        let lines = drain(&mut decoder);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_ref().unwrap().as_str(), "AT+BRSF=127");
        assert_eq!(lines[1].as_ref().unwrap().as_str(), "AT+CIND=?");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_skips_empty_lines() {
        let mut decoder = AtDecoder::new();
        decoder.push(b"\r\n+CIEV: 2,1\r\n\r\nOK\r\n");

        let lines = drain(&mut decoder);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_ref().unwrap().as_str(), "+CIEV: 2,1");
        assert_eq!(lines[1].as_ref().unwrap().as_str(), "OK");
    }

    #[test]
    fn test_decoder_split_terminator() {
        let mut decoder = AtDecoder::new();
        decoder.push(b"\r\nRING\r");
        assert_eq!(decoder.next_line().unwrap().unwrap().as_str(), "RING");
        decoder.push(b"\n");
        assert!(decoder.next_line().is_none());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_invalid_utf8() {
        let mut decoder = AtDecoder::new();
        decoder.push(&[b'O', 0xC3, b'\r', b'O', b'K', b'\r']);

        let error = decoder.next_line().unwrap().unwrap_err();
        assert_eq!(error.kind, AtErrorKind::InvalidUtf8);
        assert_eq!(error.raw.as_str(), "O?");
        assert_eq!(decoder.next_line().unwrap().unwrap().as_str(), "OK");
    }

    #[test]
    fn test_decoder_line_too_long() {
        let mut decoder = AtDecoder::new();
        let long = [b'A'; MAX_LINE_LENGTH + 10];
        for chunk in long.chunks(64) {
            decoder.push(chunk);
            while let Some(item) = decoder.next_line() {
                assert_eq!(item.unwrap_err().kind, AtErrorKind::LineTooLong);
            }
        }
        decoder.push(b"\rOK\r");

        let lines = drain(&mut decoder);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_ref().unwrap().as_str(), "OK");
    }
}
