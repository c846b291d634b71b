//! AT Command Codec
//!
//! This module turns the RFCOMM byte stream into AT lines and typed values and
//! back. The Hands-Free unit sends commands, the Audio Gateway answers with
//! information responses, final result codes and unsolicited result codes.
//!
//! ## Framing
//!
//! - **Commands** (HF → AG) are written as `AT<body>\r`
//! - **Responses** (AG → HF) are written as `\r\n<text>\r\n`
//! - The [`AtDecoder`] accepts CR, LF or CR/LF as terminator in both
//!   directions and skips empty lines, so either side tolerates peers that
//!   frame loosely.
//!
//! ## Usage
//!
//! ```rust
//! use hfpbird::at::{AtCommand, AtDecoder, AtResponse};
//!
//! let mut decoder = AtDecoder::new();
//! decoder.push(b"\r\n+BRSF: 3\r");
//! decoder.push(b"\n\r\nOK\r\n");
//!
//! let line = decoder.next_line().unwrap().unwrap();
//! assert_eq!(AtResponse::parse(&line), Ok(AtResponse::SupportedFeatures(3)));
//! assert_eq!(AtCommand::SupportedFeatures(0x180).encode().as_str(), "AT+BRSF=384\r");
//! ```

pub mod command;
pub mod decoder;
pub mod response;

pub use command::*;
pub use decoder::*;
pub use response::*;

use crate::constants::{MAX_AT_NAME_LENGTH, MAX_AT_PARAMETERS, MAX_LINE_LENGTH};
use core::str::FromStr;
use heapless::{String, Vec};

/// One decoded AT line, without terminators
pub type Line = String<MAX_LINE_LENGTH>;

/// Command or result code name (`+CIND`, `+BRSF`, ...)
pub type Name = String<MAX_AT_NAME_LENGTH>;

/// Reasons a line could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtErrorKind {
    /// Line exceeded the maximum line length
    LineTooLong,
    /// Line is not valid UTF-8
    InvalidUtf8,
    /// Command does not start with `AT`
    MissingPrefix,
    /// A parameter is missing or could not be parsed
    InvalidParameter,
    /// More parameters than the codec can hold
    TooManyParameters,
}

/// Decoding failure carrying the offending raw text
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AtError {
    /// What went wrong
    pub kind: AtErrorKind,
    /// Raw line (non-ASCII bytes replaced by `?`, truncated to a line)
    pub raw: Line,
}

impl AtError {
    /// Create a new error for a raw line
    #[must_use]
    pub fn new(kind: AtErrorKind, raw: &str) -> Self {
        Self {
            kind,
            raw: lossy_line(raw.as_bytes()),
        }
    }
}

/// Copy bytes into a line, replacing anything but printable ASCII with `?`
pub(crate) fn lossy_line(bytes: &[u8]) -> Line {
    bytes
        .iter()
        .take(MAX_LINE_LENGTH)
        .map(|&byte| {
            if byte.is_ascii() && !byte.is_ascii_control() {
                char::from(byte)
            } else {
                '?'
            }
        })
        .collect()
}

/// Split a parameter list on top-level commas
///
/// Commas inside double quotes or parentheses do not split, so
/// `("call",(0,1)),("service",(0,1))` yields two parameters. Each
/// parameter is trimmed.
pub(crate) fn split_parameters(text: &str) -> Result<Vec<&str, MAX_AT_PARAMETERS>, AtErrorKind> {
    let mut parameters = Vec::new();
    let text = text.trim();
    if text.is_empty() {
        return Ok(parameters);
    }

    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0usize;
    for (index, character) in text.char_indices() {
        match character {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.checked_sub(1).ok_or(AtErrorKind::InvalidParameter)?,
            ',' if !quoted && depth == 0 => {
                parameters
                    .push(text[start..index].trim())
                    .map_err(|_| AtErrorKind::TooManyParameters)?;
                start = index + 1;
            }
            _ => {}
        }
    }
    if quoted || depth != 0 {
        return Err(AtErrorKind::InvalidParameter);
    }
    parameters
        .push(text[start..].trim())
        .map_err(|_| AtErrorKind::TooManyParameters)?;
    Ok(parameters)
}

/// Parse a decimal parameter
pub(crate) fn parse_number<T: FromStr>(text: &str) -> Result<T, AtErrorKind> {
    text.trim()
        .parse()
        .map_err(|_| AtErrorKind::InvalidParameter)
}

/// Parse a comma separated list of decimal parameters
pub(crate) fn parse_numbers<T: FromStr, const N: usize>(text: &str) -> Result<Vec<T, N>, AtErrorKind> {
    let mut values = Vec::new();
    for parameter in split_parameters(text)? {
        values
            .push(parse_number(parameter)?)
            .map_err(|_| AtErrorKind::TooManyParameters)?;
    }
    Ok(values)
}

/// Strip one pair of surrounding parentheses
pub(crate) fn strip_parentheses(text: &str) -> Result<&str, AtErrorKind> {
    text.trim()
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .ok_or(AtErrorKind::InvalidParameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parameters_nested() {
        let parameters = split_parameters(r#"("call",(0,1)), ("callsetup",(0-3))"#).unwrap();
        assert_eq!(parameters.as_slice(), &[r#"("call",(0,1))"#, r#"("callsetup",(0-3))"#]);
    }

    #[test]
    fn test_split_parameters_quoted_comma() {
        let parameters = split_parameters(r#""a,b",3"#).unwrap();
        assert_eq!(parameters.as_slice(), &[r#""a,b""#, "3"]);
    }

    #[test]
    fn test_split_parameters_unbalanced() {
        assert_eq!(split_parameters("(0,1"), Err(AtErrorKind::InvalidParameter));
        assert_eq!(split_parameters("0,1)"), Err(AtErrorKind::InvalidParameter));
        assert!(split_parameters("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_numbers() {
        let values: Vec<u8, 4> = parse_numbers("1, 2,3").unwrap();
        assert_eq!(values.as_slice(), &[1, 2, 3]);
        assert_eq!(
            parse_numbers::<u8, 4>("1,x"),
            Err(AtErrorKind::InvalidParameter)
        );
        assert_eq!(
            parse_numbers::<u8, 2>("1,2,3"),
            Err(AtErrorKind::TooManyParameters)
        );
    }

    #[test]
    fn test_lossy_line() {
        let line = lossy_line(&[b'O', 0xFF, b'K', b'\t']);
        assert_eq!(line.as_str(), "O?K?");
    }
}
