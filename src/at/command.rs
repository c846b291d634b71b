//! AT commands (Hands-Free → Audio Gateway)

use super::{AtError, AtErrorKind, Line, Name, parse_number, parse_numbers};
use crate::constants::{MAX_CODECS, MAX_GAIN, MAX_HF_INDICATORS, MAX_NUMBER_LENGTH};
use crate::hfp::CallHoldOperation;
use core::fmt::Write;
use heapless::{String, Vec};

/// Dial string carried by `ATD`
pub type Number = String<MAX_NUMBER_LENGTH>;

/// Syntactic form of an extended command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    /// `AT+X`
    Action,
    /// `AT+X?`
    Read,
    /// `AT+X=?`
    Test,
    /// `AT+X=<args>`
    Set,
}

/// Typed AT command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtCommand {
    /// `AT+BRSF=<features>`
    SupportedFeatures(u32),
    /// `AT+BAC=<codec>,...` (raw identifiers, unknown ones kept)
    AvailableCodecs(Vec<u8, MAX_CODECS>),
    /// `AT+CIND=?`
    IndicatorsTest,
    /// `AT+CIND?`
    IndicatorsRead,
    /// `AT+CMER=<mode>,<keyp>,<disp>,<ind>`
    EventReporting {
        /// Forwarding mode (3 forwards indicator events)
        mode: u8,
        /// Whether indicator events are enabled
        indicators: bool,
    },
    /// `AT+CHLD=?`
    CallHoldTest,
    /// `AT+CHLD=<op>[<idx>]`
    CallHold {
        /// Operation kind
        operation: CallHoldOperation,
        /// Call index for `1x` / `2x`
        call_index: Option<u8>,
    },
    /// `AT+BIND=<id>,...`
    HfIndicatorsSet(Vec<u16, MAX_HF_INDICATORS>),
    /// `AT+BIND=?`
    HfIndicatorsTest,
    /// `AT+BIND?`
    HfIndicatorsRead,
    /// `AT+BIEV=<id>,<value>`
    HfIndicatorValue {
        /// Indicator identifier
        indicator: u16,
        /// New value
        value: u16,
    },
    /// `AT+BCC`
    CodecConnection,
    /// `AT+BCS=<codec>`
    CodecSelection(u8),
    /// `ATD<number>;`
    Dial(Number),
    /// `AT+BLDN`
    Redial,
    /// `ATA`
    Answer,
    /// `AT+CHUP`
    HangUp,
    /// `AT+VGS=<gain>`
    SpeakerGain(u8),
    /// `AT+VGM=<gain>`
    MicrophoneGain(u8),
    /// `AT+CMEE=<0|1>`
    ExtendedErrors(bool),
    /// Any other well-formed command, kept verbatim
    Other(Line),
}

fn gain(text: &str) -> Result<u8, AtErrorKind> {
    let value: u8 = parse_number(text)?;
    if value > MAX_GAIN {
        return Err(AtErrorKind::InvalidParameter);
    }
    Ok(value)
}

fn flag(text: &str) -> Result<bool, AtErrorKind> {
    match parse_number::<u8>(text)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(AtErrorKind::InvalidParameter),
    }
}

fn call_hold(text: &str) -> Result<AtCommand, AtErrorKind> {
    let mut characters = text.trim().chars();
    let head = characters.next();
    let tail = characters.as_str();
    let index = if tail.is_empty() {
        None
    } else {
        Some(parse_number::<u8>(tail)?)
    };

    let operation = match (head, index) {
        (Some('0'), None) => CallHoldOperation::ReleaseAllHeldCalls,
        (Some('1'), None) => CallHoldOperation::ReleaseAllActiveCalls,
        (Some('1'), Some(_)) => CallHoldOperation::ReleaseSpecificCall,
        (Some('2'), None) => CallHoldOperation::HoldAllActiveCalls,
        (Some('2'), Some(_)) => CallHoldOperation::HoldAllCallsExcept,
        (Some('3'), None) => CallHoldOperation::AddHeldCall,
        (Some('4'), None) => CallHoldOperation::ConnectTwoCalls,
        _ => return Err(AtErrorKind::InvalidParameter),
    };
    Ok(AtCommand::CallHold {
        operation,
        call_index: index,
    })
}

impl AtCommand {
    /// Parse a command line (without terminator)
    ///
    /// # Errors
    /// Returns an [`AtError`] if the line does not start with `AT` or a
    /// parameter of a known command is malformed.
    pub fn parse(line: &str) -> Result<Self, AtError> {
        Self::parse_kind(line.trim()).map_err(|kind| AtError::new(kind, line))
    }

    fn parse_kind(line: &str) -> Result<Self, AtErrorKind> {
        let body = line
            .get(..2)
            .filter(|prefix| prefix.eq_ignore_ascii_case("AT"))
            .map(|_| &line[2..])
            .ok_or(AtErrorKind::MissingPrefix)?;

        if let Some(number) = body.strip_prefix(['D', 'd']) {
            let number = number.trim().trim_end_matches(';').trim();
            if number.is_empty() {
                return Err(AtErrorKind::InvalidParameter);
            }
            let number = Number::try_from(number).map_err(|()| AtErrorKind::InvalidParameter)?;
            return Ok(Self::Dial(number));
        }
        if body.eq_ignore_ascii_case("A") {
            return Ok(Self::Answer);
        }
        if !body.starts_with('+') {
            return Self::other(line);
        }

        let split = body.find(['=', '?']).unwrap_or(body.len());
        let (name, suffix) = body.split_at(split);
        let (kind, arguments) = if suffix.is_empty() {
            (CommandKind::Action, "")
        } else if suffix == "?" {
            (CommandKind::Read, "")
        } else if suffix == "=?" {
            (CommandKind::Test, "")
        } else if let Some(arguments) = suffix.strip_prefix('=') {
            (CommandKind::Set, arguments)
        } else {
            return Err(AtErrorKind::InvalidParameter);
        };

        let is = |expected: &str| name.eq_ignore_ascii_case(expected);
        let command = match kind {
            CommandKind::Set if is("+BRSF") => Self::SupportedFeatures(parse_number(arguments)?),
            CommandKind::Set if is("+BAC") => Self::AvailableCodecs(parse_numbers(arguments)?),
            CommandKind::Test if is("+CIND") => Self::IndicatorsTest,
            CommandKind::Read if is("+CIND") => Self::IndicatorsRead,
            CommandKind::Set if is("+CMER") => {
                let values: Vec<u8, 5> = parse_numbers(arguments)?;
                let mode = *values.first().ok_or(AtErrorKind::InvalidParameter)?;
                let indicators = values.get(3).copied().unwrap_or(0) == 1;
                Self::EventReporting { mode, indicators }
            }
            CommandKind::Test if is("+CHLD") => Self::CallHoldTest,
            CommandKind::Set if is("+CHLD") => call_hold(arguments)?,
            CommandKind::Set if is("+BIND") => Self::HfIndicatorsSet(parse_numbers(arguments)?),
            CommandKind::Test if is("+BIND") => Self::HfIndicatorsTest,
            CommandKind::Read if is("+BIND") => Self::HfIndicatorsRead,
            CommandKind::Set if is("+BIEV") => {
                let values: Vec<u16, 2> = parse_numbers(arguments)?;
                match values.as_slice() {
                    [indicator, value] => Self::HfIndicatorValue {
                        indicator: *indicator,
                        value: *value,
                    },
                    _ => return Err(AtErrorKind::InvalidParameter),
                }
            }
            CommandKind::Action if is("+BCC") => Self::CodecConnection,
            CommandKind::Set if is("+BCS") => Self::CodecSelection(parse_number(arguments)?),
            CommandKind::Action if is("+BLDN") => Self::Redial,
            CommandKind::Action if is("+CHUP") => Self::HangUp,
            CommandKind::Set if is("+VGS") => Self::SpeakerGain(gain(arguments)?),
            CommandKind::Set if is("+VGM") => Self::MicrophoneGain(gain(arguments)?),
            CommandKind::Set if is("+CMEE") => Self::ExtendedErrors(flag(arguments)?),
            _ => return Self::other(line),
        };
        Ok(command)
    }

    fn other(line: &str) -> Result<Self, AtErrorKind> {
        Line::try_from(line)
            .map(Self::Other)
            .map_err(|()| AtErrorKind::InvalidParameter)
    }

    /// Prefix of the information responses this command expects, if any
    #[must_use]
    pub fn response_prefix(&self) -> Option<&'static str> {
        match self {
            Self::SupportedFeatures(_) => Some("+BRSF"),
            Self::IndicatorsTest | Self::IndicatorsRead => Some("+CIND"),
            Self::CallHoldTest => Some("+CHLD"),
            Self::HfIndicatorsTest | Self::HfIndicatorsRead => Some("+BIND"),
            _ => None,
        }
    }

    /// Name of the information responses this command expects, derived from
    /// the command name for commands the codec does not know
    #[must_use]
    pub fn expected_response(&self) -> Option<Name> {
        let name = match self {
            Self::Other(raw) => {
                let body = raw.get(2..)?;
                let end = body.find(['=', '?']).unwrap_or(body.len());
                Some(&body[..end]).filter(|name| name.starts_with('+') && name.is_ascii())?
            }
            _ => self.response_prefix()?,
        };
        let mut expected = Name::new();
        for character in name.chars() {
            expected.push(character.to_ascii_uppercase()).ok()?;
        }
        Some(expected)
    }

    /// Encode the command including its `\r` terminator
    #[must_use]
    pub fn encode(&self) -> Line {
        let mut line = Line::new();
        self.write_to(&mut line).ok();
        line.push('\r').ok();
        line
    }

    fn write_to(&self, out: &mut Line) -> core::fmt::Result {
        match self {
            Self::SupportedFeatures(features) => write!(out, "AT+BRSF={features}"),
            Self::AvailableCodecs(codecs) => {
                out.write_str("AT+BAC=")?;
                write_list(out, codecs)
            }
            Self::IndicatorsTest => out.write_str("AT+CIND=?"),
            Self::IndicatorsRead => out.write_str("AT+CIND?"),
            Self::EventReporting { mode, indicators } => {
                write!(out, "AT+CMER={mode},0,0,{}", u8::from(*indicators))
            }
            Self::CallHoldTest => out.write_str("AT+CHLD=?"),
            Self::CallHold {
                operation,
                call_index,
            } => {
                let code = &operation.as_str()[..1];
                match call_index {
                    Some(index) => write!(out, "AT+CHLD={code}{index}"),
                    None => write!(out, "AT+CHLD={code}"),
                }
            }
            Self::HfIndicatorsSet(indicators) => {
                out.write_str("AT+BIND=")?;
                write_list(out, indicators)
            }
            Self::HfIndicatorsTest => out.write_str("AT+BIND=?"),
            Self::HfIndicatorsRead => out.write_str("AT+BIND?"),
            Self::HfIndicatorValue { indicator, value } => {
                write!(out, "AT+BIEV={indicator},{value}")
            }
            Self::CodecConnection => out.write_str("AT+BCC"),
            Self::CodecSelection(codec) => write!(out, "AT+BCS={codec}"),
            Self::Dial(number) => write!(out, "ATD{number};"),
            Self::Redial => out.write_str("AT+BLDN"),
            Self::Answer => out.write_str("ATA"),
            Self::HangUp => out.write_str("AT+CHUP"),
            Self::SpeakerGain(gain) => write!(out, "AT+VGS={gain}"),
            Self::MicrophoneGain(gain) => write!(out, "AT+VGM={gain}"),
            Self::ExtendedErrors(enabled) => write!(out, "AT+CMEE={}", u8::from(*enabled)),
            Self::Other(raw) => out.write_str(raw),
        }
    }
}

pub(crate) fn write_list<T: core::fmt::Display>(out: &mut Line, values: &[T]) -> core::fmt::Result {
    for (position, value) in values.iter().enumerate() {
        if position > 0 {
            out.write_char(',')?;
        }
        write!(out, "{value}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake_commands() {
        assert_eq!(
            AtCommand::parse("AT+BRSF=896"),
            Ok(AtCommand::SupportedFeatures(896))
        );
        assert_eq!(
            AtCommand::parse("AT+BAC=1,2"),
            Ok(AtCommand::AvailableCodecs(Vec::from_slice(&[1, 2]).unwrap()))
        );
        assert_eq!(AtCommand::parse("AT+CIND=?"), Ok(AtCommand::IndicatorsTest));
        assert_eq!(AtCommand::parse("at+cind?"), Ok(AtCommand::IndicatorsRead));
        assert_eq!(
            AtCommand::parse("AT+CMER=3,0,0,1"),
            Ok(AtCommand::EventReporting {
                mode: 3,
                indicators: true
            })
        );
        assert_eq!(AtCommand::parse("AT+CHLD=?"), Ok(AtCommand::CallHoldTest));
        assert_eq!(
            AtCommand::parse("AT+BIND=1,2"),
            Ok(AtCommand::HfIndicatorsSet(Vec::from_slice(&[1, 2]).unwrap()))
        );
        assert_eq!(AtCommand::parse("AT+BIND=?"), Ok(AtCommand::HfIndicatorsTest));
        assert_eq!(AtCommand::parse("AT+BIND?"), Ok(AtCommand::HfIndicatorsRead));
    }

    #[test]
    fn test_parse_call_control() {
        assert_eq!(
            AtCommand::parse("ATD123456789;"),
            Ok(AtCommand::Dial(Number::try_from("123456789").unwrap()))
        );
        assert_eq!(
            AtCommand::parse("ATD123456789"),
            Ok(AtCommand::Dial(Number::try_from("123456789").unwrap()))
        );
        assert_eq!(AtCommand::parse("ATA"), Ok(AtCommand::Answer));
        assert_eq!(AtCommand::parse("AT+CHUP"), Ok(AtCommand::HangUp));
        assert_eq!(AtCommand::parse("AT+BLDN"), Ok(AtCommand::Redial));
        assert_eq!(
            AtCommand::parse("AT+CHLD=12"),
            Ok(AtCommand::CallHold {
                operation: CallHoldOperation::ReleaseSpecificCall,
                call_index: Some(2)
            })
        );
        assert_eq!(
            AtCommand::parse("AT+CHLD=2"),
            Ok(AtCommand::CallHold {
                operation: CallHoldOperation::HoldAllActiveCalls,
                call_index: None
            })
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(
            AtCommand::parse("+BRSF=1").unwrap_err().kind,
            AtErrorKind::MissingPrefix
        );
        assert_eq!(
            AtCommand::parse("AT+BRSF=abc").unwrap_err().kind,
            AtErrorKind::InvalidParameter
        );
        assert_eq!(
            AtCommand::parse("AT+VGS=16").unwrap_err().kind,
            AtErrorKind::InvalidParameter
        );
        assert_eq!(
            AtCommand::parse("AT+CHLD=5").unwrap_err().kind,
            AtErrorKind::InvalidParameter
        );
        assert_eq!(AtCommand::parse("ATD;").unwrap_err().kind, AtErrorKind::InvalidParameter);
    }

    #[test]
    fn test_parse_unknown_is_kept() {
        assert_eq!(
            AtCommand::parse("AT+CLCC"),
            Ok(AtCommand::Other(Line::try_from("AT+CLCC").unwrap()))
        );
        assert_eq!(
            AtCommand::parse("AT+BIEV?"),
            Ok(AtCommand::Other(Line::try_from("AT+BIEV?").unwrap()))
        );
    }

    #[test]
    fn test_encode() {
        assert_eq!(
            AtCommand::AvailableCodecs(Vec::from_slice(&[1, 2]).unwrap())
                .encode()
                .as_str(),
            "AT+BAC=1,2\r"
        );
        assert_eq!(
            AtCommand::EventReporting {
                mode: 3,
                indicators: true
            }
            .encode()
            .as_str(),
            "AT+CMER=3,0,0,1\r"
        );
        assert_eq!(
            AtCommand::CallHold {
                operation: CallHoldOperation::HoldAllCallsExcept,
                call_index: Some(1)
            }
            .encode()
            .as_str(),
            "AT+CHLD=21\r"
        );
        assert_eq!(
            AtCommand::Dial(Number::try_from("5551234").unwrap()).encode().as_str(),
            "ATD5551234;\r"
        );
        assert_eq!(
            AtCommand::HfIndicatorValue {
                indicator: 2,
                value: 100
            }
            .encode()
            .as_str(),
            "AT+BIEV=2,100\r"
        );
    }

    #[test]
    fn test_response_prefix() {
        assert_eq!(AtCommand::IndicatorsRead.response_prefix(), Some("+CIND"));
        assert_eq!(AtCommand::HfIndicatorsRead.response_prefix(), Some("+BIND"));
        assert_eq!(AtCommand::Answer.response_prefix(), None);

        let command = AtCommand::parse("at+clcc").unwrap();
        assert_eq!(command.expected_response().unwrap().as_str(), "+CLCC");
        assert_eq!(AtCommand::parse("ATZ").unwrap().expected_response(), None);
    }
}
