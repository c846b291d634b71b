//! AT responses and result codes (Audio Gateway → Hands-Free)

use super::command::write_list;
use super::{
    AtError, AtErrorKind, Line, parse_number, parse_numbers, split_parameters, strip_parentheses,
};
use crate::constants::{
    MAX_AG_INDICATORS, MAX_CALL_HOLD_OPERATIONS, MAX_HF_INDICATORS,
};
use crate::hfp::{AgIndicator, AgIndicatorState, CallHoldOperation, ValueSet};
use core::fmt::Write;
use heapless::Vec;

/// Indicator entry of a `+CIND=?` response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorDescriptor {
    /// Indicator identity
    pub indicator: AgIndicator,
    /// Legal values
    pub values: ValueSet,
}

impl From<&AgIndicatorState> for IndicatorDescriptor {
    fn from(state: &AgIndicatorState) -> Self {
        Self {
            indicator: state.indicator,
            values: state.supported_values,
        }
    }
}

/// Typed response or result code
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtResponse {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
    /// `+CME ERROR: <code>`
    CmeError(u16),
    /// `+BRSF: <features>`
    SupportedFeatures(u32),
    /// `+CIND: ("name",(values)),...`
    IndicatorDescriptors(Vec<IndicatorDescriptor, MAX_AG_INDICATORS>),
    /// `+CIND: <value>,...`
    IndicatorValues(Vec<u8, MAX_AG_INDICATORS>),
    /// `+CHLD: (<op>,...)`
    CallHoldOperations(Vec<CallHoldOperation, MAX_CALL_HOLD_OPERATIONS>),
    /// `+BIND: (<id>,...)`
    HfIndicatorsSupported(Vec<u16, MAX_HF_INDICATORS>),
    /// `+BIND: <id>,<0|1>`
    HfIndicatorStatus {
        /// Indicator identifier
        indicator: u16,
        /// Whether the AG wants updates
        enabled: bool,
    },
    /// `+CIEV: <index>,<value>`
    IndicatorEvent {
        /// 1-based position in the `+CIND` list
        index: u8,
        /// New value
        value: u8,
    },
    /// `+BCS: <codec>`
    CodecSelection(u8),
    /// `+VGS: <gain>`
    SpeakerGain(u8),
    /// `+VGM: <gain>`
    MicrophoneGain(u8),
    /// `RING`
    Ring,
    /// Any other line, kept verbatim
    Other(Line),
}

fn descriptor(text: &str) -> Result<IndicatorDescriptor, AtErrorKind> {
    let parts = split_parameters(strip_parentheses(text)?)?;
    let [name, values] = parts.as_slice() else {
        return Err(AtErrorKind::InvalidParameter);
    };
    let name = name
        .strip_prefix('"')
        .and_then(|name| name.strip_suffix('"'))
        .ok_or(AtErrorKind::InvalidParameter)?;
    let indicator = AgIndicator::from_name(name).ok_or(AtErrorKind::InvalidParameter)?;

    let mut set = ValueSet::empty();
    for item in split_parameters(strip_parentheses(values)?)? {
        if let Some((min, max)) = item.split_once('-') {
            let (min, max): (u8, u8) = (parse_number(min)?, parse_number(max)?);
            if min > max || max > ValueSet::MAX_VALUE {
                return Err(AtErrorKind::InvalidParameter);
            }
            for value in min..=max {
                set.insert(value);
            }
        } else {
            let value: u8 = parse_number(item)?;
            if value > ValueSet::MAX_VALUE {
                return Err(AtErrorKind::InvalidParameter);
            }
            set.insert(value);
        }
    }
    if set.is_empty() {
        return Err(AtErrorKind::InvalidParameter);
    }
    Ok(IndicatorDescriptor {
        indicator,
        values: set,
    })
}

fn pair<T: core::str::FromStr + Copy>(text: &str) -> Result<(T, T), AtErrorKind> {
    let values: Vec<T, 2> = parse_numbers(text)?;
    match values.as_slice() {
        [first, second] => Ok((*first, *second)),
        _ => Err(AtErrorKind::InvalidParameter),
    }
}

impl AtResponse {
    /// Parse a response line (without terminators)
    ///
    /// # Errors
    /// Returns an [`AtError`] if a known result code carries malformed
    /// parameters. Unknown lines are returned as [`AtResponse::Other`].
    pub fn parse(line: &str) -> Result<Self, AtError> {
        Self::parse_kind(line.trim()).map_err(|kind| AtError::new(kind, line))
    }

    fn parse_kind(line: &str) -> Result<Self, AtErrorKind> {
        match line {
            "OK" => return Ok(Self::Ok),
            "ERROR" => return Ok(Self::Error),
            "RING" => return Ok(Self::Ring),
            _ => {}
        }
        let Some((code, arguments)) = line.split_once(':') else {
            return Self::other(line);
        };
        let arguments = arguments.trim();

        let response = match code.trim() {
            "+CME ERROR" => Self::CmeError(parse_number(arguments)?),
            "+BRSF" => Self::SupportedFeatures(parse_number(arguments)?),
            "+CIND" if arguments.starts_with('(') => {
                let mut descriptors = Vec::new();
                for item in split_parameters(arguments)? {
                    descriptors
                        .push(descriptor(item)?)
                        .map_err(|_| AtErrorKind::TooManyParameters)?;
                }
                Self::IndicatorDescriptors(descriptors)
            }
            "+CIND" => Self::IndicatorValues(parse_numbers(arguments)?),
            "+CHLD" => {
                let mut operations = Vec::new();
                for token in split_parameters(strip_parentheses(arguments)?)? {
                    let operation =
                        CallHoldOperation::from_token(token).ok_or(AtErrorKind::InvalidParameter)?;
                    operations
                        .push(operation)
                        .map_err(|_| AtErrorKind::TooManyParameters)?;
                }
                Self::CallHoldOperations(operations)
            }
            "+BIND" if arguments.starts_with('(') => {
                Self::HfIndicatorsSupported(parse_numbers(strip_parentheses(arguments)?)?)
            }
            "+BIND" => {
                let (indicator, enabled) = pair::<u16>(arguments)?;
                Self::HfIndicatorStatus {
                    indicator,
                    enabled: enabled == 1,
                }
            }
            "+CIEV" => {
                let (index, value) = pair::<u8>(arguments)?;
                Self::IndicatorEvent { index, value }
            }
            "+BCS" => Self::CodecSelection(parse_number(arguments)?),
            "+VGS" => Self::SpeakerGain(parse_number(arguments)?),
            "+VGM" => Self::MicrophoneGain(parse_number(arguments)?),
            _ => return Self::other(line),
        };
        Ok(response)
    }

    fn other(line: &str) -> Result<Self, AtErrorKind> {
        Line::try_from(line)
            .map(Self::Other)
            .map_err(|()| AtErrorKind::LineTooLong)
    }

    /// Result code name used to match a response against the outstanding
    /// command (`+CIND`, `OK`, ...)
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::CmeError(_) => "+CME ERROR",
            Self::SupportedFeatures(_) => "+BRSF",
            Self::IndicatorDescriptors(_) | Self::IndicatorValues(_) => "+CIND",
            Self::CallHoldOperations(_) => "+CHLD",
            Self::HfIndicatorsSupported(_) | Self::HfIndicatorStatus { .. } => "+BIND",
            Self::IndicatorEvent { .. } => "+CIEV",
            Self::CodecSelection(_) => "+BCS",
            Self::SpeakerGain(_) => "+VGS",
            Self::MicrophoneGain(_) => "+VGM",
            Self::Ring => "RING",
            Self::Other(line) => line.split(':').next().unwrap_or_default().trim(),
        }
    }

    /// Whether this is a final result code that completes a command
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Ok | Self::Error | Self::CmeError(_))
    }

    /// Whether this result code may arrive without being asked for
    #[must_use]
    pub const fn is_unsolicited(&self) -> bool {
        matches!(
            self,
            Self::IndicatorEvent { .. }
                | Self::CodecSelection(_)
                | Self::SpeakerGain(_)
                | Self::MicrophoneGain(_)
                | Self::Ring
                | Self::HfIndicatorStatus { .. }
        )
    }

    /// Encode the response including its `\r\n` framing
    ///
    /// A response that does not fit in one line is sent as `ERROR` rather
    /// than cut short. Only a `+CIND` list of an unvalidated configuration
    /// can get that long.
    #[must_use]
    pub fn encode(&self) -> Line {
        self.try_encode().unwrap_or_else(|_| {
            error!("[AT] {} response does not fit in a line", self.code());
            let mut line = Line::new();
            line.push_str("\r\nERROR\r\n").ok();
            line
        })
    }

    /// Encode the response including its `\r\n` framing
    ///
    /// # Errors
    /// `LineTooLong` if the encoded response exceeds one line.
    pub fn try_encode(&self) -> Result<Line, AtError> {
        let mut line = Line::new();
        let complete = line.push_str("\r\n").is_ok()
            && self.write_to(&mut line).is_ok()
            && line.push_str("\r\n").is_ok();
        if complete {
            Ok(line)
        } else {
            Err(AtError::new(AtErrorKind::LineTooLong, &line))
        }
    }

    fn write_to(&self, out: &mut Line) -> core::fmt::Result {
        match self {
            Self::Ok => out.write_str("OK"),
            Self::Error => out.write_str("ERROR"),
            Self::CmeError(code) => write!(out, "+CME ERROR: {code}"),
            Self::SupportedFeatures(features) => write!(out, "+BRSF: {features}"),
            Self::IndicatorDescriptors(descriptors) => {
                out.write_str("+CIND: ")?;
                for (position, descriptor) in descriptors.iter().enumerate() {
                    if position > 0 {
                        out.write_char(',')?;
                    }
                    write!(out, "(\"{}\",", descriptor.indicator.name())?;
                    descriptor.values.write_to(out)?;
                    out.write_char(')')?;
                }
                Ok(())
            }
            Self::IndicatorValues(values) => {
                out.write_str("+CIND: ")?;
                write_list(out, values)
            }
            Self::CallHoldOperations(operations) => {
                out.write_str("+CHLD: (")?;
                for (position, operation) in operations.iter().enumerate() {
                    if position > 0 {
                        out.write_char(',')?;
                    }
                    out.write_str(operation.as_str())?;
                }
                out.write_char(')')
            }
            Self::HfIndicatorsSupported(indicators) => {
                out.write_str("+BIND: (")?;
                write_list(out, indicators)?;
                out.write_char(')')
            }
            Self::HfIndicatorStatus { indicator, enabled } => {
                write!(out, "+BIND: {indicator},{}", u8::from(*enabled))
            }
            Self::IndicatorEvent { index, value } => write!(out, "+CIEV: {index},{value}"),
            Self::CodecSelection(codec) => write!(out, "+BCS: {codec}"),
            Self::SpeakerGain(gain) => write!(out, "+VGS: {gain}"),
            Self::MicrophoneGain(gain) => write!(out, "+VGM: {gain}"),
            Self::Ring => out.write_str("RING"),
            Self::Other(raw) => out.write_str(raw),
        }
    }
}

/// Frame raw result code text as `\r\n<text>\r\n`
///
/// Returns `None` if the framed text does not fit in a line.
#[must_use]
pub fn frame_response(text: &str) -> Option<Line> {
    let mut line = Line::new();
    line.push_str("\r\n").ok()?;
    line.push_str(text.trim()).ok()?;
    line.push_str("\r\n").ok()?;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_results() {
        assert_eq!(AtResponse::parse("OK"), Ok(AtResponse::Ok));
        assert_eq!(AtResponse::parse(" ERROR "), Ok(AtResponse::Error));
        assert_eq!(AtResponse::parse("+CME ERROR: 30"), Ok(AtResponse::CmeError(30)));
        assert!(AtResponse::CmeError(3).is_final());
        assert!(!AtResponse::Ring.is_final());
    }

    #[test]
    fn test_parse_indicator_descriptors() {
        let response = AtResponse::parse(
            r#"+CIND: ("call",(0,1)),("callsetup",(0-3)),("signal",(0,2,4))"#,
        )
        .unwrap();
        let AtResponse::IndicatorDescriptors(descriptors) = response else {
            panic!("Expected IndicatorDescriptors");
        };
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].indicator, AgIndicator::Call);
        assert_eq!(descriptors[0].values, ValueSet::range(0, 1));
        assert_eq!(descriptors[1].values, ValueSet::range(0, 3));
        assert_eq!(descriptors[2].values, ValueSet::from_values(&[0, 2, 4]));
    }

    #[test]
    fn test_parse_indicator_values() {
        assert_eq!(
            AtResponse::parse("+CIND: 1,0,0,0,4,0,5"),
            Ok(AtResponse::IndicatorValues(
                Vec::from_slice(&[1, 0, 0, 0, 4, 0, 5]).unwrap()
            ))
        );
    }

    #[test]
    fn test_parse_unknown_indicator_name() {
        let error = AtResponse::parse(r#"+CIND: ("bogus",(0,1))"#).unwrap_err();
        assert_eq!(error.kind, AtErrorKind::InvalidParameter);
        assert_eq!(error.raw.as_str(), r#"+CIND: ("bogus",(0,1))"#);
    }

    #[test]
    fn test_parse_bind_forms() {
        assert_eq!(
            AtResponse::parse("+BIND: (1,2)"),
            Ok(AtResponse::HfIndicatorsSupported(
                Vec::from_slice(&[1, 2]).unwrap()
            ))
        );
        assert_eq!(
            AtResponse::parse("+BIND: 2,1"),
            Ok(AtResponse::HfIndicatorStatus {
                indicator: 2,
                enabled: true
            })
        );
    }

    #[test]
    fn test_parse_unsolicited() {
        let event = AtResponse::parse("+CIEV: 2,1").unwrap();
        assert_eq!(event, AtResponse::IndicatorEvent { index: 2, value: 1 });
        assert!(event.is_unsolicited());

        assert_eq!(AtResponse::parse("+BCS: 2"), Ok(AtResponse::CodecSelection(2)));
        assert_eq!(AtResponse::parse("RING"), Ok(AtResponse::Ring));
        assert!(AtResponse::parse("+CIEV: 2").is_err());
    }

    #[test]
    fn test_parse_call_hold() {
        let response = AtResponse::parse("+CHLD: (0,1,1x,2,2x,3,4)").unwrap();
        let AtResponse::CallHoldOperations(operations) = response else {
            panic!("Expected CallHoldOperations");
        };
        assert_eq!(operations.as_slice(), &CallHoldOperation::ALL);
    }

    #[test]
    fn test_parse_other() {
        let response = AtResponse::parse("+CLIP: \"5551234\",129").unwrap();
        assert_eq!(response.code(), "+CLIP");
        assert!(!response.is_unsolicited());
    }

    #[test]
    fn test_encode_indicator_descriptors() {
        let descriptors = [AgIndicatorState::call(), AgIndicatorState::callsetup()]
            .iter()
            .map(IndicatorDescriptor::from)
            .collect();
        assert_eq!(
            AtResponse::IndicatorDescriptors(descriptors).encode().as_str(),
            "\r\n+CIND: (\"call\",(0,1)),(\"callsetup\",(0-3))\r\n"
        );
    }

    #[test]
    fn test_encode_overlong_descriptors() {
        let descriptors: Vec<_, MAX_AG_INDICATORS> = core::iter::repeat_n(
            IndicatorDescriptor::from(&AgIndicatorState::callsetup()),
            MAX_AG_INDICATORS,
        )
        .collect();
        let response = AtResponse::IndicatorDescriptors(descriptors);
        assert_eq!(
            response.try_encode().map_err(|error| error.kind),
            Err(AtErrorKind::LineTooLong)
        );
        // Never a truncated frame
        assert_eq!(response.encode().as_str(), "\r\nERROR\r\n");
    }

    #[test]
    fn test_encode_results() {
        assert_eq!(AtResponse::Ok.encode().as_str(), "\r\nOK\r\n");
        assert_eq!(
            AtResponse::IndicatorEvent { index: 3, value: 1 }.encode().as_str(),
            "\r\n+CIEV: 3,1\r\n"
        );
        assert_eq!(
            AtResponse::HfIndicatorsSupported(Vec::from_slice(&[1, 2]).unwrap())
                .encode()
                .as_str(),
            "\r\n+BIND: (1,2)\r\n"
        );
        assert_eq!(
            frame_response("+VGS: 9").unwrap().as_str(),
            "\r\n+VGS: 9\r\n"
        );
    }
}
