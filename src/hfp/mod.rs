//! Hands-Free Profile Implementation
//!
//! This module implements both roles of the Hands-Free Profile on top of an
//! RFCOMM channel: the Hands-Free unit (headset, car kit) and the Audio
//! Gateway (phone).
//!
//! ## Architecture
//!
//! - **Capability Model**: feature flags, indicators, codecs and the role
//!   configurations built from them
//! - **Service Level Connection**: the fixed AT handshake run by
//!   [`HfProtocol::initiate`] and [`AgProtocol::accept`]
//! - **Session Loop**: `run()` multiplexes local commands, peer traffic and
//!   unsolicited result codes until the channel closes or the session is
//!   cancelled
//! - **Audio Setup**: eSCO parameter selection handed to the link controller
//! - **SDP Records**: advertisement and discovery of the profile
//!
//! ## Usage
//!
//! ```rust,no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use hfpbird::hfp::{HfConfiguration, HfEvent, HfProtocol, RfcommChannel};
//!
//! # async fn example<C: RfcommChannel>(mut channel: C) -> Result<(), hfpbird::hfp::HfpError> {
//! let configuration = HfConfiguration::default();
//! let hf = HfProtocol::<CriticalSectionRawMutex>::new(&configuration);
//! let mut events = hf.subscribe()?;
//!
//! hf.initiate(&mut channel).await?;
//! // Run `hf.run(&mut channel)` in its own task, then:
//! // hf.dial("123456789").await?;
//! if let HfEvent::AgIndicator(state) = events.next_message_pure().await {
//!     let _ = state.current_status;
//! }
//! # Ok(())
//! # }
//! ```

pub mod ag;
pub mod codec;
pub mod config;
pub mod esco;
pub mod event;
pub mod features;
pub mod hf;
pub mod indicators;
mod link;
pub mod sdp;


pub use ag::*;
pub use codec::*;
pub use config::*;
pub use esco::*;
pub use event::*;
pub use features::*;
pub use hf::*;
pub use indicators::*;
pub use link::RfcommChannel;
pub use sdp::*;

use crate::at::{AtError, AtErrorKind};

/// Hands-Free Profile versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ProfileVersion {
    /// HFP 1.5
    V1_5 = 0x0105,
    /// HFP 1.6
    V1_6 = 0x0106,
    /// HFP 1.7
    V1_7 = 0x0107,
    /// HFP 1.8
    V1_8 = 0x0108,
    /// HFP 1.9
    V1_9 = 0x0109,
}

impl ProfileVersion {
    /// Look up a version by its SDP encoding
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0105 => Some(Self::V1_5),
            0x0106 => Some(Self::V1_6),
            0x0107 => Some(Self::V1_7),
            0x0108 => Some(Self::V1_8),
            0x0109 => Some(Self::V1_9),
            _ => None,
        }
    }
}

/// Kinds of fatal protocol violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Violation {
    /// A line could not be decoded
    MalformedFrame(AtErrorKind),
    /// A command arrived out of the handshake order
    UnexpectedCommand,
    /// A response did not match the outstanding command
    UnexpectedResponse,
    /// The peer rejected a handshake step
    HandshakeRejected,
    /// Codec confirmation differs from the proposal
    CodecMismatch,
    /// `+CIND` value count differs from the declared indicator list
    IndicatorMismatch,
}

/// HFP Errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HfpError {
    /// The peer broke the protocol; the session is over and the channel closed
    ProtocolViolation(Violation),
    /// Feature not asserted by both sides, or item not supported
    UnsupportedFeature,
    /// Value outside its legal set; nothing was changed
    OutOfRange,
    /// Another command is outstanding; nothing was sent
    Busy,
    /// The channel closed
    Disconnected,
    /// The session was cancelled
    Cancelled,
    /// The service level connection is not established yet
    NotEstablished,
    /// The peer answered `ERROR` (`None`) or `+CME ERROR: <code>`
    Rejected(Option<u16>),
    /// A configuration invariant does not hold
    InvalidConfiguration,
    /// Command text does not fit in one AT line
    CommandTooLong,
    /// No room for another event subscriber
    ObserverLimit,
}

impl HfpError {
    /// Whether the error ends the session
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::Disconnected | Self::Cancelled
        )
    }
}

impl From<AtError> for HfpError {
    fn from(error: AtError) -> Self {
        Self::ProtocolViolation(Violation::MalformedFrame(error.kind))
    }
}

impl From<Violation> for HfpError {
    fn from(violation: Violation) -> Self {
        Self::ProtocolViolation(violation)
    }
}
