//! Session events
//!
//! Each session publishes what the peer did on an embassy `PubSubChannel`.
//! Events are delivered at most once and in channel arrival order; nothing
//! is published after the session is cancelled or the channel closed.

use super::{AgIndicatorState, AudioCodec, CallHoldOperation, HfIndicator, HfIndicatorState};
use crate::at::{AtErrorKind, Number};
use bt_hci::param::ConnHandle;

/// Events observed by the Hands-Free unit
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HfEvent {
    /// An AG indicator changed (`+CIEV`)
    AgIndicator(AgIndicatorState),
    /// A `+CIEV` named an unknown position or an illegal value; state unchanged
    IndicatorRejected {
        /// 1-based position
        index: u8,
        /// Rejected value
        value: u8,
    },
    /// Both sides agreed on a codec
    CodecNegotiation(AudioCodec),
    /// Incoming call alert
    Ring,
    /// The AG set the speaker gain
    SpeakerVolume(u8),
    /// The AG set the microphone gain
    MicrophoneVolume(u8),
    /// The AG enabled or disabled updates for an HF indicator
    HfIndicatorEnabled {
        /// Indicator
        indicator: HfIndicator,
        /// Whether updates are wanted
        enabled: bool,
    },
    /// A line could not be decoded; the session continues
    MalformedFrame(AtErrorKind),
    /// A synchronous audio link was opened
    AudioConnected(ConnHandle),
    /// The synchronous audio link was closed
    AudioDisconnected(ConnHandle),
}

/// Events observed by the Audio Gateway
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AgEvent {
    /// The HF dialed a number (`ATD`)
    Dial(Number),
    /// The HF asked to redial the last number (`AT+BLDN`)
    Redial,
    /// The HF answered the incoming call (`ATA`)
    Answer,
    /// The HF rejected or terminated a call (`AT+CHUP`)
    HangUp,
    /// The HF requested a call hold operation (`AT+CHLD`)
    CallHold {
        /// Operation
        operation: CallHoldOperation,
        /// Call index for `1x` / `2x`
        call_index: Option<u8>,
    },
    /// The HF reported an HF indicator value (`AT+BIEV`)
    HfIndicator(HfIndicatorState),
    /// Both sides agreed on a codec
    CodecNegotiation(AudioCodec),
    /// The HF reported its speaker gain
    SpeakerVolume(u8),
    /// The HF reported its microphone gain
    MicrophoneVolume(u8),
    /// A line could not be decoded; the session continues
    MalformedFrame(AtErrorKind),
    /// A synchronous audio link was opened
    AudioConnected(ConnHandle),
    /// The synchronous audio link was closed
    AudioDisconnected(ConnHandle),
}
