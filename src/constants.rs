//! `HfpBird` Constants
//!
//! This module contains the capacities and protocol constants used throughout
//! the `HfpBird` library. Every collection in the crate is a fixed-capacity
//! `heapless` container sized by one of these values.

/// Maximum length of a single AT line, excluding terminators
pub const MAX_LINE_LENGTH: usize = 256;

/// Number of bytes read from the channel per poll
pub const READ_CHUNK_SIZE: usize = 64;

/// Capacity of the AT decoder reassembly buffer
pub const DECODER_BUFFER_SIZE: usize = MAX_LINE_LENGTH + READ_CHUNK_SIZE;

/// Maximum number of comma separated parameters in one AT line
pub const MAX_AT_PARAMETERS: usize = 24;

/// Maximum length of an AT command or result code name (e.g. `+BRSF`)
pub const MAX_AT_NAME_LENGTH: usize = 16;

/// Maximum length of a dial string
pub const MAX_NUMBER_LENGTH: usize = 32;

/// Maximum number of AG indicators a gateway may declare
pub const MAX_AG_INDICATORS: usize = 16;

/// Maximum number of HF indicators tracked per session
pub const MAX_HF_INDICATORS: usize = 4;

/// Maximum number of audio codecs advertised in `AT+BAC`
pub const MAX_CODECS: usize = 8;

/// Number of call hold operation kinds defined by the profile
pub const MAX_CALL_HOLD_OPERATIONS: usize = 7;

/// Maximum number of information lines collected for one command
pub const MAX_RESPONSE_LINES: usize = 8;

/// Depth of each subscriber's event queue
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Maximum number of concurrent event subscribers per session
pub const MAX_OBSERVERS: usize = 4;

/// Maximum number of concurrent event publishers per session
pub const MAX_PUBLISHERS: usize = 2;

/// Depth of the AG unsolicited result code queue
pub const NOTIFICATION_QUEUE_DEPTH: usize = 8;

/// Depth of the HF internal command queue (codec confirmations)
pub const DEFERRED_QUEUE_DEPTH: usize = 4;

/// Highest speaker or microphone gain value
pub const MAX_GAIN: u8 = 15;

/// `+CMER` mode that forwards indicator events
pub const CMER_MODE_FORWARD: u8 = 3;

/// `+CME ERROR` code for an unsupported operation
pub const CME_OPERATION_NOT_SUPPORTED: u16 = 4;

/// `+CME ERROR` code for an operation not allowed in the current state
pub const CME_OPERATION_NOT_ALLOWED: u16 = 3;
