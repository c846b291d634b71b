#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(async_fn_in_trait, clippy::too_many_lines)]

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod at;
pub mod constants;
pub mod hfp;
pub mod sdp;

pub use hfp::{
    AgConfiguration, AgEvent, AgProtocol, HfConfiguration, HfEvent, HfProtocol, HfpError,
    ProfileVersion, RfcommChannel,
};
pub use sdp::{SdpError, SdpServer, ServiceRecord};
