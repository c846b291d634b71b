//! Service Discovery Protocol Records
//!
//! This module holds the service records a device advertises and the lookup
//! used to discover a peer's services. The Hands-Free records themselves are
//! built in [`crate::hfp::sdp`].

/// SDP Protocol Service Multiplexer (PSM) for L2CAP
pub const SDP_PSM: u16 = 0x0001;

/// Service record handle type
pub type ServiceRecordHandle = u32;

pub mod record;
pub mod server;

pub use record::{
    AttributeId, DataElement, ProfileDescriptor, ProtocolDescriptor, ServiceClassId, ServiceRecord,
};
pub use server::{SdpServer, ServiceDatabase};

/// SDP Error Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdpError {
    /// Too many attributes or list entries for one record
    TooManyAttributes,
    /// Too many services registered
    TooManyServices,
    /// A record with the same handle is already registered
    DuplicateHandle,
    /// Service not found
    ServiceNotFound,
    /// Attribute missing or of the wrong type
    InvalidData,
}
