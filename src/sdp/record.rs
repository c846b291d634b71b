//! Service records
//!
//! A record is a handle plus a map of attribute IDs to data elements. Only
//! the element kinds the Hands-Free records need are modelled: integers,
//! text, the service class list and the protocol and profile descriptor
//! lists.

use super::{SdpError, ServiceRecordHandle};
use heapless::{FnvIndexMap, Vec};

/// Attribute capacity of one record
pub const MAX_ATTRIBUTES_PER_RECORD: usize = 16;

/// Record capacity of the local database
pub const MAX_SERVICE_RECORDS: usize = 16;

/// Maximum number of service classes in a record
pub const MAX_SERVICE_CLASSES: usize = 4;

/// Maximum number of protocol descriptors in a record
pub const MAX_PROTOCOL_DESCRIPTORS: usize = 4;

/// Maximum number of profile descriptors in a record
pub const MAX_PROFILE_DESCRIPTORS: usize = 2;

/// Maximum length of a text attribute
pub const MAX_TEXT_LENGTH: usize = 64;

/// Full 128-bit UUID
pub type ServiceUuid = u128;

/// Attribute ID type
pub type AttributeId = u16;

/// Attribute IDs valid in every record
pub mod universal_attributes {
    /// Service Record Handle
    pub const SERVICE_RECORD_HANDLE: u16 = 0x0000;
    /// Service Class ID List
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    /// How the service is reached
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    /// Profiles and versions the service implements
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    /// Service Name (primary language)
    pub const SERVICE_NAME: u16 = 0x0100;
}

/// Hands-Free profile specific attribute IDs
pub mod profile_attributes {
    /// Network (AG only: ability to reject a call)
    pub const NETWORK: u16 = 0x0301;
    /// Supported Features
    pub const SUPPORTED_FEATURES: u16 = 0x0311;
}

/// Protocol UUIDs (16-bit)
pub mod protocol_uuids {
    /// RFCOMM
    pub const RFCOMM: u16 = 0x0003;
    /// L2CAP
    pub const L2CAP: u16 = 0x0100;
}

/// Service class UUIDs used by the Hands-Free records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ServiceClassId {
    /// SDP Server Service
    ServiceDiscoveryServer = 0x1000,
    /// Hands-Free Profile
    HandsFree = 0x111E,
    /// Hands-Free Audio Gateway
    HandsFreeAudioGateway = 0x111F,
    /// Generic Audio
    GenericAudio = 0x1203,
}

/// One entry of a protocol descriptor list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolDescriptor {
    /// Protocol UUID (16-bit)
    pub protocol: u16,
    /// Protocol parameter (PSM for L2CAP, server channel for RFCOMM)
    pub parameter: Option<u16>,
}

/// One entry of a profile descriptor list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileDescriptor {
    /// Profile UUID (16-bit)
    pub profile: u16,
    /// Profile version (major in the high byte)
    pub version: u16,
}

/// Value of one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataElement {
    /// `u8`
    UnsignedInt8(u8),
    /// `u16`
    UnsignedInt16(u16),
    /// `u32`
    UnsignedInt32(u32),
    /// UTF-8 text
    TextString(Vec<u8, MAX_TEXT_LENGTH>),
    /// Service class list, most specific first
    UuidList(Vec<u128, MAX_SERVICE_CLASSES>),
    /// Protocol stack used to reach the service
    ProtocolDescriptorList(Vec<ProtocolDescriptor, MAX_PROTOCOL_DESCRIPTORS>),
    /// Profiles the service conforms to
    ProfileDescriptorList(Vec<ProfileDescriptor, MAX_PROFILE_DESCRIPTORS>),
}

/// One advertised service
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    /// Handle the record is registered under
    pub handle: ServiceRecordHandle,
    /// Attribute map
    pub attributes: FnvIndexMap<AttributeId, DataElement, MAX_ATTRIBUTES_PER_RECORD>,
}

impl ServiceClassId {
    /// Full UUID of the class
    #[must_use]
    pub const fn to_uuid(self) -> ServiceUuid {
        uuid_from_u16(self as u16)
    }

    /// Human readable class name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ServiceDiscoveryServer => "Service Discovery Server",
            Self::HandsFree => "Hands-Free",
            Self::HandsFreeAudioGateway => "Hands-Free Audio Gateway",
            Self::GenericAudio => "Generic Audio",
        }
    }
}

/// Expand a 16-bit UUID with the Bluetooth Base UUID
/// (`0000xxxx-0000-1000-8000-00805F9B34FB`)
#[must_use]
pub const fn uuid_from_u16(uuid: u16) -> ServiceUuid {
    0x0000_0000_0000_1000_8000_0080_5F9B_34FB | ((uuid as u128) << 96)
}

impl DataElement {
    /// Text element
    ///
    /// # Errors
    /// `InvalidData` if the text exceeds [`MAX_TEXT_LENGTH`] bytes.
    pub fn text_string(text: &str) -> Result<Self, SdpError> {
        Vec::from_slice(text.as_bytes())
            .map(Self::TextString)
            .map_err(|()| SdpError::InvalidData)
    }
}

impl ServiceRecord {
    /// Record holding the two mandatory attributes: its handle and a one
    /// entry service class list
    #[must_use]
    pub fn new(handle: ServiceRecordHandle, service_class: ServiceClassId) -> Self {
        let mut classes = Vec::new();
        classes.push(service_class.to_uuid()).ok();

        let mut attributes = FnvIndexMap::new();
        // Both fit in an empty map
        attributes
            .insert(
                universal_attributes::SERVICE_RECORD_HANDLE,
                DataElement::UnsignedInt32(handle),
            )
            .ok();
        attributes
            .insert(
                universal_attributes::SERVICE_CLASS_ID_LIST,
                DataElement::UuidList(classes),
            )
            .ok();

        Self { handle, attributes }
    }

    /// Create a record listing several service classes, most specific first
    ///
    /// # Errors
    /// Returns error if the class list is empty or too long
    pub fn with_service_classes(
        handle: ServiceRecordHandle,
        service_classes: &[ServiceClassId],
    ) -> Result<Self, SdpError> {
        let (first, rest) = service_classes.split_first().ok_or(SdpError::InvalidData)?;
        let mut record = Self::new(handle, *first);
        if let Some(DataElement::UuidList(class_list)) = record
            .attributes
            .get_mut(&universal_attributes::SERVICE_CLASS_ID_LIST)
        {
            for class in rest {
                class_list
                    .push(class.to_uuid())
                    .map_err(|_| SdpError::TooManyAttributes)?;
            }
        }
        Ok(record)
    }

    /// Set an attribute, replacing any previous value
    ///
    /// # Errors
    /// `TooManyAttributes` if the record is full
    pub fn add_attribute(&mut self, id: AttributeId, value: DataElement) -> Result<(), SdpError> {
        self.attributes
            .insert(id, value)
            .map_err(|_| SdpError::TooManyAttributes)?;
        Ok(())
    }

    /// Value of an attribute
    #[must_use]
    pub fn get_attribute(&self, id: AttributeId) -> Option<&DataElement> {
        self.attributes.get(&id)
    }

    /// Whether the record lists a service class
    #[must_use]
    pub fn matches_service_class(&self, service_class: ServiceClassId) -> bool {
        self.matches_uuid(service_class.to_uuid())
    }

    /// Whether the service class list contains `uuid`
    #[must_use]
    pub fn matches_uuid(&self, uuid: ServiceUuid) -> bool {
        matches!(
            self.get_attribute(universal_attributes::SERVICE_CLASS_ID_LIST),
            Some(DataElement::UuidList(classes)) if classes.contains(&uuid)
        )
    }

    /// Set the primary language service name
    ///
    /// # Errors
    /// `InvalidData` if the name is too long
    pub fn set_service_name(&mut self, name: &str) -> Result<(), SdpError> {
        let name = DataElement::text_string(name)?;
        self.add_attribute(universal_attributes::SERVICE_NAME, name)
    }

    /// Reached directly over L2CAP on `psm`
    ///
    /// # Errors
    /// `TooManyAttributes` if the record is full
    pub fn add_l2cap_protocol(&mut self, psm: u16) -> Result<(), SdpError> {
        let descriptors = Vec::from_slice(&[ProtocolDescriptor {
            protocol: protocol_uuids::L2CAP,
            parameter: Some(psm),
        }])
        .map_err(|()| SdpError::TooManyAttributes)?;
        self.add_attribute(
            universal_attributes::PROTOCOL_DESCRIPTOR_LIST,
            DataElement::ProtocolDescriptorList(descriptors),
        )
    }

    /// Reached over RFCOMM server `channel`
    ///
    /// # Errors
    /// `TooManyAttributes` if the record is full
    pub fn add_rfcomm_protocol(&mut self, channel: u8) -> Result<(), SdpError> {
        let descriptors = Vec::from_slice(&[
            ProtocolDescriptor {
                protocol: protocol_uuids::L2CAP,
                parameter: None,
            },
            ProtocolDescriptor {
                protocol: protocol_uuids::RFCOMM,
                parameter: Some(u16::from(channel)),
            },
        ])
        .map_err(|()| SdpError::TooManyAttributes)?;
        self.add_attribute(
            universal_attributes::PROTOCOL_DESCRIPTOR_LIST,
            DataElement::ProtocolDescriptorList(descriptors),
        )
    }

    /// Add a profile descriptor list naming one profile
    ///
    /// # Errors
    /// Returns error if the attribute cannot be added
    pub fn add_profile_descriptor(
        &mut self,
        profile: ServiceClassId,
        version: u16,
    ) -> Result<(), SdpError> {
        let descriptors = Vec::from_slice(&[ProfileDescriptor {
            profile: profile as u16,
            version,
        }])
        .map_err(|()| SdpError::TooManyAttributes)?;
        self.add_attribute(
            universal_attributes::BLUETOOTH_PROFILE_DESCRIPTOR_LIST,
            DataElement::ProfileDescriptorList(descriptors),
        )
    }

    /// RFCOMM server channel from the protocol descriptor list
    #[must_use]
    pub fn rfcomm_channel(&self) -> Option<u8> {
        let Some(DataElement::ProtocolDescriptorList(descriptors)) =
            self.get_attribute(universal_attributes::PROTOCOL_DESCRIPTOR_LIST)
        else {
            return None;
        };
        descriptors
            .iter()
            .find(|descriptor| descriptor.protocol == protocol_uuids::RFCOMM)
            .and_then(|descriptor| descriptor.parameter)
            .and_then(|channel| u8::try_from(channel).ok())
    }

    /// Version of a profile from the profile descriptor list
    #[must_use]
    pub fn profile_version(&self, profile: ServiceClassId) -> Option<u16> {
        let Some(DataElement::ProfileDescriptorList(descriptors)) =
            self.get_attribute(universal_attributes::BLUETOOTH_PROFILE_DESCRIPTOR_LIST)
        else {
            return None;
        };
        descriptors
            .iter()
            .find(|descriptor| descriptor.profile == profile as u16)
            .map(|descriptor| descriptor.version)
    }

    /// Value of the `SupportedFeatures` attribute
    #[must_use]
    pub fn supported_features(&self) -> Option<u16> {
        match self.get_attribute(profile_attributes::SUPPORTED_FEATURES) {
            Some(DataElement::UnsignedInt16(features)) => Some(*features),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_class_uuid() {
        // 0000111E-0000-1000-8000-00805F9B34FB
        assert_eq!(
            ServiceClassId::HandsFree.to_uuid(),
            0x0000_111E_0000_1000_8000_0080_5F9B_34FB
        );
        assert_eq!(
            ServiceClassId::GenericAudio.to_uuid(),
            0x0000_1203_0000_1000_8000_0080_5F9B_34FB
        );
    }

    #[test]
    fn test_text_element_length() {
        let Ok(DataElement::TextString(bytes)) = DataElement::text_string("Hands-Free") else {
            panic!("Expected TextString");
        };
        assert_eq!(bytes.as_slice(), b"Hands-Free");

        let long = [b'x'; MAX_TEXT_LENGTH + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert_eq!(DataElement::text_string(long), Err(SdpError::InvalidData));
    }

    #[test]
    fn test_mandatory_attributes() {
        let record = ServiceRecord::new(0x10000, ServiceClassId::HandsFree);

        assert_eq!(
            record.get_attribute(universal_attributes::SERVICE_RECORD_HANDLE),
            Some(&DataElement::UnsignedInt32(0x10000))
        );
        assert!(record.matches_service_class(ServiceClassId::HandsFree));
        assert!(!record.matches_service_class(ServiceClassId::HandsFreeAudioGateway));
    }

    #[test]
    fn test_service_record_multiple_classes() {
        let record = ServiceRecord::with_service_classes(
            0x10001,
            &[ServiceClassId::HandsFreeAudioGateway, ServiceClassId::GenericAudio],
        )
        .unwrap();

        assert!(record.matches_service_class(ServiceClassId::HandsFreeAudioGateway));
        assert!(record.matches_service_class(ServiceClassId::GenericAudio));
        assert!(!record.matches_service_class(ServiceClassId::HandsFree));
        assert!(ServiceRecord::with_service_classes(0x10001, &[]).is_err());
    }

    #[test]
    fn test_service_record_rfcomm_protocol() {
        let mut record = ServiceRecord::new(0x10002, ServiceClassId::HandsFree);
        assert_eq!(record.rfcomm_channel(), None);

        record.add_rfcomm_protocol(7).unwrap();
        assert_eq!(record.rfcomm_channel(), Some(7));
    }

    #[test]
    fn test_service_record_profile_descriptor() {
        let mut record = ServiceRecord::new(0x10003, ServiceClassId::HandsFree);
        record
            .add_profile_descriptor(ServiceClassId::HandsFree, 0x0108)
            .unwrap();

        assert_eq!(record.profile_version(ServiceClassId::HandsFree), Some(0x0108));
        assert_eq!(
            record.profile_version(ServiceClassId::HandsFreeAudioGateway),
            None
        );
    }

    #[test]
    fn test_service_name_replaced() {
        let mut record = ServiceRecord::new(0x10004, ServiceClassId::HandsFree);
        record.set_service_name("Car Kit").unwrap();
        record.set_service_name("Hands-Free").unwrap();

        assert_eq!(
            record.get_attribute(universal_attributes::SERVICE_NAME),
            Some(&DataElement::text_string("Hands-Free").unwrap())
        );
        assert_eq!(record.attributes.len(), 3);
    }
}
