//! HFP Service Records
//!
//! Builds the SDP record each role advertises and extracts the RFCOMM
//! channel, profile version and SDP feature summary from a peer's records.

use super::{
    AgConfiguration, AgFeature, AgSdpFeature, AudioCodec, FeatureSet, HfConfiguration, HfFeature,
    HfSdpFeature, ProfileVersion,
};
use crate::sdp::record::{DataElement, profile_attributes};
use crate::sdp::{SdpError, ServiceClassId, ServiceDatabase, ServiceRecord, ServiceRecordHandle};

const HF_SERVICE_NAME: &str = "Hands-Free";
const AG_SERVICE_NAME: &str = "Hands-Free Audio Gateway";

/// SDP feature summary of a Hands-Free configuration
#[must_use]
pub fn hf_sdp_features(configuration: &HfConfiguration) -> FeatureSet<HfSdpFeature> {
    const MAPPING: [(HfFeature, HfSdpFeature); 7] = [
        (HfFeature::EcNr, HfSdpFeature::EcNr),
        (HfFeature::ThreeWayCalling, HfSdpFeature::ThreeWayCalling),
        (
            HfFeature::CliPresentationCapability,
            HfSdpFeature::CliPresentationCapability,
        ),
        (
            HfFeature::VoiceRecognitionActivation,
            HfSdpFeature::VoiceRecognitionActivation,
        ),
        (HfFeature::RemoteVolumeControl, HfSdpFeature::RemoteVolumeControl),
        (
            HfFeature::EnhancedVoiceRecognitionStatus,
            HfSdpFeature::EnhancedVoiceRecognitionStatus,
        ),
        (HfFeature::VoiceRecognitionText, HfSdpFeature::VoiceRecognitionText),
    ];

    let features = configuration.supported_hf_features;
    let mut summary: FeatureSet<HfSdpFeature> = MAPPING
        .iter()
        .filter(|(feature, _)| features.contains(*feature))
        .map(|(_, flag)| *flag)
        .collect();

    let codecs = &configuration.supported_audio_codecs;
    if codecs.contains(&AudioCodec::Msbc) {
        summary.insert(HfSdpFeature::WideBand);
    }
    if codecs.contains(&AudioCodec::Lc3Swb) {
        summary.insert(HfSdpFeature::SuperWideBand);
    }
    summary
}

/// SDP feature summary of an Audio Gateway configuration
#[must_use]
pub fn ag_sdp_features(configuration: &AgConfiguration) -> FeatureSet<AgSdpFeature> {
    const MAPPING: [(AgFeature, AgSdpFeature); 7] = [
        (AgFeature::ThreeWayCalling, AgSdpFeature::ThreeWayCalling),
        (AgFeature::EcNr, AgSdpFeature::EcNr),
        (
            AgFeature::VoiceRecognitionFunction,
            AgSdpFeature::VoiceRecognitionFunction,
        ),
        (
            AgFeature::InBandRingToneCapability,
            AgSdpFeature::InBandRingToneCapability,
        ),
        (AgFeature::VoiceTag, AgSdpFeature::VoiceTag),
        (
            AgFeature::EnhancedVoiceRecognitionStatus,
            AgSdpFeature::EnhancedVoiceRecognitionStatus,
        ),
        (AgFeature::VoiceRecognitionText, AgSdpFeature::VoiceRecognitionText),
    ];

    let features = configuration.supported_ag_features;
    let mut summary: FeatureSet<AgSdpFeature> = MAPPING
        .iter()
        .filter(|(feature, _)| features.contains(*feature))
        .map(|(_, flag)| *flag)
        .collect();

    let codecs = &configuration.supported_audio_codecs;
    if codecs.contains(&AudioCodec::Msbc) {
        summary.insert(AgSdpFeature::WideBand);
    }
    if codecs.contains(&AudioCodec::Lc3Swb) {
        summary.insert(AgSdpFeature::SuperWideBand);
    }
    summary
}

fn make_record(
    handle: ServiceRecordHandle,
    service_class: ServiceClassId,
    rfcomm_channel: u8,
    version: ProfileVersion,
    features: u32,
    name: &str,
) -> Result<ServiceRecord, SdpError> {
    let mut record =
        ServiceRecord::with_service_classes(handle, &[service_class, ServiceClassId::GenericAudio])?;
    record.add_rfcomm_protocol(rfcomm_channel)?;
    record.add_profile_descriptor(ServiceClassId::HandsFree, version as u16)?;
    let features = u16::try_from(features).map_err(|_| SdpError::InvalidData)?;
    record.add_attribute(
        profile_attributes::SUPPORTED_FEATURES,
        DataElement::UnsignedInt16(features),
    )?;
    record.set_service_name(name)?;
    Ok(record)
}

/// Build the service record a Hands-Free unit advertises
///
/// # Errors
/// Returns an error if the record cannot hold the attributes.
pub fn make_hf_sdp_record(
    handle: ServiceRecordHandle,
    rfcomm_channel: u8,
    configuration: &HfConfiguration,
    version: ProfileVersion,
) -> Result<ServiceRecord, SdpError> {
    make_record(
        handle,
        ServiceClassId::HandsFree,
        rfcomm_channel,
        version,
        hf_sdp_features(configuration).bits(),
        HF_SERVICE_NAME,
    )
}

/// Build the service record an Audio Gateway advertises
///
/// Adds the `Network` attribute, set when the gateway can reject calls.
///
/// # Errors
/// Returns an error if the record cannot hold the attributes.
pub fn make_ag_sdp_record(
    handle: ServiceRecordHandle,
    rfcomm_channel: u8,
    configuration: &AgConfiguration,
    version: ProfileVersion,
) -> Result<ServiceRecord, SdpError> {
    let mut record = make_record(
        handle,
        ServiceClassId::HandsFreeAudioGateway,
        rfcomm_channel,
        version,
        ag_sdp_features(configuration).bits(),
        AG_SERVICE_NAME,
    )?;
    let network = u8::from(
        configuration
            .supported_ag_features
            .contains(AgFeature::RejectCall),
    );
    record.add_attribute(profile_attributes::NETWORK, DataElement::UnsignedInt8(network))?;
    Ok(record)
}

fn find_record<D: ServiceDatabase + ?Sized>(
    database: &D,
    service_class: ServiceClassId,
) -> Result<(u8, ProfileVersion, u32), SdpError> {
    let record = database
        .find_service(service_class)
        .ok_or(SdpError::ServiceNotFound)?;
    let channel = record.rfcomm_channel().ok_or(SdpError::InvalidData)?;
    let version = record
        .profile_version(ServiceClassId::HandsFree)
        .and_then(ProfileVersion::from_u16)
        .ok_or(SdpError::InvalidData)?;
    // Absent feature attribute means the defaults, which are all zero
    let features = record.supported_features().unwrap_or(0);

    debug!(
        "[SDP] {} on channel {} version {:?}",
        service_class.name(),
        channel,
        version
    );
    Ok((channel, version, u32::from(features)))
}

/// Locate the Hands-Free record of a peer
///
/// # Errors
/// `ServiceNotFound` if no record lists the Hands-Free class, `InvalidData`
/// if the record lacks its RFCOMM channel or profile version.
pub fn find_hf_sdp_record<D: ServiceDatabase + ?Sized>(
    database: &D,
) -> Result<(u8, ProfileVersion, FeatureSet<HfSdpFeature>), SdpError> {
    let (channel, version, features) = find_record(database, ServiceClassId::HandsFree)?;
    Ok((channel, version, FeatureSet::from_bits(features)))
}

/// Locate the Audio Gateway record of a peer
///
/// # Errors
/// `ServiceNotFound` if no record lists the Audio Gateway class,
/// `InvalidData` if the record lacks its RFCOMM channel or profile version.
pub fn find_ag_sdp_record<D: ServiceDatabase + ?Sized>(
    database: &D,
) -> Result<(u8, ProfileVersion, FeatureSet<AgSdpFeature>), SdpError> {
    let (channel, version, features) =
        find_record(database, ServiceClassId::HandsFreeAudioGateway)?;
    Ok((channel, version, FeatureSet::from_bits(features)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::SdpServer;

    #[test]
    fn test_hf_sdp_record_round_trip() {
        let configuration = HfConfiguration::default();
        let record = make_hf_sdp_record(1, 2, &configuration, ProfileVersion::V1_8).unwrap();
        assert!(record.matches_service_class(ServiceClassId::GenericAudio));

        let mut server = SdpServer::new();
        server.add_service_record(record).unwrap();

        let (channel, version, features) = find_hf_sdp_record(&server).unwrap();
        assert_eq!(channel, 2);
        assert_eq!(version, ProfileVersion::V1_8);
        assert_eq!(features, hf_sdp_features(&configuration));
        assert_eq!(
            features,
            FeatureSet::empty()
                .with(HfSdpFeature::RemoteVolumeControl)
                .with(HfSdpFeature::WideBand)
        );
    }

    #[test]
    fn test_ag_sdp_record_round_trip() {
        let configuration = AgConfiguration::default();
        let record = make_ag_sdp_record(1, 2, &configuration, ProfileVersion::V1_8).unwrap();
        assert_eq!(
            record.get_attribute(profile_attributes::NETWORK),
            Some(&DataElement::UnsignedInt8(1))
        );

        let records = [record];
        let (channel, version, features) = find_ag_sdp_record(&records[..]).unwrap();
        assert_eq!(channel, 2);
        assert_eq!(version, ProfileVersion::V1_8);
        assert_eq!(features.bits(), 0x28);
    }

    #[test]
    fn test_sdp_features_minimal() {
        assert!(hf_sdp_features(&HfConfiguration::minimal()).is_empty());
        assert!(ag_sdp_features(&AgConfiguration::minimal()).is_empty());

        let configuration = HfConfiguration::minimal()
            .with_feature(HfFeature::ThreeWayCalling)
            .with_codecs(&[AudioCodec::Cvsd, AudioCodec::Lc3Swb]);
        assert_eq!(
            hf_sdp_features(&configuration),
            FeatureSet::empty()
                .with(HfSdpFeature::ThreeWayCalling)
                .with(HfSdpFeature::SuperWideBand)
        );

        let record =
            make_ag_sdp_record(3, 4, &AgConfiguration::minimal(), ProfileVersion::V1_5).unwrap();
        assert_eq!(
            record.get_attribute(profile_attributes::NETWORK),
            Some(&DataElement::UnsignedInt8(0))
        );
    }

    #[test]
    fn test_find_sdp_record_errors() {
        let server = SdpServer::new();
        assert_eq!(find_hf_sdp_record(&server), Err(SdpError::ServiceNotFound));

        // HF record looked up as AG
        let records = [
            make_hf_sdp_record(1, 2, &HfConfiguration::default(), ProfileVersion::V1_7).unwrap(),
        ];
        assert_eq!(
            find_ag_sdp_record(&records[..]),
            Err(SdpError::ServiceNotFound)
        );

        let records = [ServiceRecord::new(5, ServiceClassId::HandsFree)];
        assert_eq!(find_hf_sdp_record(&records[..]), Err(SdpError::InvalidData));
    }
}
