//! Synchronous Connection Parameters
//!
//! Default SCO/eSCO settings for the voice codecs, as handed to the link
//! controller with `HCI_Enhanced_Setup_Synchronous_Connection`. The table is
//! a pure lookup; choosing an entry depends on the selected codec and on what
//! the ACL link can carry.

use super::{AudioCodec, HfpError};
use bt_hci::param::ConnHandle;

/// Packet type bits of the synchronous connection setup
pub mod packet_type {
    /// HV1
    pub const HV1: u16 = 0x0001;
    /// HV2
    pub const HV2: u16 = 0x0002;
    /// HV3
    pub const HV3: u16 = 0x0004;
    /// EV3
    pub const EV3: u16 = 0x0008;
    /// EV4
    pub const EV4: u16 = 0x0010;
    /// EV5
    pub const EV5: u16 = 0x0020;
    /// 2-EV3 may not be used
    pub const NO_2_EV3: u16 = 0x0040;
    /// 3-EV3 may not be used
    pub const NO_3_EV3: u16 = 0x0080;
    /// 2-EV5 may not be used
    pub const NO_2_EV5: u16 = 0x0100;
    /// 3-EV5 may not be used
    pub const NO_3_EV5: u16 = 0x0200;
}

/// Coding format identifiers (Assigned Numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodingFormat {
    /// µ-law log
    ULaw = 0x00,
    /// A-law log
    ALaw = 0x01,
    /// CVSD
    Cvsd = 0x02,
    /// Transparent
    Transparent = 0x03,
    /// Linear PCM
    LinearPcm = 0x04,
    /// mSBC
    Msbc = 0x05,
    /// LC3
    Lc3 = 0x06,
}

/// PCM sample representation on the host side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PcmDataFormat {
    /// Not applicable
    NotApplicable = 0x00,
    /// 1's complement
    OnesComplement = 0x01,
    /// 2's complement
    TwosComplement = 0x02,
    /// Sign-magnitude
    SignMagnitude = 0x03,
    /// Unsigned
    Unsigned = 0x04,
}

/// Where audio data enters and leaves the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataPath {
    /// Over HCI
    Hci = 0x00,
    /// Vendor specific path (PCM/I2S)
    VendorSpecific = 0x01,
}

/// Retransmission effort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RetransmissionEffort {
    /// No retransmissions
    NoRetransmission = 0x00,
    /// At least one retransmission, optimize for power
    OptimizeForPower = 0x01,
    /// At least one retransmission, optimize for link quality
    OptimizeForQuality = 0x02,
    /// Don't care
    DontCare = 0xFF,
}

/// Enhanced synchronous connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EscoParameters {
    /// Air transmit bandwidth (octets/s)
    pub transmit_bandwidth: u32,
    /// Air receive bandwidth (octets/s)
    pub receive_bandwidth: u32,
    /// Air transmit coding format
    pub transmit_coding_format: CodingFormat,
    /// Air receive coding format
    pub receive_coding_format: CodingFormat,
    /// Air transmit frame size
    pub transmit_codec_frame_size: u16,
    /// Air receive frame size
    pub receive_codec_frame_size: u16,
    /// Host input bandwidth (octets/s)
    pub input_bandwidth: u32,
    /// Host output bandwidth (octets/s)
    pub output_bandwidth: u32,
    /// Host input coding format
    pub input_coding_format: CodingFormat,
    /// Host output coding format
    pub output_coding_format: CodingFormat,
    /// Host input coded sample size (bits)
    pub input_coded_data_size: u16,
    /// Host output coded sample size (bits)
    pub output_coded_data_size: u16,
    /// Host input PCM format
    pub input_pcm_data_format: PcmDataFormat,
    /// Host output PCM format
    pub output_pcm_data_format: PcmDataFormat,
    /// MSB position of input samples
    pub input_pcm_sample_payload_msb_position: u8,
    /// MSB position of output samples
    pub output_pcm_sample_payload_msb_position: u8,
    /// Input data path
    pub input_data_path: DataPath,
    /// Output data path
    pub output_data_path: DataPath,
    /// Input transport unit size
    pub input_transport_unit_size: u8,
    /// Output transport unit size
    pub output_transport_unit_size: u8,
    /// Maximum latency (ms)
    pub max_latency: u16,
    /// Allowed packet types, see [`packet_type`]
    pub packet_type: u16,
    /// Retransmission effort
    pub retransmission_effort: RetransmissionEffort,
}

const CVSD_BASE: EscoParameters = EscoParameters {
    transmit_bandwidth: 8000,
    receive_bandwidth: 8000,
    transmit_coding_format: CodingFormat::Cvsd,
    receive_coding_format: CodingFormat::Cvsd,
    transmit_codec_frame_size: 60,
    receive_codec_frame_size: 60,
    input_bandwidth: 16000,
    output_bandwidth: 16000,
    input_coding_format: CodingFormat::LinearPcm,
    output_coding_format: CodingFormat::LinearPcm,
    input_coded_data_size: 16,
    output_coded_data_size: 16,
    input_pcm_data_format: PcmDataFormat::TwosComplement,
    output_pcm_data_format: PcmDataFormat::TwosComplement,
    input_pcm_sample_payload_msb_position: 0,
    output_pcm_sample_payload_msb_position: 0,
    input_data_path: DataPath::Hci,
    output_data_path: DataPath::Hci,
    input_transport_unit_size: 0,
    output_transport_unit_size: 0,
    max_latency: 0xFFFF,
    packet_type: packet_type::HV1,
    retransmission_effort: RetransmissionEffort::NoRetransmission,
};

const MSBC_BASE: EscoParameters = EscoParameters {
    transmit_coding_format: CodingFormat::Msbc,
    receive_coding_format: CodingFormat::Msbc,
    input_bandwidth: 32000,
    output_bandwidth: 32000,
    ..CVSD_BASE
};

const EV3_ONLY: u16 = packet_type::EV3
    | packet_type::NO_2_EV3
    | packet_type::NO_3_EV3
    | packet_type::NO_2_EV5
    | packet_type::NO_3_EV5;

const EV3_2_EV3: u16 =
    packet_type::EV3 | packet_type::NO_3_EV3 | packet_type::NO_2_EV5 | packet_type::NO_3_EV5;

/// Default settings defined by the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DefaultCodecParameters {
    /// CVSD over SCO, HV1
    ScoCvsdD0,
    /// CVSD over SCO, HV3
    ScoCvsdD1,
    /// CVSD over eSCO, EV3, 7 ms
    EscoCvsdS1,
    /// CVSD over eSCO, 2-EV3, 7 ms
    EscoCvsdS2,
    /// CVSD over eSCO, 2-EV3, 10 ms
    EscoCvsdS3,
    /// CVSD over eSCO, 2-EV3, 12 ms
    EscoCvsdS4,
    /// mSBC over eSCO, EV3, 8 ms
    EscoMsbcT1,
    /// mSBC over eSCO, 2-EV3, 13 ms
    EscoMsbcT2,
}

/// What the link between the two devices can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkQuality {
    /// SCO only
    Sco,
    /// eSCO, basic rate packets only
    Esco,
    /// eSCO with EDR packets
    EscoEdr,
    /// eSCO with EDR packets, both sides support the S4 / T2 settings
    EscoEdrS4,
}

impl DefaultCodecParameters {
    /// Link parameters of this setting
    #[must_use]
    pub const fn parameters(self) -> EscoParameters {
        match self {
            Self::ScoCvsdD0 => CVSD_BASE,
            Self::ScoCvsdD1 => EscoParameters {
                packet_type: packet_type::HV3,
                ..CVSD_BASE
            },
            Self::EscoCvsdS1 => EscoParameters {
                max_latency: 0x0007,
                packet_type: EV3_ONLY,
                retransmission_effort: RetransmissionEffort::OptimizeForPower,
                ..CVSD_BASE
            },
            Self::EscoCvsdS2 => EscoParameters {
                max_latency: 0x0007,
                packet_type: EV3_2_EV3,
                retransmission_effort: RetransmissionEffort::OptimizeForPower,
                ..CVSD_BASE
            },
            Self::EscoCvsdS3 => EscoParameters {
                max_latency: 0x000A,
                packet_type: EV3_2_EV3,
                retransmission_effort: RetransmissionEffort::OptimizeForPower,
                ..CVSD_BASE
            },
            Self::EscoCvsdS4 => EscoParameters {
                max_latency: 0x000C,
                packet_type: EV3_2_EV3,
                retransmission_effort: RetransmissionEffort::OptimizeForQuality,
                ..CVSD_BASE
            },
            Self::EscoMsbcT1 => EscoParameters {
                max_latency: 0x0008,
                packet_type: EV3_ONLY,
                retransmission_effort: RetransmissionEffort::OptimizeForQuality,
                ..MSBC_BASE
            },
            Self::EscoMsbcT2 => EscoParameters {
                max_latency: 0x000D,
                packet_type: EV3_2_EV3,
                retransmission_effort: RetransmissionEffort::OptimizeForQuality,
                ..MSBC_BASE
            },
        }
    }

    /// Best setting for a codec over a link
    ///
    /// Returns `None` when the codec cannot run over the link (mSBC needs
    /// eSCO) or has no default setting (LC3-SWB).
    #[must_use]
    pub const fn select(codec: AudioCodec, quality: LinkQuality) -> Option<Self> {
        match (codec, quality) {
            (AudioCodec::Cvsd, LinkQuality::Sco) => Some(Self::ScoCvsdD1),
            (AudioCodec::Cvsd, LinkQuality::Esco) => Some(Self::EscoCvsdS1),
            (AudioCodec::Cvsd, LinkQuality::EscoEdr) => Some(Self::EscoCvsdS3),
            (AudioCodec::Cvsd, LinkQuality::EscoEdrS4) => Some(Self::EscoCvsdS4),
            (AudioCodec::Msbc, LinkQuality::Esco) => Some(Self::EscoMsbcT1),
            (AudioCodec::Msbc, LinkQuality::EscoEdr | LinkQuality::EscoEdrS4) => {
                Some(Self::EscoMsbcT2)
            }
            (AudioCodec::Msbc, LinkQuality::Sco) | (AudioCodec::Lc3Swb, _) => None,
        }
    }
}

/// Request for the link controller to open a synchronous connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioSetupRequest {
    /// ACL connection the audio link belongs to
    pub connection_handle: ConnHandle,
    /// Chosen default setting
    pub setting: DefaultCodecParameters,
    /// Link parameters of that setting
    pub parameters: EscoParameters,
}

/// Build an audio setup request for a negotiated codec
///
/// # Errors
/// `UnsupportedFeature` if the S4 profile is requested without mutual S4
/// support, or if the codec has no setting for the link.
pub fn audio_setup_request(
    connection_handle: ConnHandle,
    codec: AudioCodec,
    quality: LinkQuality,
    esco_s4: bool,
) -> Result<AudioSetupRequest, HfpError> {
    if quality == LinkQuality::EscoEdrS4 && !esco_s4 {
        return Err(HfpError::UnsupportedFeature);
    }
    let setting = DefaultCodecParameters::select(codec, quality).ok_or(HfpError::UnsupportedFeature)?;
    Ok(AudioSetupRequest {
        connection_handle,
        setting,
        parameters: setting.parameters(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvsd_settings() {
        let d0 = DefaultCodecParameters::ScoCvsdD0.parameters();
        assert_eq!(d0.packet_type, packet_type::HV1);
        assert_eq!(d0.max_latency, 0xFFFF);
        assert_eq!(d0.retransmission_effort, RetransmissionEffort::NoRetransmission);

        let s1 = DefaultCodecParameters::EscoCvsdS1.parameters();
        assert_eq!(s1.packet_type, 0x03C8);
        assert_eq!(s1.max_latency, 0x0007);

        let s4 = DefaultCodecParameters::EscoCvsdS4.parameters();
        assert_eq!(s4.packet_type, 0x0388);
        assert_eq!(s4.max_latency, 0x000C);
        assert_eq!(s4.retransmission_effort, RetransmissionEffort::OptimizeForQuality);
        assert_eq!(s4.transmit_coding_format, CodingFormat::Cvsd);
        assert_eq!(s4.input_bandwidth, 16000);
    }

    #[test]
    fn test_msbc_settings() {
        let t2 = DefaultCodecParameters::EscoMsbcT2.parameters();
        assert_eq!(t2.transmit_coding_format, CodingFormat::Msbc);
        assert_eq!(t2.input_coding_format, CodingFormat::LinearPcm);
        assert_eq!(t2.input_bandwidth, 32000);
        assert_eq!(t2.max_latency, 0x000D);
        assert_eq!(t2.transmit_bandwidth, 8000);
    }

    #[test]
    fn test_select() {
        assert_eq!(
            DefaultCodecParameters::select(AudioCodec::Cvsd, LinkQuality::Sco),
            Some(DefaultCodecParameters::ScoCvsdD1)
        );
        assert_eq!(
            DefaultCodecParameters::select(AudioCodec::Msbc, LinkQuality::EscoEdr),
            Some(DefaultCodecParameters::EscoMsbcT2)
        );
        assert_eq!(
            DefaultCodecParameters::select(AudioCodec::Msbc, LinkQuality::Sco),
            None
        );
        assert_eq!(
            DefaultCodecParameters::select(AudioCodec::Lc3Swb, LinkQuality::EscoEdrS4),
            None
        );
    }

    #[test]
    fn test_audio_setup_request() {
        let handle = ConnHandle::new(0x0042);
        let request = audio_setup_request(handle, AudioCodec::Cvsd, LinkQuality::EscoEdrS4, true)
            .unwrap();
        assert_eq!(request.connection_handle.raw(), 0x0042);
        assert_eq!(request.setting, DefaultCodecParameters::EscoCvsdS4);

        assert_eq!(
            audio_setup_request(handle, AudioCodec::Cvsd, LinkQuality::EscoEdrS4, false),
            Err(HfpError::UnsupportedFeature)
        );
    }
}
