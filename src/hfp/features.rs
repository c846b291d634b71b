//! Feature Flags
//!
//! Typed views over the 32-bit feature masks exchanged in `AT+BRSF` / `+BRSF`
//! and the 16-bit SDP `SupportedFeatures` attribute.
//!
//! Each flag family is an enum implementing [`FeatureFlag`]; a [`FeatureSet`]
//! is a set of flags of one family backed by the raw wire mask. Unknown bits
//! received from a peer are preserved so that the mask can be echoed back
//! unchanged.

use core::fmt;
use core::marker::PhantomData;

/// A single bit of a feature mask
pub trait FeatureFlag: Copy + 'static {
    /// Every defined flag of the family, in bit order
    const ALL: &'static [Self];

    /// Bit position mask of this flag
    fn bit(self) -> u32;
}

/// Set of feature flags of one family
pub struct FeatureSet<F> {
    bits: u32,
    _family: PhantomData<F>,
}

impl<F: FeatureFlag> FeatureSet<F> {
    /// Empty feature set
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _family: PhantomData,
        }
    }

    /// Build a set from a raw wire mask, keeping unknown bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            _family: PhantomData,
        }
    }

    /// Raw wire mask
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Check whether a flag is asserted
    #[must_use]
    pub fn contains(&self, flag: F) -> bool {
        self.bits & flag.bit() != 0
    }

    /// Assert a flag
    pub fn insert(&mut self, flag: F) {
        self.bits |= flag.bit();
    }

    /// Clear a flag
    pub fn remove(&mut self, flag: F) {
        self.bits &= !flag.bit();
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, flag: F) -> Self {
        self.insert(flag);
        self
    }

    /// Whether no bit is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterate over the asserted, known flags in bit order
    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        F::ALL.iter().copied().filter(|flag| self.contains(*flag))
    }
}

impl<F> Clone for FeatureSet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FeatureSet<F> {}

impl<F> PartialEq for FeatureSet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for FeatureSet<F> {}

impl<F: FeatureFlag> Default for FeatureSet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F> fmt::Debug for FeatureSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureSet({:#x})", self.bits)
    }
}

#[cfg(feature = "defmt")]
impl<F> defmt::Format for FeatureSet<F> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "FeatureSet({=u32:#x})", self.bits);
    }
}

impl<F: FeatureFlag> FromIterator<F> for FeatureSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl<F: FeatureFlag> From<&[F]> for FeatureSet<F> {
    fn from(flags: &[F]) -> Self {
        flags.iter().copied().collect()
    }
}

macro_rules! feature_flags {
    ($(#[$meta:meta])* $name:ident { $($(#[$variant_meta:meta])* $variant:ident = $bit:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u32)]
        pub enum $name {
            $($(#[$variant_meta])* $variant = $bit,)+
        }

        impl FeatureFlag for $name {
            const ALL: &'static [Self] = &[$(Self::$variant,)+];

            fn bit(self) -> u32 {
                self as u32
            }
        }
    };
}

feature_flags! {
    /// Hands-Free feature bits carried in `AT+BRSF`
    HfFeature {
        /// Echo cancel and/or noise reduction
        EcNr = 0x001,
        /// Three-way calling
        ThreeWayCalling = 0x002,
        /// Calling line identification presentation
        CliPresentationCapability = 0x004,
        /// Voice recognition activation
        VoiceRecognitionActivation = 0x008,
        /// Remote volume control
        RemoteVolumeControl = 0x010,
        /// Enhanced call status
        EnhancedCallStatus = 0x020,
        /// Enhanced call control
        EnhancedCallControl = 0x040,
        /// Codec negotiation
        CodecNegotiation = 0x080,
        /// HF indicators
        HfIndicators = 0x100,
        /// eSCO S4 (and T2) settings
        EscoS4SettingsSupported = 0x200,
        /// Enhanced voice recognition status
        EnhancedVoiceRecognitionStatus = 0x400,
        /// Voice recognition text
        VoiceRecognitionText = 0x800,
    }
}

feature_flags! {
    /// Audio Gateway feature bits carried in `+BRSF`
    AgFeature {
        /// Three-way calling
        ThreeWayCalling = 0x0001,
        /// Echo cancel and/or noise reduction
        EcNr = 0x0002,
        /// Voice recognition function
        VoiceRecognitionFunction = 0x0004,
        /// In-band ring tone capability
        InBandRingToneCapability = 0x0008,
        /// Attach a number to a voice tag
        VoiceTag = 0x0010,
        /// Ability to reject a call
        RejectCall = 0x0020,
        /// Enhanced call status
        EnhancedCallStatus = 0x0040,
        /// Enhanced call control
        EnhancedCallControl = 0x0080,
        /// Extended error result codes
        ExtendedErrorResultCodes = 0x0100,
        /// Codec negotiation
        CodecNegotiation = 0x0200,
        /// HF indicators
        HfIndicators = 0x0400,
        /// eSCO S4 (and T2) settings
        EscoS4SettingsSupported = 0x0800,
        /// Enhanced voice recognition status
        EnhancedVoiceRecognitionStatus = 0x1000,
        /// Voice recognition text
        VoiceRecognitionText = 0x2000,
    }
}

feature_flags! {
    /// Hands-Free bits of the SDP `SupportedFeatures` attribute
    HfSdpFeature {
        /// Echo cancel and/or noise reduction
        EcNr = 0x001,
        /// Three-way calling
        ThreeWayCalling = 0x002,
        /// CLI presentation capability
        CliPresentationCapability = 0x004,
        /// Voice recognition activation
        VoiceRecognitionActivation = 0x008,
        /// Remote volume control
        RemoteVolumeControl = 0x010,
        /// Wide band speech (mSBC)
        WideBand = 0x020,
        /// Enhanced voice recognition status
        EnhancedVoiceRecognitionStatus = 0x040,
        /// Voice recognition text
        VoiceRecognitionText = 0x080,
        /// Super wide band speech (LC3-SWB)
        SuperWideBand = 0x100,
    }
}

feature_flags! {
    /// Audio Gateway bits of the SDP `SupportedFeatures` attribute
    AgSdpFeature {
        /// Three-way calling
        ThreeWayCalling = 0x001,
        /// Echo cancel and/or noise reduction
        EcNr = 0x002,
        /// Voice recognition function
        VoiceRecognitionFunction = 0x004,
        /// In-band ring tone capability
        InBandRingToneCapability = 0x008,
        /// Attach a number to a voice tag
        VoiceTag = 0x010,
        /// Wide band speech (mSBC)
        WideBand = 0x020,
        /// Enhanced voice recognition status
        EnhancedVoiceRecognitionStatus = 0x040,
        /// Voice recognition text
        VoiceRecognitionText = 0x080,
        /// Super wide band speech (LC3-SWB)
        SuperWideBand = 0x100,
    }
}

/// Call hold and multiparty operation kinds (`AT+CHLD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallHoldOperation {
    /// `0`: release all held calls or set user busy
    ReleaseAllHeldCalls,
    /// `1`: release all active calls and accept the other
    ReleaseAllActiveCalls,
    /// `1x`: release a specific call
    ReleaseSpecificCall,
    /// `2`: hold all active calls and accept the other
    HoldAllActiveCalls,
    /// `2x`: hold all calls except the specified one
    HoldAllCallsExcept,
    /// `3`: add a held call to the conversation
    AddHeldCall,
    /// `4`: connect the two calls and disconnect the subscriber
    ConnectTwoCalls,
}

impl CallHoldOperation {
    /// Every operation kind, in advertisement order
    pub const ALL: [Self; 7] = [
        Self::ReleaseAllHeldCalls,
        Self::ReleaseAllActiveCalls,
        Self::ReleaseSpecificCall,
        Self::HoldAllActiveCalls,
        Self::HoldAllCallsExcept,
        Self::AddHeldCall,
        Self::ConnectTwoCalls,
    ];

    /// Token used in the `+CHLD` advertisement
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseAllHeldCalls => "0",
            Self::ReleaseAllActiveCalls => "1",
            Self::ReleaseSpecificCall => "1x",
            Self::HoldAllActiveCalls => "2",
            Self::HoldAllCallsExcept => "2x",
            Self::AddHeldCall => "3",
            Self::ConnectTwoCalls => "4",
        }
    }

    /// Parse an advertisement token (`0`, `1x`, ...)
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }

    /// Whether the operation addresses a specific call index
    #[must_use]
    pub const fn takes_call_index(self) -> bool {
        matches!(self, Self::ReleaseSpecificCall | Self::HoldAllCallsExcept)
    }
}

/// Local and peer feature sets of one session
///
/// Behaviour is gated on both sides asserting a feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionFeatures {
    /// Features asserted by the Hands-Free unit
    pub hf: FeatureSet<HfFeature>,
    /// Features asserted by the Audio Gateway
    pub ag: FeatureSet<AgFeature>,
}

impl SessionFeatures {
    /// Combine the two feature sets
    #[must_use]
    pub const fn new(hf: FeatureSet<HfFeature>, ag: FeatureSet<AgFeature>) -> Self {
        Self { hf, ag }
    }

    /// Both sides support codec negotiation
    #[must_use]
    pub fn codec_negotiation(&self) -> bool {
        self.hf.contains(HfFeature::CodecNegotiation) && self.ag.contains(AgFeature::CodecNegotiation)
    }

    /// Both sides support three-way calling
    #[must_use]
    pub fn three_way_calling(&self) -> bool {
        self.hf.contains(HfFeature::ThreeWayCalling) && self.ag.contains(AgFeature::ThreeWayCalling)
    }

    /// Both sides support HF indicators
    #[must_use]
    pub fn hf_indicators(&self) -> bool {
        self.hf.contains(HfFeature::HfIndicators) && self.ag.contains(AgFeature::HfIndicators)
    }

    /// Both sides support the eSCO S4 setting
    #[must_use]
    pub fn esco_s4(&self) -> bool {
        self.hf.contains(HfFeature::EscoS4SettingsSupported)
            && self.ag.contains(AgFeature::EscoS4SettingsSupported)
    }

    /// The HF accepts remote volume control (no AG counterpart bit)
    #[must_use]
    pub fn remote_volume_control(&self) -> bool {
        self.hf.contains(HfFeature::RemoteVolumeControl)
    }

    /// The AG reports extended error result codes (no HF counterpart bit)
    #[must_use]
    pub fn extended_error_result_codes(&self) -> bool {
        self.ag.contains(AgFeature::ExtendedErrorResultCodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set_bits() {
        let set: FeatureSet<HfFeature> = [HfFeature::CodecNegotiation, HfFeature::HfIndicators]
            .as_slice()
            .into();
        assert_eq!(set.bits(), 0x180);
        assert!(set.contains(HfFeature::CodecNegotiation));
        assert!(!set.contains(HfFeature::EcNr));

        let flags: heapless::Vec<HfFeature, 12> = set.iter().collect();
        assert_eq!(
            flags.as_slice(),
            &[HfFeature::CodecNegotiation, HfFeature::HfIndicators]
        );
    }

    #[test]
    fn test_feature_set_keeps_unknown_bits() {
        let set = FeatureSet::<AgFeature>::from_bits(0x8000_0201);
        assert_eq!(set.bits(), 0x8000_0201);
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_feature_set_insert_remove() {
        let mut set = FeatureSet::<AgFeature>::empty();
        assert!(set.is_empty());
        set.insert(AgFeature::RejectCall);
        assert_eq!(set.bits(), 0x20);
        set.remove(AgFeature::RejectCall);
        assert!(set.is_empty());
    }

    #[test]
    fn test_session_features_require_both_sides() {
        let hf = FeatureSet::empty().with(HfFeature::CodecNegotiation);
        let ag = FeatureSet::empty()
            .with(AgFeature::CodecNegotiation)
            .with(AgFeature::ThreeWayCalling);
        let features = SessionFeatures::new(hf, ag);

        assert!(features.codec_negotiation());
        assert!(!features.three_way_calling());
        assert!(!features.hf_indicators());
    }

    #[test]
    fn test_call_hold_tokens() {
        assert_eq!(
            CallHoldOperation::from_token("2x"),
            Some(CallHoldOperation::HoldAllCallsExcept)
        );
        assert_eq!(CallHoldOperation::from_token("5"), None);
        assert!(CallHoldOperation::ReleaseSpecificCall.takes_call_index());
        assert!(!CallHoldOperation::AddHeldCall.takes_call_index());
    }
}
