//! Role Configuration
//!
//! Immutable capability descriptions supplied when a session is created. A
//! configuration outlives every session built from it; sessions borrow it.

use super::{
    AgFeature, AgIndicatorState, AudioCodec, CallHoldOperation, FeatureSet, HfFeature,
    HfIndicator, HfpError,
};
use crate::at::{AtResponse, IndicatorDescriptor};
use crate::constants::{MAX_AG_INDICATORS, MAX_CALL_HOLD_OPERATIONS, MAX_CODECS, MAX_HF_INDICATORS};
use heapless::Vec;

/// Hands-Free configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HfConfiguration {
    /// Features sent in `AT+BRSF`
    pub supported_hf_features: FeatureSet<HfFeature>,
    /// HF indicators offered in `AT+BIND`
    pub supported_hf_indicators: Vec<HfIndicator, MAX_HF_INDICATORS>,
    /// Codecs advertised in `AT+BAC`
    pub supported_audio_codecs: Vec<AudioCodec, MAX_CODECS>,
}

/// Audio Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AgConfiguration {
    /// Features sent in `+BRSF`
    pub supported_ag_features: FeatureSet<AgFeature>,
    /// Indicators, in `+CIND` order, with their initial status
    pub supported_ag_indicators: Vec<AgIndicatorState, MAX_AG_INDICATORS>,
    /// HF indicators the gateway accepts
    pub supported_hf_indicators: Vec<HfIndicator, MAX_HF_INDICATORS>,
    /// Call hold operations advertised in `+CHLD`
    pub supported_ag_call_hold_operations: Vec<CallHoldOperation, MAX_CALL_HOLD_OPERATIONS>,
    /// Codecs the gateway may propose
    pub supported_audio_codecs: Vec<AudioCodec, MAX_CODECS>,
}

fn collect<T: Copy, const N: usize>(items: &[T]) -> Result<Vec<T, N>, HfpError> {
    Vec::from_slice(items).map_err(|()| HfpError::InvalidConfiguration)
}

impl HfConfiguration {
    /// Build and validate a configuration
    ///
    /// # Errors
    /// `InvalidConfiguration` if a list exceeds its capacity or an invariant
    /// of [`Self::validate`] does not hold.
    pub fn new(
        supported_hf_features: FeatureSet<HfFeature>,
        supported_hf_indicators: &[HfIndicator],
        supported_audio_codecs: &[AudioCodec],
    ) -> Result<Self, HfpError> {
        let configuration = Self {
            supported_hf_features,
            supported_hf_indicators: collect(supported_hf_indicators)?,
            supported_audio_codecs: collect(supported_audio_codecs)?,
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// No optional feature, no indicator, no codec list
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            supported_hf_features: FeatureSet::empty(),
            supported_hf_indicators: Vec::new(),
            supported_audio_codecs: Vec::new(),
        }
    }

    /// Check the configuration invariants:
    ///
    /// - codec negotiation requires at least one codec
    /// - HF indicators require at least one indicator
    ///
    /// # Errors
    /// `InvalidConfiguration` if one of them is broken.
    pub fn validate(&self) -> Result<(), HfpError> {
        if self.supported_hf_features.contains(HfFeature::CodecNegotiation)
            && self.supported_audio_codecs.is_empty()
        {
            return Err(HfpError::InvalidConfiguration);
        }
        if self.supported_hf_features.contains(HfFeature::HfIndicators)
            && self.supported_hf_indicators.is_empty()
        {
            return Err(HfpError::InvalidConfiguration);
        }
        Ok(())
    }

    /// Builder-style feature insert
    #[must_use]
    pub fn with_feature(mut self, feature: HfFeature) -> Self {
        self.supported_hf_features.insert(feature);
        self
    }

    /// Builder-style codec list replacement
    #[must_use]
    pub fn with_codecs(mut self, codecs: &[AudioCodec]) -> Self {
        self.supported_audio_codecs = codecs.iter().copied().take(MAX_CODECS).collect();
        self
    }

    /// Builder-style HF indicator list replacement
    #[must_use]
    pub fn with_hf_indicators(mut self, indicators: &[HfIndicator]) -> Self {
        self.supported_hf_indicators = indicators.iter().copied().take(MAX_HF_INDICATORS).collect();
        self
    }
}

impl Default for HfConfiguration {
    /// Codec negotiation (CVSD, mSBC), eSCO S4, HF indicators (enhanced
    /// safety, battery level) and remote volume control
    fn default() -> Self {
        Self::minimal()
            .with_feature(HfFeature::CodecNegotiation)
            .with_feature(HfFeature::EscoS4SettingsSupported)
            .with_feature(HfFeature::HfIndicators)
            .with_feature(HfFeature::RemoteVolumeControl)
            .with_hf_indicators(&[HfIndicator::EnhancedSafety, HfIndicator::BatteryLevel])
            .with_codecs(&[AudioCodec::Cvsd, AudioCodec::Msbc])
    }
}

impl AgConfiguration {
    /// Build and validate a configuration
    ///
    /// # Errors
    /// `InvalidConfiguration` if a list exceeds its capacity or an invariant
    /// of [`Self::validate`] does not hold.
    pub fn new(
        supported_ag_features: FeatureSet<AgFeature>,
        supported_ag_indicators: &[AgIndicatorState],
        supported_hf_indicators: &[HfIndicator],
        supported_ag_call_hold_operations: &[CallHoldOperation],
        supported_audio_codecs: &[AudioCodec],
    ) -> Result<Self, HfpError> {
        let configuration = Self {
            supported_ag_features,
            supported_ag_indicators: collect(supported_ag_indicators)?,
            supported_hf_indicators: collect(supported_hf_indicators)?,
            supported_ag_call_hold_operations: collect(supported_ag_call_hold_operations)?,
            supported_audio_codecs: collect(supported_audio_codecs)?,
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Only the `call` indicator and no optional feature
    #[must_use]
    pub fn minimal() -> Self {
        let mut indicators = Vec::new();
        indicators.push(AgIndicatorState::call()).ok();
        Self {
            supported_ag_features: FeatureSet::empty(),
            supported_ag_indicators: indicators,
            supported_hf_indicators: Vec::new(),
            supported_ag_call_hold_operations: Vec::new(),
            supported_audio_codecs: Vec::new(),
        }
    }

    /// Check the configuration invariants:
    ///
    /// - at least one AG indicator, each starting at a legal value
    /// - the `+CIND` indicator list fits in one AT line
    /// - codec negotiation requires at least one codec
    /// - HF indicators require at least one indicator
    /// - three-way calling requires at least one call hold operation
    ///
    /// # Errors
    /// `InvalidConfiguration` if one of them is broken.
    pub fn validate(&self) -> Result<(), HfpError> {
        let features = self.supported_ag_features;
        let indicators_valid = !self.supported_ag_indicators.is_empty()
            && self
                .supported_ag_indicators
                .iter()
                .all(|state| state.supported_values.contains(state.current_status))
            && AtResponse::IndicatorDescriptors(
                self.supported_ag_indicators
                    .iter()
                    .map(IndicatorDescriptor::from)
                    .collect(),
            )
            .try_encode()
            .is_ok();

        if !indicators_valid
            || (features.contains(AgFeature::CodecNegotiation)
                && self.supported_audio_codecs.is_empty())
            || (features.contains(AgFeature::HfIndicators) && self.supported_hf_indicators.is_empty())
            || (features.contains(AgFeature::ThreeWayCalling)
                && self.supported_ag_call_hold_operations.is_empty())
        {
            return Err(HfpError::InvalidConfiguration);
        }
        Ok(())
    }

    /// Builder-style feature insert
    #[must_use]
    pub fn with_feature(mut self, feature: AgFeature) -> Self {
        self.supported_ag_features.insert(feature);
        self
    }

    /// Builder-style indicator list replacement
    #[must_use]
    pub fn with_ag_indicators(mut self, indicators: &[AgIndicatorState]) -> Self {
        self.supported_ag_indicators = indicators.iter().copied().take(MAX_AG_INDICATORS).collect();
        self
    }

    /// Builder-style HF indicator list replacement
    #[must_use]
    pub fn with_hf_indicators(mut self, indicators: &[HfIndicator]) -> Self {
        self.supported_hf_indicators = indicators.iter().copied().take(MAX_HF_INDICATORS).collect();
        self
    }

    /// Builder-style call hold operation list replacement
    #[must_use]
    pub fn with_call_hold_operations(mut self, operations: &[CallHoldOperation]) -> Self {
        self.supported_ag_call_hold_operations = operations
            .iter()
            .copied()
            .take(MAX_CALL_HOLD_OPERATIONS)
            .collect();
        self
    }

    /// Builder-style codec list replacement
    #[must_use]
    pub fn with_codecs(mut self, codecs: &[AudioCodec]) -> Self {
        self.supported_audio_codecs = codecs.iter().copied().take(MAX_CODECS).collect();
        self
    }
}

impl Default for AgConfiguration {
    /// HF indicators, in-band ring tone, call rejection, codec negotiation
    /// (CVSD, mSBC), eSCO S4 and extended errors, with the seven standard
    /// indicators (service and signal initially available)
    fn default() -> Self {
        Self::minimal()
            .with_feature(AgFeature::HfIndicators)
            .with_feature(AgFeature::InBandRingToneCapability)
            .with_feature(AgFeature::RejectCall)
            .with_feature(AgFeature::CodecNegotiation)
            .with_feature(AgFeature::EscoS4SettingsSupported)
            .with_feature(AgFeature::ExtendedErrorResultCodes)
            .with_ag_indicators(&[
                AgIndicatorState::service().with_status(1),
                AgIndicatorState::call(),
                AgIndicatorState::callsetup(),
                AgIndicatorState::callheld(),
                AgIndicatorState::signal().with_status(4),
                AgIndicatorState::roam(),
                AgIndicatorState::battchg().with_status(5),
            ])
            .with_hf_indicators(&[HfIndicator::EnhancedSafety, HfIndicator::BatteryLevel])
            .with_codecs(&[AudioCodec::Cvsd, AudioCodec::Msbc])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp::ValueSet;

    #[test]
    fn test_default_configurations_are_valid() {
        assert!(HfConfiguration::default().validate().is_ok());
        assert!(AgConfiguration::default().validate().is_ok());
        assert!(HfConfiguration::minimal().validate().is_ok());
        assert!(AgConfiguration::minimal().validate().is_ok());
    }

    #[test]
    fn test_codec_negotiation_requires_codecs() {
        let result = HfConfiguration::new(
            FeatureSet::empty().with(HfFeature::CodecNegotiation),
            &[],
            &[],
        );
        assert_eq!(result, Err(HfpError::InvalidConfiguration));

        let configuration = AgConfiguration::default().with_codecs(&[]);
        assert_eq!(configuration.validate(), Err(HfpError::InvalidConfiguration));
    }

    #[test]
    fn test_hf_indicators_require_indicators() {
        let configuration = HfConfiguration::default().with_hf_indicators(&[]);
        assert_eq!(configuration.validate(), Err(HfpError::InvalidConfiguration));
    }

    #[test]
    fn test_three_way_calling_requires_operations() {
        let configuration = AgConfiguration::minimal().with_feature(AgFeature::ThreeWayCalling);
        assert_eq!(configuration.validate(), Err(HfpError::InvalidConfiguration));

        let configuration = configuration.with_call_hold_operations(&[
            CallHoldOperation::ReleaseAllHeldCalls,
            CallHoldOperation::HoldAllActiveCalls,
        ]);
        assert!(configuration.validate().is_ok());
    }

    #[test]
    fn test_indicator_status_must_be_legal() {
        let indicator = AgIndicatorState::new(
            crate::hfp::AgIndicator::Signal,
            ValueSet::range(0, 5),
            6,
        );
        let result = AgConfiguration::new(FeatureSet::empty(), &[indicator], &[], &[], &[]);
        assert_eq!(result, Err(HfpError::InvalidConfiguration));

        let result = AgConfiguration::new(FeatureSet::empty(), &[], &[], &[], &[]);
        assert_eq!(result, Err(HfpError::InvalidConfiguration));
    }

    #[test]
    fn test_indicator_list_must_fit_one_line() {
        let indicators = [AgIndicatorState::callsetup(); MAX_AG_INDICATORS];
        let configuration = AgConfiguration::minimal().with_ag_indicators(&indicators);
        assert_eq!(configuration.supported_ag_indicators.len(), MAX_AG_INDICATORS);
        assert_eq!(configuration.validate(), Err(HfpError::InvalidConfiguration));

        let configuration = AgConfiguration::minimal().with_ag_indicators(&indicators[..4]);
        assert!(configuration.validate().is_ok());
    }
}
