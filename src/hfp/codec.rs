//! Audio Codec Selection
//!
//! Tracks which voice codecs each side supports and drives the `+BCS`
//! proposal / `AT+BCS` confirmation exchange. Only codec *selection* lives
//! here; encoding is done by the controller or the audio pipeline.

use super::HfpError;
use super::Violation;
use crate::constants::MAX_CODECS;
use heapless::Vec;

/// Voice codec identifiers used in `AT+BAC` and `+BCS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AudioCodec {
    /// CVSD, narrow band, mandatory
    Cvsd = 1,
    /// mSBC, wide band
    Msbc = 2,
    /// LC3-SWB, super wide band
    Lc3Swb = 3,
}

impl AudioCodec {
    /// Look up a codec by identifier
    #[must_use]
    pub const fn from_u8(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Cvsd),
            2 => Some(Self::Msbc),
            3 => Some(Self::Lc3Swb),
            _ => None,
        }
    }

    /// Codec identifier
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }
}

/// Codec negotiation state of one session
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecNegotiation {
    local: Vec<AudioCodec, MAX_CODECS>,
    peer: Vec<u8, MAX_CODECS>,
    selected: AudioCodec,
    proposed: Option<AudioCodec>,
}

impl CodecNegotiation {
    /// Start with CVSD selected and nothing known about the peer
    #[must_use]
    pub fn new(local: &[AudioCodec]) -> Self {
        Self {
            local: local.iter().copied().take(MAX_CODECS).collect(),
            peer: Vec::new(),
            selected: AudioCodec::Cvsd,
            proposed: None,
        }
    }

    /// Codecs supported locally
    #[must_use]
    pub fn local_codecs(&self) -> &[AudioCodec] {
        &self.local
    }

    /// Raw codec identifiers advertised by the HF in `AT+BAC`
    #[must_use]
    pub fn peer_codecs(&self) -> &[u8] {
        &self.peer
    }

    /// Record the HF's `AT+BAC` list
    pub fn set_peer_codecs(&mut self, codecs: &[u8]) {
        self.peer = codecs.iter().copied().take(MAX_CODECS).collect();
    }

    /// Codec currently selected for audio connections
    #[must_use]
    pub const fn selected(&self) -> AudioCodec {
        self.selected
    }

    /// Codec proposed and not yet confirmed
    #[must_use]
    pub const fn proposed(&self) -> Option<AudioCodec> {
        self.proposed
    }

    /// Whether a codec is supported on this side
    #[must_use]
    pub fn supports(&self, codec: AudioCodec) -> bool {
        self.local.contains(&codec)
    }

    /// Whether both sides listed a codec
    #[must_use]
    pub fn is_mutual(&self, codec: AudioCodec) -> bool {
        self.supports(codec) && self.peer.contains(&codec.id())
    }

    /// Best codec both sides support (LC3-SWB, then mSBC, then CVSD)
    #[must_use]
    pub fn preferred(&self) -> Option<AudioCodec> {
        [AudioCodec::Lc3Swb, AudioCodec::Msbc, AudioCodec::Cvsd]
            .into_iter()
            .find(|codec| self.is_mutual(*codec))
    }

    /// Gateway side: start a proposal
    ///
    /// # Errors
    /// `UnsupportedFeature` if the codec is not supported by both sides.
    pub fn propose(&mut self, codec: AudioCodec) -> Result<(), HfpError> {
        if !self.is_mutual(codec) {
            return Err(HfpError::UnsupportedFeature);
        }
        self.proposed = Some(codec);
        Ok(())
    }

    /// Gateway side: handle the HF's `AT+BCS` confirmation
    ///
    /// # Errors
    /// `ProtocolViolation(CodecMismatch)` if the confirmation names a
    /// different codec than the outstanding proposal.
    pub fn confirm(&mut self, id: u8) -> Result<AudioCodec, HfpError> {
        let proposed = self.proposed.take();
        match proposed {
            Some(codec) if codec.id() == id => {
                self.selected = codec;
                Ok(codec)
            }
            _ => Err(HfpError::ProtocolViolation(Violation::CodecMismatch)),
        }
    }

    /// Gateway side: the HF answered with a fresh `AT+BAC` instead of a
    /// confirmation
    pub fn refuse(&mut self, codecs: &[u8]) {
        self.proposed = None;
        self.set_peer_codecs(codecs);
    }

    /// Hands-free side: a `+BCS` proposal arrived
    ///
    /// Returns the codec to confirm, or `None` if it must be refused with a
    /// fresh `AT+BAC`.
    pub fn receive_proposal(&mut self, id: u8) -> Option<AudioCodec> {
        let codec = AudioCodec::from_u8(id).filter(|codec| self.supports(*codec));
        self.proposed = codec;
        codec
    }

    /// Hands-free side: the AG accepted our `AT+BCS` confirmation
    pub fn complete(&mut self, codec: AudioCodec) {
        if self.proposed == Some(codec) {
            self.proposed = None;
        }
        self.selected = codec;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_codec() {
        let mut negotiation = CodecNegotiation::new(&[AudioCodec::Cvsd, AudioCodec::Msbc]);
        assert_eq!(negotiation.preferred(), None);

        negotiation.set_peer_codecs(&[1, 2, 3]);
        assert_eq!(negotiation.preferred(), Some(AudioCodec::Msbc));

        negotiation.set_peer_codecs(&[1]);
        assert_eq!(negotiation.preferred(), Some(AudioCodec::Cvsd));
    }

    #[test]
    fn test_propose_and_confirm() {
        let mut negotiation = CodecNegotiation::new(&[AudioCodec::Cvsd, AudioCodec::Msbc]);
        negotiation.set_peer_codecs(&[1, 2]);

        negotiation.propose(AudioCodec::Msbc).unwrap();
        assert_eq!(negotiation.proposed(), Some(AudioCodec::Msbc));
        assert_eq!(negotiation.confirm(2), Ok(AudioCodec::Msbc));
        assert_eq!(negotiation.selected(), AudioCodec::Msbc);
        assert_eq!(negotiation.proposed(), None);
    }

    #[test]
    fn test_confirm_mismatch() {
        let mut negotiation = CodecNegotiation::new(&[AudioCodec::Cvsd, AudioCodec::Msbc]);
        negotiation.set_peer_codecs(&[1, 2]);
        negotiation.propose(AudioCodec::Msbc).unwrap();

        assert_eq!(
            negotiation.confirm(1),
            Err(HfpError::ProtocolViolation(Violation::CodecMismatch))
        );
        assert_eq!(negotiation.selected(), AudioCodec::Cvsd);
    }

    #[test]
    fn test_propose_requires_mutual_support() {
        let mut negotiation = CodecNegotiation::new(&[AudioCodec::Cvsd]);
        negotiation.set_peer_codecs(&[1, 2]);
        assert_eq!(
            negotiation.propose(AudioCodec::Msbc),
            Err(HfpError::UnsupportedFeature)
        );
    }

    #[test]
    fn test_receive_proposal() {
        let mut negotiation = CodecNegotiation::new(&[AudioCodec::Cvsd, AudioCodec::Msbc]);
        assert_eq!(negotiation.receive_proposal(2), Some(AudioCodec::Msbc));
        negotiation.complete(AudioCodec::Msbc);
        assert_eq!(negotiation.selected(), AudioCodec::Msbc);

        assert_eq!(negotiation.receive_proposal(3), None);
        assert_eq!(negotiation.receive_proposal(9), None);
        assert_eq!(negotiation.selected(), AudioCodec::Msbc);
    }
}
