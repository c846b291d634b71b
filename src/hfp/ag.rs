//! Audio Gateway role
//!
//! The AG answers the HF's handshake commands, reports indicator changes with
//! `+CIEV` and drives codec negotiation with `+BCS`. Every command the HF
//! sends is answered with exactly one final result code; call control
//! commands are surfaced as [`AgEvent`]s.

use super::link::{EventSubscriber, Input, Link, RfcommChannel, write_line};
use super::{
    AgConfiguration, AgEvent, AgFeature, AgIndicator, AgIndicatorState, AudioCodec,
    AudioSetupRequest, CodecNegotiation, FeatureSet, HfFeature, HfIndicator, HfIndicatorState,
    HfpError, LinkQuality, SessionFeatures, Violation, audio_setup_request,
};
use crate::at::{AtCommand, AtDecoder, AtResponse, IndicatorDescriptor, frame_response};
use crate::constants::{
    CME_OPERATION_NOT_ALLOWED, CME_OPERATION_NOT_SUPPORTED, CMER_MODE_FORWARD, MAX_AG_INDICATORS,
    MAX_CODECS, MAX_GAIN, MAX_HF_INDICATORS, READ_CHUNK_SIZE,
};
use bt_hci::param::ConnHandle;
use core::cell::RefCell;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

/// Event subscriber of an AG session
pub type AgSubscriber<'a, M> = EventSubscriber<'a, M, AgEvent>;

/// Local request carried to the session loop
enum AgRequest {
    /// Write a raw result code
    ResultCode,
    /// Start codec negotiation with `+BCS`
    CodecProposal(AudioCodec),
}

/// Next handshake command the AG waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum SlcStage {
    AwaitingFeatures,
    AwaitingCodecs,
    AwaitingIndicatorList,
    AwaitingIndicatorStatus,
    AwaitingEventReporting,
    AwaitingCallHoldOperations,
    AwaitingHfIndicators,
    AwaitingHfIndicatorList,
    AwaitingHfIndicatorStatus,
    Established,
}

impl SlcStage {
    fn expects(self, command: &AtCommand) -> bool {
        matches!(
            (self, command),
            (Self::AwaitingFeatures, AtCommand::SupportedFeatures(_))
                | (Self::AwaitingCodecs, AtCommand::AvailableCodecs(_))
                | (Self::AwaitingIndicatorList, AtCommand::IndicatorsTest)
                | (Self::AwaitingIndicatorStatus, AtCommand::IndicatorsRead)
                | (Self::AwaitingEventReporting, AtCommand::EventReporting { .. })
                | (Self::AwaitingCallHoldOperations, AtCommand::CallHoldTest)
                | (Self::AwaitingHfIndicators, AtCommand::HfIndicatorsSet(_))
                | (Self::AwaitingHfIndicatorList, AtCommand::HfIndicatorsTest)
                | (Self::AwaitingHfIndicatorStatus, AtCommand::HfIndicatorsRead)
        )
    }

    /// Stage following this one; steps whose feature is not mutual are
    /// skipped
    fn next(self, features: &SessionFeatures) -> Self {
        match self {
            Self::AwaitingFeatures if features.codec_negotiation() => Self::AwaitingCodecs,
            Self::AwaitingFeatures | Self::AwaitingCodecs => Self::AwaitingIndicatorList,
            Self::AwaitingIndicatorList => Self::AwaitingIndicatorStatus,
            Self::AwaitingIndicatorStatus => Self::AwaitingEventReporting,
            Self::AwaitingEventReporting if features.three_way_calling() => {
                Self::AwaitingCallHoldOperations
            }
            Self::AwaitingEventReporting | Self::AwaitingCallHoldOperations
                if features.hf_indicators() =>
            {
                Self::AwaitingHfIndicators
            }
            Self::AwaitingHfIndicators => Self::AwaitingHfIndicatorList,
            Self::AwaitingHfIndicatorList => Self::AwaitingHfIndicatorStatus,
            Self::AwaitingEventReporting
            | Self::AwaitingCallHoldOperations
            | Self::AwaitingHfIndicatorStatus
            | Self::Established => Self::Established,
        }
    }
}

/// Outstanding `+BCS` proposal
#[derive(Debug, Clone, Copy)]
struct Proposal {
    /// Sequence number of the local caller waiting for the outcome
    requester: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
enum CodecStep {
    #[default]
    None,
    Confirmed {
        codec: AudioCodec,
        requester: Option<u32>,
    },
    Refused {
        requester: Option<u32>,
    },
}

/// What answering one HF command requires
#[derive(Default)]
struct Reaction {
    responses: Vec<AtResponse, { MAX_HF_INDICATORS + 2 }>,
    event: Option<AgEvent>,
    codec: CodecStep,
}

impl Reaction {
    fn respond(&mut self, response: AtResponse) {
        if self.responses.push(response).is_err() {
            warn!("[AG] Response overflow");
        }
    }

    fn ok(&mut self) {
        self.respond(AtResponse::Ok);
    }

    fn reject(&mut self, extended_errors: bool, code: u16) {
        self.respond(if extended_errors {
            AtResponse::CmeError(code)
        } else {
            AtResponse::Error
        });
    }
}

struct AgState {
    stage: SlcStage,
    features: SessionFeatures,
    ag_indicators: Vec<AgIndicatorState, MAX_AG_INDICATORS>,
    indicator_reporting: bool,
    hf_indicators: Vec<HfIndicatorState, MAX_HF_INDICATORS>,
    codecs: CodecNegotiation,
    proposal: Option<Proposal>,
    extended_errors: bool,
    decoder: AtDecoder,
}

impl AgState {
    fn new(configuration: &AgConfiguration) -> Self {
        Self {
            stage: SlcStage::AwaitingFeatures,
            features: SessionFeatures::new(FeatureSet::empty(), configuration.supported_ag_features),
            ag_indicators: configuration.supported_ag_indicators.clone(),
            indicator_reporting: false,
            hf_indicators: configuration
                .supported_hf_indicators
                .iter()
                .map(|&indicator| HfIndicatorState {
                    enabled: true,
                    ..HfIndicatorState::new(indicator)
                })
                .collect(),
            codecs: CodecNegotiation::new(&configuration.supported_audio_codecs),
            proposal: None,
            extended_errors: false,
            decoder: AtDecoder::new(),
        }
    }

    fn established(&self) -> bool {
        self.stage == SlcStage::Established
    }

    /// Apply one HF command
    ///
    /// Errors are fatal protocol violations; rejected commands are answered
    /// with an error result code in the reaction instead.
    fn apply(
        &mut self,
        configuration: &AgConfiguration,
        command: AtCommand,
    ) -> Result<Reaction, HfpError> {
        let establishing = !self.established();
        if establishing && !self.stage.expects(&command) {
            warn!("[AG] {:?} while {:?}", command, self.stage);
            return Err(Violation::UnexpectedCommand.into());
        }

        let mut reaction = Reaction::default();
        let extended = self.extended_errors;
        match command {
            AtCommand::SupportedFeatures(bits) if establishing => {
                self.features.hf = FeatureSet::<HfFeature>::from_bits(bits);
                reaction.respond(AtResponse::SupportedFeatures(
                    configuration.supported_ag_features.bits(),
                ));
                reaction.ok();
            }
            AtCommand::AvailableCodecs(codecs) if self.features.codec_negotiation() => {
                match self.proposal.take() {
                    Some(proposal) => {
                        self.codecs.refuse(&codecs);
                        reaction.codec = CodecStep::Refused {
                            requester: proposal.requester,
                        };
                    }
                    None => self.codecs.set_peer_codecs(&codecs),
                }
                reaction.ok();
            }
            AtCommand::IndicatorsTest => {
                reaction.respond(AtResponse::IndicatorDescriptors(
                    self.ag_indicators.iter().map(IndicatorDescriptor::from).collect(),
                ));
                reaction.ok();
            }
            AtCommand::IndicatorsRead => {
                reaction.respond(AtResponse::IndicatorValues(
                    self.ag_indicators
                        .iter()
                        .map(|indicator| indicator.current_status)
                        .collect(),
                ));
                reaction.ok();
            }
            AtCommand::EventReporting { mode, indicators } => {
                self.indicator_reporting = mode == CMER_MODE_FORWARD && indicators;
                reaction.ok();
            }
            AtCommand::CallHoldTest if self.features.three_way_calling() => {
                reaction.respond(AtResponse::CallHoldOperations(
                    configuration.supported_ag_call_hold_operations.clone(),
                ));
                reaction.ok();
            }
            AtCommand::CallHold {
                operation,
                call_index,
            } if self.features.three_way_calling()
                && configuration
                    .supported_ag_call_hold_operations
                    .contains(&operation) =>
            {
                reaction.event = Some(AgEvent::CallHold {
                    operation,
                    call_index,
                });
                reaction.ok();
            }
            AtCommand::HfIndicatorsSet(identifiers) if establishing => {
                for entry in &mut self.hf_indicators {
                    entry.supported = identifiers.contains(&entry.indicator.id());
                }
                reaction.ok();
            }
            AtCommand::HfIndicatorsTest => {
                reaction.respond(AtResponse::HfIndicatorsSupported(
                    configuration
                        .supported_hf_indicators
                        .iter()
                        .map(|indicator| indicator.id())
                        .collect(),
                ));
                reaction.ok();
            }
            AtCommand::HfIndicatorsRead => {
                for entry in self.hf_indicators.iter().filter(|entry| entry.supported) {
                    reaction.respond(AtResponse::HfIndicatorStatus {
                        indicator: entry.indicator.id(),
                        enabled: entry.enabled,
                    });
                }
                reaction.ok();
            }
            AtCommand::HfIndicatorValue { indicator, value } if self.features.hf_indicators() => {
                let entry = self.hf_indicators.iter_mut().find(|entry| {
                    entry.indicator.id() == indicator && entry.supported && entry.enabled
                });
                match entry {
                    Some(entry) if entry.indicator.accepts(value) => {
                        entry.current_status = value;
                        reaction.event = Some(AgEvent::HfIndicator(*entry));
                        reaction.ok();
                    }
                    Some(_) => {
                        warn!("[AG] HF indicator {} value {} out of range", indicator, value);
                        reaction.reject(extended, CME_OPERATION_NOT_ALLOWED);
                    }
                    None => reaction.reject(extended, CME_OPERATION_NOT_SUPPORTED),
                }
            }
            AtCommand::CodecConnection if self.features.codec_negotiation() => {
                reaction.ok();
                if self.proposal.is_none() {
                    if let Some(codec) = self.codecs.preferred() {
                        self.codecs.propose(codec)?;
                        self.proposal = Some(Proposal { requester: None });
                        reaction.respond(AtResponse::CodecSelection(codec.id()));
                    }
                }
            }
            AtCommand::CodecSelection(id) if self.proposal.is_some() => {
                let requester = self.proposal.take().and_then(|proposal| proposal.requester);
                let codec = self.codecs.confirm(id)?;
                reaction.codec = CodecStep::Confirmed { codec, requester };
                reaction.ok();
            }
            AtCommand::Dial(number) => {
                reaction.event = Some(AgEvent::Dial(number));
                reaction.ok();
            }
            AtCommand::Redial => {
                reaction.event = Some(AgEvent::Redial);
                reaction.ok();
            }
            AtCommand::Answer => {
                reaction.event = Some(AgEvent::Answer);
                reaction.ok();
            }
            AtCommand::HangUp => {
                reaction.event = Some(AgEvent::HangUp);
                reaction.ok();
            }
            AtCommand::SpeakerGain(gain) => {
                reaction.event = Some(AgEvent::SpeakerVolume(gain));
                reaction.ok();
            }
            AtCommand::MicrophoneGain(gain) => {
                reaction.event = Some(AgEvent::MicrophoneVolume(gain));
                reaction.ok();
            }
            AtCommand::ExtendedErrors(enabled)
                if configuration
                    .supported_ag_features
                    .contains(AgFeature::ExtendedErrorResultCodes) =>
            {
                self.extended_errors = enabled;
                reaction.ok();
            }
            other => {
                debug!("[AG] Rejecting {:?}", other);
                reaction.reject(extended, CME_OPERATION_NOT_SUPPORTED);
            }
        }

        if establishing {
            self.stage = self.stage.next(&self.features);
        }
        Ok(reaction)
    }
}

/// Audio Gateway side of one service level connection
///
/// `M` selects the mutex flavour guarding the session: `NoopRawMutex` when
/// every task runs on one executor, `CriticalSectionRawMutex` otherwise.
pub struct AgProtocol<'a, M: RawMutex> {
    configuration: &'a AgConfiguration,
    state: Mutex<M, RefCell<AgState>>,
    link: Link<M, AgEvent, Option<AudioCodec>, AgRequest>,
}

impl<'a, M: RawMutex> AgProtocol<'a, M> {
    /// Create a session for one RFCOMM channel
    #[must_use]
    pub fn new(configuration: &'a AgConfiguration) -> Self {
        Self {
            configuration,
            state: Mutex::new(RefCell::new(AgState::new(configuration))),
            link: Link::new(),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AgState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Answer the HF's handshake until the service level connection is up
    ///
    /// # Errors
    /// `ProtocolViolation` if the HF sends a malformed or out-of-order
    /// command; the channel is closed in that case. `Disconnected` if the
    /// channel closes first. `Cancelled` if [`Self::cancel`] is called
    /// meanwhile; the channel stays open.
    pub async fn accept<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        self.link.ensure_open()?;
        info!("[AG] Waiting for service level connection");
        let outcome = select(self.link.wait_cancelled(), self.handshake(channel)).await;
        let result = match outcome {
            Either::First(()) => {
                info!("[AG] Handshake cancelled");
                return Err(HfpError::Cancelled);
            }
            Either::Second(result) => result,
        };
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                error!("[AG] Handshake failed: {:?}", error);
                if matches!(error, HfpError::ProtocolViolation(_)) {
                    write_line(channel, &AtResponse::Error.encode()).await.ok();
                }
                self.link.shutdown(channel, error).await;
                Err(error)
            }
        }
    }

    async fn handshake<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            while let Some(line) = self.with_state(|state| state.decoder.next_line()) {
                let command = AtCommand::parse(&line?)?;
                debug!("[AG] <- {:?}", command);
                let reaction =
                    self.with_state(|state| state.apply(self.configuration, command))?;
                self.react(channel, reaction).await?;
                if self.is_established() {
                    info!("[AG] Service level connection established");
                    return Ok(());
                }
            }
            let count = channel
                .read(&mut buffer)
                .await
                .map_err(|_| HfpError::Disconnected)?;
            if count == 0 {
                return Err(HfpError::Disconnected);
            }
            self.with_state(|state| state.decoder.push(&buffer[..count]));
        }
    }

    async fn react<T: RfcommChannel>(&self, channel: &mut T, reaction: Reaction) -> Result<(), HfpError> {
        for response in &reaction.responses {
            let Ok(line) = response.try_encode() else {
                error!("[AG] {} answer does not fit in a line", response.code());
                return write_line(channel, &AtResponse::Error.encode()).await;
            };
            write_line(channel, &line).await?;
        }
        if let Some(event) = reaction.event {
            self.link.publish(event);
        }
        match reaction.codec {
            CodecStep::None => {}
            CodecStep::Confirmed { codec, requester } => {
                info!("[AG] Codec {:?} selected", codec);
                if let Some(seq) = requester {
                    self.link.resolve(seq, Ok(Some(codec)));
                }
                self.link.publish(AgEvent::CodecNegotiation(codec));
            }
            CodecStep::Refused { requester } => {
                warn!("[AG] HF refused codec proposal");
                if let Some(seq) = requester {
                    self.link.resolve(seq, Err(HfpError::Rejected(None)));
                }
            }
        }
        Ok(())
    }

    /// Serve the established connection until it closes or is cancelled
    ///
    /// # Errors
    /// `NotEstablished` before [`Self::accept`] succeeded, `Disconnected`
    /// when the channel closes, `ProtocolViolation` if the HF confirms a
    /// codec other than the one proposed.
    pub async fn run<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        match self.link.closed() {
            Some(HfpError::Cancelled) => return Ok(()),
            Some(error) => return Err(error),
            None => {}
        }
        if !self.is_established() {
            return Err(HfpError::NotEstablished);
        }

        let result = self.serve(channel).await;
        if let Err(error) = result {
            warn!("[AG] Session ended: {:?}", error);
            self.link.shutdown(channel, error).await;
        }
        result
    }

    async fn serve<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        let mut buffer = [0u8; READ_CHUNK_SIZE];

        // Commands that arrived together with the last handshake command
        self.drain(channel).await?;

        loop {
            self.forget_abandoned_proposal();
            match self.link.next_input(channel, &mut buffer, true).await {
                Input::Data(count) => {
                    self.with_state(|state| state.decoder.push(&buffer[..count]));
                    self.drain(channel).await?;
                }
                Input::Request(request) => match request.kind {
                    AgRequest::ResultCode => {
                        trace!("[AG] -> {}", request.line.as_str().trim());
                        write_line(channel, &request.line).await?;
                        self.link.resolve(request.seq, Ok(None));
                    }
                    AgRequest::CodecProposal(codec) => {
                        // Replaces any outstanding proposal, none of which
                        // has a caller left
                        let proposed = self.with_state(|state| {
                            state.codecs.propose(codec)?;
                            state.proposal = Some(Proposal {
                                requester: Some(request.seq),
                            });
                            Ok(())
                        });
                        match proposed {
                            Ok(()) => {
                                debug!("[AG] Proposing codec {:?}", codec);
                                write_line(channel, &request.line).await?;
                            }
                            Err(error) => self.link.resolve(request.seq, Err(error)),
                        }
                    }
                },
                Input::Notification(line) => write_line(channel, &line).await?,
                Input::Cancelled => {
                    info!("[AG] Session cancelled");
                    return Ok(());
                }
                Input::Closed => return Err(HfpError::Disconnected),
            }
        }
    }

    /// Keep an outstanding `+BCS` whose caller gave up, but stop routing its
    /// outcome to that caller
    fn forget_abandoned_proposal(&self) {
        let requester = self.with_state(|state| state.proposal.and_then(|proposal| proposal.requester));
        if let Some(seq) = requester.filter(|&seq| !self.link.is_pending(seq)) {
            debug!("[AG] Codec proposal {} abandoned", seq);
            self.with_state(|state| {
                if let Some(proposal) = state.proposal.as_mut() {
                    proposal.requester = None;
                }
            });
        }
    }

    async fn drain<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        while let Some(line) = self.with_state(|state| state.decoder.next_line()) {
            let command = match line.and_then(|line| AtCommand::parse(&line)) {
                Ok(command) => command,
                Err(error) => {
                    warn!("[AG] Malformed command: {:?}", error.kind);
                    self.link.publish(AgEvent::MalformedFrame(error.kind));
                    write_line(channel, &AtResponse::Error.encode()).await?;
                    continue;
                }
            };
            trace!("[AG] <- {:?}", command);
            let reaction = self.with_state(|state| state.apply(self.configuration, command))?;
            self.react(channel, reaction).await?;
        }
        Ok(())
    }

    fn ensure_established(&self) -> Result<(), HfpError> {
        self.link.ensure_open()?;
        if self.is_established() {
            Ok(())
        } else {
            Err(HfpError::NotEstablished)
        }
    }

    /// Send a raw result code to the HF
    ///
    /// `+BCS: <codec>` starts codec negotiation and `+CIEV: <index>,<value>`
    /// updates the indicator at that position; anything else is written as
    /// is.
    ///
    /// # Errors
    /// `Busy` if another command is outstanding (nothing is written),
    /// `CommandTooLong` if the text does not fit in a line.
    pub async fn execute_command(&self, text: &str) -> Result<(), HfpError> {
        self.ensure_established()?;
        match AtResponse::parse(text) {
            Ok(AtResponse::CodecSelection(id)) => {
                let codec = AudioCodec::from_u8(id).ok_or(HfpError::UnsupportedFeature)?;
                return self.negotiate_codec(codec).await.map(drop);
            }
            Ok(AtResponse::IndicatorEvent { index, value }) => {
                let indicator = self
                    .with_state(|state| {
                        let position = usize::from(index).checked_sub(1)?;
                        state.ag_indicators.get(position).map(|entry| entry.indicator)
                    })
                    .ok_or(HfpError::OutOfRange)?;
                return self.update_ag_indicator(indicator, value).await;
            }
            _ => {}
        }
        let line = frame_response(text).ok_or(HfpError::CommandTooLong)?;
        self.link.execute(line, AgRequest::ResultCode).await.map(drop)
    }

    /// Propose a codec with `+BCS` and wait for the HF's confirmation
    ///
    /// # Errors
    /// `UnsupportedFeature` unless both sides support codec negotiation and
    /// listed `codec`. `Rejected` if the HF answers with a fresh `AT+BAC`.
    /// `ProtocolViolation` if it confirms a different codec.
    pub async fn negotiate_codec(&self, codec: AudioCodec) -> Result<AudioCodec, HfpError> {
        self.ensure_established()?;
        let negotiable = self
            .with_state(|state| state.features.codec_negotiation() && state.codecs.is_mutual(codec));
        if !negotiable {
            return Err(HfpError::UnsupportedFeature);
        }
        let line = AtResponse::CodecSelection(codec.id()).encode();
        self.link
            .execute(line, AgRequest::CodecProposal(codec))
            .await?
            .ok_or(HfpError::Rejected(None))
    }

    /// Change an AG indicator, reporting it with `+CIEV` once the HF enabled
    /// indicator events
    ///
    /// # Errors
    /// `UnsupportedFeature` if the indicator was not declared, `OutOfRange`
    /// if the value is not legal for it; nothing changes in either case.
    pub async fn update_ag_indicator(&self, indicator: AgIndicator, value: u8) -> Result<(), HfpError> {
        self.link.ensure_open()?;
        let report = self.with_state(|state| {
            let (position, entry) = state
                .ag_indicators
                .iter_mut()
                .enumerate()
                .find(|(_, entry)| entry.indicator == indicator)
                .ok_or(HfpError::UnsupportedFeature)?;
            if !entry.update(value) {
                return Err(HfpError::OutOfRange);
            }
            let index = u8::try_from(position + 1).map_err(|_| HfpError::OutOfRange)?;
            Ok((state.established() && state.indicator_reporting).then_some(index))
        })?;

        debug!("[AG] {} = {}", indicator.name(), value);
        if let Some(index) = report {
            self.link
                .notify(AtResponse::IndicatorEvent { index, value }.encode())
                .await?;
        }
        Ok(())
    }

    /// Alert the HF of an incoming call (`RING`)
    pub async fn ring(&self) -> Result<(), HfpError> {
        self.ensure_established()?;
        self.link.notify(AtResponse::Ring.encode()).await
    }

    /// Set the HF speaker gain (`+VGS`, 0..=15)
    pub async fn set_speaker_volume(&self, gain: u8) -> Result<(), HfpError> {
        self.check_volume(gain)?;
        self.link.notify(AtResponse::SpeakerGain(gain).encode()).await
    }

    /// Set the HF microphone gain (`+VGM`, 0..=15)
    pub async fn set_microphone_volume(&self, gain: u8) -> Result<(), HfpError> {
        self.check_volume(gain)?;
        self.link
            .notify(AtResponse::MicrophoneGain(gain).encode())
            .await
    }

    fn check_volume(&self, gain: u8) -> Result<(), HfpError> {
        self.ensure_established()?;
        if !self.with_state(|state| state.features.remote_volume_control()) {
            return Err(HfpError::UnsupportedFeature);
        }
        if gain > MAX_GAIN {
            return Err(HfpError::OutOfRange);
        }
        Ok(())
    }

    /// Link parameters for an audio connection with the selected codec
    pub fn audio_setup_request(
        &self,
        connection_handle: ConnHandle,
        quality: LinkQuality,
    ) -> Result<AudioSetupRequest, HfpError> {
        self.ensure_established()?;
        let (codec, esco_s4) =
            self.with_state(|state| (state.codecs.selected(), state.features.esco_s4()));
        audio_setup_request(connection_handle, codec, quality, esco_s4)
    }

    /// The link controller opened the audio connection
    pub fn on_audio_connected(&self, connection_handle: ConnHandle) {
        debug!("[AG] Audio connected on {}", connection_handle.raw());
        self.link.publish(AgEvent::AudioConnected(connection_handle));
    }

    /// The link controller closed the audio connection
    pub fn on_audio_disconnected(&self, connection_handle: ConnHandle) {
        debug!("[AG] Audio disconnected on {}", connection_handle.raw());
        self.link
            .publish(AgEvent::AudioDisconnected(connection_handle));
    }

    /// Subscribe to session events
    ///
    /// # Errors
    /// `ObserverLimit` if all subscriber slots are taken, or the reason the
    /// session ended.
    pub fn subscribe(&self) -> Result<AgSubscriber<'_, M>, HfpError> {
        self.link.subscribe()
    }

    /// Stop the session: `accept` or `run` returns, the outstanding request (if any)
    /// fails with `Cancelled` and no further event is delivered
    ///
    /// The channel is left open.
    pub fn cancel(&self) {
        info!("[AG] Cancelling session");
        self.link.cancel();
    }

    /// Whether the service level connection is up
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.with_state(|state| state.established())
    }

    /// Features the HF advertised in `AT+BRSF`
    #[must_use]
    pub fn supported_hf_features(&self) -> FeatureSet<HfFeature> {
        self.with_state(|state| state.features.hf)
    }

    /// Features advertised locally
    #[must_use]
    pub fn supported_ag_features(&self) -> FeatureSet<AgFeature> {
        self.configuration.supported_ag_features
    }

    /// AG indicators in `+CIND` order with their current values
    #[must_use]
    pub fn ag_indicators(&self) -> Vec<AgIndicatorState, MAX_AG_INDICATORS> {
        self.with_state(|state| state.ag_indicators.clone())
    }

    /// Local HF indicators with the HF's support flags and last values
    #[must_use]
    pub fn hf_indicators(&self) -> Vec<HfIndicatorState, MAX_HF_INDICATORS> {
        self.with_state(|state| state.hf_indicators.clone())
    }

    /// Current value of one HF indicator, if both sides support it
    #[must_use]
    pub fn hf_indicator(&self, indicator: HfIndicator) -> Option<HfIndicatorState> {
        self.with_state(|state| {
            state
                .hf_indicators
                .iter()
                .find(|entry| entry.indicator == indicator && entry.supported)
                .copied()
        })
    }

    /// Codec identifiers the HF listed in `AT+BAC`
    #[must_use]
    pub fn hf_codecs(&self) -> Vec<u8, MAX_CODECS> {
        self.with_state(|state| state.codecs.peer_codecs().iter().copied().collect())
    }

    /// Codec used for the next audio connection
    #[must_use]
    pub fn selected_codec(&self) -> AudioCodec {
        self.with_state(|state| state.codecs.selected())
    }

    /// Whether the HF enabled `+CIEV` reporting with `AT+CMER`
    #[must_use]
    pub fn indicator_reporting_enabled(&self) -> bool {
        self.with_state(|state| state.indicator_reporting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::Number;

    fn establish(state: &mut AgState, configuration: &AgConfiguration, hf: u32) {
        let commands = [
            AtCommand::SupportedFeatures(hf),
            AtCommand::AvailableCodecs(Vec::from_slice(&[1, 2]).unwrap()),
            AtCommand::IndicatorsTest,
            AtCommand::IndicatorsRead,
            AtCommand::EventReporting {
                mode: 3,
                indicators: true,
            },
            AtCommand::HfIndicatorsSet(Vec::from_slice(&[1, 2]).unwrap()),
            AtCommand::HfIndicatorsTest,
            AtCommand::HfIndicatorsRead,
        ];
        for command in commands {
            state.apply(configuration, command).unwrap();
        }
        assert!(state.established());
    }

    #[test]
    fn test_stage_skips_unasserted_steps() {
        let features = SessionFeatures::new(FeatureSet::empty(), FeatureSet::empty());
        assert_eq!(
            SlcStage::AwaitingFeatures.next(&features),
            SlcStage::AwaitingIndicatorList
        );
        assert_eq!(
            SlcStage::AwaitingEventReporting.next(&features),
            SlcStage::Established
        );

        let features = SessionFeatures::new(
            FeatureSet::empty().with(HfFeature::ThreeWayCalling),
            FeatureSet::empty().with(AgFeature::ThreeWayCalling),
        );
        assert_eq!(
            SlcStage::AwaitingEventReporting.next(&features),
            SlcStage::AwaitingCallHoldOperations
        );
        assert_eq!(
            SlcStage::AwaitingCallHoldOperations.next(&features),
            SlcStage::Established
        );
    }

    #[test]
    fn test_out_of_order_command() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        assert_eq!(
            state.apply(&configuration, AtCommand::IndicatorsTest).err(),
            Some(HfpError::ProtocolViolation(Violation::UnexpectedCommand))
        );
    }

    #[test]
    fn test_handshake_responses() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);

        let reaction = state
            .apply(&configuration, AtCommand::SupportedFeatures(0x390))
            .unwrap();
        assert_eq!(
            reaction.responses.as_slice(),
            &[
                AtResponse::SupportedFeatures(configuration.supported_ag_features.bits()),
                AtResponse::Ok
            ]
        );
        assert_eq!(state.stage, SlcStage::AwaitingCodecs);

        state
            .apply(
                &configuration,
                AtCommand::AvailableCodecs(Vec::from_slice(&[1, 2]).unwrap()),
            )
            .unwrap();
        let reaction = state.apply(&configuration, AtCommand::IndicatorsRead);
        assert!(reaction.is_err());
    }

    #[test]
    fn test_hf_indicator_status_lists_only_bound_indicators() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        let commands = [
            AtCommand::SupportedFeatures(0x390),
            AtCommand::AvailableCodecs(Vec::from_slice(&[1, 2]).unwrap()),
            AtCommand::IndicatorsTest,
            AtCommand::IndicatorsRead,
            AtCommand::EventReporting {
                mode: 3,
                indicators: true,
            },
            AtCommand::HfIndicatorsSet(Vec::from_slice(&[2]).unwrap()),
            AtCommand::HfIndicatorsTest,
        ];
        for command in commands {
            state.apply(&configuration, command).unwrap();
        }

        let reaction = state
            .apply(&configuration, AtCommand::HfIndicatorsRead)
            .unwrap();
        assert_eq!(
            reaction.responses.as_slice(),
            &[
                AtResponse::HfIndicatorStatus {
                    indicator: HfIndicator::BatteryLevel.id(),
                    enabled: true,
                },
                AtResponse::Ok
            ]
        );
        assert!(state.established());
    }

    #[test]
    fn test_call_control_events() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        establish(&mut state, &configuration, 0x390);

        let number = Number::try_from("123456789").unwrap();
        let reaction = state
            .apply(&configuration, AtCommand::Dial(number.clone()))
            .unwrap();
        assert_eq!(reaction.event, Some(AgEvent::Dial(number)));
        assert_eq!(reaction.responses.as_slice(), &[AtResponse::Ok]);

        let reaction = state.apply(&configuration, AtCommand::HangUp).unwrap();
        assert_eq!(reaction.event, Some(AgEvent::HangUp));
    }

    #[test]
    fn test_hf_indicator_value() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        establish(&mut state, &configuration, 0x390);

        let reaction = state
            .apply(
                &configuration,
                AtCommand::HfIndicatorValue {
                    indicator: 2,
                    value: 100,
                },
            )
            .unwrap();
        let Some(AgEvent::HfIndicator(entry)) = reaction.event else {
            panic!("Expected HfIndicator event");
        };
        assert_eq!(entry.indicator, HfIndicator::BatteryLevel);
        assert_eq!(entry.current_status, 100);

        let reaction = state
            .apply(
                &configuration,
                AtCommand::HfIndicatorValue {
                    indicator: 2,
                    value: 101,
                },
            )
            .unwrap();
        assert_eq!(reaction.event, None);
        assert_eq!(reaction.responses.as_slice(), &[AtResponse::Error]);
    }

    #[test]
    fn test_extended_errors() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        establish(&mut state, &configuration, 0x390);

        state
            .apply(&configuration, AtCommand::ExtendedErrors(true))
            .unwrap();
        let reaction = state
            .apply(
                &configuration,
                AtCommand::CallHold {
                    operation: crate::hfp::CallHoldOperation::AddHeldCall,
                    call_index: None,
                },
            )
            .unwrap();
        assert_eq!(
            reaction.responses.as_slice(),
            &[AtResponse::CmeError(CME_OPERATION_NOT_SUPPORTED)]
        );
    }

    #[test]
    fn test_codec_connection_request_proposes() {
        let configuration = AgConfiguration::default();
        let mut state = AgState::new(&configuration);
        establish(&mut state, &configuration, 0x390);

        let reaction = state
            .apply(&configuration, AtCommand::CodecConnection)
            .unwrap();
        assert_eq!(
            reaction.responses.as_slice(),
            &[AtResponse::Ok, AtResponse::CodecSelection(2)]
        );

        // A second request is folded into the outstanding proposal
        let reaction = state
            .apply(&configuration, AtCommand::CodecConnection)
            .unwrap();
        assert_eq!(reaction.responses.as_slice(), &[AtResponse::Ok]);

        assert_eq!(
            state
                .apply(&configuration, AtCommand::CodecSelection(1))
                .err(),
            Some(HfpError::ProtocolViolation(Violation::CodecMismatch))
        );
    }
}
