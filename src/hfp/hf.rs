//! Hands-Free role
//!
//! The HF drives the service level connection handshake and then issues
//! call control and indicator commands, one at a time. Unsolicited result
//! codes from the AG (`+CIEV`, `+BCS`, `RING`, gains) are turned into
//! [`HfEvent`]s.

use super::link::{EventSubscriber, Input, Link, RfcommChannel, write_line};
use super::{
    AgFeature, AgIndicatorState, AudioCodec, AudioSetupRequest, CallHoldOperation,
    CodecNegotiation, FeatureSet, HfConfiguration, HfEvent, HfFeature, HfIndicator,
    HfIndicatorState, HfpError, LinkQuality, SessionFeatures, Violation, audio_setup_request,
};
use crate::at::{AtCommand, AtDecoder, AtResponse, Line, Name, Number};
use crate::constants::{
    CMER_MODE_FORWARD, DEFERRED_QUEUE_DEPTH, MAX_AG_INDICATORS, MAX_CALL_HOLD_OPERATIONS,
    MAX_GAIN, MAX_HF_INDICATORS, MAX_RESPONSE_LINES, READ_CHUNK_SIZE,
};
use bt_hci::param::ConnHandle;
use core::cell::RefCell;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{Deque, Vec};

/// Event subscriber of an HF session
pub type HfSubscriber<'a, M> = EventSubscriber<'a, M, HfEvent>;

/// Information responses collected for a command
pub type Replies = Vec<AtResponse, MAX_RESPONSE_LINES>;

/// Commands the session loop sends on its own behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum InternalCommand {
    /// Confirm an AG codec proposal with `AT+BCS`
    ConfirmCodec(AudioCodec),
    /// Refuse an AG codec proposal by re-sending `AT+BAC`
    AdvertiseCodecs,
}

enum Origin {
    User(u32),
    Internal(InternalCommand),
}

/// Command written to the AG and waiting for its final result code
struct InFlight {
    origin: Origin,
    prefix: Option<Name>,
    replies: Replies,
}

impl InFlight {
    fn new(origin: Origin, prefix: Option<Name>) -> Self {
        Self {
            origin,
            prefix,
            replies: Replies::new(),
        }
    }
}

struct HfState {
    established: bool,
    features: SessionFeatures,
    ag_indicators: Vec<AgIndicatorState, MAX_AG_INDICATORS>,
    ag_call_hold_operations: Vec<CallHoldOperation, MAX_CALL_HOLD_OPERATIONS>,
    hf_indicators: Vec<HfIndicatorState, MAX_HF_INDICATORS>,
    codecs: CodecNegotiation,
    decoder: AtDecoder,
    /// Peer proposals received while a command was outstanding
    deferred: Deque<InternalCommand, DEFERRED_QUEUE_DEPTH>,
}

/// Hands-Free side of one service level connection
///
/// `M` selects the mutex flavour guarding the session: `NoopRawMutex` when
/// every task runs on one executor, `CriticalSectionRawMutex` otherwise.
pub struct HfProtocol<'a, M: RawMutex> {
    configuration: &'a HfConfiguration,
    state: Mutex<M, RefCell<HfState>>,
    link: Link<M, HfEvent, Replies, Option<Name>>,
}

impl<'a, M: RawMutex> HfProtocol<'a, M> {
    /// Create a session for one RFCOMM channel
    #[must_use]
    pub fn new(configuration: &'a HfConfiguration) -> Self {
        Self {
            configuration,
            state: Mutex::new(RefCell::new(HfState {
                established: false,
                features: SessionFeatures::new(
                    configuration.supported_hf_features,
                    FeatureSet::empty(),
                ),
                ag_indicators: Vec::new(),
                ag_call_hold_operations: Vec::new(),
                hf_indicators: Vec::new(),
                codecs: CodecNegotiation::new(&configuration.supported_audio_codecs),
                decoder: AtDecoder::new(),
                deferred: Deque::new(),
            })),
            link: Link::new(),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HfState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Run the service level connection handshake
    ///
    /// # Errors
    /// `ProtocolViolation` if the AG answers out of order, rejects a step or
    /// sends a malformed line; the channel is closed in that case.
    /// `Disconnected` if the channel closes first. `Cancelled` if
    /// [`Self::cancel`] is called meanwhile; the channel stays open.
    pub async fn initiate<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        self.link.ensure_open()?;
        info!("[HF] Initiating service level connection");
        let outcome = select(self.link.wait_cancelled(), self.establish(channel)).await;
        let result = match outcome {
            Either::First(()) => {
                info!("[HF] Handshake cancelled");
                return Err(HfpError::Cancelled);
            }
            Either::Second(result) => result,
        };
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                error!("[HF] Handshake failed: {:?}", error);
                self.link.shutdown(channel, error).await;
                Err(error)
            }
        }
    }

    async fn establish<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        let configuration = self.configuration;

        let replies = self
            .transact(
                channel,
                AtCommand::SupportedFeatures(configuration.supported_hf_features.bits()),
            )
            .await?;
        let ag_features = replies
            .iter()
            .find_map(|reply| match reply {
                AtResponse::SupportedFeatures(bits) => Some(FeatureSet::<AgFeature>::from_bits(*bits)),
                _ => None,
            })
            .ok_or(Violation::UnexpectedResponse)?;
        let features = SessionFeatures::new(configuration.supported_hf_features, ag_features);
        self.with_state(|state| state.features = features);
        debug!("[HF] AG features: {}", ag_features.bits());

        if features.codec_negotiation() {
            self.transact(channel, advertised_codecs(configuration)).await?;
        }

        let replies = self.transact(channel, AtCommand::IndicatorsTest).await?;
        let descriptors = replies
            .iter()
            .find_map(|reply| match reply {
                AtResponse::IndicatorDescriptors(descriptors) => Some(descriptors.clone()),
                _ => None,
            })
            .ok_or(Violation::UnexpectedResponse)?;
        let replies = self.transact(channel, AtCommand::IndicatorsRead).await?;
        let values = replies
            .iter()
            .find_map(|reply| match reply {
                AtResponse::IndicatorValues(values) => Some(values.clone()),
                _ => None,
            })
            .ok_or(Violation::UnexpectedResponse)?;
        if values.len() != descriptors.len() {
            return Err(Violation::IndicatorMismatch.into());
        }
        let mut indicators = Vec::<AgIndicatorState, MAX_AG_INDICATORS>::new();
        for (descriptor, &value) in descriptors.iter().zip(values.iter()) {
            if !descriptor.values.contains(value) {
                return Err(Violation::IndicatorMismatch.into());
            }
            indicators
                .push(AgIndicatorState::new(descriptor.indicator, descriptor.values, value))
                .ok();
        }
        debug!("[HF] {} AG indicators", indicators.len());
        self.with_state(|state| state.ag_indicators = indicators);

        self.transact(
            channel,
            AtCommand::EventReporting {
                mode: CMER_MODE_FORWARD,
                indicators: true,
            },
        )
        .await?;

        if features.three_way_calling() {
            let replies = self.transact(channel, AtCommand::CallHoldTest).await?;
            let operations = replies
                .iter()
                .find_map(|reply| match reply {
                    AtResponse::CallHoldOperations(operations) => Some(operations.clone()),
                    _ => None,
                })
                .ok_or(Violation::UnexpectedResponse)?;
            self.with_state(|state| state.ag_call_hold_operations = operations);
        }

        if features.hf_indicators() {
            self.exchange_hf_indicators(channel).await?;
        }

        self.with_state(|state| state.established = true);
        info!("[HF] Service level connection established");
        Ok(())
    }

    async fn exchange_hf_indicators<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        let local = &self.configuration.supported_hf_indicators;
        let identifiers = local.iter().map(|indicator| indicator.id()).collect();
        self.transact(channel, AtCommand::HfIndicatorsSet(identifiers))
            .await?;

        let replies = self.transact(channel, AtCommand::HfIndicatorsTest).await?;
        let supported = replies
            .iter()
            .find_map(|reply| match reply {
                AtResponse::HfIndicatorsSupported(identifiers) => Some(identifiers.clone()),
                _ => None,
            })
            .ok_or(Violation::UnexpectedResponse)?;

        let mut indicators: Vec<HfIndicatorState, MAX_HF_INDICATORS> = local
            .iter()
            .map(|&indicator| HfIndicatorState {
                supported: supported.contains(&indicator.id()),
                ..HfIndicatorState::new(indicator)
            })
            .collect();

        let replies = self.transact(channel, AtCommand::HfIndicatorsRead).await?;
        for reply in &replies {
            if let AtResponse::HfIndicatorStatus { indicator, enabled } = *reply {
                if let Some(state) = indicators
                    .iter_mut()
                    .find(|state| state.supported && state.indicator.id() == indicator)
                {
                    state.enabled = enabled;
                }
            }
        }
        self.with_state(|state| state.hf_indicators = indicators);
        Ok(())
    }

    /// Write a handshake command and collect its responses up to `OK`
    async fn transact<T: RfcommChannel>(
        &self,
        channel: &mut T,
        command: AtCommand,
    ) -> Result<Replies, HfpError> {
        let line = command.encode();
        debug!("[HF] -> {}", line.as_str().trim_end());
        write_line(channel, &line).await?;

        let prefix = command.response_prefix();
        let mut replies = Replies::new();
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            while let Some(line) = self.with_state(|state| state.decoder.next_line()) {
                let response = AtResponse::parse(&line?)?;
                match response {
                    AtResponse::Ok => return Ok(replies),
                    AtResponse::Error | AtResponse::CmeError(_) => {
                        warn!("[HF] AG rejected {:?}", command);
                        return Err(Violation::HandshakeRejected.into());
                    }
                    response if Some(response.code()) == prefix => {
                        replies
                            .push(response)
                            .map_err(|_| Violation::UnexpectedResponse)?;
                    }
                    response => debug!("[HF] Ignoring {} during handshake", response.code()),
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

    /// Serve the established connection until it closes or is cancelled
    ///
    /// Must run concurrently with callers of the command methods.
    ///
    /// # Errors
    /// `NotEstablished` before [`Self::initiate`] succeeded, `Disconnected`
    /// when the channel closes.
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
            warn!("[HF] Session ended: {:?}", error);
            self.link.shutdown(channel, error).await;
        }
        result
    }

    async fn serve<T: RfcommChannel>(&self, channel: &mut T) -> Result<(), HfpError> {
        let mut in_flight: Option<InFlight> = None;
        let mut buffer = [0u8; READ_CHUNK_SIZE];

        // Lines that arrived together with the last handshake response
        self.drain(&mut in_flight);

        loop {
            if in_flight.is_none() {
                if let Some(command) = self.with_state(|state| state.deferred.pop_front()) {
                    in_flight = Some(self.send_internal(channel, command).await?);
                    continue;
                }
            }

            match self
                .link
                .next_input(channel, &mut buffer, in_flight.is_none())
                .await
            {
                Input::Data(count) => {
                    self.with_state(|state| state.decoder.push(&buffer[..count]));
                    self.drain(&mut in_flight);
                }
                Input::Request(request) => {
                    trace!("[HF] -> {}", request.line.as_str().trim_end());
                    in_flight = Some(InFlight::new(Origin::User(request.seq), request.kind));
                    write_line(channel, &request.line).await?;
                }
                Input::Notification(line) => write_line(channel, &line).await?,
                Input::Cancelled => {
                    info!("[HF] Session cancelled");
                    return Ok(());
                }
                Input::Closed => return Err(HfpError::Disconnected),
            }
        }
    }

    async fn send_internal<T: RfcommChannel>(
        &self,
        channel: &mut T,
        command: InternalCommand,
    ) -> Result<InFlight, HfpError> {
        let at = match command {
            InternalCommand::ConfirmCodec(codec) => AtCommand::CodecSelection(codec.id()),
            InternalCommand::AdvertiseCodecs => advertised_codecs(self.configuration),
        };
        debug!("[HF] -> {:?}", command);
        write_line(channel, &at.encode()).await?;
        Ok(InFlight::new(Origin::Internal(command), None))
    }

    fn drain(&self, in_flight: &mut Option<InFlight>) {
        while let Some(line) = self.with_state(|state| state.decoder.next_line()) {
            match line.and_then(|line| AtResponse::parse(&line)) {
                Ok(response) => self.dispatch(response, in_flight),
                Err(error) => {
                    warn!("[HF] Malformed line: {:?}", error.kind);
                    self.link.publish(HfEvent::MalformedFrame(error.kind));
                }
            }
        }
    }

    fn dispatch(&self, response: AtResponse, in_flight: &mut Option<InFlight>) {
        if response.is_final() {
            match in_flight.take() {
                Some(command) => self.complete(command, &response),
                None => warn!("[HF] Unexpected {}", response.code()),
            }
            return;
        }

        if let Some(command) = in_flight.as_mut() {
            let expected = command.prefix.as_deref() == Some(response.code());
            if expected || !response.is_unsolicited() {
                if command.replies.push(response).is_err() {
                    warn!("[HF] Response overflow");
                }
                return;
            }
        }
        self.unsolicited(response);
    }

    fn complete(&self, command: InFlight, response: &AtResponse) {
        let result = match *response {
            AtResponse::Ok => Ok(command.replies),
            AtResponse::CmeError(code) => Err(HfpError::Rejected(Some(code))),
            _ => Err(HfpError::Rejected(None)),
        };

        match command.origin {
            Origin::User(seq) => self.link.resolve(seq, result),
            Origin::Internal(InternalCommand::ConfirmCodec(codec)) => match result {
                Ok(_) => {
                    self.with_state(|state| state.codecs.complete(codec));
                    info!("[HF] Codec {:?} selected", codec);
                    self.link.publish(HfEvent::CodecNegotiation(codec));
                }
                Err(error) => warn!("[HF] AG refused codec confirmation: {:?}", error),
            },
            Origin::Internal(InternalCommand::AdvertiseCodecs) => {
                if let Err(error) = result {
                    warn!("[HF] AG refused codec list: {:?}", error);
                }
            }
        }
    }

    fn unsolicited(&self, response: AtResponse) {
        match response {
            AtResponse::IndicatorEvent { index, value } => {
                let updated = self.with_state(|state| {
                    let position = usize::from(index).checked_sub(1)?;
                    let indicator = state.ag_indicators.get_mut(position)?;
                    indicator.update(value).then_some(*indicator)
                });
                match updated {
                    Some(indicator) => self.link.publish(HfEvent::AgIndicator(indicator)),
                    None => {
                        warn!("[HF] Rejected indicator {} = {}", index, value);
                        self.link.publish(HfEvent::IndicatorRejected { index, value });
                    }
                }
            }
            AtResponse::CodecSelection(id) => {
                let queued = self.with_state(|state| {
                    if !state.features.codec_negotiation() {
                        return None;
                    }
                    let command = match state.codecs.receive_proposal(id) {
                        Some(codec) => InternalCommand::ConfirmCodec(codec),
                        None => InternalCommand::AdvertiseCodecs,
                    };
                    Some(state.deferred.push_back(command).is_ok())
                });
                match queued {
                    Some(true) => debug!("[HF] AG proposed codec {}", id),
                    Some(false) => warn!("[HF] Codec proposal {} dropped", id),
                    None => warn!("[HF] Codec proposal without codec negotiation"),
                }
            }
            AtResponse::Ring => self.link.publish(HfEvent::Ring),
            AtResponse::SpeakerGain(gain) if gain <= MAX_GAIN => {
                self.link.publish(HfEvent::SpeakerVolume(gain));
            }
            AtResponse::MicrophoneGain(gain) if gain <= MAX_GAIN => {
                self.link.publish(HfEvent::MicrophoneVolume(gain));
            }
            AtResponse::HfIndicatorStatus { indicator, enabled } => {
                let changed = self.with_state(|state| {
                    let entry = state
                        .hf_indicators
                        .iter_mut()
                        .find(|entry| entry.supported && entry.indicator.id() == indicator)?;
                    entry.enabled = enabled;
                    Some(entry.indicator)
                });
                match changed {
                    Some(indicator) => {
                        self.link
                            .publish(HfEvent::HfIndicatorEnabled { indicator, enabled });
                    }
                    None => warn!("[HF] Status for unknown HF indicator {}", indicator),
                }
            }
            other => debug!("[HF] Unhandled {}", other.code()),
        }
    }

    fn ensure_established(&self) -> Result<(), HfpError> {
        self.link.ensure_open()?;
        if self.is_established() {
            Ok(())
        } else {
            Err(HfpError::NotEstablished)
        }
    }

    async fn send(&self, command: AtCommand) -> Result<Replies, HfpError> {
        self.ensure_established()?;
        self.link
            .execute(command.encode(), command.expected_response())
            .await
    }

    /// Send a raw AT command and wait for its final result code
    ///
    /// `text` is the command without terminator (`AT+CLCC`). Information
    /// responses named after the command are returned in arrival order.
    ///
    /// # Errors
    /// `Busy` if another command is outstanding (nothing is written),
    /// `Rejected` if the AG answers `ERROR` or `+CME ERROR`.
    pub async fn execute_command(&self, text: &str) -> Result<Replies, HfpError> {
        self.ensure_established()?;
        let text = text.trim();
        let mut line = Line::try_from(text).map_err(|()| HfpError::CommandTooLong)?;
        line.push('\r').map_err(|()| HfpError::CommandTooLong)?;
        let prefix = AtCommand::parse(text)
            .ok()
            .and_then(|command| command.expected_response());
        self.link.execute(line, prefix).await
    }

    /// Place an outgoing call (`ATD<number>;`)
    ///
    /// # Errors
    /// `OutOfRange` for an empty number, `CommandTooLong` if it does not fit.
    pub async fn dial(&self, number: &str) -> Result<(), HfpError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(HfpError::OutOfRange);
        }
        let number = Number::try_from(number).map_err(|()| HfpError::CommandTooLong)?;
        self.send(AtCommand::Dial(number)).await.map(drop)
    }

    /// Redial the last number (`AT+BLDN`)
    pub async fn redial(&self) -> Result<(), HfpError> {
        self.send(AtCommand::Redial).await.map(drop)
    }

    /// Answer the incoming call (`ATA`)
    pub async fn answer_incoming_call(&self) -> Result<(), HfpError> {
        self.send(AtCommand::Answer).await.map(drop)
    }

    /// Reject the incoming call (`AT+CHUP`)
    pub async fn reject_incoming_call(&self) -> Result<(), HfpError> {
        self.send(AtCommand::HangUp).await.map(drop)
    }

    /// Terminate the ongoing call (`AT+CHUP`)
    pub async fn terminate_call(&self) -> Result<(), HfpError> {
        self.send(AtCommand::HangUp).await.map(drop)
    }

    /// Request a call hold or multiparty operation (`AT+CHLD`)
    ///
    /// # Errors
    /// `UnsupportedFeature` unless both sides support three-way calling and
    /// the AG advertised `operation`. `OutOfRange` if `call_index` is given
    /// for an operation without index or missing for one with.
    pub async fn call_hold(
        &self,
        operation: CallHoldOperation,
        call_index: Option<u8>,
    ) -> Result<(), HfpError> {
        self.ensure_established()?;
        let supported = self.with_state(|state| {
            state.features.three_way_calling() && state.ag_call_hold_operations.contains(&operation)
        });
        if !supported {
            return Err(HfpError::UnsupportedFeature);
        }
        if operation.takes_call_index() != call_index.is_some() {
            return Err(HfpError::OutOfRange);
        }
        self.send(AtCommand::CallHold {
            operation,
            call_index,
        })
        .await
        .map(drop)
    }

    /// Report an HF indicator value (`AT+BIEV`)
    ///
    /// # Errors
    /// `UnsupportedFeature` unless both sides support HF indicators and the
    /// AG enabled this one; `OutOfRange` if the value is illegal.
    pub async fn update_hf_indicator(&self, indicator: HfIndicator, value: u16) -> Result<(), HfpError> {
        self.ensure_established()?;
        let usable = self.with_state(|state| {
            state.features.hf_indicators()
                && state
                    .hf_indicators
                    .iter()
                    .any(|entry| entry.indicator == indicator && entry.supported && entry.enabled)
        });
        if !usable {
            return Err(HfpError::UnsupportedFeature);
        }
        if !indicator.accepts(value) {
            return Err(HfpError::OutOfRange);
        }

        self.send(AtCommand::HfIndicatorValue {
            indicator: indicator.id(),
            value,
        })
        .await?;
        self.with_state(|state| {
            if let Some(entry) = state
                .hf_indicators
                .iter_mut()
                .find(|entry| entry.indicator == indicator)
            {
                entry.current_status = value;
            }
        });
        Ok(())
    }

    /// Ask the AG to start codec negotiation (`AT+BCC`)
    ///
    /// The outcome arrives as [`HfEvent::CodecNegotiation`].
    pub async fn request_codec_connection(&self) -> Result<(), HfpError> {
        self.ensure_established()?;
        if !self.with_state(|state| state.features.codec_negotiation()) {
            return Err(HfpError::UnsupportedFeature);
        }
        self.send(AtCommand::CodecConnection).await.map(drop)
    }

    /// Report the speaker gain (`AT+VGS`, 0..=15)
    pub async fn set_speaker_volume(&self, gain: u8) -> Result<(), HfpError> {
        self.check_volume(gain)?;
        self.send(AtCommand::SpeakerGain(gain)).await.map(drop)
    }

    /// Report the microphone gain (`AT+VGM`, 0..=15)
    pub async fn set_microphone_volume(&self, gain: u8) -> Result<(), HfpError> {
        self.check_volume(gain)?;
        self.send(AtCommand::MicrophoneGain(gain)).await.map(drop)
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

    /// Enable or disable `+CME ERROR` result codes (`AT+CMEE`)
    pub async fn set_extended_errors(&self, enabled: bool) -> Result<(), HfpError> {
        self.ensure_established()?;
        if !self.with_state(|state| state.features.extended_error_result_codes()) {
            return Err(HfpError::UnsupportedFeature);
        }
        self.send(AtCommand::ExtendedErrors(enabled)).await.map(drop)
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
        debug!("[HF] Audio connected on {}", connection_handle.raw());
        self.link.publish(HfEvent::AudioConnected(connection_handle));
    }

    /// The link controller closed the audio connection
    pub fn on_audio_disconnected(&self, connection_handle: ConnHandle) {
        debug!("[HF] Audio disconnected on {}", connection_handle.raw());
        self.link
            .publish(HfEvent::AudioDisconnected(connection_handle));
    }

    /// Subscribe to session events
    ///
    /// # Errors
    /// `ObserverLimit` if all subscriber slots are taken, or the reason the
    /// session ended.
    pub fn subscribe(&self) -> Result<HfSubscriber<'_, M>, HfpError> {
        self.link.subscribe()
    }

    /// Stop the session: `initiate` or `run` returns, the outstanding command (if any)
    /// fails with `Cancelled` and no further event is delivered
    ///
    /// The channel is left open.
    pub fn cancel(&self) {
        info!("[HF] Cancelling session");
        self.link.cancel();
    }

    /// Whether the service level connection is up
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.with_state(|state| state.established)
    }

    /// Features advertised locally
    #[must_use]
    pub fn supported_hf_features(&self) -> FeatureSet<HfFeature> {
        self.configuration.supported_hf_features
    }

    /// Features the AG advertised in `+BRSF`
    #[must_use]
    pub fn supported_ag_features(&self) -> FeatureSet<AgFeature> {
        self.with_state(|state| state.features.ag)
    }

    /// AG indicators in `+CIND` order
    #[must_use]
    pub fn ag_indicators(&self) -> Vec<AgIndicatorState, MAX_AG_INDICATORS> {
        self.with_state(|state| state.ag_indicators.clone())
    }

    /// Local HF indicators with the AG's support and enable flags
    #[must_use]
    pub fn hf_indicators(&self) -> Vec<HfIndicatorState, MAX_HF_INDICATORS> {
        self.with_state(|state| state.hf_indicators.clone())
    }

    /// Call hold operations the AG advertised
    #[must_use]
    pub fn ag_call_hold_operations(&self) -> Vec<CallHoldOperation, MAX_CALL_HOLD_OPERATIONS> {
        self.with_state(|state| state.ag_call_hold_operations.clone())
    }

    /// Codec used for the next audio connection
    #[must_use]
    pub fn selected_codec(&self) -> AudioCodec {
        self.with_state(|state| state.codecs.selected())
    }
}

fn advertised_codecs(configuration: &HfConfiguration) -> AtCommand {
    AtCommand::AvailableCodecs(
        configuration
            .supported_audio_codecs
            .iter()
            .map(|codec| codec.id())
            .collect(),
    )
}
