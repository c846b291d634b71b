//! Session plumbing shared by the HF and AG roles
//!
//! A session has one reader (the role's `run` loop) and any number of
//! callers issuing commands from other tasks. Callers hand their encoded
//! command to the loop through a one-slot request channel and wait for the
//! loop to post the reply tagged with their sequence number. Only one command
//! may be outstanding: the slot is claimed synchronously, so a second caller
//! fails with `Busy` before anything is queued or written.

use super::HfpError;
use crate::at::Line;
use crate::constants::{
    EVENT_QUEUE_DEPTH, MAX_OBSERVERS, MAX_PUBLISHERS, NOTIFICATION_QUEUE_DEPTH,
};
use core::cell::Cell;
use embassy_futures::select::{Either4, select4};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use embassy_sync::signal::Signal;
use embedded_io_async::{Read, Write};

/// Byte stream carrying the AT traffic (an RFCOMM data link connection)
///
/// `read` must be cancel-safe: the session loop drops pending reads when a
/// local command or a cancellation wins the race. A read returning 0 bytes or
/// an error means the channel is gone.
pub trait RfcommChannel: Read + Write {
    /// Close the channel
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// Event subscriber of a session
pub type EventSubscriber<'a, M, E> =
    Subscriber<'a, M, E, EVENT_QUEUE_DEPTH, MAX_OBSERVERS, MAX_PUBLISHERS>;

/// Command handed from a caller to the session loop
pub(crate) struct Request<K> {
    pub seq: u32,
    pub line: Line,
    pub kind: K,
}

/// What woke the session loop
pub(crate) enum Input<K> {
    Data(usize),
    Request(Request<K>),
    Notification(Line),
    Cancelled,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    busy: bool,
    seq: u32,
    closed: Option<HfpError>,
}

struct SlotGuard<'a, M: RawMutex> {
    slot: &'a Mutex<M, Cell<SlotState>>,
}

impl<M: RawMutex> Drop for SlotGuard<'_, M> {
    fn drop(&mut self) {
        self.slot.lock(|slot| {
            let mut state = slot.get();
            state.busy = false;
            slot.set(state);
        });
    }
}

pub(crate) struct Link<M: RawMutex, E: Clone, R, K> {
    slot: Mutex<M, Cell<SlotState>>,
    requests: Channel<M, Request<K>, 1>,
    replies: Channel<M, (u32, Result<R, HfpError>), 2>,
    notifications: Channel<M, Line, NOTIFICATION_QUEUE_DEPTH>,
    cancelled: Signal<M, ()>,
    events: PubSubChannel<M, E, EVENT_QUEUE_DEPTH, MAX_OBSERVERS, MAX_PUBLISHERS>,
}

impl<M: RawMutex, E: Clone, R, K> Link<M, E, R, K> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(SlotState::default())),
            requests: Channel::new(),
            replies: Channel::new(),
            notifications: Channel::new(),
            cancelled: Signal::new(),
            events: PubSubChannel::new(),
        }
    }

    /// Why the session ended, if it did
    pub(crate) fn closed(&self) -> Option<HfpError> {
        self.slot.lock(Cell::get).closed
    }

    pub(crate) fn ensure_open(&self) -> Result<(), HfpError> {
        self.closed().map_or(Ok(()), Err)
    }

    /// Send a command through the session loop and wait for its reply
    pub(crate) async fn execute(&self, line: Line, kind: K) -> Result<R, HfpError> {
        let seq = self.slot.lock(|slot| {
            let mut state = slot.get();
            if let Some(error) = state.closed {
                return Err(error);
            }
            if state.busy {
                return Err(HfpError::Busy);
            }
            state.busy = true;
            state.seq = state.seq.wrapping_add(1);
            slot.set(state);
            Ok(state.seq)
        })?;
        let _slot = SlotGuard { slot: &self.slot };

        // Replies left over from abandoned callers
        while self.replies.try_receive().is_ok() {}

        self.requests.send(Request { seq, line, kind }).await;
        loop {
            let (reply, result) = self.replies.receive().await;
            if reply == seq {
                return result;
            }
        }
    }

    /// Whether `seq` is the command of a caller still waiting for its reply
    pub(crate) fn is_pending(&self, seq: u32) -> bool {
        let state = self.slot.lock(Cell::get);
        state.busy && state.seq == seq
    }

    /// Post the reply of a command
    pub(crate) fn resolve(&self, seq: u32, result: Result<R, HfpError>) {
        if self.replies.try_send((seq, result)).is_err() {
            warn!("[LINK] reply {} dropped", seq);
        }
    }

    /// Queue an unsolicited line for the session loop to write
    pub(crate) async fn notify(&self, line: Line) -> Result<(), HfpError> {
        self.ensure_open()?;
        self.notifications.send(line).await;
        Ok(())
    }

    /// End the session: later commands fail with `error`, the outstanding
    /// caller (if any) is woken with it and no further event is published
    pub(crate) fn terminate(&self, error: HfpError) {
        let pending = self.slot.lock(|slot| {
            let mut state = slot.get();
            if state.closed.is_none() {
                state.closed = Some(error);
                slot.set(state);
            }
            state.busy.then_some(state.seq)
        });
        if let Some(seq) = pending {
            self.resolve(seq, Err(error));
        }
    }

    /// Stop the session loop; the channel is left open
    pub(crate) fn cancel(&self) {
        self.terminate(HfpError::Cancelled);
        self.cancelled.signal(());
    }

    /// Resolves once `cancel` was called
    pub(crate) async fn wait_cancelled(&self) {
        self.cancelled.wait().await;
    }

    /// End the session after a failure, closing the channel on protocol
    /// violations
    pub(crate) async fn shutdown<T: RfcommChannel>(&self, channel: &mut T, error: HfpError) {
        self.terminate(error);
        if matches!(error, HfpError::ProtocolViolation(_)) && channel.close().await.is_err() {
            warn!("[LINK] failed to close channel");
        }
    }

    pub(crate) fn subscribe(&self) -> Result<EventSubscriber<'_, M, E>, HfpError> {
        self.ensure_open()?;
        self.events.subscriber().map_err(|_| HfpError::ObserverLimit)
    }

    /// Publish an event unless the session has ended
    ///
    /// Publishing never blocks the session loop: a subscriber that falls
    /// more than the queue depth behind loses its oldest events.
    pub(crate) fn publish(&self, event: E) {
        if self.closed().is_none() {
            self.events.immediate_publisher().publish_immediate(event);
        }
    }

    /// Wait for the next thing the session loop must handle
    ///
    /// Local requests are only taken while `idle` (no command outstanding on
    /// the wire). A request whose caller gave up before it was taken is
    /// dropped here and never written.
    pub(crate) async fn next_input<T: RfcommChannel>(
        &self,
        channel: &mut T,
        buffer: &mut [u8],
        idle: bool,
    ) -> Input<K> {
        loop {
            let request = async {
                if idle {
                    self.requests.receive().await
                } else {
                    core::future::pending().await
                }
            };
            // Cancellation is polled first so a queued request is never written
            // after `cancel`
            let input = match select4(
                self.cancelled.wait(),
                channel.read(&mut *buffer),
                request,
                self.notifications.receive(),
            )
            .await
            {
                Either4::First(()) => Input::Cancelled,
                Either4::Second(Ok(0)) => Input::Closed,
                Either4::Second(Ok(count)) => Input::Data(count),
                Either4::Second(Err(_)) => {
                    warn!("[LINK] channel read failed");
                    Input::Closed
                }
                Either4::Third(request) if !self.is_pending(request.seq) => {
                    debug!("[LINK] dropping abandoned request {}", request.seq);
                    continue;
                }
                Either4::Third(request) => Input::Request(request),
                Either4::Fourth(line) => Input::Notification(line),
            };
            return input;
        }
    }
}

/// Write one encoded line
pub(crate) async fn write_line<T: RfcommChannel>(channel: &mut T, line: &str) -> Result<(), HfpError> {
    channel
        .write_all(line.as_bytes())
        .await
        .map_err(|_| HfpError::Disconnected)?;
    channel.flush().await.map_err(|_| HfpError::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures_executor::block_on;

    type TestLink = Link<NoopRawMutex, u8, u8, ()>;

    #[test]
    fn test_execute_busy_while_outstanding() {
        let link = TestLink::new();
        block_on(async {
            let first = link.execute(Line::try_from("AT\r").unwrap(), ());
            let mut first = core::pin::pin!(first);
            // Claim the slot and queue the request
            assert!(embassy_futures::poll_once(first.as_mut()).is_pending());

            let second = link.execute(Line::try_from("AT\r").unwrap(), ()).await;
            assert_eq!(second, Err(HfpError::Busy));

            let request = link.requests.receive().await;
            link.resolve(request.seq, Ok(7));
            assert_eq!(first.await, Ok(7));
        });
    }

    #[test]
    fn test_dropped_caller_releases_slot() {
        let link = TestLink::new();
        block_on(async {
            {
                let first = link.execute(Line::try_from("AT\r").unwrap(), ());
                let mut first = core::pin::pin!(first);
                assert!(embassy_futures::poll_once(first.as_mut()).is_pending());
            }
            let stale = link.requests.receive().await;
            link.resolve(stale.seq, Ok(1));

            let second = link.execute(Line::try_from("AT\r").unwrap(), ());
            let mut second = core::pin::pin!(second);
            assert!(embassy_futures::poll_once(second.as_mut()).is_pending());
            let request = link.requests.receive().await;
            assert_ne!(request.seq, stale.seq);
            link.resolve(request.seq, Ok(2));
            assert_eq!(second.await, Ok(2));
        });
    }

    #[test]
    fn test_abandoned_request_is_not_pending() {
        let link = TestLink::new();
        block_on(async {
            {
                let first = link.execute(Line::try_from("AT\r").unwrap(), ());
                let mut first = core::pin::pin!(first);
                assert!(embassy_futures::poll_once(first.as_mut()).is_pending());
            }
            let stale = link.requests.receive().await;
            assert!(!link.is_pending(stale.seq));

            let second = link.execute(Line::try_from("AT\r").unwrap(), ());
            let mut second = core::pin::pin!(second);
            assert!(embassy_futures::poll_once(second.as_mut()).is_pending());
            let request = link.requests.receive().await;
            assert!(link.is_pending(request.seq));
            assert!(!link.is_pending(stale.seq));
            link.resolve(request.seq, Ok(3));
            assert_eq!(second.await, Ok(3));
        });
    }

    #[test]
    fn test_terminate_wakes_caller() {
        let link = TestLink::new();
        block_on(async {
            let first = link.execute(Line::try_from("AT\r").unwrap(), ());
            let mut first = core::pin::pin!(first);
            assert!(embassy_futures::poll_once(first.as_mut()).is_pending());

            link.terminate(HfpError::Disconnected);
            assert_eq!(first.await, Err(HfpError::Disconnected));
            assert_eq!(
                link.execute(Line::new(), ()).await,
                Err(HfpError::Disconnected)
            );
        });
    }

    #[test]
    fn test_no_events_after_cancel() {
        let link = TestLink::new();
        let mut subscriber = link.subscribe().unwrap();
        link.publish(1);
        link.cancel();
        link.publish(2);

        assert_eq!(subscriber.try_next_message_pure(), Some(1));
        assert_eq!(subscriber.try_next_message_pure(), None);
        assert!(matches!(link.subscribe(), Err(HfpError::Cancelled)));
        assert_eq!(link.closed(), Some(HfpError::Cancelled));
    }
}
