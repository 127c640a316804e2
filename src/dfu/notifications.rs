//! Control point response correlation.
//!
//! The peripheral answers control point requests with notifications on a
//! link that also carries unrelated traffic. `NotificationCorrelator`
//! buffers everything that arrives during a listening session and lets the
//! caller await the next response to a specific opcode.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use super::config::{
    ResultCode, CONTROL_POINT_UUID, NOTIFICATION_POLL_INTERVAL, NOTIFICATION_TIMEOUT,
    RESPONSE_MARKER,
};
use super::error::{DfuError, DfuResult};
use super::transport::{Notification, NotificationSource, SubscriptionId};

/// Outcome of matching one buffered notification against an awaited opcode.
#[derive(Debug)]
enum Scan {
    /// Not a control point response; drop it and keep scanning.
    Discard,
    /// Successful response to the awaited opcode.
    Match(Vec<u8>),
    /// Recognized response that ends the wait with an error.
    Fail(DfuError),
}

fn classify(notification: Notification, channel: u128, op_code: u8) -> Scan {
    if notification.channel != channel {
        return Scan::Discard;
    }

    let value = notification.value;
    if value.first() != Some(&RESPONSE_MARKER) {
        return Scan::Discard;
    }

    match value.get(1) {
        Some(&actual) if actual != op_code => {
            return Scan::Fail(DfuError::UnexpectedNotification {
                expected: op_code,
                actual,
            })
        }
        Some(_) => {}
        // A bare marker answers nothing we asked for
        None => return Scan::Discard,
    }

    match value.get(2) {
        Some(&code) if code == ResultCode::Success as u8 => Scan::Match(value),
        Some(&code) => Scan::Fail(DfuError::CommandError { op_code, code }),
        None => Scan::Fail(DfuError::MalformedResponse {
            op_code,
            len: value.len(),
        }),
    }
}

/// Buffer and subscription for one listening session.
///
/// Dropping the session unsubscribes and discards anything unconsumed.
struct ListeningSession<S: NotificationSource> {
    source: Arc<S>,
    id: SubscriptionId,
    inbox: UnboundedReceiver<Notification>,
    buffer: VecDeque<Notification>,
}

impl<S: NotificationSource> ListeningSession<S> {
    fn open(source: Arc<S>) -> Self {
        let (sink, inbox) = mpsc::unbounded_channel();
        let id = source.subscribe(sink);
        Self {
            source,
            id,
            inbox,
            buffer: VecDeque::new(),
        }
    }

    /// Move everything delivered so far onto the tail of the buffer.
    fn collect(&mut self) {
        while let Ok(notification) = self.inbox.try_recv() {
            self.buffer.push_back(notification);
        }
    }

    async fn poll_for(
        &mut self,
        channel: u128,
        op_code: u8,
        interval: Duration,
    ) -> DfuResult<Vec<u8>> {
        loop {
            self.collect();

            while let Some(notification) = self.buffer.pop_front() {
                let origin = notification.channel;
                match classify(notification, channel, op_code) {
                    Scan::Discard => {
                        debug!(op_code, origin = ?origin, "discarding unrelated notification");
                    }
                    Scan::Match(value) => return Ok(value),
                    Scan::Fail(err) => return Err(err),
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}

impl<S: NotificationSource> Drop for ListeningSession<S> {
    fn drop(&mut self) {
        self.source.unsubscribe(self.id);
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Turns the shared notification stream into opcode-addressed responses.
pub struct NotificationCorrelator<S: NotificationSource> {
    source: Arc<S>,
    channel: u128,
    timeout: Duration,
    poll_interval: Duration,
    session: Option<ListeningSession<S>>,
}

impl<S: NotificationSource> NotificationCorrelator<S> {
    /// Correlate responses on the DFU Control Point with default timing.
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            channel: CONTROL_POINT_UUID,
            timeout: NOTIFICATION_TIMEOUT,
            poll_interval: NOTIFICATION_POLL_INTERVAL,
            session: None,
        }
    }

    /// Override the response ceiling and buffer poll interval.
    ///
    /// The interval is floored at 1 ms so the poll loop always yields.
    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Subscribe and start buffering every notification.
    ///
    /// A session that is already open is closed first.
    pub fn start_listening(&mut self) {
        self.stop_listening();
        self.session = Some(ListeningSession::open(Arc::clone(&self.source)));
    }

    /// Unsubscribe and drop unconsumed notifications. Safe to call repeatedly.
    pub fn stop_listening(&mut self) {
        self.session = None;
    }

    /// Start listening for as long as the returned guard lives.
    pub fn listen(&mut self) -> Listening<'_, S> {
        self.start_listening();
        Listening { correlator: self }
    }

    /// Wait for the next successful response to `op_code`.
    ///
    /// Notifications from other channels or without the response marker are
    /// consumed silently. A response to a different opcode fails with
    /// `UnexpectedNotification`, a non-success result with `CommandError`.
    /// Fails with `NotificationTimeout` when nothing matches within the
    /// ceiling, measured from this call.
    pub async fn read_next(&mut self, op_code: u8) -> DfuResult<Vec<u8>> {
        let channel = self.channel;
        let timeout = self.timeout;
        let poll_interval = self.poll_interval;
        let session = self.session.as_mut().ok_or(DfuError::NotListening)?;

        tokio::select! {
            biased;
            result = session.poll_for(channel, op_code, poll_interval) => result,
            _ = tokio::time::sleep(timeout) => {
                debug!(op_code, timeout_ms = timeout.as_millis() as u64, "no response from device");
                Err(DfuError::NotificationTimeout {
                    op_code,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Listening session bound to a borrow of the correlator.
///
/// Stops listening when dropped, including when the future holding it is
/// cancelled mid-await.
pub struct Listening<'a, S: NotificationSource> {
    correlator: &'a mut NotificationCorrelator<S>,
}

impl<S: NotificationSource> Listening<'_, S> {
    /// See [`NotificationCorrelator::read_next`].
    pub async fn read_next(&mut self, op_code: u8) -> DfuResult<Vec<u8>> {
        self.correlator.read_next(op_code).await
    }
}

impl<S: NotificationSource> Drop for Listening<'_, S> {
    fn drop(&mut self) {
        self.correlator.stop_listening();
    }
}
