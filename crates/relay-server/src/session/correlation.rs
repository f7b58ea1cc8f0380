//! Request/response correlation over one connection.
//!
//! Every request gets a fresh [`CorrelationId`] and a pending entry holding
//! the sending half of a oneshot channel. The entry is removed exactly once,
//! under the state lock, by whichever of these happens first: a reply with the
//! same id, the timeout, the connection closing, or the caller dropping the
//! future.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use parking_lot::Mutex;
use relay_core::errors::SessionError;
use relay_core::ids::CorrelationId;
use relay_core::protocol::{FrameCodec, Payload, Reply};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};

use crate::metrics::{REQUEST_DURATION_SECONDS, REQUEST_ERRORS_TOTAL, REQUESTS_TOTAL};
use crate::websocket::connection::Connection;

type Settlement = Result<Payload, SessionError>;

struct PendingRequest {
    command: String,
    settle: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct PendingState {
    closed: bool,
    requests: HashMap<String, PendingRequest>,
}

/// Tracks outstanding requests for one connection.
pub(crate) struct Correlator {
    connection: Arc<Connection>,
    codec: Arc<FrameCodec>,
    state: Mutex<PendingState>,
}

impl Correlator {
    pub(crate) fn new(connection: Arc<Connection>, codec: Arc<FrameCodec>) -> Self {
        Self {
            connection,
            codec,
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Write a request frame without waiting for any reply.
    pub(crate) async fn send_only(&self, command: &str, payload: Payload) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::ConnectionClosed);
        }
        let id = CorrelationId::new();
        let frame = self.codec.encode_request(id.as_str(), command, payload)?;
        self.connection.send_text(frame).await?;
        counter!(REQUESTS_TOTAL, "command" => command.to_owned()).increment(1);
        Ok(())
    }

    /// Write a request frame and wait for its reply.
    pub(crate) async fn send_and_receive(
        &self,
        command: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, SessionError> {
        let started = Instant::now();
        counter!(REQUESTS_TOTAL, "command" => command.to_owned()).increment(1);

        let result = self.exchange(command, payload, timeout).await;

        histogram!(REQUEST_DURATION_SECONDS, "command" => command.to_owned())
            .record(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            counter!(
                REQUEST_ERRORS_TOTAL,
                "command" => command.to_owned(),
                "error_type" => err.kind()
            )
            .increment(1);
        }
        result
    }

    async fn exchange(&self, command: &str, payload: Payload, timeout: Duration) -> Settlement {
        if self.connection.is_closed() {
            return Err(SessionError::ConnectionClosed);
        }
        let id = CorrelationId::new();
        let frame = self.codec.encode_request(id.as_str(), command, payload)?;
        let (settle, mut settled) = oneshot::channel();

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SessionError::ConnectionClosed);
            }
            let _ = state.requests.insert(
                id.to_string(),
                PendingRequest {
                    command: command.to_owned(),
                    settle,
                },
            );
        }
        let _guard = PendingGuard {
            correlator: self,
            id: id.as_str(),
        };

        // One deadline covers the write and the reply.
        let deadline = time::Instant::now() + timeout;
        let timed_out = || SessionError::Timeout {
            command: command.to_owned(),
            timeout,
        };

        if let Ok(sent) = time::timeout_at(deadline, self.connection.send_text(frame)).await {
            sent?;
        } else {
            debug!(command, correlation_id = %id, ?timeout, "request write timed out");
            return Err(timed_out());
        }
        debug!(command, correlation_id = %id, "request sent");

        match time::timeout_at(deadline, &mut settled).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(SessionError::ConnectionClosed),
            Err(_) => {
                if self.take(id.as_str()).is_some() {
                    debug!(command, correlation_id = %id, ?timeout, "request timed out");
                    return Err(timed_out());
                }
                // Settled between the deadline and the lock.
                settled
                    .try_recv()
                    .unwrap_or(Err(SessionError::ConnectionClosed))
            }
        }
    }

    /// Settle the request waiting on `id`. Returns `false` if nothing was
    /// waiting (already settled, timed out, or never sent).
    pub(crate) fn settle(&self, id: &str, reply: Reply) -> bool {
        let mut state = self.state.lock();
        let Some(pending) = state.requests.remove(id) else {
            drop(state);
            debug!(correlation_id = id, "reply for unknown correlation id dropped");
            return false;
        };

        let outcome = match reply {
            Reply::Response { command, payload } if command == pending.command => Ok(payload),
            Reply::Error(value) => Err(SessionError::Remote(value)),
            Reply::Response { command, .. } => {
                let actual = self.codec.response_type(&command);
                Err(self.protocol_error(&pending.command, actual))
            }
            Reply::Other { type_tag, .. } => Err(self.protocol_error(&pending.command, type_tag)),
        };
        if let Err(SessionError::Protocol { expected, actual }) = &outcome {
            warn!(
                connection_id = %self.connection.id,
                correlation_id = id,
                expected = %expected,
                actual = %actual,
                "protocol violation"
            );
        }
        let _ = pending.settle.send(outcome);
        true
    }

    fn protocol_error(&self, command: &str, actual: String) -> SessionError {
        SessionError::Protocol {
            expected: self.codec.response_type(command),
            actual,
        }
    }

    fn take(&self, id: &str) -> Option<PendingRequest> {
        self.state.lock().requests.remove(id)
    }

    /// Refuse new requests and fail every outstanding one with
    /// [`SessionError::ConnectionClosed`]. Returns how many were pending.
    pub(crate) fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let drained = state.requests.len();
        for (_, pending) in state.requests.drain() {
            let _ = pending.settle.send(Err(SessionError::ConnectionClosed));
        }
        drained
    }

    /// Whether requests are refused: the correlator was closed or the
    /// connection is shutting down.
    pub(crate) fn is_closed(&self) -> bool {
        self.connection.is_closed() || self.state.lock().closed
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

/// Removes the pending entry if the awaiting future goes away first.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.correlator.take(self.id);
    }
}
