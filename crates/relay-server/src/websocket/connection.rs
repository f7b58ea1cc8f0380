//! WebSocket connection state shared between the reader loop, the writer
//! task, the session handle, and the liveness monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use relay_core::errors::SessionError;
use relay_core::ids::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Work item for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// A text frame; `written` reports whether the socket write succeeded.
    Text {
        /// Encoded frame.
        frame: String,
        /// Write acknowledgement.
        written: oneshot::Sender<bool>,
    },
    /// A liveness probe.
    Ping,
}

/// One accepted device connection.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the writer task.
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the peer answered the last probe.
    is_alive: AtomicBool,
    /// Cancelled once the connection must stop.
    closed: CancellationToken,
}

impl Connection {
    /// Create a new connection feeding `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a text frame and wait until the writer has written it.
    pub async fn send_text(&self, frame: String) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Transport("connection is closed".into()));
        }
        let (written, ack) = oneshot::channel();
        self.tx
            .send(Outbound::Text { frame, written })
            .await
            .map_err(|_| SessionError::Transport("writer has stopped".into()))?;
        match ack.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::Transport("socket write failed".into())),
            Err(_) => Err(SessionError::Transport("writer dropped the frame".into())),
        }
    }

    /// Queue a ping without waiting. Returns `false` if the queue is full or
    /// the writer has stopped.
    pub fn send_ping(&self) -> bool {
        self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Record a pong from the peer.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Reset the alive flag for the next probe.
    ///
    /// Returns `true` if the peer answered since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Current alive flag, without resetting it.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Ask the connection to shut down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
