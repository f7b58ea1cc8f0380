//! Test doubles shared by the unit tests in this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relay_core::ids::ConnectionId;
use relay_core::protocol::FrameCodec;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::session::{RequestTimeouts, Session};
use crate::websocket::connection::{Connection, Outbound};

/// The far end of a session: sees every frame the session writes.
pub(crate) struct Device {
    frames: mpsc::UnboundedReceiver<Value>,
    pings: Arc<AtomicUsize>,
}

impl Device {
    /// Next frame written by the session, decoded as JSON.
    pub(crate) async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("no frame written within 5s")
            .expect("writer stopped")
    }

    /// Pings written so far.
    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

pub(crate) const TEST_TIMEOUTS: RequestTimeouts = RequestTimeouts {
    request: Duration::from_secs(2),
    refresh: Duration::from_secs(4),
};

/// A session on a fake transport, with the default test windows.
pub(crate) fn session_pair(namespace: &str) -> (Session, Device) {
    session_with_timeouts(namespace, TEST_TIMEOUTS)
}

/// A session on a fake transport.
pub(crate) fn session_with_timeouts(namespace: &str, timeouts: RequestTimeouts) -> (Session, Device) {
    let codec = Arc::new(FrameCodec::new(namespace).unwrap());
    let (tx, mut rx) = mpsc::channel::<Outbound>(64);
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let pings = Arc::new(AtomicUsize::new(0));
    let writer_pings = pings.clone();

    let _writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Text { frame, written } => {
                    let value: Value = serde_json::from_str(&frame).unwrap();
                    let _ = frames_tx.send(value);
                    let _ = written.send(true);
                }
                Outbound::Ping => {
                    let _ = writer_pings.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    });

    let connection = Arc::new(Connection::new(ConnectionId::for_workflow("test"), tx));
    let session = Session::new(connection, codec, "test", "/test", timeouts);
    (session, Device { frames, pings })
}
