//! The handle a workflow uses to talk to its device.
//!
//! A [`Session`] pairs one connection with its request correlator and its
//! event listeners. It is cheap to clone; every clone refers to the same
//! connection.

mod correlation;
mod events;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use relay_core::errors::SessionError;
use relay_core::ids::ConnectionId;
use relay_core::protocol::{EventKind, FrameCodec, Payload};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

pub(crate) use correlation::Correlator;
pub(crate) use events::EventDispatcher;
pub use events::Listener;

use crate::unwind::{PanicSite, report_panic};
use crate::websocket::connection::Connection;

/// Default reply windows applied by [`Session::request`] and
/// [`Session::request_refreshing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTimeouts {
    /// Window for ordinary requests.
    pub request: Duration,
    /// Window for queries that make the device refresh data first.
    pub refresh: Duration,
}

/// A live device session, handed to the workflow when the device connects.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    workflow: String,
    path: String,
    connection: Arc<Connection>,
    codec: Arc<FrameCodec>,
    correlator: Correlator,
    events: EventDispatcher,
    timeouts: RequestTimeouts,
}

impl Session {
    pub(crate) fn new(
        connection: Arc<Connection>,
        codec: Arc<FrameCodec>,
        workflow: &str,
        path: &str,
        timeouts: RequestTimeouts,
    ) -> Self {
        let correlator = Correlator::new(connection.clone(), codec.clone());
        Self {
            inner: Arc::new(SessionInner {
                workflow: workflow.to_owned(),
                path: path.to_owned(),
                connection,
                codec,
                correlator,
                events: EventDispatcher::default(),
                timeouts,
            }),
        }
    }

    /// Connection id, `"<workflow>-<uuid>"`.
    pub fn id(&self) -> &ConnectionId {
        &self.inner.connection.id
    }

    /// Name of the workflow that owns this session.
    pub fn workflow(&self) -> &str {
        &self.inner.workflow
    }

    /// Request path the device connected to.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Subscribe `listener` to `kind`. Returns the registered listener, which
    /// is the key for [`off`](Self::off).
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Listener
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.inner.events.on(kind, listener.clone());
        listener
    }

    /// Subscribe an already-built listener. The same listener may be
    /// subscribed more than once and then runs once per subscription.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) {
        self.inner.events.on(kind, listener);
    }

    /// Remove one subscription of `listener` from `kind`. Unknown listeners
    /// are ignored.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        self.inner.events.off(kind, listener)
    }

    /// Subscribe an async handler. Each event runs the handler on its own
    /// task, so the handler can issue requests and await their replies.
    /// Errors are logged against the connection.
    pub fn on_async<F, Fut>(&self, kind: EventKind, handler: F) -> Listener
    where
        F: Fn(Session, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        self.on(kind, move |payload: &Payload| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = Session { inner };
            let connection_id = session.id().clone();
            let workflow = session.workflow().to_owned();
            let task = handler(session, payload.clone());
            drop(tokio::spawn(async move {
                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(
                        connection_id = %connection_id,
                        event = %kind,
                        error = %format!("{err:#}"),
                        "event handler failed"
                    ),
                    Err(panic) => {
                        report_panic(&connection_id, &workflow, PanicSite::AsyncHandler, &*panic);
                    }
                }
            }));
        })
    }

    /// Send `command` without waiting for a reply.
    pub async fn send(&self, command: &str, payload: impl Serialize) -> Result<(), SessionError> {
        let payload = to_payload(payload)?;
        self.inner.correlator.send_only(command, payload).await
    }

    /// Send `command` and wait for its response, using the default window.
    pub async fn request(
        &self,
        command: &str,
        payload: impl Serialize,
    ) -> Result<Payload, SessionError> {
        self.request_with_timeout(command, payload, self.inner.timeouts.request)
            .await
    }

    /// Send a query that makes the device refresh its data before answering,
    /// using the longer refresh window.
    pub async fn request_refreshing(
        &self,
        command: &str,
        payload: impl Serialize,
    ) -> Result<Payload, SessionError> {
        self.request_with_timeout(command, payload, self.inner.timeouts.refresh)
            .await
    }

    /// Send `command` and wait up to `timeout` for its response.
    pub async fn request_with_timeout(
        &self,
        command: &str,
        payload: impl Serialize,
        timeout: Duration,
    ) -> Result<Payload, SessionError> {
        let payload = to_payload(payload)?;
        self.inner
            .correlator
            .send_and_receive(command, payload, timeout)
            .await
    }

    /// Close the connection. Outstanding requests fail with
    /// [`SessionError::ConnectionClosed`].
    pub fn disconnect(&self) {
        debug!(connection_id = %self.id(), "workflow requested disconnect");
        self.inner.connection.close();
    }

    /// Whether the session no longer accepts requests.
    pub fn is_closed(&self) -> bool {
        self.inner.correlator.is_closed()
    }

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.events.listener_count(kind)
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    pub(crate) fn codec(&self) -> &FrameCodec {
        &self.inner.codec
    }

    pub(crate) fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    pub(crate) fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    /// Fail outstanding requests and drop every listener. Returns how many
    /// requests were still pending.
    pub(crate) fn teardown(&self) -> usize {
        let failed = self.inner.correlator.close();
        self.inner.events.clear();
        failed
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", self.id())
            .field("workflow", &self.inner.workflow)
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

/// Serialize a request payload. `null` (e.g. `()`) becomes an empty payload.
fn to_payload(payload: impl Serialize) -> Result<Payload, SessionError> {
    match serde_json::to_value(payload)? {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Payload::new()),
        _ => Err(SessionError::InvalidPayload),
    }
}
