//! One device connection, from upgrade through disconnect.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::ids::ConnectionId;
use relay_core::protocol::FrameCodec;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{Span, debug, field, info, instrument, warn};

use super::connection::{Connection, Outbound};
use super::handler::handle_message;
use super::registry::SessionRegistry;
use crate::metrics::{
    FRAMES_DROPPED_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::session::{RequestTimeouts, Session};
use crate::unwind::{PanicSite, report_panic};
use crate::workflow::ResolvedWorkflow;

/// How long the writer gets to flush its close frame.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Per-server state every connection task needs.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) codec: Arc<FrameCodec>,
    pub(crate) timeouts: RequestTimeouts,
    pub(crate) send_queue_capacity: usize,
}

/// Run a device connection.
///
/// 1. Spawns the writer task that owns the socket sink
/// 2. Registers the session and starts the workflow
/// 3. Routes inbound frames until the peer leaves or the connection is closed
/// 4. Fails outstanding requests and deregisters the session
#[instrument(
    skip_all,
    fields(workflow = %resolved.name, path = %path, connection_id = field::Empty)
)]
pub(crate) async fn run_connection(
    socket: WebSocket,
    resolved: ResolvedWorkflow,
    path: String,
    context: ConnectionContext,
) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(context.send_queue_capacity.max(1));
    let connection = Arc::new(Connection::new(ConnectionId::for_workflow(&resolved.name), tx));
    let _ = Span::current().record("connection_id", connection.id.as_str());

    let mut writer = tokio::spawn(write_outbound(sink, rx, connection.clone()));

    let session = Session::new(
        connection.clone(),
        context.codec.clone(),
        &resolved.name,
        &path,
        context.timeouts,
    );
    context.sessions.add(session.clone());
    let registration = Registration {
        session: session.clone(),
        sessions: context.sessions.clone(),
    };
    info!("device connected");
    counter!(WS_CONNECTIONS_TOTAL, "workflow" => resolved.name.clone()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| resolved.workflow.start(&session))) {
        report_panic(session.id(), session.workflow(), PanicSite::Start, &*panic);
        connection.close();
    }

    loop {
        let message = tokio::select! {
            biased;
            () = connection.closed() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                let _ = handle_message(&session, text.as_str());
            }
            Some(Ok(Message::Binary(data))) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    let _ = handle_message(&session, text);
                } else {
                    warn!(len = data.len(), "dropping non-UTF-8 binary frame");
                    counter!(FRAMES_DROPPED_TOTAL, "reason" => "binary").increment(1);
                }
            }
            Some(Ok(Message::Pong(_))) => connection.mark_alive(),
            // Pings are answered by the socket itself.
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                debug!("peer closed the connection");
                break;
            }
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
        }
    }

    drop(registration);
    if time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Sole owner of the socket sink: serializes every outbound frame.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    connection: Arc<Connection>,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = connection.closed() => break,
            item = rx.recv() => item,
        };
        match item {
            Some(Outbound::Text { frame, written }) => {
                let ok = sink.send(Message::Text(frame.into())).await.is_ok();
                let _ = written.send(ok);
                if !ok {
                    break;
                }
            }
            Some(Outbound::Ping) => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            None => break,
        }
    }
    connection.close();
    let _ = sink.send(Message::Close(None)).await;
}

/// Deregisters the session when the connection task ends, including by
/// unwinding.
struct Registration {
    session: Session,
    sessions: Arc<SessionRegistry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let connection = self.session.connection();
        connection.close();
        let failed_requests = self.session.teardown();
        let _ = self.sessions.remove(self.session.id());
        info!(
            connection_id = %connection.id,
            failed_requests,
            duration_secs = connection.age().as_secs(),
            "device disconnected"
        );
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    }
}
