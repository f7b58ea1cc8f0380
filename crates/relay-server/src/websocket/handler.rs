//! Inbound frame dispatch: replies go to the correlator, events to the
//! listeners, everything else is dropped.

use metrics::counter;
use relay_core::errors::FrameError;
use relay_core::protocol::{EventKind, InboundFrame};
use tracing::{trace, warn};

use crate::metrics::FRAMES_DROPPED_TOTAL;
use crate::session::Session;
use crate::unwind::{PanicSite, report_panic};

/// What happened to one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    /// A reply; `settled` is false when no request was waiting on its id.
    Reply {
        /// Whether a pending request was settled.
        settled: bool,
    },
    /// An event delivered to `listeners` listeners.
    Event {
        /// Event kind.
        kind: EventKind,
        /// Listeners invoked.
        listeners: usize,
    },
    /// Undecodable or unknown; logged and discarded.
    Dropped,
}

/// Route one inbound text frame for `session`.
pub fn handle_message(session: &Session, text: &str) -> Routed {
    match session.codec().decode(text) {
        Ok(InboundFrame::Reply { id, reply }) => Routed::Reply {
            settled: session.correlator().settle(&id, reply),
        },
        Ok(InboundFrame::Event { kind, payload }) => {
            let dispatched = session.events().dispatch(kind, &payload);
            for panic in &dispatched.panics {
                report_panic(session.id(), session.workflow(), PanicSite::Listener, &**panic);
            }
            let listeners = dispatched.listeners;
            trace!(connection_id = %session.id(), event = %kind, listeners, "event dispatched");
            Routed::Event { kind, listeners }
        }
        Err(err) => {
            warn!(
                connection_id = %session.id(),
                reason = drop_reason(&err),
                error = %err,
                "dropping malformed inbound frame"
            );
            counter!(FRAMES_DROPPED_TOTAL, "reason" => drop_reason(&err)).increment(1);
            Routed::Dropped
        }
    }
}

fn drop_reason(err: &FrameError) -> &'static str {
    match err {
        FrameError::Malformed(_) | FrameError::NotAnObject => "malformed",
        FrameError::MissingType | FrameError::InvalidId => "envelope",
        FrameError::UnknownEvent(_) => "unknown_event",
        FrameError::Pattern(_) => "pattern",
    }
}
