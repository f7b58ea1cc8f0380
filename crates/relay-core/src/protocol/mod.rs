//! Wire protocol.
//!
//! Every message is one JSON text frame encoding a flat object:
//!
//! | Frame    | `type`                        | `id` |
//! |----------|-------------------------------|------|
//! | request  | `<ns>_<command>_request`      | yes  |
//! | response | `<ns>_<command>_response`     | yes  |
//! | error    | `<ns>_error_response`         | yes  |
//! | event    | `<ns>_<name>_event`           | no   |
//!
//! All other fields are payload, delivered to application code with the
//! envelope fields removed. Frames are decoded once by [`FrameCodec`] into
//! [`InboundFrame`]; nothing downstream looks at type strings again.

mod codec;
mod event;

pub use codec::FrameCodec;
pub use event::EventKind;

use serde_json::{Map, Value};

/// Frame payload with the envelope (`type`, `id`) removed.
pub type Payload = Map<String, Value>;

/// Reserved field carrying the frame type tag.
pub const TYPE_FIELD: &str = "type";
/// Reserved field carrying the correlation id.
pub const ID_FIELD: &str = "id";
/// Field carrying the remote error value on error responses.
pub const ERROR_FIELD: &str = "error";

/// Namespace used by devices unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "wf_api";

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// A frame carrying a correlation id.
    Reply {
        /// Correlation id copied from the request.
        id: String,
        /// What the peer answered.
        reply: Reply,
    },
    /// An unsolicited frame with no correlation id.
    Event {
        /// Which event fired.
        kind: EventKind,
        /// Event fields.
        payload: Payload,
    },
}

/// The body of a reply frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// `<ns>_<command>_response`.
    Response {
        /// Command the response belongs to.
        command: String,
        /// Response fields.
        payload: Payload,
    },
    /// `<ns>_error_response`; the `error` value (or `null` when absent).
    Error(Value),
    /// Any other type tag arriving with an id.
    Other {
        /// The tag as received.
        type_tag: String,
        /// Remaining fields.
        payload: Payload,
    },
}
