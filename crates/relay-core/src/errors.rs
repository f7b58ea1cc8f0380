//! Error types for frame decoding and session calls.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Why an inbound frame could not be decoded.
///
/// These never reach workflow code: the connection drops the frame and logs
/// the reason.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The reserved `type` field is missing or not a string.
    #[error("frame has no string `type` field")]
    MissingType,
    /// The reserved `id` field is present but not a string.
    #[error("frame `id` field is not a string")]
    InvalidId,
    /// An id-less frame whose type tag is not a known event.
    #[error("unrecognized event type `{0}`")]
    UnknownEvent(String),
    /// The event-name pattern could not be compiled for the namespace.
    #[error("invalid event pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure of a call issued through a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The frame could not be written to the transport.
    #[error("transport error: {0}")]
    Transport(String),
    /// The session was torn down before (or while) the call was in flight.
    #[error("connection closed")]
    ConnectionClosed,
    /// No matching response arrived within the window.
    #[error("request `{command}` timed out after {timeout:?}")]
    Timeout {
        /// Command that was requested.
        command: String,
        /// The window that elapsed.
        timeout: Duration,
    },
    /// The peer answered with a type tag that is neither the expected
    /// response nor the error response.
    #[error("protocol error: expected `{expected}`, got `{actual}`")]
    Protocol {
        /// The response tag the request was waiting for.
        expected: String,
        /// The tag that actually arrived.
        actual: String,
    },
    /// The peer answered with an error response; the `error` value is passed
    /// through untouched.
    #[error("remote error: {0}")]
    Remote(Value),
    /// The request payload did not serialize to a JSON object.
    #[error("request payload must serialize to a JSON object")]
    InvalidPayload,
    /// The request payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Payload(#[from] serde_json::Error),
    /// The request frame could not be encoded.
    #[error("failed to encode frame: {0}")]
    Frame(#[from] FrameError),
}

impl SessionError {
    /// The remote `error` value, if the peer rejected the request.
    pub fn remote_value(&self) -> Option<&Value> {
        match self {
            Self::Remote(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this error came from the request window elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::ConnectionClosed => "connection_closed",
            Self::Timeout { .. } => "timeout",
            Self::Protocol { .. } => "protocol",
            Self::Remote(_) => "remote",
            Self::InvalidPayload | Self::Payload(_) | Self::Frame(_) => "payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timeout_display_names_command() {
        let err = SessionError::Timeout {
            command: "say".into(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "request `say` timed out after 250ms");
        assert!(err.is_timeout());
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn remote_value_passed_through() {
        let err = SessionError::Remote(json!("bad-arg"));
        assert_eq!(err.remote_value(), Some(&json!("bad-arg")));
        assert!(!err.is_timeout());
    }

    #[test]
    fn remote_value_absent_for_other_kinds() {
        assert!(SessionError::ConnectionClosed.remote_value().is_none());
        assert_eq!(SessionError::ConnectionClosed.kind(), "connection_closed");
    }

    #[test]
    fn protocol_display() {
        let err = SessionError::Protocol {
            expected: "wf_api_say_response".into(),
            actual: "wf_api_vibrate_response".into(),
        };
        assert!(err.to_string().contains("wf_api_say_response"));
        assert!(err.to_string().contains("wf_api_vibrate_response"));
    }

    #[test]
    fn frame_error_from_json() {
        let json_err = serde_json::from_str::<Value>("{nope").unwrap_err();
        let err: FrameError = json_err.into();
        assert!(matches!(err, FrameError::Malformed(_)));
        assert!(err.to_string().starts_with("malformed frame"));
    }

    #[test]
    fn unknown_event_display() {
        let err = FrameError::UnknownEvent("wf_api_bogus_event".into());
        assert_eq!(err.to_string(), "unrecognized event type `wf_api_bogus_event`");
    }
}
