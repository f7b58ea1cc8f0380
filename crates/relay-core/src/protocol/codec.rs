use regex::Regex;
use serde_json::Value;

use super::{ERROR_FIELD, EventKind, ID_FIELD, InboundFrame, Payload, Reply, TYPE_FIELD};
use crate::errors::FrameError;

const REQUEST_SUFFIX: &str = "_request";
const RESPONSE_SUFFIX: &str = "_response";

/// Encodes and decodes frames for one protocol namespace.
///
/// An empty namespace produces bare tags (`say_request`, `error_response`,
/// `start_event`).
#[derive(Clone, Debug)]
pub struct FrameCodec {
    namespace: String,
    prefix: String,
    event_pattern: Regex,
}

impl FrameCodec {
    /// Build a codec for `namespace`.
    pub fn new(namespace: &str) -> Result<Self, FrameError> {
        let prefix = if namespace.is_empty() {
            String::new()
        } else {
            format!("{namespace}_")
        };
        let event_pattern = Regex::new(&format!(
            "^{}([a-z][a-z_]*)_event$",
            regex::escape(&prefix)
        ))?;
        Ok(Self {
            namespace: namespace.to_owned(),
            prefix,
            event_pattern,
        })
    }

    /// The namespace this codec was built for.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<ns>_<command>_request`.
    pub fn request_type(&self, command: &str) -> String {
        format!("{}{command}{REQUEST_SUFFIX}", self.prefix)
    }

    /// `<ns>_<command>_response`.
    pub fn response_type(&self, command: &str) -> String {
        format!("{}{command}{RESPONSE_SUFFIX}", self.prefix)
    }

    /// `<ns>_error_response`.
    pub fn error_type(&self) -> String {
        self.response_type("error")
    }

    /// `<ns>_<name>_event`.
    pub fn event_type(&self, kind: EventKind) -> String {
        format!("{}{}_event", self.prefix, kind.as_str())
    }

    /// Encode a request frame. Envelope fields override payload fields of the
    /// same name.
    pub fn encode_request(
        &self,
        id: &str,
        command: &str,
        payload: Payload,
    ) -> Result<String, FrameError> {
        encode(self.request_type(command), Some(id), payload)
    }

    /// Encode a response frame, as a device would send it.
    pub fn encode_response(
        &self,
        id: &str,
        command: &str,
        payload: Payload,
    ) -> Result<String, FrameError> {
        encode(self.response_type(command), Some(id), payload)
    }

    /// Encode an error response frame, as a device would send it.
    pub fn encode_error(&self, id: &str, error: Value) -> Result<String, FrameError> {
        let mut payload = Payload::new();
        let _ = payload.insert(ERROR_FIELD.to_owned(), error);
        encode(self.error_type(), Some(id), payload)
    }

    /// Encode an event frame, as a device would send it.
    pub fn encode_event(&self, kind: EventKind, payload: Payload) -> Result<String, FrameError> {
        encode(self.event_type(kind), None, payload)
    }

    /// Decode one inbound text frame.
    ///
    /// Frames with a string `id` are replies; frames without one (or with a
    /// `null` id) are events and must match the event-name pattern.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, FrameError> {
        let Value::Object(mut fields) = serde_json::from_str::<Value>(text)? else {
            return Err(FrameError::NotAnObject);
        };
        let Some(Value::String(type_tag)) = fields.remove(TYPE_FIELD) else {
            return Err(FrameError::MissingType);
        };

        match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => {
                let reply = self.classify_reply(type_tag, fields);
                Ok(InboundFrame::Reply { id, reply })
            }
            Some(Value::Null) | None => {
                let kind = self
                    .event_pattern
                    .captures(&type_tag)
                    .and_then(|caps| caps.get(1))
                    .and_then(|name| EventKind::from_name(name.as_str()));
                let Some(kind) = kind else {
                    return Err(FrameError::UnknownEvent(type_tag));
                };
                Ok(InboundFrame::Event {
                    kind,
                    payload: fields,
                })
            }
            Some(_) => Err(FrameError::InvalidId),
        }
    }

    fn classify_reply(&self, type_tag: String, mut payload: Payload) -> Reply {
        if type_tag == self.error_type() {
            return Reply::Error(payload.remove(ERROR_FIELD).unwrap_or(Value::Null));
        }
        let command = type_tag
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(RESPONSE_SUFFIX))
            .filter(|command| !command.is_empty())
            .map(str::to_owned);
        match command {
            Some(command) => Reply::Response { command, payload },
            None => Reply::Other { type_tag, payload },
        }
    }
}

fn encode(type_tag: String, id: Option<&str>, mut payload: Payload) -> Result<String, FrameError> {
    let _ = payload.insert(TYPE_FIELD.to_owned(), Value::String(type_tag));
    match id {
        Some(id) => {
            let _ = payload.insert(ID_FIELD.to_owned(), Value::String(id.to_owned()));
        }
        None => {
            let _ = payload.remove(ID_FIELD);
        }
    }
    Ok(serde_json::to_string(&Value::Object(payload))?)
}
