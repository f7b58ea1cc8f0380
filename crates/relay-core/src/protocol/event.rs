use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed vocabulary of events a device may emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The workflow was started on the device.
    Start,
    /// A device button was pressed.
    Button,
    /// A timer set by the workflow fired.
    Timer,
    /// A notification was acknowledged or dismissed.
    Notification,
    /// A call was connected.
    CallConnected,
    /// A call ended.
    CallDisconnected,
    /// A call could not be placed.
    CallFailed,
    /// An incoming call arrived.
    CallReceived,
    /// The user asked to start a call.
    CallStartRequest,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Start,
        Self::Button,
        Self::Timer,
        Self::Notification,
        Self::CallConnected,
        Self::CallDisconnected,
        Self::CallFailed,
        Self::CallReceived,
        Self::CallStartRequest,
    ];

    /// Name used inside the `<ns>_<name>_event` type tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Button => "button",
            Self::Timer => "timer",
            Self::Notification => "notification",
            Self::CallConnected => "call_connected",
            Self::CallDisconnected => "call_disconnected",
            Self::CallFailed => "call_failed",
            Self::CallReceived => "call_received",
            Self::CallStartRequest => "call_start_request",
        }
    }

    /// Look up a kind by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde() {
        for kind in EventKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn from_name_known() {
        assert_eq!(EventKind::from_name("start"), Some(EventKind::Start));
        assert_eq!(
            EventKind::from_name("call_start_request"),
            Some(EventKind::CallStartRequest)
        );
    }

    #[test]
    fn from_name_unknown() {
        assert_eq!(EventKind::from_name("interaction_started"), None);
        assert_eq!(EventKind::from_name(""), None);
        assert_eq!(EventKind::from_name("Start"), None);
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(EventKind::CallFailed.to_string(), "call_failed");
    }
}
