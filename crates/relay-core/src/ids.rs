//! Branded ID newtypes.
//!
//! Connection and correlation identifiers are distinct types so a correlation
//! token can never be passed where a connection id is expected. Both are built
//! on UUID v7 (time-ordered, 74 random bits per id).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

branded_id!(
    /// Identifies one accepted connection: `"<workflow>-<uuid>"`.
    ConnectionId
);

branded_id!(
    /// Token linking a request frame to its response frame.
    CorrelationId
);

impl ConnectionId {
    /// Generate an id for a connection owned by `workflow`.
    #[must_use]
    pub fn for_workflow(workflow: &str) -> Self {
        Self(format!("{workflow}-{}", Uuid::now_v7().simple()))
    }
}

impl CorrelationId {
    /// Generate a fresh correlation token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}
