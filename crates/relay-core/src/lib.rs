//! # relay-core
//!
//! Foundation types shared by the workflow session server crates:
//!
//! - **Protocol**: [`protocol::FrameCodec`] decodes inbound JSON frames once, at
//!   the transport boundary, into [`protocol::InboundFrame`] and encodes
//!   outbound requests
//! - **Events**: the closed [`protocol::EventKind`] vocabulary
//! - **Branded IDs**: [`ids::ConnectionId`] and [`ids::CorrelationId`]
//! - **Errors**: [`errors::SessionError`] for calls issued through a session,
//!   [`errors::FrameError`] for undecodable frames
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{FrameError, SessionError};
pub use ids::{ConnectionId, CorrelationId};
pub use protocol::{EventKind, FrameCodec, InboundFrame, Payload, Reply};
