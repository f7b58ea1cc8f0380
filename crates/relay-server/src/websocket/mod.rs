//! WebSocket connection management, liveness monitoring, and inbound
//! frame dispatch.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub(crate) mod lifecycle;
pub mod registry;
