//! # relay-server
//!
//! Axum `WebSocket` server that hands each device connection to a registered
//! workflow.
//!
//! - Routing: exact path match, else the default workflow (unless strict)
//! - [`Session`]: concurrent request/response calls correlated by id, plus
//!   event subscriptions
//! - Liveness: a server-wide ping sweep evicts peers that miss a probe
//! - HTTP endpoints: health check and Prometheus metrics
//! - Graceful shutdown via `CancellationToken`
//!
//! ```ignore
//! let mut workflows = WorkflowRegistry::new();
//! workflows.register_default(|session: &Session| {
//!     let _ = session.on_async(EventKind::Start, |session, _event| async move {
//!         session.request("say", json!({ "text": "hello" })).await?;
//!         Ok(())
//!     });
//! })?;
//! let server = WorkflowServer::new(ServerConfig::default(), workflows)?;
//! let (addr, handle) = server.listen().await?;
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod websocket;
pub mod workflow;
mod unwind;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use relay_core::errors::SessionError;
pub use relay_core::protocol::{EventKind, Payload};
pub use server::{ServerError, WorkflowServer};
pub use session::{Listener, RequestTimeouts, Session};
pub use websocket::registry::SessionRegistry;
pub use workflow::{RegistryError, ResolvedWorkflow, Workflow, WorkflowRegistry};
