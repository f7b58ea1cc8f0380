//! Workflow registration and path resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::session::Session;

/// Name reported for the default workflow.
pub const DEFAULT_WORKFLOW_NAME: &str = "default";

/// Paths served by the HTTP side of the server.
const RESERVED_PATHS: [&str; 2] = ["health", "metrics"];

/// Application code run once per accepted connection.
///
/// `start` runs before the first inbound frame is read, so listeners it
/// registers see every event, including `start`. It must not block: issue
/// requests from [`Session::on_async`] handlers or spawned tasks.
pub trait Workflow: Send + Sync + 'static {
    /// Wire up a freshly connected session.
    fn start(&self, session: &Session);
}

impl<F> Workflow for F
where
    F: Fn(&Session) + Send + Sync + 'static,
{
    fn start(&self, session: &Session) {
        self(session);
    }
}

/// Registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A workflow is already registered at this path.
    #[error("a workflow is already registered at path `{0}`")]
    DuplicatePath(String),
    /// A default workflow is already registered.
    #[error("a default workflow is already registered")]
    DuplicateDefault,
    /// The path is empty after normalization; use `register_default`.
    #[error("workflow path is empty; register it as the default instead")]
    EmptyPath,
    /// The path is served by the HTTP side.
    #[error("path `{0}` is reserved")]
    ReservedPath(String),
}

/// A workflow matched to an incoming request path.
#[derive(Clone)]
pub struct ResolvedWorkflow {
    /// Registration path, or [`DEFAULT_WORKFLOW_NAME`].
    pub name: String,
    /// The workflow to start.
    pub workflow: Arc<dyn Workflow>,
}

impl fmt::Debug for ResolvedWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedWorkflow")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered workflows, built before the server starts and read-only after.
#[derive(Default)]
pub struct WorkflowRegistry {
    default: Option<Arc<dyn Workflow>>,
    paths: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `workflow` at `path`. Leading `/` are stripped. Each path can
    /// be registered once.
    pub fn register(&mut self, path: &str, workflow: impl Workflow) -> Result<(), RegistryError> {
        let key = normalize_path(path);
        if key.is_empty() {
            return Err(RegistryError::EmptyPath);
        }
        if RESERVED_PATHS.contains(&key) {
            return Err(RegistryError::ReservedPath(key.to_owned()));
        }
        if self.paths.contains_key(key) {
            return Err(RegistryError::DuplicatePath(key.to_owned()));
        }
        let _ = self.paths.insert(key.to_owned(), Arc::new(workflow));
        Ok(())
    }

    /// Register the workflow for the base path (and, outside strict mode,
    /// every unmatched path).
    pub fn register_default(&mut self, workflow: impl Workflow) -> Result<(), RegistryError> {
        if self.default.is_some() {
            return Err(RegistryError::DuplicateDefault);
        }
        self.default = Some(Arc::new(workflow));
        Ok(())
    }

    /// Find the workflow owning `path`.
    ///
    /// An exact match wins. The base path maps to the default workflow in
    /// both modes; other unmatched paths fall back to it only when `strict`
    /// is off.
    pub fn resolve(&self, path: &str, strict: bool) -> Option<ResolvedWorkflow> {
        let key = normalize_path(path);
        if let Some(workflow) = self.paths.get(key) {
            return Some(ResolvedWorkflow {
                name: key.to_owned(),
                workflow: workflow.clone(),
            });
        }
        if strict && !key.is_empty() {
            return None;
        }
        self.default.as_ref().map(|workflow| ResolvedWorkflow {
            name: DEFAULT_WORKFLOW_NAME.to_owned(),
            workflow: workflow.clone(),
        })
    }

    /// Whether a default workflow is registered.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Registered workflows, the default included.
    pub fn len(&self) -> usize {
        self.paths.len() + usize::from(self.default.is_some())
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip leading `/` from a registration or request path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
