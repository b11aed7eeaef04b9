//! Scope handle for code that may run before a registry exists.
//!
//! Instead of a process-global registry, callers receive an `UploadScope`.
//! The default scope is detached: every operation fails immediately with
//! [`ScopeError::ProviderMissing`], so wiring mistakes surface at the call
//! site rather than silently doing nothing.

use convoy_protocol::TaskId;
use tokio::sync::watch;

use crate::error::ScopeError;
use crate::registry::{UploadRegistry, UploadTicket};
use crate::store::Snapshot;

/// Cheap cloneable handle to the registry in effect, if any.
#[derive(Clone, Default)]
pub struct UploadScope {
    registry: Option<UploadRegistry>,
}

impl UploadScope {
    /// A scope with no registry. Equivalent to `UploadScope::default()`.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A scope backed by the given registry.
    pub fn provide(registry: UploadRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Returns the registry in effect.
    pub fn registry(&self) -> Result<&UploadRegistry, ScopeError> {
        self.registry.as_ref().ok_or(ScopeError::ProviderMissing)
    }

    /// Registers a new upload through the scoped registry.
    pub fn request_upload(&self, source: &str) -> Result<UploadTicket, ScopeError> {
        Ok(self.registry()?.request_upload(source)?)
    }

    /// Returns the current snapshot of all tasks.
    pub fn uploads(&self) -> Result<Snapshot, ScopeError> {
        Ok(self.registry()?.uploads())
    }

    /// Returns the current state of one task.
    pub fn upload(&self, id: &TaskId) -> Result<Option<convoy_protocol::Task>, ScopeError> {
        Ok(self.registry()?.task(id))
    }

    /// Returns a watch receiver tracking the latest snapshot.
    pub fn watch_uploads(&self) -> Result<watch::Receiver<Snapshot>, ScopeError> {
        Ok(self.registry()?.watch())
    }
}
