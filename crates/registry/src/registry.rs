//! Registry construction and the registration API.

use std::collections::HashSet;
use std::sync::Arc;

use convoy_protocol::{Task, TaskId, classify_content_type};
use tokio::sync::watch;
use uuid::Uuid;

use crate::destination::DestinationResolver;
use crate::engine::{self, Completion};
use crate::error::RegisterError;
use crate::store::{Snapshot, SnapshotStore, Subscription};

/// Classifies a source locator into a content type, or refuses.
pub type Classifier = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Produces a fresh, unique task identifier on every call.
///
/// The registry relies on uniqueness rather than re-checking it; the
/// default allocator draws random UUIDs.
pub type IdAllocator = Arc<dyn Fn() -> TaskId + Send + Sync>;

/// Registry configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Content types accepted at registration. Empty means nothing is
    /// accepted until configured.
    pub allowed_content_types: HashSet<String>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a content type to the allowed set.
    pub fn allow(mut self, content_type: impl Into<String>) -> Self {
        self.allowed_content_types.insert(content_type.into());
        self
    }
}

pub(crate) struct RegistryInner {
    pub(crate) store: SnapshotStore,
    pub(crate) resolver: DestinationResolver,
    config: RegistryConfig,
    classifier: Classifier,
    allocate_id: IdAllocator,
}

/// The owning collection of upload tasks and the operations over it.
///
/// Cloning is cheap and every clone refers to the same task map. One
/// registry is typically constructed at the scope that owns all uploads for
/// a session and handed to whatever needs it.
#[derive(Clone)]
pub struct UploadRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl UploadRegistry {
    /// Starts building a registry around the given destination resolver.
    pub fn builder(resolver: DestinationResolver) -> RegistryBuilder {
        RegistryBuilder {
            config: RegistryConfig::new(),
            classifier: Arc::new(|source| classify_content_type(source).map(str::to_owned)),
            allocate_id: Arc::new(|| TaskId::new(Uuid::new_v4().to_string())),
            resolver,
        }
    }

    /// Validates and registers a new upload.
    ///
    /// Checks run in order and fail fast: a non-empty source, a classifiable
    /// content type, membership in the allowed set. On failure nothing is
    /// inserted. On success subscribers observe the `Created` task before
    /// any transmission starts, and the returned ticket starts the attempt.
    pub fn request_upload(&self, source: &str) -> Result<UploadTicket, RegisterError> {
        self.register(source, self.inner.resolver.clone())
    }

    /// Like [`request_upload`](Self::request_upload), but the returned
    /// ticket resolves its destination through `resolver` instead of the
    /// registry-wide one.
    pub fn request_upload_to(
        &self,
        source: &str,
        resolver: DestinationResolver,
    ) -> Result<UploadTicket, RegisterError> {
        self.register(source, resolver)
    }

    fn register(
        &self,
        source: &str,
        resolver: DestinationResolver,
    ) -> Result<UploadTicket, RegisterError> {
        if source.is_empty() {
            return Err(RegisterError::InvalidLocator);
        }

        let content_type = (self.inner.classifier)(source)
            .filter(|ct| !ct.is_empty())
            .ok_or_else(|| RegisterError::Unclassifiable {
                locator: source.to_string(),
            })?;

        if !self.inner.config.allowed_content_types.contains(&content_type) {
            return Err(RegisterError::UnsupportedContentType { content_type });
        }

        let id = (self.inner.allocate_id)();
        let task = Task::new(source, content_type);
        tracing::debug!(task = %id, content_type = %task.content_type, "upload registered");

        self.inner.store.update(|tasks| {
            let mut next = tasks.clone();
            next.insert(id.clone(), task.clone());
            next
        });

        Ok(UploadTicket {
            id,
            inner: self.inner.clone(),
            resolver,
        })
    }

    /// Starts an upload attempt for a task by identifier, using the
    /// registry-wide destination resolver.
    pub fn start(&self, id: &TaskId) -> Completion {
        engine::trigger(&self.inner, id, &self.inner.resolver)
    }

    /// Returns the current snapshot of all tasks.
    pub fn uploads(&self) -> Snapshot {
        self.inner.store.read()
    }

    /// Returns the current state of one task.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner.store.read().get(id).cloned()
    }

    /// Registers a callback invoked with the new snapshot after every
    /// change.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.store.subscribe(callback)
    }

    /// Returns a watch receiver tracking the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.inner.store.watch()
    }
}

/// Builder for [`UploadRegistry`].
pub struct RegistryBuilder {
    config: RegistryConfig,
    classifier: Classifier,
    allocate_id: IdAllocator,
    resolver: DestinationResolver,
}

impl RegistryBuilder {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a content type to the allowed set.
    pub fn allow(mut self, content_type: impl Into<String>) -> Self {
        self.config = self.config.allow(content_type);
        self
    }

    /// Replaces the default extension-based classifier.
    pub fn classifier(mut self, f: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.classifier = Arc::new(f);
        self
    }

    /// Replaces the default UUID identifier allocator.
    pub fn id_allocator(mut self, f: impl Fn() -> TaskId + Send + Sync + 'static) -> Self {
        self.allocate_id = Arc::new(f);
        self
    }

    pub fn build(self) -> UploadRegistry {
        UploadRegistry {
            inner: Arc::new(RegistryInner {
                store: SnapshotStore::new(),
                resolver: self.resolver,
                config: self.config,
                classifier: self.classifier,
                allocate_id: self.allocate_id,
            }),
        }
    }
}

/// Handle to one registered upload: its identifier plus the trigger that
/// starts (or retries) the attempt.
pub struct UploadTicket {
    id: TaskId,
    inner: Arc<RegistryInner>,
    resolver: DestinationResolver,
}

impl std::fmt::Debug for UploadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTicket").field("id", &self.id).finish()
    }
}

impl UploadTicket {
    pub fn task_id(&self) -> &TaskId {
        &self.id
    }

    /// Starts an upload attempt.
    ///
    /// Safe to call repeatedly: each invocation re-reads current state, and
    /// only a task in `Created` or `Error` is claimed, so concurrent calls
    /// produce at most one active transmission. Must be called from within
    /// a tokio runtime. Dropping the returned [`Completion`] does not stop
    /// the attempt.
    pub fn start(&self) -> Completion {
        engine::trigger(&self.inner, &self.id, &self.resolver)
    }
}
