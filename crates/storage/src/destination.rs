use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use convoy_protocol::{Task, TaskId, TransferUpdate, TransportState, primary_type_segment};
use convoy_registry::{
    Destination, DestinationRef, DestinationResolver, Transmission, TransportError,
};
use object_store::path::Path as StoragePath;
use object_store::{Attribute, Attributes, PutOptions};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{DEFAULT_CHUNK_SIZE, ObjectStorage};

/// One upload target inside an [`ObjectStorage`] backend.
pub struct ObjectDestination {
    storage: ObjectStorage,
    key: String,
    chunk_size: usize,
}

impl ObjectDestination {
    pub fn new(storage: ObjectStorage, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the read chunk size (and with it the progress
    /// granularity). A size of 0 falls back to [`DEFAULT_CHUNK_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Destination for ObjectDestination {
    fn begin(
        &self,
        source: &str,
        content_type: &str,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Transmission, TransportError>> + Send + '_>> {
        let storage = self.storage.clone();
        let key = self.key.clone();
        let chunk_size = self.chunk_size;
        let source = source.to_string();
        let content_type = content_type.to_string();

        Box::pin(async move {
            let file = File::open(&source).await?;
            let total = file.metadata().await?.len();

            let (updates_tx, updates) = mpsc::channel(32);
            let (done, completion) = oneshot::channel();
            tokio::spawn(async move {
                let result = transmit(
                    storage, key, file, total, content_type, chunk_size, updates_tx, cancel,
                )
                .await;
                let _ = done.send(result);
            });

            Ok(Transmission {
                updates,
                completion,
            })
        })
    }

    fn location(&self) -> String {
        format!("{}/{}", self.storage.bucket(), self.key)
    }
}

#[allow(clippy::too_many_arguments)]
async fn transmit(
    storage: ObjectStorage,
    key: String,
    mut file: File,
    total: u64,
    content_type: String,
    chunk_size: usize,
    updates: mpsc::Sender<TransferUpdate>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    let mut data = Vec::with_capacity(total as usize);
    let mut buf = vec![0u8; chunk_size];
    let mut transferred: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        transferred += n as u64;

        let _ = updates
            .send(TransferUpdate {
                state: TransportState::Running,
                bytes_transferred: transferred,
                total_bytes: Some(total),
            })
            .await;
    }

    if cancel.is_cancelled() {
        return Err(TransportError::Cancelled);
    }

    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type.into());
    let options = PutOptions {
        attributes,
        ..Default::default()
    };
    storage
        .store
        .put_opts(&StoragePath::from(key.as_str()), data.into(), options)
        .await
        .map_err(|e| TransportError::Backend(e.to_string()))?;
    tracing::debug!(key, bytes = transferred, "object stored");

    let _ = updates
        .send(TransferUpdate {
            state: TransportState::Success,
            bytes_transferred: transferred,
            total_bytes: Some(total),
        })
        .await;

    Ok(())
}

/// Default destination policy: objects keyed by the primary segment of the
/// task's content type (`image/png` → `image/{task_id}`).
pub fn partitioned_resolver(storage: ObjectStorage) -> DestinationResolver {
    Arc::new(move |id: &TaskId, task: &Task| {
        let key = format!("{}/{}", primary_type_segment(&task.content_type), id);
        let destination: DestinationRef = Arc::new(ObjectDestination::new(storage.clone(), key));
        Ok(destination)
    })
}
