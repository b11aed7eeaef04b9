//! Progress relay: folds transport updates into task state.
//!
//! One relay task runs per upload attempt. Every fold re-reads the current
//! snapshot and only touches the progress counters while the task is still
//! `Uploading`, so a concurrent terminal transition is never clobbered and
//! a status is never overwritten. Transport errors are not handled here;
//! they surface through the engine's failure path.

use std::sync::Arc;

use convoy_protocol::{TaskId, TaskStatus, TransferUpdate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registry::RegistryInner;

/// Spawns the relay for one transmission. The relay detaches (drops its
/// subscription) at the first terminal update or when the transport closes
/// the channel.
pub(crate) fn spawn(
    inner: Arc<RegistryInner>,
    id: TaskId,
    mut updates: mpsc::Receiver<TransferUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            inner.store.amend_task(&id, |task| {
                if task.status != TaskStatus::Uploading {
                    return None;
                }
                Some(task.with_progress(update.bytes_transferred, update.total_bytes))
            });

            if update.state.is_terminal() {
                tracing::trace!(task = %id, state = ?update.state, "relay detached");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use convoy_protocol::TransportState;

    use super::*;
    use crate::destination::{DestinationRef, DestinationResolver, TransportError};
    use crate::engine::tests::MockDestination;
    use crate::registry::UploadRegistry;

    fn registry() -> UploadRegistry {
        let destination = MockDestination::new();
        let resolver: DestinationResolver = Arc::new(move |_, _| {
            let d: DestinationRef = destination.clone();
            Ok::<_, TransportError>(d)
        });
        UploadRegistry::builder(resolver).allow("image/png").build()
    }

    fn update(state: TransportState, bytes: u64) -> TransferUpdate {
        TransferUpdate {
            state,
            bytes_transferred: bytes,
            total_bytes: Some(100),
        }
    }

    #[tokio::test]
    async fn folds_progress_while_uploading() {
        let registry = registry();
        let ticket = registry.request_upload("/tmp/a.png").unwrap();
        let id = ticket.task_id().clone();
        registry
            .inner
            .store
            .amend_task(&id, |t| Some(t.with_status(TaskStatus::Uploading)));

        let (tx, rx) = mpsc::channel(8);
        let relay = spawn(registry.inner.clone(), id.clone(), rx);
        tx.send(update(TransportState::Running, 40)).await.unwrap();
        tx.send(update(TransportState::Running, 70)).await.unwrap();
        drop(tx);
        relay.await.unwrap();

        let task = registry.task(&id).unwrap();
        assert_eq!(task.bytes_transferred, 70);
        assert_eq!(task.total_bytes, Some(100));
        assert_eq!(task.status, TaskStatus::Uploading);
    }

    #[tokio::test]
    async fn updates_after_terminal_status_are_ignored() {
        let registry = registry();
        let ticket = registry.request_upload("/tmp/a.png").unwrap();
        let id = ticket.task_id().clone();
        registry.inner.store.amend_task(&id, |t| {
            Some(t.with_status(TaskStatus::Uploading).with_progress(100, Some(100)))
        });
        registry
            .inner
            .store
            .amend_task(&id, |t| Some(t.with_status(TaskStatus::Finished)));

        let (tx, rx) = mpsc::channel(8);
        let relay = spawn(registry.inner.clone(), id.clone(), rx);
        tx.send(update(TransportState::Running, 999)).await.unwrap();
        drop(tx);
        relay.await.unwrap();

        let task = registry.task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.bytes_transferred, 100);
    }

    #[tokio::test]
    async fn detaches_at_the_first_terminal_update() {
        let registry = registry();
        let ticket = registry.request_upload("/tmp/a.png").unwrap();
        let id = ticket.task_id().clone();
        registry
            .inner
            .store
            .amend_task(&id, |t| Some(t.with_status(TaskStatus::Uploading)));

        let (tx, rx) = mpsc::channel(8);
        let relay = spawn(registry.inner.clone(), id.clone(), rx);
        tx.send(update(TransportState::Success, 100)).await.unwrap();
        relay.await.unwrap();

        // The receiver is gone once the relay detached.
        assert!(tx.send(update(TransportState::Running, 1)).await.is_err());

        let task = registry.task(&id).unwrap();
        assert_eq!(task.bytes_transferred, 100);
    }
}
