//! Transition engine: claims a task for upload and drives the attempt.
//!
//! Claiming is a single compare-and-set against the snapshot store: the
//! status check and the `Uploading` write commit together, so two
//! near-simultaneous triggers can never both start a transmission. The
//! claim is visible to readers before any bytes move.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use convoy_protocol::{Task, TaskId, TaskStatus};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::destination::{DestinationRef, DestinationResolver, Transmission, TransportError};
use crate::error::UploadError;
use crate::registry::RegistryInner;
use crate::relay;

/// Completion signal of one upload attempt.
///
/// Resolves with the finalized destination handle on success or the failure
/// cause on error, strictly after the task's terminal status is committed:
/// a task is never still `Uploading` once this has settled. Dropping the
/// signal does not stop the attempt; [`cancel`](Self::cancel) asks the
/// transport to abort.
pub struct Completion {
    rx: oneshot::Receiver<Result<DestinationRef, UploadError>>,
    cancel: CancellationToken,
}

impl Completion {
    /// Asks the transport to abort the attempt. A cooperating destination
    /// fails with [`TransportError::Cancelled`], which finalizes the task
    /// through the ordinary error path; the task can be retried afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn settled(result: Result<DestinationRef, UploadError>, cancel: CancellationToken) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx, cancel }
    }
}

impl Future for Completion {
    type Output = Result<DestinationRef, UploadError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| match settled {
            Ok(result) => result,
            Err(_) => Err(UploadError::Interrupted),
        })
    }
}

/// Claims the task and spawns the driver for one upload attempt.
pub(crate) fn trigger(
    inner: &Arc<RegistryInner>,
    id: &TaskId,
    resolver: &DestinationResolver,
) -> Completion {
    let cancel = CancellationToken::new();

    let claim = inner.store.try_amend_task(id, |current| {
        let task = current.ok_or_else(|| UploadError::UnknownTask(id.clone()))?;
        if !task.status.is_startable() {
            return Err(UploadError::InvalidState(task.status));
        }
        // Entering Uploading discards the progress counters and failure
        // message of any previous attempt.
        Ok(task.with_status(TaskStatus::Uploading).with_progress(0, None))
    });

    match claim {
        Ok((task, _)) => {
            tracing::debug!(task = %id, source = %task.source, "upload claimed");
            let (done, rx) = oneshot::channel();
            tokio::spawn(drive(
                inner.clone(),
                id.clone(),
                task,
                resolver.clone(),
                cancel.clone(),
                done,
            ));
            Completion { rx, cancel }
        }
        Err(error) => {
            tracing::debug!(task = %id, error = %error, "upload start refused");
            Completion::settled(Err(error), cancel)
        }
    }
}

/// Runs one attempt to completion and commits the terminal status before
/// settling the completion signal.
async fn drive(
    inner: Arc<RegistryInner>,
    id: TaskId,
    task: Task,
    resolver: DestinationResolver,
    cancel: CancellationToken,
    done: oneshot::Sender<Result<DestinationRef, UploadError>>,
) {
    let result = attempt(&inner, &id, &task, resolver, cancel).await;

    match &result {
        Ok(destination) => {
            inner
                .store
                .amend_task(&id, |t| Some(t.with_status(TaskStatus::Finished)));
            tracing::debug!(task = %id, location = %destination.location(), "upload finished");
        }
        Err(error) => {
            let message = error.to_string();
            inner
                .store
                .amend_task(&id, |t| Some(t.with_failure(message.clone())));
            tracing::warn!(task = %id, error = %message, "upload failed");
        }
    }

    let _ = done.send(result);
}

async fn attempt(
    inner: &Arc<RegistryInner>,
    id: &TaskId,
    task: &Task,
    resolver: DestinationResolver,
    cancel: CancellationToken,
) -> Result<DestinationRef, UploadError> {
    let destination = resolver(id, task)?;
    let transmission = destination
        .begin(&task.source, &task.content_type, cancel)
        .await?;
    let Transmission {
        updates,
        completion,
    } = transmission;

    // Attach the relay before awaiting the outcome; updates buffered in the
    // channel since `begin` are not lost.
    let relay = relay::spawn(inner.clone(), id.clone(), updates);
    let outcome = completion.await;

    // Drain trailing progress (including a final success snapshot) before
    // the terminal status is committed.
    if relay.await.is_err() {
        tracing::warn!(task = %id, "progress relay panicked");
    }

    match outcome {
        Ok(Ok(())) => Ok(destination),
        Ok(Err(cause)) => Err(UploadError::Transmission(cause)),
        Err(_) => Err(UploadError::Transmission(TransportError::Backend(
            "transport dropped without reporting a result".into(),
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use convoy_protocol::{TransferUpdate, TransportState};
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::UploadRegistry;

    /// Scripted destination that replays queued transmissions.
    pub(crate) struct MockDestination {
        scripts: Mutex<Vec<Script>>,
        began: AtomicUsize,
    }

    pub(crate) struct Script {
        pub(crate) updates: Vec<TransferUpdate>,
        pub(crate) outcome: Result<(), TransportError>,
    }

    impl MockDestination {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(Vec::new()),
                began: AtomicUsize::new(0),
            })
        }

        pub(crate) fn push_script(
            &self,
            updates: Vec<TransferUpdate>,
            outcome: Result<(), TransportError>,
        ) {
            self.scripts.lock().unwrap().push(Script { updates, outcome });
        }

        pub(crate) fn transmissions_started(&self) -> usize {
            self.began.load(Ordering::SeqCst)
        }
    }

    impl crate::destination::Destination for MockDestination {
        fn begin(
            &self,
            _source: &str,
            _content_type: &str,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<Transmission, TransportError>> + Send + '_>>
        {
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }

                let script = {
                    let mut scripts = self.scripts.lock().unwrap();
                    if scripts.is_empty() {
                        return Err(TransportError::Backend("no scripted transmission".into()));
                    }
                    scripts.remove(0)
                };
                self.began.fetch_add(1, Ordering::SeqCst);

                let (updates_tx, updates) = mpsc::channel(16);
                let (done, completion) = oneshot::channel();
                tokio::spawn(async move {
                    for update in script.updates {
                        let _ = updates_tx.send(update).await;
                    }
                    let _ = done.send(script.outcome);
                });

                Ok(Transmission {
                    updates,
                    completion,
                })
            })
        }

        fn location(&self) -> String {
            "mock://uploads".into()
        }
    }

    fn running(bytes: u64, total: u64) -> TransferUpdate {
        TransferUpdate {
            state: TransportState::Running,
            bytes_transferred: bytes,
            total_bytes: Some(total),
        }
    }

    fn success(total: u64) -> TransferUpdate {
        TransferUpdate {
            state: TransportState::Success,
            bytes_transferred: total,
            total_bytes: Some(total),
        }
    }

    fn registry_with(destination: &Arc<MockDestination>) -> UploadRegistry {
        let handle = destination.clone();
        let resolver: DestinationResolver = Arc::new(move |_, _| {
            let d: DestinationRef = handle.clone();
            Ok(d)
        });
        UploadRegistry::builder(resolver).allow("image/png").build()
    }

    #[tokio::test]
    async fn start_commits_uploading_before_settling() {
        let destination = MockDestination::new();
        destination.push_script(vec![], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let completion = ticket.start();
        // The claim is synchronous: readers see Uploading before any
        // transmission work has run.
        assert_eq!(
            registry.task(ticket.task_id()).unwrap().status,
            TaskStatus::Uploading
        );

        completion.await.unwrap();
        assert_eq!(
            registry.task(ticket.task_id()).unwrap().status,
            TaskStatus::Finished
        );
    }

    #[tokio::test]
    async fn successful_upload_records_final_progress() {
        let destination = MockDestination::new();
        destination.push_script(vec![running(50, 100), success(100)], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let finished = ticket.start().await.unwrap();
        assert_eq!(finished.location(), "mock://uploads");

        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.bytes_transferred, 100);
        assert_eq!(task.total_bytes, Some(100));
    }

    #[tokio::test]
    async fn failed_upload_records_error_and_allows_retry() {
        let destination = MockDestination::new();
        destination.push_script(
            vec![running(30, 100)],
            Err(TransportError::Backend("connection reset".into())),
        );
        destination.push_script(vec![success(100)], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let err = ticket.start().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transmission(TransportError::Backend(_))
        ));

        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.error.as_deref().unwrap().contains("connection reset"));

        // Retry re-enters through the same claim and succeeds.
        ticket.start().await.unwrap();
        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.error, None);
        assert_eq!(destination.transmissions_started(), 2);
    }

    #[tokio::test]
    async fn retry_resets_progress_from_the_failed_attempt() {
        let destination = MockDestination::new();
        destination.push_script(
            vec![running(80, 100)],
            Err(TransportError::Backend("timed out".into())),
        );
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let _ = ticket.start().await;
        assert_eq!(
            registry.task(ticket.task_id()).unwrap().bytes_transferred,
            80
        );

        // The second claim wipes the stale counters; with no script queued
        // the attempt fails immediately, leaving the reset visible.
        let _ = ticket.start();
        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.bytes_transferred, 0);
        assert_eq!(task.total_bytes, None);
    }

    #[tokio::test]
    async fn double_trigger_starts_exactly_one_transmission() {
        let destination = MockDestination::new();
        destination.push_script(vec![success(10)], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let first = ticket.start();
        let second = ticket.start();

        let err = second.await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidState(TaskStatus::Uploading)
        ));

        first.await.unwrap();
        assert_eq!(destination.transmissions_started(), 1);
    }

    #[tokio::test]
    async fn finished_task_cannot_be_restarted() {
        let destination = MockDestination::new();
        destination.push_script(vec![], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();
        ticket.start().await.unwrap();

        let err = ticket.start().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidState(TaskStatus::Finished)
        ));
        assert_eq!(destination.transmissions_started(), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_refused_without_touching_the_registry() {
        let destination = MockDestination::new();
        let registry = registry_with(&destination);
        registry.request_upload("/tmp/a.png").unwrap();
        let before = registry.uploads();

        let err = registry.start(&TaskId::new("missing")).await.unwrap_err();
        assert!(matches!(err, UploadError::UnknownTask(_)));
        assert_eq!(*registry.uploads(), *before);
        assert_eq!(destination.transmissions_started(), 0);
    }

    #[tokio::test]
    async fn refused_start_does_not_write_an_error_status() {
        let destination = MockDestination::new();
        destination.push_script(vec![], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let first = ticket.start();
        let _ = ticket.start().await;
        first.await.unwrap();

        // The refused second call never wrote an Error status.
        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
    }

    #[tokio::test]
    async fn per_request_resolver_overrides_the_registry_default() {
        let shared = MockDestination::new();
        let registry = registry_with(&shared);

        let private = MockDestination::new();
        private.push_script(vec![], Ok(()));
        let handle = private.clone();
        let override_resolver: DestinationResolver = Arc::new(move |_, _| {
            let d: DestinationRef = handle.clone();
            Ok(d)
        });

        let ticket = registry
            .request_upload_to("/tmp/a.png", override_resolver)
            .unwrap();
        ticket.start().await.unwrap();

        assert_eq!(private.transmissions_started(), 1);
        assert_eq!(shared.transmissions_started(), 0);
    }

    #[tokio::test]
    async fn resolver_failure_finalizes_to_error() {
        let resolver: DestinationResolver =
            Arc::new(|_, _| Err(TransportError::Backend("no destination configured".into())));
        let registry = UploadRegistry::builder(resolver).allow("image/png").build();
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let err = ticket.start().await.unwrap_err();
        assert!(matches!(err, UploadError::Transmission(_)));
        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn cancel_aborts_and_leaves_a_retryable_task() {
        let destination = MockDestination::new();
        destination.push_script(vec![], Ok(()));
        let registry = registry_with(&destination);
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        // Cancel before the driver has been polled: the transport observes
        // the token on begin and aborts.
        let completion = ticket.start();
        completion.cancel();
        let err = completion.await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transmission(TransportError::Cancelled)
        ));

        let task = registry.task(ticket.task_id()).unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.status.is_startable());
        assert_eq!(destination.transmissions_started(), 0);
    }

    #[tokio::test]
    async fn dropped_transport_surfaces_as_transmission_failure() {
        struct VanishingDestination;

        impl crate::destination::Destination for VanishingDestination {
            fn begin(
                &self,
                _source: &str,
                _content_type: &str,
                _cancel: CancellationToken,
            ) -> Pin<Box<dyn Future<Output = Result<Transmission, TransportError>> + Send + '_>>
            {
                Box::pin(async {
                    let (_updates_tx, updates) = mpsc::channel(1);
                    let (done, completion) = oneshot::channel::<Result<(), TransportError>>();
                    drop(done);
                    Ok(Transmission {
                        updates,
                        completion,
                    })
                })
            }

            fn location(&self) -> String {
                "mock://vanishing".into()
            }
        }

        let resolver: DestinationResolver = Arc::new(|_, _| {
            let d: DestinationRef = Arc::new(VanishingDestination);
            Ok(d)
        });
        let registry = UploadRegistry::builder(resolver).allow("image/png").build();
        let ticket = registry.request_upload("/tmp/a.png").unwrap();

        let err = ticket.start().await.unwrap_err();
        assert!(matches!(err, UploadError::Transmission(_)));
        assert_eq!(
            registry.task(ticket.task_id()).unwrap().status,
            TaskStatus::Error
        );
    }
}
