//! Transmission collaborator interface.
//!
//! The registry never moves bytes itself. A [`Destination`] represents the
//! remote location one task uploads to; `begin` starts the transfer and
//! hands back a [`Transmission`] carrying the progress stream and the
//! completion channel. Using a trait keeps the registry decoupled from any
//! particular storage backend and testable with mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use convoy_protocol::{Task, TaskId, TransferUpdate};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Errors reported by a transmission backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport backend error: {0}")]
    Backend(String),

    #[error("transmission cancelled")]
    Cancelled,
}

/// Live handle to one in-flight transfer.
///
/// Progress events buffer in `updates` until a consumer drains them, so
/// attaching a listener after `begin` returns loses nothing. The backend
/// must settle `completion` exactly once, after its final update, and must
/// close the update channel (drop its sender or emit a terminal state) when
/// the transfer ends, successfully or not.
pub struct Transmission {
    pub updates: mpsc::Receiver<TransferUpdate>,
    pub completion: oneshot::Receiver<Result<(), TransportError>>,
}

/// A remote destination capable of receiving one task's bytes.
pub trait Destination: Send + Sync {
    /// Starts transmitting the resource at `source` with the declared
    /// content type. A cooperating backend aborts when `cancel` trips and
    /// reports [`TransportError::Cancelled`].
    fn begin(
        &self,
        source: &str,
        content_type: &str,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Transmission, TransportError>> + Send + '_>>;

    /// Human-readable location of the destination, for logs and results.
    fn location(&self) -> String;
}

pub type DestinationRef = Arc<dyn Destination>;

impl std::fmt::Debug for dyn Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("location", &self.location())
            .finish()
    }
}

/// Maps a task to the destination its bytes should go to.
pub type DestinationResolver =
    Arc<dyn Fn(&TaskId, &Task) -> Result<DestinationRef, TransportError> + Send + Sync>;
