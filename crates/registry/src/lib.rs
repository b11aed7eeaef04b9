//! Upload task registry and state machine.
//!
//! This crate implements the **tracking logic** for file uploads: client
//! code registers a local resource, receives a ticket, and starts the
//! attempt when ready; the registry walks every task through
//! `Created → Uploading → Finished/Error` (with `Error → Uploading` retry)
//! and publishes copy-on-write snapshots to subscribers. It is a library
//! crate with no transport dependencies — the embedding application
//! supplies a [`Destination`] implementation that moves the bytes
//! (`convoy-storage` ships an object-store-backed one).
//!
//! # Pipeline
//!
//! 1. **Register** — validate the source and content type, insert a
//!    `Created` task, hand back an [`UploadTicket`]
//! 2. **Claim** — `start()` flips the task to `Uploading` in one
//!    compare-and-set, so at most one attempt is ever in flight
//! 3. **Transmit** — the destination streams [`TransferUpdate`]s while the
//!    relay folds them into the snapshot
//! 4. **Finalize** — the terminal status is committed before the attempt's
//!    [`Completion`] settles
//!
//! [`TransferUpdate`]: convoy_protocol::TransferUpdate

pub mod destination;
pub mod engine;
pub mod error;
pub mod registry;
mod relay;
pub mod scope;
pub mod store;

// Re-export primary types for convenience.
pub use destination::{
    Destination, DestinationRef, DestinationResolver, Transmission, TransportError,
};
pub use engine::Completion;
pub use error::{RegisterError, ScopeError, UploadError};
pub use registry::{
    Classifier, IdAllocator, RegistryBuilder, RegistryConfig, UploadRegistry, UploadTicket,
};
pub use scope::UploadScope;
pub use store::{Snapshot, SnapshotStore, Subscription};
