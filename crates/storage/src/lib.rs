//! Object-store destination for the convoy upload registry.
//!
//! Implements the registry's [`Destination`](convoy_registry::Destination)
//! collaborator on top of the `object_store` crate, so uploads land in any
//! backend that crate supports (S3-compatible stores, the local filesystem,
//! or memory for tests). Also ships the default destination policy:
//! objects partitioned by the primary segment of their content type.

mod client;
mod destination;

pub use client::{ObjectStorage, StorageError};
pub use destination::{ObjectDestination, partitioned_resolver};

/// Default chunk size for reading the source file: 1 MiB.
///
/// Each read chunk produces one progress update; smaller chunks trade
/// syscall overhead for finer-grained progress.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
