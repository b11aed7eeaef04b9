//! Shared value types for the convoy upload registry.
//!
//! Everything here is a plain immutable value: the task snapshot and its
//! status machine, the progress-event shape emitted by transports, and the
//! default content-type classifier. Behavior lives in `convoy-registry`.

mod classify;
mod types;

pub use classify::{classify_content_type, primary_type_segment};
pub use types::{Task, TaskId, TaskStatus, TransferUpdate, TransportState};
