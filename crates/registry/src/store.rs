//! Copy-on-write snapshot store for task state.
//!
//! The whole task map is replaced on every mutation, never edited in place,
//! so any [`Snapshot`] a reader holds is a frozen point-in-time view. A
//! single mutex serializes writers; readers clone an `Arc` and never block
//! on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use convoy_protocol::{Task, TaskId};
use tokio::sync::watch;

/// Immutable point-in-time view of the task map.
pub type Snapshot = Arc<HashMap<TaskId, Task>>;

type Callback = Arc<dyn Fn(&Snapshot) + Send + Sync>;
type SubscriberMap = Mutex<HashMap<u64, Callback>>;

/// Versioned task map with atomic replacement and subscriber fan-out.
pub struct SnapshotStore {
    state: Mutex<Snapshot>,
    subscribers: Arc<SubscriberMap>,
    next_subscriber: AtomicU64,
    watch_tx: watch::Sender<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let initial: Snapshot = Arc::new(HashMap::new());
        let (watch_tx, _) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(initial),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(0),
            watch_tx,
        }
    }

    /// Returns the current snapshot. Never blocks on writers for longer
    /// than the pointer swap.
    pub fn read(&self) -> Snapshot {
        self.state.lock().unwrap().clone()
    }

    /// Atomically replaces the map with `f(current)` and notifies
    /// subscribers with the new snapshot.
    pub fn update(
        &self,
        f: impl FnOnce(&HashMap<TaskId, Task>) -> HashMap<TaskId, Task>,
    ) -> Snapshot {
        let committed: Result<Snapshot, std::convert::Infallible> =
            self.try_update(|tasks| Ok(f(tasks)));
        match committed {
            Ok(snapshot) => snapshot,
            Err(never) => match never {},
        }
    }

    /// Like [`update`](Self::update), but the closure may refuse the write.
    ///
    /// Check and replacement run under one critical section, so this is the
    /// compare-and-set primitive: on `Err` the store is untouched and nobody
    /// is notified.
    pub fn try_update<E>(
        &self,
        f: impl FnOnce(&HashMap<TaskId, Task>) -> Result<HashMap<TaskId, Task>, E>,
    ) -> Result<Snapshot, E> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let next = Arc::new(f(&**state)?);
            *state = next.clone();
            next
        };
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Compare-and-set of a single entry.
    ///
    /// `f` receives the current value for `id` (or `None`) and either
    /// produces the replacement or refuses with an error, all under one
    /// critical section. Returns the committed task and the new snapshot.
    pub fn try_amend_task<E>(
        &self,
        id: &TaskId,
        f: impl FnOnce(Option<&Task>) -> Result<Task, E>,
    ) -> Result<(Task, Snapshot), E> {
        let (task, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let next_task = f(state.get(id))?;
            let mut next = (**state).clone();
            next.insert(id.clone(), next_task.clone());
            let next = Arc::new(next);
            *state = next.clone();
            (next_task, next)
        };
        self.notify(&snapshot);
        Ok((task, snapshot))
    }

    /// Read-modify-write of a single entry against the current snapshot.
    ///
    /// Returning `None` from `f` (or an absent `id`) leaves the store
    /// untouched and skips notification.
    pub fn amend_task(
        &self,
        id: &TaskId,
        f: impl FnOnce(&Task) -> Option<Task>,
    ) -> Option<Snapshot> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let next_task = f(state.get(id)?)?;
            let mut next = (**state).clone();
            next.insert(id.clone(), next_task);
            let next = Arc::new(next);
            *state = next.clone();
            next
        };
        self.notify(&snapshot);
        Some(snapshot)
    }

    /// Registers a callback invoked after every successful write.
    ///
    /// Callbacks run outside all store locks, so they may freely call
    /// `read`, `update`, or unsubscribe. The subscription detaches when the
    /// returned handle is dropped.
    pub fn subscribe(&self, callback: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Arc::new(callback));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Returns a watch receiver carrying the latest snapshot, for reactive
    /// consumers that want to await changes rather than register callbacks.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.watch_tx.subscribe()
    }

    fn notify(&self, snapshot: &Snapshot) {
        self.watch_tx.send_replace(snapshot.clone());
        let callbacks: Vec<Callback> = self.subscribers.lock().unwrap().values().cloned().collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered store callback.
///
/// Unsubscribes on drop; [`unsubscribe`](Self::unsubscribe) is idempotent
/// and safe to call from inside a callback.
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberMap>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().unwrap().remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
