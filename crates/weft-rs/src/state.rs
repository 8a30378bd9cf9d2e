//! Run-scoped shared state: loop counters and pending-item queues.
//!
//! [`SharedState`] is the only mutable structure shared across a run. It is
//! passed explicitly through [`ActionProps`](crate::action::ActionProps) and
//! only ever appended to or overwritten per key.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio::sync::Notify;

/// Status of a named loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopStatus {
    NotRunning,
    /// Zero-based index of the iteration currently being produced.
    Iteration(usize),
}

// Serialized as `false` or the iteration number.
impl Serialize for LoopStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LoopStatus::NotRunning => serializer.serialize_bool(false),
            LoopStatus::Iteration(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

/// Plain snapshot of the run state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct State {
    pub loops: BTreeMap<String, LoopStatus>,
    pub queue: BTreeMap<String, Vec<Value>>,
}

/// Handle to the state of one run. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<State>>,
    changed: Arc<Notify>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the status of loop `id`.
    pub fn set_loop(&self, id: &str, status: LoopStatus) {
        self.lock().loops.insert(id.to_string(), status);
    }

    pub fn loop_status(&self, id: &str) -> Option<LoopStatus> {
        self.lock().loops.get(id).copied()
    }

    /// Iteration index of `loop_id` if it is running, otherwise 0.
    pub fn current_iteration(&self, loop_id: Option<&str>) -> usize {
        match loop_id.and_then(|id| self.loop_status(id)) {
            Some(LoopStatus::Iteration(i)) => i,
            _ => 0,
        }
    }

    /// Append an item to the queue under `key` and wake any waiters.
    pub fn push_queue(&self, key: &str, item: impl Into<Value>) {
        self.lock()
            .queue
            .entry(key.to_string())
            .or_default()
            .push(item.into());
        self.changed.notify_waiters();
    }

    pub fn queue_item(&self, key: &str, index: usize) -> Option<Value> {
        self.lock()
            .queue
            .get(key)
            .and_then(|items| items.get(index))
            .cloned()
    }

    pub fn queue_len(&self, key: &str) -> usize {
        self.lock().queue.get(key).map_or(0, Vec::len)
    }

    /// Wait until `queue[key][index]` exists and return it.
    pub async fn wait_for_item(&self, key: &str, index: usize) -> Value {
        loop {
            let mut notified = std::pin::pin!(self.changed.notified());
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();
            if let Some(item) = self.queue_item(key, index) {
                return item;
            }
            notified.await;
        }
    }

    pub fn snapshot(&self) -> State {
        self.lock().clone()
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedState").field(&*self.lock()).finish()
    }
}
