//! Fire-and-forget persistence with one ordered write lane per key.
//!
//! Mutations update in-memory state and then hand a snapshot to
//! [`PersistWriter::persist`], which returns immediately. Each key has its own
//! background task draining an unbounded channel, so writes to the same key
//! land in the order they were issued and never interleave.
//!
//! Write failures are logged and counted; they never propagate back to the
//! code that issued the mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use tasksync_proto::codec;

use super::KvStore;

/// A queued operation on one key's lane.
#[derive(Debug)]
enum WriteOp {
    /// Store this encoded value.
    Put(String),
    /// Remove the key.
    Delete,
    /// Signal once every earlier op on this lane has completed.
    Flush(oneshot::Sender<()>),
}

/// Serializes writes per key onto background tasks.
///
/// Lanes are spawned lazily on the first write to a key, on the current
/// Tokio runtime. A write issued with no runtime available is dropped and
/// counted in [`failure_count`](Self::failure_count).
pub struct PersistWriter<S: KvStore + 'static> {
    store: Arc<S>,
    lanes: Mutex<HashMap<String, mpsc::UnboundedSender<WriteOp>>>,
    failures: Arc<AtomicU64>,
}

impl<S: KvStore + 'static> PersistWriter<S> {
    /// Creates a writer over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lanes: Mutex::new(HashMap::new()),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The backing store, for reads.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of writes that have failed since creation.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Encodes `value` now and queues it for storage under `key`.
    ///
    /// Returns without waiting for the write.
    pub fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match codec::encode(value) {
            Ok(text) => self.submit(key, WriteOp::Put(text)),
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %err, "failed to encode value for persistence");
            }
        }
    }

    /// Queues removal of `key`.
    pub fn remove(&self, key: &str) {
        self.submit(key, WriteOp::Delete);
    }

    /// Waits until every write queued so far has completed.
    pub async fn flush(&self) {
        let pending: Vec<oneshot::Receiver<()>> = {
            let lanes = self.lanes.lock();
            lanes
                .values()
                .filter_map(|tx| {
                    let (done_tx, done_rx) = oneshot::channel();
                    tx.send(WriteOp::Flush(done_tx)).ok().map(|()| done_rx)
                })
                .collect()
        };
        for done in pending {
            let _ = done.await;
        }
    }

    fn submit(&self, key: &str, op: WriteOp) {
        let mut lanes = self.lanes.lock();
        let op = match lanes.get(key) {
            Some(tx) => match tx.send(op) {
                Ok(()) => return,
                Err(mpsc::error::SendError(op)) => {
                    // The lane task is gone (runtime shut down under it); start a fresh one.
                    tracing::debug!(key, "persistence lane closed, respawning");
                    lanes.remove(key);
                    op
                }
            },
            None => op,
        };
        let Some(tx) = self.spawn_lane(key) else {
            return;
        };
        let _ = tx.send(op);
        lanes.insert(key.to_string(), tx);
    }

    /// Starts the background task for `key`'s lane.
    ///
    /// Outside a Tokio runtime there is nothing to run it on; the write is
    /// dropped and counted as a failure instead.
    fn spawn_lane(&self, key: &str) -> Option<mpsc::UnboundedSender<WriteOp>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key, "no async runtime, write dropped");
            return None;
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        let store = Arc::clone(&self.store);
        let failures = Arc::clone(&self.failures);
        let key = key.to_string();
        runtime.spawn(async move {
            while let Some(op) = rx.recv().await {
                let result = match op {
                    WriteOp::Put(text) => store.set(&key, text).await,
                    WriteOp::Delete => store.delete(&key).await,
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                if let Err(err) = result {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %err, "persistence write failed");
                }
            }
        });
        Some(tx)
    }
}
