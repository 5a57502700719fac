// Single-flight request deduplication.
//
// Concurrent callers asking for the same key share one in-flight call and
// observe the same outcome, success or failure. The pending entry is looked up
// and inserted under one DashMap shard lock, so two callers can never both
// decide to start a call. The call runs as its own task and removes its entry
// once it settles, even if every caller has given up waiting.

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error};

use crate::error::GatewayError;

type SharedResult<V> = Shared<BoxFuture<'static, Result<V, GatewayError>>>;

pub struct Deduplicator<V> {
    pending: Arc<DashMap<String, SharedResult<V>>>,
    started: AtomicU64,
    joined: AtomicU64,
}

impl<V> Default for Deduplicator<V> {
    fn default() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }
}

// Removes the pending entry when the in-flight call finishes or unwinds.
struct PendingGuard<V> {
    pending: Arc<DashMap<String, SharedResult<V>>>,
    key: String,
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

impl<V: Clone + Send + Sync + 'static> Deduplicator<V> {
    pub fn new() -> Self {
        Self::default()
    }

    // `producer` is only invoked when no call for `key` is in flight. It runs
    // while the map shard is locked, so it must only build the future and not
    // touch this deduplicator synchronously. Must be called within a tokio
    // runtime.
    pub async fn dedupe<F, Fut>(&self, key: &str, producer: F) -> Result<V, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GatewayError>> + Send + 'static,
    {
        let shared = match self.pending.entry(key.to_string()) {
            Entry::Occupied(in_flight) => {
                self.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key, "joining in-flight request");
                in_flight.get().clone()
            }
            Entry::Vacant(slot) => {
                // release the shard before unwinding, nothing was registered
                let request = match panic::catch_unwind(AssertUnwindSafe(producer)) {
                    Ok(request) => request,
                    Err(payload) => {
                        drop(slot);
                        panic::resume_unwind(payload);
                    }
                };
                self.started.fetch_add(1, Ordering::Relaxed);

                let guard = PendingGuard {
                    pending: self.pending.clone(),
                    key: key.to_string(),
                };
                let task = tokio::spawn(async move {
                    let _guard = guard;
                    request.await
                });

                let owned_key = key.to_string();
                let shared = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(join_error) => {
                            error!(key = %owned_key, error = %join_error, "in-flight request panicked");
                            Err(GatewayError::Unknown("in-flight request panicked".into()))
                        }
                    }
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                shared
            }
        };

        shared.await
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    // Number of calls that actually invoked their producer.
    pub fn started_count(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    // Number of calls that piggybacked on an in-flight request.
    pub fn joined_count(&self) -> u64 {
        self.joined.load(Ordering::Relaxed)
    }
}
