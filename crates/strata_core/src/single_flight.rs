//! # Single-Flight Loading
//!
//! Coalesces concurrent loads of the same key into one execution of the
//! slow path.
//!
//! ```text
//!   load(key) ──► cache hit? ──yes──► value
//!                    │ no
//!                    ▼
//!            gate table (locked)
//!       ┌────────────┼──────────────────┐
//!   gate exists   cache hit now     no gate: create one
//!       │            │                  │
//!     wait         value           spawn slow path
//!       │                           insert into cache
//!   gate removed                    remove gate, then wake waiters
//!       │
//!   start over
//! ```
//!
//! A key is either absent or in flight; in-flight keys have exactly one gate.
//! The gate is removed from the table before its waiters are woken, and the
//! value is in the cache before the gate is removed, so a woken waiter always
//! finds either the value or (after a failure) no gate at all.
//!
//! ## Cancellation
//!
//! The slow path runs as its own tokio task. A cancelled caller stops waiting
//! and gets [`WorldError::Cancelled`], but a slow path that has started keeps
//! running, caches its result and wakes any other waiters.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cancel::CancelToken;
use crate::coords::{Bounds, TreePoint};
use crate::error::{WorldError, WorldResult};
use crate::tree::SparseTree;

/// Open gates by key. A gate closes when its sender is dropped.
type GateTable<P> = Mutex<HashMap<P, watch::Receiver<()>>>;

/// Outcome of trying to enter the gate table.
enum Admission<P: TreePoint, V> {
    /// The value landed in the cache since the first check.
    Ready(V),
    /// Someone else is loading; wait for their gate to close.
    Wait(watch::Receiver<()>),
    /// This caller owns the gate and must run the slow path.
    Lead(Ticket<P>),
}

/// Ownership of one open gate. Dropping it removes the gate, then wakes
/// the waiters, both under the table lock.
struct Ticket<P: TreePoint> {
    gates: Arc<GateTable<P>>,
    key: P,
    tx: Option<watch::Sender<()>>,
}

impl<P: TreePoint> Drop for Ticket<P> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        gates.remove(&self.key);
        drop(self.tx.take());
    }
}

/// A cache tree plus the per-key gates that guard its misses.
pub struct SingleFlight<P: TreePoint, V> {
    cache: Arc<SparseTree<P, V>>,
    gates: Arc<GateTable<P>>,
}

impl<P: TreePoint, V> Clone for SingleFlight<P, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            gates: Arc::clone(&self.gates),
        }
    }
}

impl<P, V> SingleFlight<P, V>
where
    P: TreePoint,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader with an empty cache over `bounds`.
    #[must_use]
    pub fn new(bounds: Bounds<P>) -> Self {
        Self::with_cache(Arc::new(SparseTree::new(bounds)))
    }

    /// Creates a loader over an existing cache.
    #[must_use]
    pub fn with_cache(cache: Arc<SparseTree<P, V>>) -> Self {
        Self {
            cache,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The cache tree.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<SparseTree<P, V>> {
        &self.cache
    }

    /// Number of keys currently being loaded.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.gates.lock().len()
    }

    /// Returns the cached value for `key`, running `slow_path` at most once
    /// across all concurrent callers if it is missing.
    ///
    /// `slow_path` is only called if this caller ends up owning the gate.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`WorldError::OutOfRange`] if `key` is outside the cache domain
    /// - [`WorldError::Cancelled`] if `cancel` fires before a value is available
    /// - whatever the slow path returns, for the caller that ran it
    /// - [`WorldError::DuplicateKey`] for the caller that ran the slow path if
    ///   the key was inserted into the cache behind the loader's back
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the slow path in the caller that ran it.
    pub async fn load<F, Fut>(&self, key: P, cancel: &CancelToken, slow_path: F) -> WorldResult<V>
    where
        F: FnOnce(P) -> Fut + Send,
        Fut: Future<Output = WorldResult<V>> + Send + 'static,
    {
        let domain = self.cache.bounds();
        if !domain.contains(key) {
            return Err(WorldError::OutOfRange {
                coord: key.components(),
                min: domain.min.components(),
                max: domain.max.components(),
            });
        }

        let ticket = loop {
            if cancel.is_cancelled() {
                return Err(WorldError::Cancelled);
            }
            if let Some(value) = self.cache.try_get(key) {
                return Ok(value);
            }

            match self.admit(key) {
                Admission::Ready(value) => return Ok(value),
                Admission::Lead(ticket) => break ticket,
                Admission::Wait(mut gate) => {
                    tokio::select! {
                        // closed, successfully or not: look again
                        _ = gate.changed() => {}
                        () = cancel.cancelled() => return Err(WorldError::Cancelled),
                    }
                }
            }
        };

        let work = slow_path(key);
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            let _ticket = ticket;
            let value = match work.await {
                Ok(value) => value,
                Err(err) => {
                    tracing::debug!("Slow path failed for {:?}: {}", key, err);
                    return Err(err);
                }
            };

            if let Err(err) = cache.insert(key, value.clone()) {
                // the cached value stays; waiters pick it up after the gate closes
                tracing::warn!("Loaded {:?} but the cache already holds it: {}", key, err);
                return Err(err);
            }
            Ok(value)
        });

        tokio::select! {
            joined = handle => match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(WorldError::Cancelled),
            },
            () = cancel.cancelled() => Err(WorldError::Cancelled),
        }
    }

    fn admit(&self, key: P) -> Admission<P, V> {
        let mut gates = self.gates.lock();

        if let Some(gate) = gates.get(&key) {
            return Admission::Wait(gate.clone());
        }
        // A load may have finished between the first cache check and here.
        if let Some(value) = self.cache.try_get(key) {
            return Admission::Ready(value);
        }

        let (tx, rx) = watch::channel(());
        gates.insert(key, rx);
        Admission::Lead(Ticket {
            gates: Arc::clone(&self.gates),
            key,
            tx: Some(tx),
        })
    }
}

impl<P: TreePoint, V> fmt::Debug for SingleFlight<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("cache", &self.cache)
            .field("in_flight", &self.gates.lock().len())
            .finish()
    }
}
