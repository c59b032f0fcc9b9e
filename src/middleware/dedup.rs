//! Deduplication middleware
//!
//! Skips messages whose id was already seen within a time window.
//!
//! # Memory Behavior
//!
//! [`InMemoryDedupStore`] grows as new unique ids arrive. Expired entries are
//! purged every `cleanup_interval` operations, and by a [`DedupSweeper`]
//! thread when one is running.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::Message;

/// Storage for seen message ids.
pub trait DedupStore: Send + Sync {
    /// Atomically record `id` for `ttl` unless it is already recorded and not
    /// expired. Returns true if the id was newly marked.
    fn mark_if_absent(&self, id: &str, ttl: Duration) -> bool;

    /// Forget `id`.
    fn remove(&self, id: &str);

    /// Drop expired entries, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

/// Process-local [`DedupStore`].
pub struct InMemoryDedupStore {
    /// id -> expiry
    seen: Mutex<HashMap<String, Instant>>,
    ops_since_cleanup: AtomicU32,
    /// Purge every N operations (minimum 1)
    cleanup_interval: u32,
}

impl Default for InMemoryDedupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDedupStore {
    /// Store purging every 1000 operations.
    pub fn new() -> Self {
        Self::with_cleanup_interval(1000)
    }

    pub fn with_cleanup_interval(cleanup_interval: u32) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ops_since_cleanup: AtomicU32::new(0),
            cleanup_interval: cleanup_interval.max(1),
        }
    }

    /// Tracked ids, expired or not.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Start a thread that purges expired entries every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> io::Result<DedupSweeper> {
        let store = Arc::clone(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("relaybus-dedup-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            trace!(purged, "dedup sweeper purged expired ids");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(DedupSweeper {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn maybe_cleanup(&self) {
        let ops = self.ops_since_cleanup.fetch_add(1, Ordering::Relaxed);
        if ops + 1 >= self.cleanup_interval
            && self
                .ops_since_cleanup
                .compare_exchange(ops + 1, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.purge_expired();
        }
    }
}

impl DedupStore for InMemoryDedupStore {
    fn mark_if_absent(&self, id: &str, ttl: Duration) -> bool {
        self.maybe_cleanup();

        let now = Instant::now();
        let mut seen = self.seen.lock();
        #[allow(clippy::collapsible_if)]
        if let Some(expiry) = seen.get(id) {
            if *expiry > now {
                return false;
            }
        }
        seen.insert(id.to_string(), now + ttl);
        true
    }

    fn remove(&self, id: &str) {
        self.seen.lock().remove(id);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, expiry| *expiry > now);
        before - seen.len()
    }
}

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct DedupSweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DedupSweeper {
    /// Stop the sweeper and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DedupSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// When a mark is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupMode {
    /// Keep the mark from the moment the message is received.
    MarkOnReceive,
    /// Remove the mark if the inner call fails or panics, so a redelivery is
    /// processed again.
    #[default]
    ReleaseOnFailure,
}

/// Skips messages already seen within `ttl`.
///
/// Skipped duplicates return `Ok(())` and are acknowledged by the adapter.
#[derive(Clone)]
pub struct Deduplication {
    store: Arc<dyn DedupStore>,
    ttl: Duration,
    mode: DedupMode,
    dropped: Arc<AtomicU64>,
}

impl Deduplication {
    pub fn new(store: Arc<dyn DedupStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            mode: DedupMode::default(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deduplication over a fresh [`InMemoryDedupStore`].
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryDedupStore::new()), ttl)
    }

    pub fn with_mode(mut self, mode: DedupMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DedupMode {
        self.mode
    }

    /// Duplicates skipped so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Releases the mark unless disarmed.
struct Release<'a> {
    store: &'a dyn DedupStore,
    id: &'a str,
    armed: bool,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.remove(self.id);
        }
    }
}

impl Middleware for Deduplication {
    fn name(&self) -> &'static str {
        "deduplication"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let store = Arc::clone(&self.store);
        let ttl = self.ttl;
        let mode = self.mode;
        let dropped = Arc::clone(&self.dropped);
        Arc::new(move |ctx: &Context, msg: &Message| {
            if !store.mark_if_absent(&msg.id, ttl) {
                dropped.fetch_add(1, Ordering::Relaxed);
                debug!(id = %msg.id, "duplicate message skipped");
                return Ok(());
            }

            if mode == DedupMode::MarkOnReceive {
                return next(ctx, msg);
            }

            let mut release = Release {
                store: store.as_ref(),
                id: &msg.id,
                armed: true,
            };
            let result = next(ctx, msg);
            release.armed = result.is_err();
            result
        })
    }
}
