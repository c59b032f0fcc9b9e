//! Cancellation context passed to every handler call.
//!
//! A `Context` is a cheap, cloneable cancellation signal. Cancelling any
//! clone cancels all of them; children created with [`Context::child`] are
//! cancelled when their parent is, but cancelling a child leaves the parent
//! running.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Signal {
    cancelled: Mutex<bool>,
    cond: Condvar,
    /// Children are held weakly; dropped ones are pruned on registration.
    children: Mutex<Vec<Weak<Signal>>>,
}

impl Signal {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        {
            let mut cancelled = self.cancelled.lock();
            if *cancelled {
                return;
            }
            *cancelled = true;
            self.cond.notify_all();
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cancellation context.
///
/// ## Example
///
/// ```
/// use relaybus::Context;
/// use std::time::Duration;
///
/// let ctx = Context::new();
/// let child = ctx.child();
/// ctx.cancel();
/// assert!(child.is_cancelled());
/// assert!(child.wait_timeout(Duration::from_secs(1)));
/// ```
#[derive(Clone)]
pub struct Context {
    signal: Arc<Signal>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Context {
    /// Create a new, uncancelled context.
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    /// Create a child context that is cancelled together with `self`.
    pub fn child(&self) -> Self {
        let child = Arc::new(Signal::new());
        // Hold the parent's flag while registering so a concurrent cancel
        // cannot slip between the check and the push.
        let cancelled = self.signal.cancelled.lock();
        if *cancelled {
            drop(cancelled);
            child.cancel();
        } else {
            let mut children = self.signal.children.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        Self { signal: child }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.signal.cancelled.lock()
    }

    /// Block until the context is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.signal.cancelled.lock();
        while !*cancelled {
            self.signal.cond.wait(&mut cancelled);
        }
    }

    /// Block for at most `timeout`. Returns `true` if the context was
    /// cancelled, `false` if the timeout elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.signal.cancelled.lock();
        while !*cancelled {
            if self
                .signal
                .cond
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return *cancelled;
            }
        }
        true
    }
}

#[cfg(test)]
impl Context {
    /// Child registrations currently held, live or not yet pruned.
    pub(crate) fn retained_children(&self) -> usize {
        self.signal.children.lock().len()
    }

    /// Registered children still referenced somewhere.
    pub(crate) fn live_children(&self) -> usize {
        self.signal
            .children
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
