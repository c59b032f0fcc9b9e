//! Priority admission middleware.
//!
//! Limits concurrent executions to a number of slots. When deliveries queue
//! up for a slot, the one with the highest priority is admitted first, and
//! equal priorities are admitted in arrival order. Priority only reorders
//! deliveries that are waiting at the same time, so it is a scheduling hint
//! rather than a global ordering guarantee.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::Middleware;
use crate::context::Context;
use crate::error::HandlerError;
use crate::events::EventRegistry;
use crate::handler::Handler;
use crate::message::Message;

type PriorityFn = Arc<dyn Fn(&Message) -> i64 + Send + Sync>;

/// How often a waiting delivery re-checks its context for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, PartialEq, Eq)]
struct Waiter {
    priority: i64,
    seq: u64,
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on priority, then earliest arrival.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Queue {
    running: usize,
    next_seq: u64,
    waiting: BinaryHeap<Waiter>,
}

struct Scheduler {
    slots: usize,
    queue: Mutex<Queue>,
    cond: Condvar,
}

impl Scheduler {
    fn admit(self: &Arc<Self>, priority: i64, ctx: &Context) -> Result<Permit, HandlerError> {
        let mut queue = self.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.waiting.push(Waiter { priority, seq });

        loop {
            let at_front = queue.waiting.peek().map(|w| w.seq) == Some(seq);
            if at_front && queue.running < self.slots {
                queue.waiting.pop();
                queue.running += 1;
                // The next waiter may also fit into a free slot.
                self.cond.notify_all();
                return Ok(Permit {
                    scheduler: Arc::clone(self),
                });
            }
            if ctx.is_cancelled() {
                queue.waiting.retain(|w| w.seq != seq);
                self.cond.notify_all();
                return Err(HandlerError::Cancelled);
            }
            self.cond.wait_for(&mut queue, CANCEL_POLL);
        }
    }
}

struct Permit {
    scheduler: Arc<Scheduler>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut queue = self.scheduler.queue.lock();
        queue.running -= 1;
        self.scheduler.cond.notify_all();
    }
}

/// Admits deliveries into `slots` concurrent executions by priority.
///
/// All handlers wrapped by the same `Priority` share its slots.
#[derive(Clone)]
pub struct Priority {
    priority: PriorityFn,
    scheduler: Arc<Scheduler>,
}

impl Priority {
    /// Score messages with `priority`; higher runs first.
    pub fn new<F>(priority: F, slots: usize) -> Self
    where
        F: Fn(&Message) -> i64 + Send + Sync + 'static,
    {
        Self {
            priority: Arc::new(priority),
            scheduler: Arc::new(Scheduler {
                slots: slots.max(1),
                queue: Mutex::new(Queue::default()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Read the priority from a numeric metadata value (missing or invalid = 0).
    pub fn from_metadata(key: impl Into<String>, slots: usize) -> Self {
        let key = key.into();
        Self::new(
            move |msg: &Message| msg.meta(&key).and_then(|v| v.parse().ok()).unwrap_or(0),
            slots,
        )
    }

    /// Use the configured priority of the message's event type.
    pub fn from_registry(registry: Arc<EventRegistry>, slots: usize) -> Self {
        Self::new(
            move |msg: &Message| {
                msg.event_type()
                    .and_then(|event_type| registry.event_config(event_type))
                    .map(|config| config.priority)
                    .unwrap_or(0)
            },
            slots,
        )
    }

    /// Deliveries currently waiting for a slot.
    pub fn pending(&self) -> usize {
        self.scheduler.queue.lock().waiting.len()
    }
}

impl Middleware for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let priority = Arc::clone(&self.priority);
        let scheduler = Arc::clone(&self.scheduler);
        Arc::new(move |ctx: &Context, msg: &Message| {
            let score = priority(msg);
            let _permit = scheduler.admit(score, ctx)?;
            trace!(id = %msg.id, priority = score, "priority slot acquired");
            next(ctx, msg)
        })
    }
}
