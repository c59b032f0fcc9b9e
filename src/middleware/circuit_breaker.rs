//! Circuit breaker middleware
//!
//! Fails fast while a handler keeps failing, then lets a single probe call
//! through once the reset timeout has elapsed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::Middleware;
use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::Message;

/// Circuit breaker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through
    Closed,
    /// Calls fail fast with `HandlerError::CircuitOpen`
    Open,
    /// One probe call is allowed to test recovery
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time to wait before transitioning from Open to HalfOpen
    pub reset_timeout: Duration,
    /// Concurrent probe calls allowed in HalfOpen
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_calls: u32,
    /// Bumped on every transition; results admitted under an older
    /// generation are ignored.
    generation: u64,
}

struct Inner {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    open_count: AtomicU64,
    rejected_count: AtomicU64,
}

/// Shared circuit breaker.
///
/// Clones share state, so a breaker can be installed as middleware and still
/// be inspected from elsewhere.
///
/// A call's outcome only counts if no transition happened since it was
/// admitted; in half-open only the admitted probe decides.
///
/// ```
/// use std::time::Duration;
/// use relaybus::middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Middleware};
/// use relaybus::{handler_fn, Context, HandlerError, Message};
///
/// let breaker = CircuitBreaker::new(
///     "billing",
///     CircuitBreakerConfig { failure_threshold: 1, reset_timeout: Duration::from_secs(60), ..Default::default() },
/// );
/// let handler = breaker.wrap(handler_fn(|_, _| Err(HandlerError::Rejected("down".into()))));
/// let _ = handler(&Context::new(), &Message::new(Vec::new()));
/// assert_eq!(breaker.state(), CircuitState::Open);
/// ```
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker. `name` appears in transition logs.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(BreakerState {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    half_open_calls: 0,
                    generation: 0,
                }),
                open_count: AtomicU64::new(0),
                rejected_count: AtomicU64::new(0),
            }),
        }
    }

    /// Create a breaker with default configuration
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Current state. An open circuit whose reset timeout has elapsed reports
    /// `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let mut state = self.inner.state.lock();
        self.refresh(&mut state);
        state.state
    }

    /// Consecutive failures counted while closed.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.state.lock().consecutive_failures
    }

    /// Times the circuit has opened
    pub fn open_count(&self) -> u64 {
        self.inner.open_count.load(Ordering::Relaxed)
    }

    /// Calls short-circuited without invoking the handler
    pub fn rejected_count(&self) -> u64 {
        self.inner.rejected_count.load(Ordering::Relaxed)
    }

    fn refresh(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        #[allow(clippy::collapsible_if)]
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() >= self.inner.config.reset_timeout {
                state.state = CircuitState::HalfOpen;
                state.half_open_calls = 0;
                state.generation += 1;
                info!(breaker = %self.inner.name, "circuit breaker transitioning to half-open");
            }
        }
    }

    /// Admit a call, returning the generation its result belongs to.
    fn try_acquire(&self) -> Option<u64> {
        let mut state = self.inner.state.lock();
        self.refresh(&mut state);

        let allowed = match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if state.half_open_calls < self.inner.config.half_open_max_calls.max(1) {
                    state.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        };
        if !allowed {
            self.inner.rejected_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(state.generation)
    }

    fn is_stale(&self, state: &BreakerState, generation: u64) -> bool {
        let stale = state.generation != generation;
        if stale {
            debug!(
                breaker = %self.inner.name,
                admitted = generation,
                current = state.generation,
                "ignoring result admitted before the last transition"
            );
        }
        stale
    }

    fn record_success(&self, generation: u64) {
        let mut state = self.inner.state.lock();
        if self.is_stale(&state, generation) {
            return;
        }
        state.consecutive_failures = 0;
        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            state.half_open_calls = 0;
            state.opened_at = None;
            state.generation += 1;
            info!(breaker = %self.inner.name, "circuit breaker closed - handler recovered");
        }
    }

    fn record_failure(&self, generation: u64) {
        let mut state = self.inner.state.lock();
        if self.is_stale(&state, generation) {
            return;
        }
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.inner.config.failure_threshold {
                    self.open(&mut state);
                    warn!(
                        breaker = %self.inner.name,
                        failures = state.consecutive_failures,
                        "circuit breaker opened - too many failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.open(&mut state);
                warn!(breaker = %self.inner.name, "circuit breaker re-opened - probe failed");
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        state.opened_at = Some(Instant::now());
        state.half_open_calls = 0;
        state.generation += 1;
        self.inner.open_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Records a failure if the inner call unwinds before reporting.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    done: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.record_failure(self.generation);
        }
    }
}

impl Middleware for CircuitBreaker {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let breaker = self.clone();
        Arc::new(move |ctx: &Context, msg: &Message| {
            let Some(generation) = breaker.try_acquire() else {
                debug!(breaker = %breaker.inner.name, id = %msg.id, "circuit open, call short-circuited");
                return Err(HandlerError::CircuitOpen);
            };

            let mut guard = CallGuard {
                breaker: &breaker,
                generation,
                done: false,
            };
            let result = next(ctx, msg);
            guard.done = true;
            match &result {
                Ok(()) => breaker.record_success(generation),
                Err(_) => breaker.record_failure(generation),
            }
            result
        })
    }
}
