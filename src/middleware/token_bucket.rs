//! Token bucket with discrete refills.
//!
//! The bucket holds at most `capacity` tokens and gains `refill` tokens at
//! the end of every `period`. Refills happen on the period grid anchored at
//! creation, so a cold bucket of capacity N refilling N per second grants
//! at most N tokens in any one-second window.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
///
/// Acquisition is atomic: one token is never granted to two callers.
pub struct TokenBucket {
    capacity: u64,
    refill: u64,
    period: Duration,
    state: Mutex<BucketState>,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill", &self.refill)
            .field("period", &self.period)
            .field("available", &self.available())
            .finish()
    }
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// # Arguments
    /// * `capacity` - Maximum tokens held. If 0, no acquisition ever succeeds.
    /// * `refill` - Tokens added per period (0 = tokens deplete permanently)
    /// * `period` - Refill interval (zero is treated as one millisecond)
    pub fn new(capacity: u64, refill: u64, period: Duration) -> Self {
        Self {
            capacity,
            refill,
            period: period.max(Duration::from_millis(1)),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// `rate` tokens per second with a burst of `rate`.
    pub fn per_second(rate: u64) -> Self {
        Self::new(rate, rate, Duration::from_secs(1))
    }

    /// Try to take one token.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }

    /// Tokens currently available.
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Time until the next refill adds tokens (zero if tokens are available).
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens > 0 {
            return Duration::ZERO;
        }
        (state.last_refill + self.period).saturating_duration_since(now)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if self.refill == 0 {
            return;
        }
        let elapsed = now.saturating_duration_since(state.last_refill);
        let periods = elapsed.as_nanos() / self.period.as_nanos();
        if periods == 0 {
            return;
        }

        let added = (periods.min(u64::MAX as u128) as u64).saturating_mul(self.refill);
        state.tokens = state.tokens.saturating_add(added).min(self.capacity);
        let advance = self.period.as_nanos().saturating_mul(periods);
        state.last_refill += Duration::from_nanos(advance.min(u64::MAX as u128) as u64);
    }
}
