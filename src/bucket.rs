use std::sync::Arc;

use likely_stable::unlikely;
use parking_lot::Mutex;

use crate::clock::{Clock, StdClock};

/// Starting balance of an auto-created bucket.
pub const DEFAULT_STARTING_TOKENS: f64 = 0.0;
/// Capacity of an auto-created bucket.
pub const DEFAULT_MAX_TOKENS: f64 = 10.0;
/// Replenish rate (tokens per second) of an auto-created bucket.
pub const DEFAULT_REPLENISH_RATE: f64 = 1.0;

/// Read-only view of a bucket, handed to the exhaustion callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Current balance. Zero inside an exhaustion callback.
    pub tokens: f64,
    /// Capacity ceiling.
    pub max_tokens: f64,
    /// Balance the bucket returns to on [`TokenBucket::reset`].
    pub starting_tokens: f64,
    /// Tokens replenished per second of elapsed time.
    pub replenish_rate: f64,
    /// Tokens removed over the bucket's lifetime, including the partial
    /// drains of failed consume calls.
    pub total_consumed: f64,
}

/// Callback invoked when a consume request cannot be fully satisfied.
///
/// Called synchronously on the consuming thread, after every lock has been
/// released, at most once per failed consume call. The callback may be slow
/// and may freely call back into the bucket or its registry.
pub type ExhaustedCallback = Arc<dyn Fn(&BucketSnapshot) + Send + Sync + 'static>;

/// Mutable fields, guarded by the bucket's own mutex.
struct State {
    tokens: f64,
    total_consumed: f64,
    last_update: f64,
}

/// A token bucket rate limiter with a configurable clock implementation.
///
/// The bucket holds a balance that replenishes continuously over time at
/// `replenish_rate` tokens per second, up to `max_tokens`. [`consume`]
/// draws the balance down; when a request exceeds the balance, the
/// remainder is drained, the optional exhaustion callback fires, and the
/// call reports failure.
///
/// All operations take `&self`; the mutable state sits behind an internal
/// mutex, so a bucket can be shared across threads as-is (or through an
/// `Arc` when handed out by a registry).
///
/// # Type Parameters
///
/// - `C`: Clock implementation (default: [`StdClock`])
///
/// # Examples
///
/// ```rust
/// use granary::TokenBucket;
///
/// // 5 tokens now, capacity 10, one new token per second
/// let bucket = TokenBucket::new(5.0, 10.0, 1.0);
///
/// assert!(bucket.consume(4.0));
/// assert!(!bucket.test(4.0));
/// ```
///
/// [`consume`]: Self::consume
pub struct TokenBucket<C = StdClock> {
    starting_tokens: f64,
    max_tokens: f64,
    replenish_rate: f64,
    auto_update: bool,
    on_exhausted: Option<ExhaustedCallback>,
    clock: C,
    state: Mutex<State>,
}

impl TokenBucket<StdClock> {
    /// Creates a new token bucket on the standard clock.
    ///
    /// # Arguments
    ///
    /// * `starting` - Initial balance, also the balance [`reset`] returns to
    /// * `max` - Capacity ceiling
    /// * `rate` - Tokens replenished per second
    ///
    /// # Examples
    ///
    /// ```rust
    /// use granary::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(0.0, 100.0, 25.0);
    /// ```
    ///
    /// [`reset`]: Self::reset
    pub fn new(starting: f64, max: f64, rate: f64) -> Self {
        Self::with_clock(starting, max, rate, StdClock::default())
    }
}

impl Default for TokenBucket<StdClock> {
    /// The bucket auto-created on unknown-key registry access: starts
    /// empty, holds up to 10 tokens, replenishes one per second.
    fn default() -> Self {
        Self::new(
            DEFAULT_STARTING_TOKENS,
            DEFAULT_MAX_TOKENS,
            DEFAULT_REPLENISH_RATE,
        )
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Creates a new token bucket with a custom clock implementation.
    ///
    /// Use this with `ManualClock` for deterministic tests, or with
    /// `FastClock` when consume sits on a hot path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use granary::{ManualClock, TokenBucket};
    ///
    /// let clock = Arc::new(ManualClock::new(0.0));
    /// let bucket = TokenBucket::with_clock(0.0, 10.0, 2.0, Arc::clone(&clock));
    ///
    /// clock.advance(3.0);
    /// assert_eq!(6.0, bucket.count());
    /// ```
    pub fn with_clock(starting: f64, max: f64, rate: f64, clock: C) -> Self {
        debug_assert!(max.is_finite() && max > 0.0);
        debug_assert!(rate.is_finite() && rate >= 0.0);
        debug_assert!(starting.is_finite() && starting >= 0.0 && starting <= max);
        let now = clock.now();
        Self {
            starting_tokens: starting,
            max_tokens: max,
            replenish_rate: rate,
            auto_update: true,
            on_exhausted: None,
            clock,
            state: Mutex::new(State {
                tokens: starting,
                total_consumed: 0.0,
                last_update: now,
            }),
        }
    }

    /// Attaches an exhaustion callback, builder style.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use granary::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(1.0, 10.0, 1.0)
    ///     .on_exhausted(|view| eprintln!("exhausted after {}", view.total_consumed));
    ///
    /// assert!(bucket.consume(1.0));
    /// assert!(!bucket.consume(5.0)); // callback fires here
    /// ```
    pub fn on_exhausted(self, callback: impl Fn(&BucketSnapshot) + Send + Sync + 'static) -> Self {
        self.with_exhausted_callback(Arc::new(callback))
    }

    /// Attaches an already-shared exhaustion callback.
    pub fn with_exhausted_callback(mut self, callback: ExhaustedCallback) -> Self {
        self.on_exhausted = Some(callback);
        self
    }

    /// Sets the auto-update policy, builder style.
    ///
    /// When on (the default), [`consume`](Self::consume) and
    /// [`count`](Self::count) apply replenishment before acting. When off,
    /// the balance only moves on explicit [`update`](Self::update) calls,
    /// e.g. from a timer-driven `BucketRegistry::manual_update`.
    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    /// Replenishes the balance for the time elapsed since the last update.
    ///
    /// Adds `elapsed_seconds * replenish_rate` tokens, clamped to
    /// `max_tokens`. Zero elapsed time is a no-op. There is no need to call
    /// this manually unless auto-update is disabled.
    pub fn update(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let elapsed = now - state.last_update;
        if elapsed <= 0.0 {
            return;
        }
        state.last_update = now;
        state.tokens = (state.tokens + elapsed * self.replenish_rate).min(self.max_tokens);
    }

    /// Consumes the given amount of tokens.
    ///
    /// Applies replenishment first (unless auto-update is off). If the
    /// balance covers `amount`, it is drawn down and the call returns
    /// `true`. Otherwise the *remaining* balance is drained into the
    /// total-consumed counter, the balance floors at zero, the exhaustion
    /// callback (if any) runs with a read-only snapshot, and the call
    /// returns `false`.
    ///
    /// Insufficient tokens are a routine outcome, not an error; nothing
    /// here panics.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use granary::{ManualClock, TokenBucket};
    ///
    /// let clock = Arc::new(ManualClock::new(0.0));
    /// let bucket = TokenBucket::with_clock(5.0, 10.0, 1.0, clock);
    ///
    /// assert!(bucket.consume(4.0));
    /// assert!(!bucket.consume(2.0)); // only one token left: drained, call fails
    /// assert_eq!(5.0, bucket.total_consumed());
    /// ```
    pub fn consume(&self, amount: f64) -> bool {
        debug_assert!(amount.is_finite() && amount >= 0.0);
        if self.auto_update {
            self.update();
        }
        let mut state = self.state.lock();
        if unlikely(state.tokens < amount) {
            // failed requests still drain what is left
            state.total_consumed += state.tokens;
            state.tokens = 0.0;
            let view = self.snapshot_of(&state);
            // the callback must never run under the bucket lock
            drop(state);
            if let Some(callback) = &self.on_exhausted {
                callback(&view);
            }
            return false;
        }
        state.tokens -= amount;
        state.total_consumed += amount;
        true
    }

    /// Consumes exactly one token. Equivalent to `consume(1.0)`.
    pub fn consume_one(&self) -> bool {
        self.consume(1.0)
    }

    /// Restores the given amount of tokens, clamped to `max_tokens`.
    ///
    /// Does not touch the total-consumed counter and never invokes the
    /// exhaustion callback.
    pub fn restore(&self, amount: f64) {
        debug_assert!(amount.is_finite() && amount >= 0.0);
        let mut state = self.state.lock();
        state.tokens = (state.tokens + amount).min(self.max_tokens);
    }

    /// Resets the balance to its starting value.
    ///
    /// The total-consumed counter and the replenishment timestamp are left
    /// untouched.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.starting_tokens;
    }

    /// Tests whether the balance covers `amount`, without side effects.
    ///
    /// No replenishment is applied; this reads the balance as of the last
    /// update.
    pub fn test(&self, amount: f64) -> bool {
        self.state.lock().tokens >= amount
    }

    /// Returns the current balance, applying replenishment first (unless
    /// auto-update is off).
    pub fn count(&self) -> f64 {
        if self.auto_update {
            self.update();
        }
        self.state.lock().tokens
    }

    /// Returns the total tokens consumed since the bucket was created.
    ///
    /// Monotonically non-decreasing; failed consume calls contribute the
    /// balance they drained. Not affected by [`reset`](Self::reset).
    pub fn total_consumed(&self) -> f64 {
        self.state.lock().total_consumed
    }

    /// Returns a coherent read-only view of the bucket.
    pub fn snapshot(&self) -> BucketSnapshot {
        let state = self.state.lock();
        self.snapshot_of(&state)
    }

    /// Returns the capacity ceiling.
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Returns the balance [`reset`](Self::reset) restores.
    pub fn starting_tokens(&self) -> f64 {
        self.starting_tokens
    }

    /// Returns the replenish rate in tokens per second.
    pub fn replenish_rate(&self) -> f64 {
        self.replenish_rate
    }

    fn snapshot_of(&self, state: &State) -> BucketSnapshot {
        BucketSnapshot {
            tokens: state.tokens,
            max_tokens: self.max_tokens,
            starting_tokens: self.starting_tokens,
            replenish_rate: self.replenish_rate,
            total_consumed: state.total_consumed,
        }
    }
}

impl<C: Clock + Clone> Clone for TokenBucket<C> {
    /// A copy keeps the balance, the total-consumed counter, the
    /// parameters and the callback, but its replenishment timestamp is
    /// re-stamped to "now": pending elapsed time does not carry over.
    fn clone(&self) -> Self {
        let state = self.state.lock();
        let clock = self.clock.clone();
        let now = clock.now();
        Self {
            starting_tokens: self.starting_tokens,
            max_tokens: self.max_tokens,
            replenish_rate: self.replenish_rate,
            auto_update: self.auto_update,
            on_exhausted: self.on_exhausted.clone(),
            clock,
            state: Mutex::new(State {
                tokens: state.tokens,
                total_consumed: state.total_consumed,
                last_update: now,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;

    fn bucket(
        clock: &Arc<ManualClock>,
        starting: f64,
        max: f64,
        rate: f64,
    ) -> TokenBucket<Arc<ManualClock>> {
        TokenBucket::with_clock(starting, max, rate, Arc::clone(clock))
    }

    #[test]
    fn exhaustion_scenario() {
        let clock = Arc::new(ManualClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let tb = bucket(&clock, 5.0, 10.0, 1.0).on_exhausted(move |view| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(0.0, view.tokens);
            assert_eq!(10.0, view.max_tokens);
        });

        assert!(tb.consume(4.0));
        assert_eq!(1.0, tb.count());
        assert_eq!(4.0, tb.total_consumed());
        assert_eq!(0, calls.load(Ordering::SeqCst));

        // zero elapsed time: only the remaining balance is drained
        assert!(!tb.consume(2.0));
        assert_eq!(0.0, tb.count());
        assert_eq!(5.0, tb.total_consumed());
        assert_eq!(1, calls.load(Ordering::SeqCst));

        // three simulated seconds at one token per second
        clock.advance(3.0);
        assert_eq!(3.0, tb.count());

        // restoring clamps at capacity
        tb.restore(20.0);
        assert_eq!(10.0, tb.count());
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn replenishment_is_linear() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 0.0, 100.0, 2.5);

        clock.advance(4.0);
        assert_eq!(10.0, tb.count());
        // no elapsed time, no movement
        assert_eq!(10.0, tb.count());
        clock.advance(0.5);
        assert_eq!(11.25, tb.count());
    }

    #[test]
    fn replenishment_clamps_at_capacity() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 5.0, 5.0, 1.0);

        clock.advance(1000.0);
        assert_eq!(5.0, tb.count());
        tb.restore(1.0);
        assert_eq!(5.0, tb.count());
    }

    #[test]
    fn failed_consume_drains_only_what_was_available() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 3.0, 10.0, 1.0);

        assert!(!tb.consume(7.0));
        assert_eq!(3.0, tb.total_consumed());
        assert_eq!(0.0, tb.count());

        // a second failure on an empty bucket adds nothing
        assert!(!tb.consume(1.0));
        assert_eq!(3.0, tb.total_consumed());
    }

    #[test]
    fn callback_fires_once_per_failed_consume() {
        let clock = Arc::new(ManualClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let tb = bucket(&clock, 1.0, 10.0, 1.0).on_exhausted(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tb.consume(1.0));
        assert_eq!(0, calls.load(Ordering::SeqCst));
        assert!(!tb.consume(1.0));
        assert!(!tb.consume(1.0));
        assert_eq!(2, calls.load(Ordering::SeqCst));

        // neither restore nor reset notifies
        tb.restore(5.0);
        tb.reset();
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn reset_returns_to_starting_and_keeps_the_counter() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 6.0, 10.0, 1.0);

        assert!(tb.consume(4.0));
        tb.reset();
        assert_eq!(6.0, tb.count());
        assert_eq!(4.0, tb.total_consumed());
    }

    #[test]
    fn test_has_no_side_effects() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 1.0, 10.0, 1.0);

        assert!(tb.test(1.0));
        assert!(!tb.test(5.0));
        assert_eq!(1.0, tb.count());
        assert_eq!(0.0, tb.total_consumed());

        // test() reads as of the last update; it never replenishes
        clock.advance(3.0);
        assert!(!tb.test(2.0));
        assert_eq!(4.0, tb.count());
    }

    #[test]
    fn consuming_zero_always_succeeds() {
        let clock = Arc::new(ManualClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let tb = bucket(&clock, 0.0, 10.0, 1.0).on_exhausted(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tb.consume(0.0));
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn manual_update_mode_freezes_the_balance() {
        let clock = Arc::new(ManualClock::default());
        let tb = bucket(&clock, 0.0, 10.0, 2.0).with_auto_update(false);

        clock.advance(3.0);
        assert_eq!(0.0, tb.count());
        assert!(!tb.consume(1.0));

        tb.update();
        assert_eq!(6.0, tb.count());
        assert!(tb.consume(6.0));
    }

    #[test]
    fn clone_does_not_inherit_pending_elapsed_time() {
        let clock = Arc::new(ManualClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let tb = bucket(&clock, 2.0, 10.0, 1.0).on_exhausted(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(tb.consume(1.0));

        clock.advance(5.0);
        let copy = tb.clone();

        // the copy was stamped at t=5: its five pending seconds are gone
        assert_eq!(1.0, copy.count());
        assert_eq!(6.0, tb.count());

        // counter and callback came along
        assert_eq!(1.0, copy.total_consumed());
        assert!(!copy.consume(100.0));
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn concurrent_consume_accounts_exactly() {
        let clock = Arc::new(ManualClock::default());
        let tb = Arc::new(bucket(&clock, 10_000.0, 10_000.0, 0.0));
        std::thread::scope(|s| {
            for _ in 0..4 {
                let tb = Arc::clone(&tb);
                s.spawn(move || {
                    for _ in 0..2000 {
                        assert!(tb.consume_one());
                    }
                });
            }
        });
        assert!((tb.count() - 2000.0).abs() < 1e-9);
        assert!((tb.total_consumed() - 8000.0).abs() < 1e-9);
    }
}
