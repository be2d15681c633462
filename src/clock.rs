use std::sync::{Arc, Mutex};

/// Trait for monotonic clock implementations used by buckets and registries.
///
/// Implementations must provide monotonic time that never goes backwards.
/// The time is measured in seconds as floating-point values since an
/// arbitrary, implementation-chosen origin.
pub trait Clock {
    /// Returns the current time in seconds since an arbitrary epoch.
    ///
    /// The returned value must be monotonic (never decrease) and should
    /// have sufficient precision for rate limiting purposes — nanosecond
    /// resolution on common platforms.
    fn now(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Standard clock implementation using [`std::time::Instant`].
///
/// This is the default time source for buckets and registries. For
/// high-throughput scenarios, consider `FastClock` (behind the "quanta"
/// feature) which trades a little precision for speed.
///
/// # Examples
///
/// ```rust
/// use granary::{StdClock, TokenBucket};
///
/// let clock = StdClock::default();
/// let bucket = TokenBucket::with_clock(5.0, 10.0, 1.0, clock);
/// ```
#[derive(Clone)]
pub struct StdClock {
    origin: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> f64 {
        std::time::Instant::now()
            .duration_since(self.origin)
            .as_secs_f64()
    }
}

/// High-precision clock implementation using the `quanta` crate.
///
/// Provides precise timing with better performance characteristics than
/// [`StdClock`] in some scenarios. Requires the "quanta" feature.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "quanta")]
/// # {
/// use granary::{QuantaClock, TokenBucket};
///
/// let clock = QuantaClock::default();
/// let bucket = TokenBucket::with_clock(5.0, 10.0, 1.0, clock);
/// # }
/// ```
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct QuantaClock {
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for QuantaClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl QuantaClock {
    /// Creates a new `QuantaClock` from a `quanta::Clock` instance.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self { origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for QuantaClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// High-performance clock using quanta's coarse timing.
///
/// Significantly faster than [`StdClock`], with precision limited by
/// quanta's upkeep thread interval. Requires the "quanta" feature.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "quanta")]
/// # {
/// use granary::{FastClock, TokenBucket};
///
/// let clock = FastClock::default();
/// let bucket = TokenBucket::with_clock(0.0, 100.0, 10.0, clock);
/// # }
/// ```
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct FastClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for FastClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl FastClock {
    /// Creates a new `FastClock` from a `quanta::Clock` instance.
    ///
    /// **Important**: Ensure the clock's upkeep thread is running,
    /// otherwise replenishment will not observe the passage of time.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.recent();
        Self { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for FastClock {
    fn now(&self) -> f64 {
        (self.clock.recent() - self.origin).as_secs_f64()
    }
}

/// Manual clock implementation for testing and simulation.
///
/// Allows precise control over time progression, making it ideal for unit
/// tests and deterministic simulations of replenishment behavior.
///
/// # Thread Safety
///
/// This clock is thread-safe; share it through an `Arc` to keep a handle
/// for advancing time after handing it to a bucket or registry.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use granary::{ManualClock, TokenBucket};
///
/// let clock = Arc::new(ManualClock::new(0.0));
/// let bucket = TokenBucket::with_clock(0.0, 10.0, 1.0, Arc::clone(&clock));
///
/// // Initially no tokens available
/// assert!(!bucket.consume_one());
///
/// // Two seconds later there are two
/// clock.advance(2.0);
/// assert!(bucket.consume_one());
/// ```
pub struct ManualClock {
    now: Mutex<f64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ManualClock {
    /// Creates a new manual clock starting at the specified time.
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Sets the current time to the specified value.
    pub fn set(&self, now: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard = now;
    }

    /// Advances the current time by the specified number of seconds.
    pub fn advance(&self, delta: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        let guard = self.now.lock().unwrap();
        *guard
    }
}
