use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::bucket::{
    DEFAULT_MAX_TOKENS, DEFAULT_REPLENISH_RATE, DEFAULT_STARTING_TOKENS, ExhaustedCallback,
    TokenBucket,
};
use crate::clock::{Clock, StdClock};
use crate::config::{BucketId, CategoryId, RegistryConfig};

type CategoryMap<C> = HashMap<BucketId, Arc<TokenBucket<C>>>;

/// A thread-safe collection of token buckets indexed by (category, bucket id).
///
/// The registry owns the two-level bucket map behind a single reader/writer
/// lock; each bucket guards its own numeric state, so per-bucket operations
/// only hold the registry lock long enough to locate (or create) the
/// bucket. Exhaustion callbacks therefore never run under either lock.
///
/// Looking up a key that does not exist auto-creates a default bucket
/// (empty, capacity 10, one token per second). This mirrors the behavior
/// callers of [`get_bucket_in`](Self::get_bucket_in) traditionally rely
/// on; use [`try_get_bucket_in`](Self::try_get_bucket_in) when silent
/// creation is not wanted.
///
/// # Examples
///
/// ```rust
/// use granary::BucketRegistry;
///
/// let registry = BucketRegistry::new();
/// registry.create_bucket_in(3, 15, 5.0, 10.0, 1.0, None);
///
/// assert!(registry.consume_in(3, 15, 4.0));
/// assert!(!registry.consume_in(3, 15, 2.0));
/// ```
pub struct BucketRegistry<C = StdClock> {
    buckets: RwLock<HashMap<CategoryId, CategoryMap<C>>>,
    enabled: AtomicBool,
    config: RegistryConfig,
    clock: C,
}

impl BucketRegistry<StdClock> {
    /// Creates a registry with the default policy on the standard clock.
    pub fn new() -> Self {
        Self::with_clock(RegistryConfig::default(), StdClock::default())
    }

    /// Creates a registry with the given policy on the standard clock.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_clock(config, StdClock::default())
    }

    /// Returns the process-wide default registry.
    ///
    /// Lazily constructed on first access with the default policy, and
    /// alive for the rest of the process. Prefer passing an explicitly
    /// constructed registry where feasible; this accessor exists for code
    /// paths without anywhere to thread one through.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use granary::BucketRegistry;
    ///
    /// BucketRegistry::global().restore_in(1, 42, 1.0);
    /// assert!(BucketRegistry::global().consume_in(1, 42, 1.0));
    /// ```
    pub fn global() -> &'static BucketRegistry {
        static GLOBAL: OnceLock<BucketRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BucketRegistry::new)
    }
}

impl Default for BucketRegistry<StdClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> BucketRegistry<C> {
    /// Creates a registry with the given policy and clock.
    ///
    /// Buckets created through the registry share clones of this clock, so
    /// a `ManualClock` handed in here drives every bucket in tests.
    pub fn with_clock(config: RegistryConfig, clock: C) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(true),
            config,
            clock,
        }
    }

    /// Returns the registry's policy.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns whether rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables the registry as a whole.
    ///
    /// While disabled, [`consume_in`](Self::consume_in) grants every
    /// request without touching any bucket. Restores keep working.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Inserts `bucket` at (`category`, `bucket_id`).
    ///
    /// An existing bucket at that key is silently discarded, history
    /// included.
    pub fn insert_bucket_in(
        &self,
        category: CategoryId,
        bucket_id: BucketId,
        bucket: TokenBucket<C>,
    ) {
        let mut buckets = self.buckets.write();
        buckets
            .entry(category)
            .or_default()
            .insert(bucket_id, Arc::new(bucket));
    }

    /// Inserts `bucket` at `bucket_id` in the default category.
    pub fn insert_bucket(&self, bucket_id: BucketId, bucket: TokenBucket<C>) {
        self.insert_bucket_in(self.config.default_category, bucket_id, bucket);
    }

    /// Creates a bucket from its parameters at (`category`, `bucket_id`).
    ///
    /// The bucket runs on the registry's clock and inherits its
    /// auto-update policy. Overwrites any existing bucket at that key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use granary::BucketRegistry;
    ///
    /// let registry = BucketRegistry::new();
    /// registry.create_bucket_in(
    ///     5,
    ///     15,
    ///     5.0,
    ///     10.0,
    ///     1.0,
    ///     Some(Arc::new(|view: &granary::BucketSnapshot| {
    ///         eprintln!("exhausted after {} tokens", view.total_consumed);
    ///     })),
    /// );
    /// ```
    pub fn create_bucket_in(
        &self,
        category: CategoryId,
        bucket_id: BucketId,
        starting: f64,
        max: f64,
        rate: f64,
        callback: Option<ExhaustedCallback>,
    ) {
        let mut bucket = TokenBucket::with_clock(starting, max, rate, self.clock.clone())
            .with_auto_update(self.config.auto_update);
        if let Some(callback) = callback {
            bucket = bucket.with_exhausted_callback(callback);
        }
        self.insert_bucket_in(category, bucket_id, bucket);
    }

    /// Creates a bucket from its parameters in the default category.
    pub fn create_bucket(
        &self,
        bucket_id: BucketId,
        starting: f64,
        max: f64,
        rate: f64,
        callback: Option<ExhaustedCallback>,
    ) {
        self.create_bucket_in(
            self.config.default_category,
            bucket_id,
            starting,
            max,
            rate,
            callback,
        );
    }

    /// Returns the bucket at (`category`, `bucket_id`), creating a default
    /// one if the key is unknown.
    ///
    /// The returned handle stays valid after the registry moves on; a
    /// bucket removed by [`clear`](Self::clear) or overwritten by a create
    /// simply lives on in the handles already given out.
    pub fn get_bucket_in(&self, category: CategoryId, bucket_id: BucketId) -> Arc<TokenBucket<C>> {
        if let Some(bucket) = self.try_get_bucket_in(category, bucket_id) {
            return bucket;
        }
        let mut buckets = self.buckets.write();
        Arc::clone(
            buckets
                .entry(category)
                .or_default()
                .entry(bucket_id)
                .or_insert_with(|| Arc::new(self.default_bucket())),
        )
    }

    /// Returns the bucket at `bucket_id` in the default category, creating
    /// a default one if the key is unknown.
    pub fn get_bucket(&self, bucket_id: BucketId) -> Arc<TokenBucket<C>> {
        self.get_bucket_in(self.config.default_category, bucket_id)
    }

    /// Returns the bucket at (`category`, `bucket_id`), or `None` — never
    /// creates one.
    pub fn try_get_bucket_in(
        &self,
        category: CategoryId,
        bucket_id: BucketId,
    ) -> Option<Arc<TokenBucket<C>>> {
        let buckets = self.buckets.read();
        buckets
            .get(&category)
            .and_then(|category| category.get(&bucket_id))
            .map(Arc::clone)
    }

    /// Returns the bucket at `bucket_id` in the default category, or
    /// `None` — never creates one.
    pub fn try_get_bucket(&self, bucket_id: BucketId) -> Option<Arc<TokenBucket<C>>> {
        self.try_get_bucket_in(self.config.default_category, bucket_id)
    }

    /// Consumes `amount` tokens from the bucket at (`category`,
    /// `bucket_id`), creating a default bucket if the key is unknown.
    ///
    /// Returns `true` when the bucket had enough tokens — or
    /// unconditionally when the registry is disabled, in which case no
    /// bucket state is touched at all. On failure, the
    /// reset-when-consumed policy (if set) resets the bucket before the
    /// call returns.
    pub fn consume_in(&self, category: CategoryId, bucket_id: BucketId, amount: f64) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let bucket = self.get_bucket_in(category, bucket_id);
        let granted = bucket.consume(amount);
        if !granted && self.config.reset_when_consumed {
            bucket.reset();
        }
        granted
    }

    /// Consumes `amount` tokens from `bucket_id` in the default category.
    pub fn consume(&self, bucket_id: BucketId, amount: f64) -> bool {
        self.consume_in(self.config.default_category, bucket_id, amount)
    }

    /// Restores `amount` tokens to the bucket at (`category`, `bucket_id`),
    /// creating a default bucket if the key is unknown.
    ///
    /// Restores are always honored, even while the registry is disabled.
    pub fn restore_in(&self, category: CategoryId, bucket_id: BucketId, amount: f64) {
        self.get_bucket_in(category, bucket_id).restore(amount);
    }

    /// Restores `amount` tokens to `bucket_id` in the default category.
    pub fn restore(&self, bucket_id: BucketId, amount: f64) {
        self.restore_in(self.config.default_category, bucket_id, amount);
    }

    /// Replenishes every bucket in every category.
    ///
    /// Intended for timer-driven refresh when auto-update is off. Runs
    /// under the registry-wide lock; iteration order is unspecified.
    pub fn manual_update(&self) {
        let buckets = self.buckets.write();
        for category in buckets.values() {
            for bucket in category.values() {
                bucket.update();
            }
        }
    }

    /// Resets every bucket in every category to its starting balance.
    pub fn reset_all(&self) {
        let buckets = self.buckets.write();
        for category in buckets.values() {
            for bucket in category.values() {
                bucket.reset();
            }
        }
    }

    /// Removes all categories and buckets.
    ///
    /// The enabled flag is untouched; a disabled registry stays disabled.
    pub fn clear(&self) {
        self.buckets.write().clear();
    }

    fn default_bucket(&self) -> TokenBucket<C> {
        TokenBucket::with_clock(
            DEFAULT_STARTING_TOKENS,
            DEFAULT_MAX_TOKENS,
            DEFAULT_REPLENISH_RATE,
            self.clock.clone(),
        )
        .with_auto_update(self.config.auto_update)
    }
}
