/// Identifier of a bucket category (a namespace of bucket ids).
pub type CategoryId = u32;

/// Identifier of a bucket inside a category.
pub type BucketId = u32;

/// Category used by the registry operations that omit one.
pub const DEFAULT_CATEGORY: CategoryId = 0;

/// Injected policy for a [`BucketRegistry`](crate::BucketRegistry).
///
/// Fixed at registry construction. The runtime kill-switch
/// (`set_enabled`) lives on the registry itself, not here.
///
/// # Examples
///
/// ```rust
/// use granary::{BucketRegistry, RegistryConfig};
///
/// let registry = BucketRegistry::with_config(
///     RegistryConfig::new()
///         .with_default_category(7)
///         .with_reset_when_consumed(true),
/// );
/// assert_eq!(7, registry.config().default_category);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Category targeted by the operations that omit one.
    pub default_category: CategoryId,
    /// When on (the default), buckets the registry creates replenish
    /// lazily on every consume/count. When off, the balance only moves on
    /// [`manual_update`](crate::BucketRegistry::manual_update).
    pub auto_update: bool,
    /// When on, a bucket whose consume call fails is reset to its starting
    /// balance before the call returns, so the next window starts fresh
    /// instead of staying at zero.
    pub reset_when_consumed: bool,
}

impl RegistryConfig {
    /// The default policy: category 0, lazy replenishment, no reset on
    /// exhaustion.
    pub const fn new() -> Self {
        Self {
            default_category: DEFAULT_CATEGORY,
            auto_update: true,
            reset_when_consumed: false,
        }
    }

    /// Sets the category targeted by category-omitting operations.
    pub const fn with_default_category(mut self, category: CategoryId) -> Self {
        self.default_category = category;
        self
    }

    /// Sets the auto-update policy for buckets the registry creates.
    pub const fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    /// Sets the reset-on-exhausted-consume policy.
    pub const fn with_reset_when_consumed(mut self, reset: bool) -> Self {
        self.reset_when_consumed = reset;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}
