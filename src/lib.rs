#![doc = include_str!("../README.md")]
//!
//! # Core Components
//!
//! - [`TokenBucket`] - The replenish/consume/restore state machine for a single rate-limited resource
//! - [`BucketRegistry`] - A thread-safe (category, bucket id) index over token buckets
//! - [`Clock`] trait and implementations for time sources
//! - [`RegistryConfig`] - Injected registry policy (default category, auto-update, reset-on-exhaustion)
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use granary::{BucketRegistry, BucketSnapshot, RegistryConfig};
//!
//! // A registry that resets a bucket after each exhaustion
//! let registry = BucketRegistry::with_config(RegistryConfig::new().with_reset_when_consumed(true));
//!
//! // Category 5, bucket 15: 5 tokens now, capacity 10, one per second
//! registry.create_bucket_in(
//!     5,
//!     15,
//!     5.0,
//!     10.0,
//!     1.0,
//!     Some(Arc::new(|view: &BucketSnapshot| {
//!         eprintln!("bucket exhausted after {} tokens", view.total_consumed);
//!     })),
//! );
//!
//! assert!(registry.consume_in(5, 15, 5.0)); // drains the bucket
//! assert!(!registry.consume_in(5, 15, 2.0)); // exhausted: callback fires, bucket resets
//! ```

mod bucket;
mod clock;
mod config;
mod registry;

pub use bucket::{
    BucketSnapshot, DEFAULT_MAX_TOKENS, DEFAULT_REPLENISH_RATE, DEFAULT_STARTING_TOKENS,
    ExhaustedCallback, TokenBucket,
};
#[cfg(feature = "quanta")]
pub use clock::{FastClock, QuantaClock};
pub use clock::{Clock, ManualClock, StdClock};
pub use config::{BucketId, CategoryId, DEFAULT_CATEGORY, RegistryConfig};
pub use registry::BucketRegistry;
