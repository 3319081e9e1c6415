//! Quality tiers and the per-image caching / fallback machinery.
//!
//! - [`tier`]: Tier definitions and per-request tier selection
//! - [`resolver`]: Canonical URI + tier → concrete fetchable URI
//! - [`clock`]: Wall-clock abstraction for TTL arithmetic
//! - [`tier_cache`]: Persistent key → last-successful-URI store with TTL
//! - [`loader`]: Primary/secondary renderer state machine for one URI
//! - [`degradation`]: Ordered candidate URIs across tiers
//! - [`prefetcher`]: Scroll-driven batch prefetching for list surfaces

pub mod clock;
pub mod degradation;
pub mod loader;
pub mod prefetcher;
pub mod resolver;
pub mod tier;
pub mod tier_cache;
