//! Degradation chain: picks the next URI to try after a URI has failed on
//! both renderers.
//!
//! Tier order is fixed: `optimized → low → original → none`. A cached
//! last-known-good URI, when present, is tried before any tier is resolved.
//! URIs already attempted in this lifecycle are skipped, so the number of
//! candidates is bounded by `1 + Tier::ALL.len()` and the chain never loops.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cache::resolver::QualityResolver;
use crate::cache::tier::Tier;
use crate::cache::tier_cache::CacheEntry;

/// One URI the display surface should attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub uri: String,

    /// Tier the URI belongs to (`None` for a cached URI of unknown tier).
    pub tier: Option<Tier>,

    /// Whether the URI came from the persistent tier cache.
    pub from_cache: bool,
}

/// Ordered, finite sequence of candidate URIs for one canonical URI.
#[derive(Debug)]
pub struct DegradationChain {
    resolver: Arc<QualityResolver>,
    canonical_uri: String,
    cached: Option<CacheEntry>,
    next_tier: Option<Tier>,
    attempted: HashSet<String>,
}

impl DegradationChain {
    pub fn new(resolver: Arc<QualityResolver>, canonical_uri: &str, cached: Option<CacheEntry>) -> Self {
        Self {
            resolver,
            canonical_uri: canonical_uri.trim().to_string(),
            cached,
            next_tier: Some(Tier::Optimized),
            attempted: HashSet::new(),
        }
    }

    /// The tier that follows `previous`, or `None` once `original` has failed.
    pub fn next(previous: Tier) -> Option<Tier> {
        previous.demote()
    }

    /// Produce the next candidate, or `None` when the chain is exhausted.
    pub fn next_candidate(&mut self) -> Option<Candidate> {
        if let Some(entry) = self.cached.take() {
            if !entry.uri.is_empty() {
                // Resume below the cached tier; an unknown tier restarts at the top.
                if let Some(tier) = entry.tier {
                    self.next_tier = Self::next(tier);
                }
                self.attempted.insert(entry.uri.clone());
                return Some(Candidate {
                    uri: entry.uri,
                    tier: entry.tier,
                    from_cache: true,
                });
            }
        }

        while let Some(tier) = self.next_tier {
            self.next_tier = Self::next(tier);

            let uri = self.resolver.resolve(&self.canonical_uri, tier);
            if uri.is_empty() {
                continue;
            }
            if !self.attempted.insert(uri.clone()) {
                debug!(tier = %tier, uri = %uri, "Skipping tier with an already-attempted URI");
                continue;
            }
            return Some(Candidate {
                uri,
                tier: Some(tier),
                from_cache: false,
            });
        }

        None
    }

    /// Number of distinct URIs handed out so far.
    pub fn attempted(&self) -> usize {
        self.attempted.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cached.is_none() && self.next_tier.is_none()
    }
}
