//! Prometheus counters for the image pipeline.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,

    /// Tier cache lookups by outcome (`hit` / `miss`).
    pub cache_lookups: IntCounterVec,

    /// Load attempts by renderer and outcome (`ok` / `error`).
    pub load_attempts: IntCounterVec,

    /// Display surfaces that exhausted every tier and renderer.
    pub terminal_failures: IntCounter,

    /// Moves to the next candidate after a URI failed on both renderers.
    pub degradations: IntCounter,

    /// Prefetch requests handed to the fetch primitive.
    pub prefetch_dispatched: IntCounter,

    /// Prefetch requests that failed (discarded).
    pub prefetch_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("image_tier_cache".to_string()), None)?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("tier_cache_lookups_total", "Tier cache lookups"),
            &["outcome"],
        )?;
        let load_attempts = IntCounterVec::new(
            Opts::new("load_attempts_total", "Image load attempts"),
            &["renderer", "outcome"],
        )?;
        let terminal_failures = IntCounter::new("terminal_failures_total", "Images that could not be rendered")?;
        let degradations = IntCounter::new("tier_degradations_total", "Quality tier degradations")?;
        let prefetch_dispatched = IntCounter::new("prefetch_dispatched_total", "Prefetch requests dispatched")?;
        let prefetch_failures = IntCounter::new("prefetch_failures_total", "Prefetch requests that failed")?;

        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(load_attempts.clone()))?;
        registry.register(Box::new(terminal_failures.clone()))?;
        registry.register(Box::new(degradations.clone()))?;
        registry.register(Box::new(prefetch_dispatched.clone()))?;
        registry.register(Box::new(prefetch_failures.clone()))?;

        Ok(Self {
            registry,
            cache_lookups,
            load_attempts,
            terminal_failures,
            degradations,
            prefetch_dispatched,
            prefetch_failures,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
