//! Wiring of resolver, tier cache, renderers and metrics.
//!
//! [`ImagePipeline`] is what an application holds on to: it mounts display
//! surfaces and detail views, builds prefetch schedulers for lists, warms
//! caches ahead of time and clears every cache layer on demand.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::prefetcher::PrefetchScheduler;
use crate::cache::resolver::QualityResolver;
use crate::cache::tier::Tier;
use crate::cache::tier_cache::PersistentTierCache;
use crate::config::Config;
use crate::detail::{DetailProps, DetailView};
use crate::metrics::Metrics;
use crate::render::{BaselineRenderer, Renderer, RichRenderer};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::view::{ImageProps, ImageView, ViewDeps};

/// Outcome of a bulk preload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub requested: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Empty or duplicate inputs.
    pub skipped: usize,
}

/// Outcome of clearing every cache layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub tier_entries_removed: usize,
    pub disk_cleared: bool,
}

pub struct ImagePipeline {
    config: Arc<Config>,
    deps: ViewDeps,
}

impl ImagePipeline {
    /// Build a pipeline from its parts.
    pub fn new(
        config: Arc<Config>,
        cache: Arc<PersistentTierCache>,
        rich: Arc<dyn Renderer>,
        baseline: Arc<dyn Renderer>,
    ) -> anyhow::Result<Self> {
        let resolver = Arc::new(QualityResolver::new(config.resolver.clone()));
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            deps: ViewDeps {
                resolver,
                cache,
                rich,
                baseline,
                metrics,
            },
        })
    }

    /// Build the production pipeline: file-backed (or in-memory) tier cache
    /// and the HTTP renderers.
    pub async fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => {
                info!(path = %path.display(), "Opening tier cache store");
                Arc::new(FileStore::open(path).await?)
            }
            None => {
                info!("Tier cache store is in-memory only");
                Arc::new(MemoryStore::new())
            }
        };
        let cache = Arc::new(PersistentTierCache::new(store, &config.cache));
        let rich: Arc<dyn Renderer> = Arc::new(RichRenderer::new(&config.renderer)?);
        let baseline: Arc<dyn Renderer> = Arc::new(BaselineRenderer::new(&config.renderer)?);
        Self::new(config, cache, rich, baseline)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<QualityResolver> {
        &self.deps.resolver
    }

    pub fn cache(&self) -> &Arc<PersistentTierCache> {
        &self.deps.cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.deps.metrics
    }

    /// Create a display surface. Nothing loads until [`ImageView::load`].
    pub fn mount(&self, props: ImageProps) -> ImageView {
        let mut props = props;
        if !self.deps.cache.is_enabled() {
            props.cache_enabled = false;
        }
        ImageView::new(props, self.deps.clone())
    }

    /// Mount a surface and run its load to completion.
    pub async fn render(&self, props: ImageProps) -> ImageView {
        let mut view = self.mount(props);
        view.load().await;
        view
    }

    /// Create a detail view. Nothing loads until [`DetailView::open`].
    pub fn mount_detail(&self, props: DetailProps) -> DetailView {
        let thumbnail = self.mount(props.thumbnail.clone());
        DetailView::new(props, thumbnail, self.deps.clone(), &self.config.detail)
    }

    /// Mount a detail view and open it (thumbnail, preload, and the full
    /// image when it loads on mount).
    pub async fn render_detail(&self, props: DetailProps) -> DetailView {
        let mut view = self.mount_detail(props);
        view.open().await;
        view
    }

    /// Prefetch scheduler for a list surface, warming the rich renderer.
    pub fn prefetch_surface(&self, items: Vec<String>) -> PrefetchScheduler {
        PrefetchScheduler::new(
            items,
            self.config.prefetch.clone(),
            self.deps.resolver.clone(),
            self.deps.rich.clone(),
            self.deps.metrics.clone(),
        )
    }

    /// Warm the rich renderer for `uris` at `tier` (the prefetch tier when
    /// `None`) and wait for every fetch to finish.
    pub async fn preload(&self, uris: &[String], tier: Option<Tier>) -> PreloadReport {
        let tier = tier.unwrap_or(self.config.prefetch.tier);
        let mut report = PreloadReport {
            requested: uris.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for uri in uris {
            let uri = self.deps.resolver.resolve(uri, tier);
            if uri.is_empty() || !seen.insert(uri.clone()) {
                report.skipped += 1;
                continue;
            }
            resolved.push(uri);
        }

        report.dispatched = resolved.len();
        self.deps.metrics.prefetch_dispatched.inc_by(resolved.len() as u64);
        let results = join_all(resolved.iter().map(|uri| self.deps.rich.prefetch(uri))).await;
        report.failed = results.iter().filter(|r| r.is_err()).count();
        self.deps.metrics.prefetch_failures.inc_by(report.failed as u64);

        info!(
            requested = report.requested,
            dispatched = report.dispatched,
            failed = report.failed,
            %tier,
            "Preload complete"
        );
        report
    }

    /// Clear the rich renderer's memory and disk caches and every tier cache
    /// entry. A failing disk clear is reported, not raised.
    pub async fn clear_cache(&self) -> ClearReport {
        self.deps.rich.clear_memory_cache().await;
        let disk_cleared = match self.deps.rich.clear_disk_cache().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear renderer disk cache");
                false
            }
        };
        let tier_entries_removed = self.deps.cache.clear().await;
        info!(tier_entries_removed, disk_cleared, "Image caches cleared");
        ClearReport {
            tier_entries_removed,
            disk_cleared,
        }
    }
}
