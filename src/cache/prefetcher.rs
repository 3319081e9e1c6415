//! Prefetching: warms the rich renderer's caches for items that are about to
//! scroll into view.
//!
//! Strategy:
//! 1. On mount, prefetch the first batch; a second batch follows after a short
//!    delay so it does not compete with the first paint.
//! 2. On every viewability change, if the highest visible index is within
//!    `lookahead` items of the end of the prefetched range, prefetch the next
//!    batch right after it.
//!
//! Each resolved URI is dispatched at most once per scheduler. Dispatches are
//! fire-and-forget and their failures are discarded. Dropping the scheduler
//! cancels the pending follow-up timer and discards the dedup set.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::resolver::QualityResolver;
use crate::config::PrefetchConfig;
use crate::metrics::Metrics;
use crate::render::Renderer;

/// What one scheduling call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchBatch {
    /// First item index covered.
    pub start: usize,
    /// One past the last item index covered.
    pub end: usize,
    /// Resolved URIs newly handed to the fetcher.
    pub dispatched: Vec<String>,
    /// Items skipped as duplicates or empty.
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct PrefetchState {
    items: Vec<String>,
    prefetched: HashSet<String>,
    prefetched_end: usize,
}

struct Inner {
    config: PrefetchConfig,
    resolver: Arc<QualityResolver>,
    fetcher: Arc<dyn Renderer>,
    metrics: Arc<Metrics>,
    state: Mutex<PrefetchState>,
}

impl Inner {
    fn schedule_locked(&self, state: &mut PrefetchState, start: usize, count: usize) -> PrefetchBatch {
        let end = start.saturating_add(count).min(state.items.len());
        let mut batch = PrefetchBatch {
            start,
            end: end.max(start),
            ..Default::default()
        };
        if start >= end {
            return batch;
        }

        for index in start..end {
            let uri = self.resolver.resolve(&state.items[index], self.config.tier);
            // Inserted before dispatch so overlapping calls cannot both send it.
            if uri.is_empty() || !state.prefetched.insert(uri.clone()) {
                batch.skipped += 1;
                continue;
            }
            self.dispatch(uri.clone());
            batch.dispatched.push(uri);
        }
        state.prefetched_end = state.prefetched_end.max(end);

        debug!(
            start,
            end,
            dispatched = batch.dispatched.len(),
            skipped = batch.skipped,
            "Prefetch batch scheduled"
        );
        batch
    }

    fn dispatch(&self, uri: String) {
        let fetcher = self.fetcher.clone();
        let metrics = self.metrics.clone();
        metrics.prefetch_dispatched.inc();
        tokio::spawn(async move {
            if let Err(e) = fetcher.prefetch(&uri).await {
                metrics.prefetch_failures.inc();
                debug!(uri = %uri, error = %e, "Prefetch failed");
            }
        });
    }
}

/// Per-surface prefetch pipeline.
pub struct PrefetchScheduler {
    inner: Arc<Inner>,
    follow_up: Option<JoinHandle<()>>,
}

impl PrefetchScheduler {
    pub fn new(
        items: Vec<String>,
        config: PrefetchConfig,
        resolver: Arc<QualityResolver>,
        fetcher: Arc<dyn Renderer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                fetcher,
                metrics,
                state: Mutex::new(PrefetchState {
                    items,
                    ..Default::default()
                }),
            }),
            follow_up: None,
        }
    }

    /// Prefetch the first batch now and arm the delayed second batch.
    pub async fn on_mount(&mut self) -> PrefetchBatch {
        let batch_size = self.inner.config.batch_size;
        let first = self.schedule(0, batch_size).await;

        if let Some(previous) = self.follow_up.take() {
            previous.abort();
        }
        let inner = self.inner.clone();
        let delay = inner.config.follow_up_delay();
        self.follow_up = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = inner.state.lock().await;
            inner.schedule_locked(&mut state, batch_size, batch_size);
        }));

        first
    }

    /// Prefetch items `[start, start + count)`.
    pub async fn schedule(&self, start: usize, count: usize) -> PrefetchBatch {
        let mut state = self.inner.state.lock().await;
        self.inner.schedule_locked(&mut state, start, count)
    }

    /// Feed the indices currently on screen. Returns the batch scheduled, if any.
    pub async fn on_viewability_change(&self, visible: &[usize]) -> Option<PrefetchBatch> {
        let highest = *visible.iter().max()?;
        let mut state = self.inner.state.lock().await;

        let end = state.prefetched_end;
        if end >= state.items.len() || highest.saturating_add(self.inner.config.lookahead) < end {
            return None;
        }
        Some(self.inner.schedule_locked(&mut state, end, self.inner.config.batch_size))
    }

    /// Replace the item list (e.g. after the next page loaded). The dedup set
    /// and prefetched range are kept.
    pub async fn set_items(&self, items: Vec<String>) {
        let mut state = self.inner.state.lock().await;
        state.prefetched_end = state.prefetched_end.min(items.len());
        state.items = items;
    }

    /// End of the prefetched range (exclusive).
    pub async fn prefetched_end(&self) -> usize {
        self.inner.state.lock().await.prefetched_end
    }

    /// Number of distinct URIs dispatched so far.
    pub async fn prefetched_count(&self) -> usize {
        self.inner.state.lock().await.prefetched.len()
    }

    pub async fn is_prefetched(&self, uri: &str) -> bool {
        self.inner.state.lock().await.prefetched.contains(uri)
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.follow_up.take() {
            timer.abort();
        }
    }
}
