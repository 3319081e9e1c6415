//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use image_tier_cache::cache::clock::Clock;
use image_tier_cache::cache::tier_cache::PersistentTierCache;
use image_tier_cache::config::Config;
use image_tier_cache::pipeline::ImagePipeline;
use image_tier_cache::render::{ImageSource, RenderError, RenderedImage, Renderer, RendererKind};
use image_tier_cache::storage::{KeyValueStore, MemoryStore};

/// A small, fully decodable PNG.
pub fn png() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(4, 4, image::Rgb([102, 126, 234]))
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub const CDN_URI: &str = "https://cdn.example.com/img/upload/photo.jpg";

type UriPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Renderer whose outcome is decided by a predicate on the URI.
pub struct ScriptedRenderer {
    kind: RendererKind,
    fail_when: UriPredicate,
    calls: Mutex<Vec<String>>,
    memory_clears: AtomicUsize,
    disk_clears: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(kind: RendererKind, fail_when: impl Fn(&str) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail_when: Box::new(fail_when),
            calls: Mutex::new(Vec::new()),
            memory_clears: AtomicUsize::new(0),
            disk_clears: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(kind: RendererKind) -> Arc<Self> {
        Self::new(kind, |_| false)
    }

    pub fn failing(kind: RendererKind) -> Arc<Self> {
        Self::new(kind, |_| true)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn memory_clears(&self) -> usize {
        self.memory_clears.load(Ordering::SeqCst)
    }

    pub fn disk_clears(&self) -> usize {
        self.disk_clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    fn kind(&self) -> RendererKind {
        self.kind
    }

    async fn load(&self, uri: &str) -> Result<RenderedImage, RenderError> {
        self.calls.lock().unwrap().push(uri.to_string());
        if (self.fail_when)(uri) {
            return Err(RenderError::Status {
                uri: uri.to_string(),
                status: 404,
            });
        }
        Ok(RenderedImage {
            uri: uri.to_string(),
            data: Bytes::from(png()),
            source: ImageSource::Network,
        })
    }

    async fn clear_memory_cache(&self) {
        self.memory_clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn clear_disk_cache(&self) -> Result<(), RenderError> {
        self.disk_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Renderer that parks every load of a gated URI until [`release`] is
/// called, so tests can observe in-flight visuals.
///
/// [`release`]: GatedRenderer::release
pub struct GatedRenderer {
    kind: RendererKind,
    gate_when: UriPredicate,
    fail_when: UriPredicate,
    release: Notify,
    calls: Mutex<Vec<String>>,
}

impl GatedRenderer {
    pub fn new(
        kind: RendererKind,
        gate_when: impl Fn(&str) -> bool + Send + Sync + 'static,
        fail_when: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            gate_when: Box::new(gate_when),
            fail_when: Box::new(fail_when),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Let one parked (or the next) gated load finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for GatedRenderer {
    fn kind(&self) -> RendererKind {
        self.kind
    }

    async fn load(&self, uri: &str) -> Result<RenderedImage, RenderError> {
        self.calls.lock().unwrap().push(uri.to_string());
        if (self.gate_when)(uri) {
            self.release.notified().await;
        }
        if (self.fail_when)(uri) {
            return Err(RenderError::Status {
                uri: uri.to_string(),
                status: 503,
            });
        }
        Ok(RenderedImage {
            uri: uri.to_string(),
            data: Bytes::from(png()),
            source: ImageSource::Network,
        })
    }
}

/// Pipeline over in-memory storage with arbitrary renderers.
pub fn pipeline_with(rich: Arc<dyn Renderer>, baseline: Arc<dyn Renderer>) -> ImagePipeline {
    let config = test_config();
    let cache = PersistentTierCache::new(Arc::new(MemoryStore::new()), &config.cache);
    ImagePipeline::new(Arc::new(config), Arc::new(cache), rich, baseline).unwrap()
}

/// Defaults plus `cdn.example.com` as a transform host, in-memory storage.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.resolver.transform_hosts.push("cdn.example.com".to_string());
    config.storage.path = None;
    config
}

pub struct Harness {
    pub pipeline: ImagePipeline,
    pub store: Arc<MemoryStore>,
    pub rich: Arc<ScriptedRenderer>,
    pub baseline: Arc<ScriptedRenderer>,
}

pub fn harness(rich: Arc<ScriptedRenderer>, baseline: Arc<ScriptedRenderer>) -> Harness {
    harness_with(test_config(), None, rich, baseline)
}

pub fn harness_with(
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    rich: Arc<ScriptedRenderer>,
    baseline: Arc<ScriptedRenderer>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let cache = match clock {
        Some(clock) => PersistentTierCache::with_clock(kv, clock, &config.cache),
        None => PersistentTierCache::new(kv, &config.cache),
    };
    let pipeline = ImagePipeline::new(
        Arc::new(config),
        Arc::new(cache),
        rich.clone(),
        baseline.clone(),
    )
    .unwrap();
    Harness {
        pipeline,
        store,
        rich,
        baseline,
    }
}
