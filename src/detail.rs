//! Detail view: a full-resolution image loaded on demand over its thumbnail.
//!
//! The thumbnail is an ordinary [`ImageView`] walking the tier chain. The
//! full image is resolved with a detail preset (quality level + max width)
//! and loaded on the rich renderer, then the baseline renderer. Until it
//! loads, the thumbnail stays on screen with the loading indicator over it;
//! a failed full load keeps the thumbnail.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::loader::{DualRendererImageLoader, LoaderState, Transition};
use crate::config::{DetailConfig, DetailQuality};
use crate::render::{Renderer, RendererKind};
use crate::view::{Attempt, ImageProps, ImageView, ViewDeps, Visual};

/// Inputs of a detail view. Unset options take the `detail` config defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailProps {
    /// Thumbnail surface shown while the full image loads.
    pub thumbnail: ImageProps,
    pub full_uri: Option<String>,
    pub quality: Option<DetailQuality>,
    pub max_width: Option<u32>,
    pub preload: Option<bool>,
    pub load_on_mount: Option<bool>,
}

impl DetailProps {
    pub fn new(thumbnail_uri: impl Into<String>, full_uri: impl Into<String>) -> Self {
        Self {
            thumbnail: ImageProps::new(thumbnail_uri),
            full_uri: Some(full_uri.into()),
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, quality: DetailQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn without_preload(mut self) -> Self {
        self.preload = Some(false);
        self
    }

    pub fn load_on_mount(mut self) -> Self {
        self.load_on_mount = Some(true);
        self
    }
}

/// What a detail view currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailVisual {
    /// The thumbnail's visual until the full image loads, then the full image.
    pub visual: Visual,
    /// Loading indicator over `visual` while the full image is in flight.
    pub show_loader: bool,
    /// `visual` is the full-resolution image.
    pub full: bool,
}

impl DetailVisual {
    fn thumbnail(visual: Visual, show_loader: bool) -> Self {
        Self {
            visual,
            show_loader,
            full: false,
        }
    }
}

pub struct DetailView {
    props: DetailProps,
    full_uri: String,
    preload: bool,
    load_on_mount: bool,
    thumbnail: ImageView,
    deps: ViewDeps,
    loader: DualRendererImageLoader,
    visual: watch::Sender<DetailVisual>,
    attempts: Vec<Attempt>,
}

impl DetailView {
    pub(crate) fn new(props: DetailProps, thumbnail: ImageView, deps: ViewDeps, config: &DetailConfig) -> Self {
        let preset = DetailConfig::preset(
            props.quality.unwrap_or(config.quality),
            props.max_width.unwrap_or(config.max_width),
        );
        let full_uri = deps
            .resolver
            .resolve_with(props.full_uri.as_deref().unwrap_or(""), &preset);
        let (visual, _) = watch::channel(DetailVisual::thumbnail(Visual::Idle, false));

        Self {
            preload: props.preload.unwrap_or(config.preload),
            load_on_mount: props.load_on_mount.unwrap_or(config.load_on_mount),
            props,
            full_uri,
            thumbnail,
            deps,
            loader: DualRendererImageLoader::new(),
            visual,
            attempts: Vec::new(),
        }
    }

    pub fn props(&self) -> &DetailProps {
        &self.props
    }

    /// Resolved full-resolution URI; empty when there is none.
    pub fn full_uri(&self) -> &str {
        &self.full_uri
    }

    pub fn thumbnail(&self) -> &ImageView {
        &self.thumbnail
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailVisual> {
        self.visual.subscribe()
    }

    pub fn visual(&self) -> DetailVisual {
        self.visual.borrow().clone()
    }

    /// State of the full-image load.
    pub fn loader_state(&self) -> &LoaderState {
        self.loader.state()
    }

    /// Full-image attempts, in order. Thumbnail attempts live on the thumbnail.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    fn publish(&self, visual: DetailVisual) -> DetailVisual {
        self.visual.send_replace(visual.clone());
        visual
    }

    fn renderer(&self, kind: RendererKind) -> Arc<dyn Renderer> {
        match kind {
            RendererKind::Rich => self.deps.rich.clone(),
            RendererKind::Baseline => self.deps.baseline.clone(),
        }
    }

    /// Thumbnail visual to keep after the full image failed.
    fn settled_thumbnail(&self) -> Visual {
        match self.thumbnail.visual() {
            Visual::Idle | Visual::Loading { .. } => match &self.props.thumbnail.fallback {
                Some(asset) => Visual::Fallback { asset: asset.clone() },
                None => Visual::Unavailable,
            },
            shown => shown,
        }
    }

    /// Show the thumbnail and warm the rich renderer with the full image.
    /// Loads the full image straight away when `load_on_mount` is set.
    pub async fn open(&mut self) -> DetailVisual {
        if self.preload && !self.full_uri.is_empty() {
            self.spawn_preload();
        }

        if !self.props.thumbnail.canonical_uri().is_empty() {
            self.thumbnail.load().await;
        }
        self.publish(DetailVisual::thumbnail(self.thumbnail.visual(), false));

        if self.load_on_mount {
            return self.load_full().await;
        }
        self.visual()
    }

    fn spawn_preload(&self) {
        let fetcher = self.deps.rich.clone();
        let metrics = self.deps.metrics.clone();
        let uri = self.full_uri.clone();
        metrics.prefetch_dispatched.inc();
        debug!(uri = %uri, "Preloading full image");

        tokio::spawn(async move {
            if let Err(e) = fetcher.prefetch(&uri).await {
                metrics.prefetch_failures.inc();
                debug!(uri = %uri, error = %e, "Full image preload failed");
            }
        });
    }

    /// Load the full image. Runs once per view: a loaded or failed full
    /// image is not fetched again.
    pub async fn load_full(&mut self) -> DetailVisual {
        if self.full_uri.is_empty() || self.loader.state().is_settled() {
            return self.visual();
        }
        let Some(mut ticket) = self.loader.begin(&self.full_uri, None) else {
            return self.visual();
        };

        loop {
            let show_loader = self.loader.show_loader(self.props.thumbnail.show_loader);
            self.publish(DetailVisual::thumbnail(self.thumbnail.visual(), show_loader));

            let result = self.renderer(ticket.renderer()).load(ticket.uri()).await;
            let label = if result.is_ok() { "ok" } else { "error" };
            self.deps
                .metrics
                .load_attempts
                .with_label_values(&[ticket.renderer().as_str(), label])
                .inc();

            let transition = match &result {
                Ok(_) => self.loader.on_load_end(&ticket),
                Err(e) => {
                    debug!(uri = %self.full_uri, renderer = %ticket.renderer(), error = %e, "Full image load failed");
                    self.loader.on_error(&ticket)
                }
            };
            self.attempts.push(Attempt {
                uri: self.full_uri.clone(),
                tier: None,
                renderer: ticket.renderer(),
                from_cache: false,
                ok: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            match transition {
                Transition::Fallback(next) => ticket = next,
                Transition::Loaded => {
                    info!(uri = %self.full_uri, renderer = %ticket.renderer(), "Full image loaded");
                    return self.publish(DetailVisual {
                        visual: Visual::Image {
                            uri: self.full_uri.clone(),
                            tier: None,
                            renderer: ticket.renderer(),
                        },
                        show_loader: false,
                        full: true,
                    });
                }
                Transition::Failed | Transition::Ignored => {
                    warn!(uri = %self.full_uri, "Full image unavailable, keeping thumbnail");
                    return self.publish(DetailVisual::thumbnail(self.settled_thumbnail(), false));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_props_deserialize() {
        let props: DetailProps = serde_json::from_str(
            r#"{"thumbnail": {"uri": "https://img.test/t.jpg"}, "full_uri": "https://img.test/f.jpg", "quality": "low"}"#,
        )
        .unwrap();
        assert_eq!(props.thumbnail.canonical_uri(), "https://img.test/t.jpg");
        assert!(props.thumbnail.show_loader);
        assert_eq!(props.quality, Some(DetailQuality::Low));
        assert_eq!(props.max_width, None);
        assert_eq!(props.load_on_mount, None);
    }

    #[test]
    fn test_detail_visual_serialization() {
        let visual = DetailVisual {
            visual: Visual::Unavailable,
            show_loader: true,
            full: false,
        };
        let json = serde_json::to_value(&visual).unwrap();
        assert_eq!(json["visual"]["state"], "unavailable");
        assert_eq!(json["show_loader"], true);
        assert_eq!(json["full"], false);
    }
}
