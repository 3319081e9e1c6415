//! Display surface: one image slot on screen.
//!
//! An [`ImageView`] owns the per-instance state of a thumbnail / poster tile:
//! 1. Sanitises the source URI (empty → the no-image path, no error)
//! 2. Consults the persistent tier cache for a last-known-good URI
//! 3. Walks the degradation chain, loading each candidate with the rich
//!    renderer and then the baseline renderer
//! 4. Writes the succeeding URI back to the tier cache
//! 5. Publishes every visual change on a `watch` channel
//!
//! Failures never escape: the only observable outcome is the [`Visual`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::degradation::{Candidate, DegradationChain};
use crate::cache::loader::{DualRendererImageLoader, LoaderState, Transition};
use crate::cache::resolver::QualityResolver;
use crate::cache::tier::Tier;
use crate::cache::tier_cache::PersistentTierCache;
use crate::metrics::Metrics;
use crate::render::{Renderer, RendererKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    #[default]
    Cover,
    Contain,
    Stretch,
    Center,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderSize {
    #[default]
    Small,
    Large,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderStyle {
    pub color: String,
    pub size: LoaderSize,
}

impl Default for LoaderStyle {
    fn default() -> Self {
        Self {
            color: "#667eea".to_string(),
            size: LoaderSize::Small,
        }
    }
}

/// A bundled static image shown when nothing could be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackAsset(pub String);

/// Inputs of a display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProps {
    pub uri: Option<String>,
    pub cache_key: Option<String>,
    pub resize_mode: ResizeMode,
    pub show_loader: bool,
    pub loader_style: LoaderStyle,
    pub fallback: Option<FallbackAsset>,
    pub cache_enabled: bool,
}

impl Default for ImageProps {
    fn default() -> Self {
        Self {
            uri: None,
            cache_key: None,
            resize_mode: ResizeMode::default(),
            show_loader: true,
            loader_style: LoaderStyle::default(),
            fallback: None,
            cache_enabled: true,
        }
    }
}

impl ImageProps {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_fallback(mut self, asset: impl Into<String>) -> Self {
        self.fallback = Some(FallbackAsset(asset.into()));
        self
    }

    pub fn without_loader(mut self) -> Self {
        self.show_loader = false;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Trimmed source URI; empty when missing.
    pub fn canonical_uri(&self) -> &str {
        self.uri.as_deref().map(str::trim).unwrap_or("")
    }

    /// Explicit cache key if supplied, else the canonical URI.
    pub fn cache_key(&self) -> &str {
        match self.cache_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => self.canonical_uri(),
        }
    }

    fn same_identity(&self, other: &ImageProps) -> bool {
        self.canonical_uri() == other.canonical_uri() && self.cache_key() == other.cache_key()
    }
}

/// What the surface currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Visual {
    Idle,
    Loading {
        uri: String,
        tier: Option<Tier>,
        renderer: RendererKind,
        show_loader: bool,
    },
    Image {
        uri: String,
        tier: Option<Tier>,
        renderer: RendererKind,
    },
    Fallback {
        asset: FallbackAsset,
    },
    Unavailable,
}

impl Visual {
    pub fn is_image(&self) -> bool {
        matches!(self, Visual::Image { .. })
    }
}

/// One renderer attempt, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub uri: String,
    pub tier: Option<Tier>,
    pub renderer: RendererKind,
    pub from_cache: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared collaborators of every surface.
#[derive(Clone)]
pub(crate) struct ViewDeps {
    pub resolver: Arc<QualityResolver>,
    pub cache: Arc<PersistentTierCache>,
    pub rich: Arc<dyn Renderer>,
    pub baseline: Arc<dyn Renderer>,
    pub metrics: Arc<Metrics>,
}

pub struct ImageView {
    props: ImageProps,
    deps: ViewDeps,
    loader: DualRendererImageLoader,
    visual: watch::Sender<Visual>,
    attempts: Vec<Attempt>,
}

impl ImageView {
    pub(crate) fn new(props: ImageProps, deps: ViewDeps) -> Self {
        let (visual, _) = watch::channel(Visual::Idle);
        Self {
            props,
            deps,
            loader: DualRendererImageLoader::new(),
            visual,
            attempts: Vec::new(),
        }
    }

    pub fn props(&self) -> &ImageProps {
        &self.props
    }

    /// Receive every visual change of this surface.
    pub fn subscribe(&self) -> watch::Receiver<Visual> {
        self.visual.subscribe()
    }

    pub fn visual(&self) -> Visual {
        self.visual.borrow().clone()
    }

    pub fn loader_state(&self) -> &LoaderState {
        self.loader.state()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    fn publish(&self, visual: Visual) {
        self.visual.send_replace(visual);
    }

    fn renderer(&self, kind: RendererKind) -> Arc<dyn Renderer> {
        match kind {
            RendererKind::Rich => self.deps.rich.clone(),
            RendererKind::Baseline => self.deps.baseline.clone(),
        }
    }

    fn give_up_visual(&self) -> Visual {
        match &self.props.fallback {
            Some(asset) => Visual::Fallback { asset: asset.clone() },
            None => Visual::Unavailable,
        }
    }

    /// Change the inputs. A new URI or cache key restarts from `Idle`; other
    /// changes (styling, loader visibility) only re-publish the visual.
    pub async fn set_props(&mut self, props: ImageProps) -> Visual {
        let identity_changed = !self.props.same_identity(&props);
        self.props = props;
        if identity_changed {
            debug!(uri = self.props.canonical_uri(), "Image identity changed, reloading");
            return self.load().await;
        }

        let visual = match self.visual() {
            Visual::Loading { uri, tier, renderer, .. } => Visual::Loading {
                uri,
                tier,
                renderer,
                show_loader: self.loader.show_loader(self.props.show_loader),
            },
            Visual::Fallback { .. } | Visual::Unavailable => self.give_up_visual(),
            other => other,
        };
        self.publish(visual.clone());
        visual
    }

    /// Run the load to completion and return the settled visual.
    pub async fn load(&mut self) -> Visual {
        self.loader.reset();
        self.attempts.clear();
        self.publish(Visual::Idle);

        let canonical = self.props.canonical_uri().to_string();
        if canonical.is_empty() {
            debug!("No image URI, showing fallback");
            let visual = self.give_up_visual();
            self.publish(visual.clone());
            return visual;
        }

        let key = self.props.cache_key().to_string();
        let cached = if self.props.cache_enabled {
            self.deps.cache.get(&key).await
        } else {
            None
        };
        let outcome = if cached.is_some() { "hit" } else { "miss" };
        self.deps.metrics.cache_lookups.with_label_values(&[outcome]).inc();

        let mut chain = DegradationChain::new(self.deps.resolver.clone(), &canonical, cached);
        let mut next = chain.next_candidate();
        while let Some(candidate) = next {
            if let Some(visual) = self.try_candidate(&key, &candidate).await {
                return visual;
            }

            if candidate.from_cache {
                self.deps.cache.invalidate(&key).await;
            }
            next = chain.next_candidate();
            if let Some(following) = &next {
                self.deps.metrics.degradations.inc();
                info!(
                    uri = %candidate.uri,
                    tier = ?candidate.tier,
                    next_tier = ?following.tier,
                    "Both renderers failed, degrading tier"
                );
            }
        }

        self.deps.metrics.terminal_failures.inc();
        warn!(
            uri = %canonical,
            attempts = self.attempts.len(),
            "Image unavailable after exhausting tiers"
        );
        let visual = self.give_up_visual();
        self.publish(visual.clone());
        visual
    }

    /// Load one candidate on the primary then secondary renderer. Returns the
    /// settled visual on success, `None` when both renderers failed.
    async fn try_candidate(&mut self, key: &str, candidate: &Candidate) -> Option<Visual> {
        self.loader.reset();
        let mut ticket = self.loader.begin(&candidate.uri, candidate.tier)?;

        loop {
            self.publish(Visual::Loading {
                uri: candidate.uri.clone(),
                tier: candidate.tier,
                renderer: ticket.renderer(),
                show_loader: self.loader.show_loader(self.props.show_loader),
            });

            let renderer = self.renderer(ticket.renderer());
            let result = renderer.load(ticket.uri()).await;
            let label = if result.is_ok() { "ok" } else { "error" };
            self.deps
                .metrics
                .load_attempts
                .with_label_values(&[ticket.renderer().as_str(), label])
                .inc();

            let transition = match &result {
                Ok(_) => self.loader.on_load_end(&ticket),
                Err(e) => {
                    debug!(uri = %candidate.uri, renderer = %ticket.renderer(), error = %e, "Image load failed");
                    self.loader.on_error(&ticket)
                }
            };
            self.attempts.push(Attempt {
                uri: candidate.uri.clone(),
                tier: candidate.tier,
                renderer: ticket.renderer(),
                from_cache: candidate.from_cache,
                ok: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            match transition {
                Transition::Loaded => {
                    if self.props.cache_enabled {
                        self.deps.cache.put(key, &candidate.uri, candidate.tier).await;
                    }
                    let visual = Visual::Image {
                        uri: candidate.uri.clone(),
                        tier: candidate.tier,
                        renderer: ticket.renderer(),
                    };
                    self.publish(visual.clone());
                    return Some(visual);
                }
                Transition::Fallback(next) => ticket = next,
                Transition::Failed => return None,
                Transition::Ignored => {
                    warn!(
                        uri = %candidate.uri,
                        generation = self.loader.generation(),
                        ticket_generation = ticket.generation(),
                        "Dropped stale load completion"
                    );
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_identity() {
        let a = ImageProps::new(" https://img.test/a.jpg ");
        assert_eq!(a.canonical_uri(), "https://img.test/a.jpg");
        assert_eq!(a.cache_key(), "https://img.test/a.jpg");

        let keyed = a.clone().with_cache_key("poster-42");
        assert_eq!(keyed.cache_key(), "poster-42");
        assert!(!a.same_identity(&keyed));

        let restyled = ImageProps {
            resize_mode: ResizeMode::Contain,
            ..a.clone()
        };
        assert!(a.same_identity(&restyled));

        let blank_key = a.clone().with_cache_key("  ");
        assert_eq!(blank_key.cache_key(), "https://img.test/a.jpg");
    }

    #[test]
    fn test_props_deserialize_defaults() {
        let props: ImageProps = serde_json::from_str(r#"{"uri": "https://img.test/a.jpg"}"#).unwrap();
        assert!(props.show_loader);
        assert!(props.cache_enabled);
        assert_eq!(props.resize_mode, ResizeMode::Cover);
        assert_eq!(props.loader_style.color, "#667eea");
    }

    #[test]
    fn test_visual_serialization() {
        let visual = Visual::Image {
            uri: "u".to_string(),
            tier: Some(Tier::Low),
            renderer: RendererKind::Baseline,
        };
        let json = serde_json::to_value(&visual).unwrap();
        assert_eq!(json["state"], "image");
        assert_eq!(json["tier"], "low");
        assert_eq!(json["renderer"], "baseline");
    }
}
