//! Detail-view tests: thumbnail while the full image loads, background
//! preload, quality presets and full-image failure.

mod common;

use image_tier_cache::cache::tier::Tier;
use image_tier_cache::config::DetailQuality;
use image_tier_cache::detail::{DetailProps, DetailVisual};
use image_tier_cache::render::RendererKind;
use image_tier_cache::view::{FallbackAsset, Visual};

use common::{harness, pipeline_with, GatedRenderer, ScriptedRenderer};

const THUMB: &str = "https://img.test/thumb.jpg";
const FULL: &str = "https://img.test/full.jpg";

fn thumbnail_image() -> Visual {
    Visual::Image {
        uri: format!("{THUMB}?w=800&q=90"),
        tier: Some(Tier::Optimized),
        renderer: RendererKind::Rich,
    }
}

#[tokio::test]
async fn test_thumbnail_shown_until_full_image_loads() {
    let rich = GatedRenderer::new(RendererKind::Rich, |uri| uri.contains("full"), |_| false);
    let baseline = GatedRenderer::new(RendererKind::Baseline, |_| false, |_| false);
    let pipeline = pipeline_with(rich.clone(), baseline.clone());

    let mut view = pipeline.mount_detail(DetailProps::new(THUMB, FULL).without_preload());
    assert_eq!(view.full_uri(), format!("{FULL}?w=2400&q=90"));
    let mut rx = view.subscribe();

    let opened = view.open().await;
    assert_eq!(opened.visual, thumbnail_image());
    assert!(!opened.full);
    assert!(!opened.show_loader);
    assert_eq!(rich.calls().len(), 1, "full image is loaded on demand");

    let task = tokio::spawn(async move {
        view.load_full().await;
        view
    });

    let loading = rx.wait_for(|v| v.show_loader).await.unwrap().clone();
    assert_eq!(
        loading,
        DetailVisual {
            visual: thumbnail_image(),
            show_loader: true,
            full: false,
        }
    );
    rich.release();

    let view = task.await.unwrap();
    let expected = DetailVisual {
        visual: Visual::Image {
            uri: format!("{FULL}?w=2400&q=90"),
            tier: None,
            renderer: RendererKind::Rich,
        },
        show_loader: false,
        full: true,
    };
    assert_eq!(view.visual(), expected);
    assert_eq!(*rx.borrow(), expected);
    assert_eq!(view.attempts().len(), 1);
    assert!(baseline.calls().is_empty());
}

#[tokio::test]
async fn test_full_image_preloaded_in_background() {
    let h = harness(
        ScriptedRenderer::succeeding(RendererKind::Rich),
        ScriptedRenderer::succeeding(RendererKind::Baseline),
    );

    let view = h.pipeline.render_detail(DetailProps::new(THUMB, FULL)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(!view.visual().full);
    assert_eq!(view.loader_state().name(), "idle");
    assert!(h.rich.calls().contains(&format!("{FULL}?w=2400&q=90")));
    assert_eq!(h.pipeline.metrics().prefetch_dispatched.get(), 1);
}

#[tokio::test]
async fn test_load_on_mount_and_quality_preset() {
    let h = harness(
        ScriptedRenderer::succeeding(RendererKind::Rich),
        ScriptedRenderer::succeeding(RendererKind::Baseline),
    );

    let props = DetailProps::new(THUMB, "https://cdn.example.com/img/upload/v3/poster.jpg")
        .with_quality(DetailQuality::Medium)
        .with_max_width(1600)
        .without_preload()
        .load_on_mount();
    let view = h.pipeline.render_detail(props).await;

    let full = "https://cdn.example.com/img/upload/f_auto,q_auto:good,c_limit,w_1600/v3/poster.jpg";
    assert_eq!(view.full_uri(), full);
    assert!(view.visual().full);
    assert_eq!(h.rich.calls(), vec![format!("{THUMB}?w=800&q=90"), full.to_string()]);
}

#[tokio::test]
async fn test_failed_full_image_keeps_thumbnail() {
    let h = harness(
        ScriptedRenderer::new(RendererKind::Rich, |uri| uri.contains("full")),
        ScriptedRenderer::new(RendererKind::Baseline, |uri| uri.contains("full")),
    );

    let mut view = h.pipeline.render_detail(DetailProps::new(THUMB, FULL).without_preload()).await;
    let visual = view.load_full().await;
    assert_eq!(visual.visual, thumbnail_image());
    assert!(!visual.full);
    assert!(!visual.show_loader);
    assert_eq!(view.attempts().len(), 2);
    assert_eq!(view.loader_state().name(), "error_terminal");

    // A settled full load is not retried.
    view.load_full().await;
    assert_eq!(view.attempts().len(), 2);
    assert_eq!(h.rich.calls().len(), 2);
}

#[tokio::test]
async fn test_no_thumbnail_and_failed_full_image_shows_fallback() {
    let h = harness(
        ScriptedRenderer::failing(RendererKind::Rich),
        ScriptedRenderer::failing(RendererKind::Baseline),
    );

    let mut props = DetailProps::new("", FULL).without_preload();
    props.thumbnail = props.thumbnail.with_fallback("assets/logo.png");
    let mut view = h.pipeline.render_detail(props).await;
    assert_eq!(view.visual().visual, Visual::Idle);

    let visual = view.load_full().await;
    assert_eq!(
        visual.visual,
        Visual::Fallback {
            asset: FallbackAsset("assets/logo.png".to_string())
        }
    );
    assert!(view.thumbnail().attempts().is_empty());
}

#[tokio::test]
async fn test_no_full_image_is_a_no_op() {
    let h = harness(
        ScriptedRenderer::succeeding(RendererKind::Rich),
        ScriptedRenderer::succeeding(RendererKind::Baseline),
    );

    let mut view = h.pipeline.render_detail(DetailProps::new(THUMB, "  ")).await;
    assert_eq!(view.full_uri(), "");
    let visual = view.load_full().await;
    assert_eq!(visual.visual, thumbnail_image());
    assert_eq!(h.pipeline.metrics().prefetch_dispatched.get(), 0);
    assert_eq!(h.rich.calls().len(), 1);
}
