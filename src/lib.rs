//! image-tier-cache: adaptive image delivery for list-heavy UIs.
//!
//! Every image is requested at the cheapest tier that still looks right:
//!   optimized (bounded width, high quality) → low (half width) → original
//!
//! A per-key tier cache remembers which URI last rendered so the next visit
//! starts there, a dual-renderer loader retries the same URI on a plainer
//! renderer before degrading, and a prefetch scheduler warms caches ahead of
//! scrolling. Detail views load a full-resolution image on demand over the
//! thumbnail.

pub mod cache;
pub mod config;
pub mod detail;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod storage;
pub mod view;

pub use cache::tier::Tier;
pub use config::Config;
pub use detail::{DetailProps, DetailView};
pub use pipeline::ImagePipeline;
pub use view::{ImageProps, ImageView, Visual};
