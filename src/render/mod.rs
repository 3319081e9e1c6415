//! Image rendering strategies.
//!
//! - [`http`]: reqwest-backed rich (memory + disk cached) and baseline renderers
//!
//! A renderer accepts a URI and either produces a decoded image or an
//! error. The display surface tries the rich renderer first and falls back to
//! the baseline renderer for the same URI.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use http::{BaselineRenderer, RichRenderer};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {uri}")]
    Status { uri: String, status: u16 },

    #[error("Not an image ({content_type}) at {uri}")]
    NotAnImage { uri: String, content_type: String },

    #[error("Undecodable image data at {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty URI")]
    EmptyUri,
}

/// Which of the two rendering strategies produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Primary: aggressive memory + disk caching.
    Rich,
    /// Secondary: plain fetch, no caching assumptions.
    Baseline,
}

impl RendererKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendererKind::Rich => "rich",
            RendererKind::Baseline => "baseline",
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rendered image's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Network,
    Memory,
    Disk,
}

/// A successfully loaded image.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub uri: String,
    pub data: Bytes,
    pub source: ImageSource,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    fn kind(&self) -> RendererKind;

    /// Load and validate the image at `uri`.
    async fn load(&self, uri: &str) -> Result<RenderedImage, RenderError>;

    /// Fetch `uri` purely to warm caches.
    async fn prefetch(&self, uri: &str) -> Result<(), RenderError> {
        self.load(uri).await.map(|_| ())
    }

    /// Drop any in-memory cached images.
    async fn clear_memory_cache(&self) {}

    /// Drop any on-disk cached images.
    async fn clear_disk_cache(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Decode `data` as an image. A known signature in front of a corrupt or
/// truncated body is rejected.
pub fn validate_image_bytes(uri: &str, data: &[u8]) -> Result<(), RenderError> {
    if let Err(e) = image::load_from_memory(data) {
        debug!(uri, size = data.len(), error = %e, "Image data failed to decode");
        return Err(RenderError::Decode(uri.to_string()));
    }
    Ok(())
}

/// A small encoded image in `format`.
#[cfg(test)]
pub(crate) fn encoded_image(format: image::ImageFormat) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::RgbImage::from_pixel(4, 4, image::Rgb([102, 126, 234]))
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}
