//! HTTP renderers built on reqwest.
//!
//! The baseline renderer fetches and decodes on every call. The rich
//! renderer keeps a bounded moka cache in front of an on-disk cache and only
//! touches the network on a double miss.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::RendererConfig;
use crate::render::{validate_image_bytes, ImageSource, RenderError, RenderedImage, Renderer, RendererKind};

fn build_client(config: &RendererConfig) -> Result<reqwest::Client, RenderError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

/// GET `uri` and check it looks like an image.
async fn fetch_image(client: &reqwest::Client, uri: &str) -> Result<Bytes, RenderError> {
    let response = client.get(uri).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RenderError::Status {
            uri: uri.to_string(),
            status: status.as_u16(),
        });
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let content_type = content_type.to_ascii_lowercase();
        if !content_type.starts_with("image/") && !content_type.starts_with("application/octet-stream") {
            return Err(RenderError::NotAnImage {
                uri: uri.to_string(),
                content_type,
            });
        }
    }

    let data = response.bytes().await?;
    validate_image_bytes(uri, &data)?;
    Ok(data)
}

/// Plain fetch-and-validate renderer with no caching of its own.
pub struct BaselineRenderer {
    client: reqwest::Client,
}

impl BaselineRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self, RenderError> {
        Ok(Self {
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl Renderer for BaselineRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Baseline
    }

    async fn load(&self, uri: &str) -> Result<RenderedImage, RenderError> {
        if uri.is_empty() {
            return Err(RenderError::EmptyUri);
        }
        let data = fetch_image(&self.client, uri).await?;
        debug!(uri, size = data.len(), "Baseline renderer loaded image");
        Ok(RenderedImage {
            uri: uri.to_string(),
            data,
            source: ImageSource::Network,
        })
    }
}

/// Renderer with memory and disk caching in front of the network.
pub struct RichRenderer {
    client: reqwest::Client,
    memory: Cache<String, Bytes>,
    disk_path: PathBuf,
}

impl RichRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self, RenderError> {
        Ok(Self {
            client: build_client(config)?,
            memory: Cache::builder()
                .max_capacity(config.memory_cache_entries as u64)
                .build(),
            disk_path: config.disk_cache_path.clone(),
        })
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    /// On-disk location for `uri`: `<dir>/<2 hex>/<sha256>.img`.
    pub fn disk_entry_path(&self, uri: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(uri.as_bytes()));
        self.disk_path.join(&digest[..2]).join(format!("{digest}.img"))
    }

    pub async fn memory_entries(&self) -> u64 {
        self.memory.run_pending_tasks().await;
        self.memory.entry_count()
    }

    async fn read_disk(&self, uri: &str) -> Option<Bytes> {
        let path = self.disk_entry_path(uri);
        let data = fs::read(&path).await.ok()?;
        if validate_image_bytes(uri, &data).is_err() {
            warn!(uri, path = %path.display(), "Discarding invalid disk cache entry");
            let _ = fs::remove_file(&path).await;
            return None;
        }
        Some(Bytes::from(data))
    }

    async fn write_disk(&self, uri: &str, data: &[u8]) {
        let path = self.disk_entry_path(uri);
        let result = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, data).await
        }
        .await;

        if let Err(e) = result {
            warn!(uri, path = %path.display(), error = %e, "Failed to write disk cache entry");
        }
    }
}

#[async_trait]
impl Renderer for RichRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Rich
    }

    async fn load(&self, uri: &str) -> Result<RenderedImage, RenderError> {
        if uri.is_empty() {
            return Err(RenderError::EmptyUri);
        }

        if let Some(data) = self.memory.get(uri).await {
            debug!(uri, "Rich renderer memory hit");
            return Ok(RenderedImage {
                uri: uri.to_string(),
                data,
                source: ImageSource::Memory,
            });
        }

        if let Some(data) = self.read_disk(uri).await {
            debug!(uri, "Rich renderer disk hit");
            self.memory.insert(uri.to_string(), data.clone()).await;
            return Ok(RenderedImage {
                uri: uri.to_string(),
                data,
                source: ImageSource::Disk,
            });
        }

        let data = fetch_image(&self.client, uri).await?;
        self.write_disk(uri, &data).await;
        self.memory.insert(uri.to_string(), data.clone()).await;
        debug!(uri, size = data.len(), "Rich renderer loaded image from network");

        Ok(RenderedImage {
            uri: uri.to_string(),
            data,
            source: ImageSource::Network,
        })
    }

    async fn clear_memory_cache(&self) {
        let cleared = self.memory.entry_count();
        self.memory.invalidate_all();
        info!(cleared, "Rich renderer memory cache cleared");
    }

    async fn clear_disk_cache(&self) -> Result<(), RenderError> {
        match fs::remove_dir_all(&self.disk_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.disk_path).await?;
        info!(path = %self.disk_path.display(), "Rich renderer disk cache cleared");
        Ok(())
    }
}
