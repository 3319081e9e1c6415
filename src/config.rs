//! Runtime configuration for image-tier-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tier-related knobs (transform presets, TTL, prefetch window) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::tier::Tier;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-tier-cache", about = "Adaptive image delivery and tier cache service")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Quality resolver presets.
    pub resolver: ResolverConfig,

    /// Persistent tier cache settings.
    pub cache: TierCacheConfig,

    /// Key-value store backing the tier cache.
    pub storage: StorageConfig,

    /// Rich/baseline renderer settings.
    pub renderer: RendererConfig,

    /// Prefetching settings.
    pub prefetch: PrefetchConfig,

    /// Full-resolution detail view settings.
    pub detail: DetailConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Size/quality preset for one transformed tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPreset {
    /// Maximum width requested from the host.
    pub max_width: u32,

    /// Quality token for transform CDNs (`q_<token>`).
    pub cdn_quality: String,

    /// Numeric quality for generic `q=` query parameters.
    pub generic_quality: u8,
}

/// Host transform rules and per-tier presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Hosts that accept path-segment transforms after the upload marker.
    pub transform_hosts: Vec<String>,

    /// Path marker after which the transform segment is injected.
    pub upload_marker: String,

    /// Preset for the `optimized` tier.
    pub optimized: TierPreset,

    /// Preset for the `low` tier.
    pub low: TierPreset,

    /// Rewrite video URIs to their `.jpg` poster frame before transforming.
    pub video_poster_frames: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            transform_hosts: vec!["res.cloudinary.com".to_string()],
            upload_marker: "/upload/".to_string(),
            optimized: TierPreset {
                max_width: 800,
                cdn_quality: "auto:best".to_string(),
                generic_quality: 90,
            },
            low: TierPreset {
                max_width: 400,
                cdn_quality: "auto:eco".to_string(),
                generic_quality: 60,
            },
            video_poster_frames: true,
        }
    }
}

/// Persistent tier cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCacheConfig {
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,

    /// Prefix prepended to every storage key.
    pub key_prefix: String,

    /// Global switch; when false every lookup misses and writes are dropped.
    pub enabled: bool,
}

impl Default for TierCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60, // 7 days
            key_prefix: "@thumbnail_cache_".to_string(),
            enabled: true,
        }
    }
}

impl TierCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Key-value store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the file-backed store. `None` keeps entries in memory only.
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("/tmp/image-tier-cache/kv")),
        }
    }
}

/// Renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// On-disk cache directory of the rich renderer.
    pub disk_cache_path: PathBuf,

    /// Maximum number of images kept in the rich renderer's memory cache.
    pub memory_cache_entries: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// User agent sent with image requests.
    pub user_agent: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            disk_cache_path: PathBuf::from("/tmp/image-tier-cache/images"),
            memory_cache_entries: 256,
            request_timeout_secs: 30,
            user_agent: format!("image-tier-cache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Prefetch window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Number of items per prefetch batch.
    pub batch_size: usize,

    /// Schedule the next batch when the highest visible index is this close
    /// to the end of the prefetched range.
    pub lookahead: usize,

    /// Delay before the second mount-time batch, in milliseconds.
    pub follow_up_delay_ms: u64,

    /// Tier whose resolved URI is prefetched.
    pub tier: Tier,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            lookahead: 10,
            follow_up_delay_ms: 300,
            tier: Tier::Optimized,
        }
    }
}

impl PrefetchConfig {
    pub fn follow_up_delay(&self) -> Duration {
        Duration::from_millis(self.follow_up_delay_ms)
    }
}

/// Quality level of a full-resolution detail load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailQuality {
    Low,
    Medium,
    #[default]
    High,
    Original,
}

impl DetailQuality {
    /// Quality token for transform CDNs.
    pub fn cdn_quality(&self) -> &'static str {
        match self {
            DetailQuality::Low => "auto:low",
            DetailQuality::Medium => "auto:good",
            DetailQuality::High => "auto:best",
            DetailQuality::Original => "auto",
        }
    }

    /// Numeric `q=` for generic hosts.
    pub fn generic_quality(&self) -> u8 {
        match self {
            DetailQuality::High => 90,
            DetailQuality::Medium => 75,
            DetailQuality::Low | DetailQuality::Original => 60,
        }
    }
}

/// Full-resolution detail view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Default quality level.
    pub quality: DetailQuality,

    /// Default maximum width of the full image.
    pub max_width: u32,

    /// Warm the rich renderer with the full image as soon as the view opens.
    pub preload: bool,

    /// Load the full image on open instead of on demand.
    pub load_on_mount: bool,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            quality: DetailQuality::High,
            max_width: 2400,
            preload: true,
            load_on_mount: false,
        }
    }
}

impl DetailConfig {
    /// Transform preset for a full-resolution load.
    pub fn preset(quality: DetailQuality, max_width: u32) -> TierPreset {
        TierPreset {
            max_width,
            cdn_quality: quality.cdn_quality().to_string(),
            generic_quality: quality.generic_quality(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
