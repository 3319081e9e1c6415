//! Quality resolver: derives tier-specific URIs from a canonical media URI.
//!
//! Two rewrite strategies:
//! 1. Transform CDNs (`/upload/` style paths): inject or replace the leading
//!    transform segment, e.g. `f_auto,q_auto:best,c_limit,w_800`.
//! 2. Any other http(s) host: append `w=` / `q=` query parameters unless the
//!    URI already carries sizing parameters.
//!
//! Resolution is a pure function of `(uri, tier)` and the resolver config.

use tracing::trace;
use url::Url;

use crate::cache::tier::{QualityRequest, Tier};
use crate::config::{ResolverConfig, TierPreset};

/// Query parameters that indicate the URI is already sized by its author.
const SIZING_PARAMS: &[&str] = &["w", "width", "h", "height", "q", "quality", "fit", "resize"];

/// Crop modes accepted in a `c_` transform.
const CROP_MODES: &[&str] = &[
    "crop", "fill", "fill_pad", "fit", "imagga_crop", "imagga_scale", "lfill", "limit", "lpad",
    "mfit", "mpad", "pad", "scale", "thumb",
];

/// Delivery formats accepted in an `f_` transform.
const FORMATS: &[&str] = &["auto", "avif", "gif", "jpg", "jpeg", "png", "webp", "jxl", "heic"];

/// Gravities accepted in a `g_` transform.
const GRAVITIES: &[&str] = &[
    "auto", "center", "east", "face", "faces", "north", "north_east", "north_west", "south",
    "south_east", "south_west", "west", "xy_center",
];

/// Effects accepted in an `e_` transform (before any `:` parameter).
const EFFECTS: &[&str] = &[
    "auto_brightness", "auto_color", "auto_contrast", "blur", "blur_faces", "brightness",
    "colorize", "contrast", "grayscale", "improve", "pixelate", "saturation", "sepia", "sharpen",
    "trim", "unsharp_mask", "vibrance",
];

/// Flags accepted in an `fl_` transform (dot separated).
const FLAGS: &[&str] = &["any_format", "keep_iptc", "lossy", "preserve_transparency", "progressive", "strip_profile"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "avif", "heic"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];

/// Resolves canonical URIs into per-tier URIs.
#[derive(Debug, Clone)]
pub struct QualityResolver {
    config: ResolverConfig,
}

impl Default for QualityResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl QualityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `canonical_uri` for `tier`.
    ///
    /// An empty (or whitespace-only) input yields an empty string, meaning
    /// "no image available". The `original` tier returns the trimmed input
    /// unchanged. URIs the resolver cannot safely rewrite are returned as-is.
    pub fn resolve(&self, canonical_uri: &str, tier: Tier) -> String {
        let preset = match tier {
            Tier::Optimized => &self.config.optimized,
            Tier::Low => &self.config.low,
            Tier::Original => return canonical_uri.trim().to_string(),
        };
        let resolved = self.resolve_with(canonical_uri, preset);
        trace!(uri = canonical_uri, tier = %tier, resolved = %resolved, "Resolved quality tier");
        resolved
    }

    /// Rewrite `canonical_uri` for an explicit preset, e.g. a full-resolution
    /// detail load. Same rules as [`resolve`](Self::resolve) for a
    /// transformed tier.
    pub fn resolve_with(&self, canonical_uri: &str, preset: &TierPreset) -> String {
        let uri = canonical_uri.trim();
        if uri.is_empty() {
            return String::new();
        }

        let source = if self.config.video_poster_frames {
            poster_frame_uri(uri)
        } else {
            uri.to_string()
        };

        let parsed = match Url::parse(&source) {
            Ok(url) => url,
            Err(_) => return source,
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return source;
        }

        if self.is_transform_host(parsed.host_str()) && parsed.path().contains(&self.config.upload_marker) {
            self.apply_path_transform(&source, preset).unwrap_or(source)
        } else {
            apply_query_params(&source, &parsed, preset)
        }
    }

    /// Resolve `request` and every cheaper tier after it, in degradation order.
    pub fn resolve_chain(&self, request: &QualityRequest) -> Vec<(Tier, String)> {
        std::iter::successors(Some(request.clone()), QualityRequest::degraded)
            .map(|req| (req.tier, self.resolve(&req.canonical_uri, req.tier)))
            .collect()
    }

    fn is_transform_host(&self, host: Option<&str>) -> bool {
        let Some(host) = host else {
            return false;
        };
        self.config.transform_hosts.iter().any(|known| {
            host.eq_ignore_ascii_case(known)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", known.to_ascii_lowercase()))
        })
    }

    /// `…/upload/<transform>/<rest>`: the preset's transform is injected right
    /// after the marker. Leading transform segments are replaced only when
    /// they are unambiguous (see [`strip_transforms`]); anything else stays
    /// in place and the injected transform chains in front of it.
    fn apply_path_transform(&self, source: &str, preset: &TierPreset) -> Option<String> {
        let marker = &self.config.upload_marker;
        let path_end = source.find(['?', '#']).unwrap_or(source.len());
        let (path, tail) = source.split_at(path_end);
        let (prefix, remainder) = path.split_once(marker.as_str())?;
        if remainder.is_empty() {
            return None;
        }

        let remainder = strip_transforms(remainder);
        let transform = injected_transform(preset);
        Some(format!("{prefix}{marker}{transform}/{remainder}{tail}"))
    }
}

fn injected_transform(preset: &TierPreset) -> String {
    format!("f_auto,q_{},c_limit,w_{}", preset.cdn_quality, preset.max_width)
}

/// Drop leading transform segments from the path after the upload marker.
///
/// A segment this resolver injected is always replaced. Other leading
/// segments go only when every part is a known key with a valid value and
/// the run is followed by a version (`v1712`) or the file name; folders such
/// as `e_commerce/` or `t_shirts/` are kept.
fn strip_transforms(remainder: &str) -> &str {
    let remainder = match remainder.split_once('/') {
        Some((first, rest)) if is_injected_transform(first) && !rest.is_empty() => rest,
        _ => remainder,
    };

    let mut cursor = remainder;
    while let Some((first, rest)) = cursor.split_once('/') {
        if !is_transform_segment(first) {
            break;
        }
        cursor = rest;
    }

    if cursor.len() < remainder.len() && starts_with_asset(cursor) {
        cursor
    } else {
        remainder
    }
}

/// `v<digits>/…` or a bare file name.
fn starts_with_asset(path: &str) -> bool {
    match path.split_once('/') {
        Some((first, rest)) => is_version_segment(first) && !rest.is_empty(),
        None => !path.is_empty(),
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// `f_auto,q_<token>,c_limit,w_<digits>`.
fn is_injected_transform(segment: &str) -> bool {
    let parts: Vec<&str> = segment.split(',').collect();
    matches!(
        parts.as_slice(),
        ["f_auto", quality, "c_limit", width]
            if quality.len() > 2 && quality.starts_with("q_")
                && width.strip_prefix("w_").is_some_and(is_number)
    )
}

fn apply_query_params(source: &str, parsed: &Url, preset: &TierPreset) -> String {
    let already_sized = parsed
        .query_pairs()
        .any(|(key, _)| SIZING_PARAMS.contains(&key.to_ascii_lowercase().as_str()));
    if already_sized {
        return source.to_string();
    }

    let (base, fragment) = match source.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (source, None),
    };
    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };

    let mut out = format!(
        "{base}{separator}w={}&q={}",
        preset.max_width, preset.generic_quality
    );
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// A segment like `c_fill,w_200` made only of known `key_value` parts.
fn is_transform_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.split(',').all(|part| match part.split_once('_') {
            Some((key, value)) => is_transform_part(key, value),
            None => false,
        })
}

/// Whether `value` is a valid argument for transform `key`. Keys that take
/// free-form names (named transformations, overlays) never qualify.
fn is_transform_part(key: &str, value: &str) -> bool {
    match key {
        "w" | "h" | "q" | "dpr" => is_number(value) || value == "auto" || value.starts_with("auto:"),
        "x" | "y" | "a" | "z" => is_number(value),
        "r" => is_number(value) || value == "max",
        "ar" => value.split(':').all(is_number),
        "c" => CROP_MODES.contains(&value),
        "f" => FORMATS.contains(&value),
        "g" => GRAVITIES.contains(&value),
        "e" => EFFECTS.contains(&value.split(':').next().unwrap_or(value)),
        "fl" => value.split('.').all(|flag| FLAGS.contains(&flag)),
        "b" => value.starts_with("rgb:") || value == "auto" || value.starts_with("auto:"),
        _ => false,
    }
}

fn is_number(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    digits.bytes().any(|b| b.is_ascii_digit()) && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

fn path_extension(path: &str) -> Option<(usize, String)> {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = path[file_start..].rfind('.')? + file_start;
    Some((dot, path[dot + 1..].to_ascii_lowercase()))
}

/// Map a video URI to its `.jpg` poster frame. Image URIs and anything
/// unrecognised are returned unchanged; the query string is preserved.
pub fn poster_frame_uri(input: &str) -> String {
    let (path, query) = match input.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (input, None),
    };

    let extension = path_extension(path);
    if let Some((_, ext)) = &extension {
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return input.to_string();
        }
    }

    let transformed = match extension {
        Some((dot, ext)) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => {
            format!("{}.jpg", &path[..dot])
        }
        _ if path.contains("/video/") => format!("{path}.jpg"),
        _ => return input.to_string(),
    };

    match query {
        Some(query) => format!("{transformed}?{query}"),
        None => transformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOUDINARY: &str = "https://res.cloudinary.com/demo/image/upload/v1712/posters/diwali.jpg";

    #[test]
    fn test_cloudinary_inject() {
        let resolver = QualityResolver::default();
        assert_eq!(
            resolver.resolve(CLOUDINARY, Tier::Optimized),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:best,c_limit,w_800/v1712/posters/diwali.jpg"
        );
        assert_eq!(
            resolver.resolve(CLOUDINARY, Tier::Low),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:eco,c_limit,w_400/v1712/posters/diwali.jpg"
        );
    }

    #[test]
    fn test_cloudinary_replaces_existing_transform() {
        let resolver = QualityResolver::default();
        let uri = "https://res.cloudinary.com/demo/image/upload/c_fill,w_1200/e_sharpen/v1712/a.png";
        assert_eq!(
            resolver.resolve(uri, Tier::Low),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:eco,c_limit,w_400/v1712/a.png"
        );
    }

    #[test]
    fn test_underscored_filename_is_not_a_transform() {
        let resolver = QualityResolver::default();
        let uri = "https://res.cloudinary.com/demo/image/upload/my_photo.jpg";
        assert_eq!(
            resolver.resolve(uri, Tier::Optimized),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:best,c_limit,w_800/my_photo.jpg"
        );
    }

    #[test]
    fn test_transform_like_folders_are_kept() {
        let resolver = QualityResolver::default();
        for folder in ["e_commerce", "t_shirts", "c_posters", "w_banners"] {
            let uri = format!("https://res.cloudinary.com/demo/image/upload/{folder}/shoe.jpg");
            let optimized = resolver.resolve(&uri, Tier::Optimized);
            assert_eq!(
                optimized,
                format!("https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:best,c_limit,w_800/{folder}/shoe.jpg")
            );
            assert_eq!(resolver.resolve(&optimized, Tier::Optimized), optimized);
            assert_eq!(
                resolver.resolve(&optimized, Tier::Low),
                format!("https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:eco,c_limit,w_400/{folder}/shoe.jpg")
            );
        }
    }

    #[test]
    fn test_transform_before_folder_is_chained() {
        let resolver = QualityResolver::default();
        let uri = "https://res.cloudinary.com/demo/image/upload/w_300/banners/a.jpg";
        assert_eq!(
            resolver.resolve(uri, Tier::Optimized),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:best,c_limit,w_800/w_300/banners/a.jpg"
        );

        let uri = "https://res.cloudinary.com/demo/image/upload/c_thumb,g_face,w_150/avatar.png";
        assert_eq!(
            resolver.resolve(uri, Tier::Low),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:eco,c_limit,w_400/avatar.png"
        );
    }

    #[test]
    fn test_upload_marker_in_query_is_ignored() {
        let resolver = QualityResolver::default();
        assert_eq!(
            resolver.resolve("https://res.cloudinary.com/demo/image/fetch/a.jpg?next=/upload/x", Tier::Optimized),
            "https://res.cloudinary.com/demo/image/fetch/a.jpg?next=/upload/x&w=800&q=90"
        );
        assert_eq!(
            resolver.resolve("https://res.cloudinary.com/demo/image/upload/v1/a.jpg?from=/upload/b", Tier::Low),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:eco,c_limit,w_400/v1/a.jpg?from=/upload/b"
        );
    }

    #[test]
    fn test_transform_part_values() {
        assert!(is_transform_segment("c_fill,w_200,h_200,g_auto"));
        assert!(is_transform_segment("f_auto,q_auto:best,c_limit,w_800"));
        assert!(is_transform_segment("e_blur:300"));
        assert!(!is_transform_segment("e_commerce"));
        assert!(!is_transform_segment("t_shirts"));
        assert!(!is_transform_segment("w_banners"));
        assert!(!is_transform_segment("c_posters"));
        assert!(!is_transform_segment("l_logo"));
        assert!(is_version_segment("v1712"));
        assert!(!is_version_segment("v"));
        assert!(!is_version_segment("videos"));
    }

    #[test]
    fn test_resolve_with_detail_preset() {
        let resolver = QualityResolver::default();
        let preset = TierPreset {
            max_width: 2400,
            cdn_quality: "auto:good".to_string(),
            generic_quality: 75,
        };
        assert_eq!(
            resolver.resolve_with(CLOUDINARY, &preset),
            "https://res.cloudinary.com/demo/image/upload/f_auto,q_auto:good,c_limit,w_2400/v1712/posters/diwali.jpg"
        );
        assert_eq!(
            resolver.resolve_with(" https://images.test/p/1.jpg ", &preset),
            "https://images.test/p/1.jpg?w=2400&q=75"
        );
        assert_eq!(resolver.resolve_with("", &preset), "");
    }

    #[test]
    fn test_generic_host_appends_params() {
        let resolver = QualityResolver::default();
        assert_eq!(
            resolver.resolve("https://images.test/p/1.jpg", Tier::Optimized),
            "https://images.test/p/1.jpg?w=800&q=90"
        );
        assert_eq!(
            resolver.resolve("https://images.test/p/1.jpg?token=abc#top", Tier::Low),
            "https://images.test/p/1.jpg?token=abc&w=400&q=60#top"
        );
    }

    #[test]
    fn test_presized_uri_unmodified() {
        let resolver = QualityResolver::default();
        let uri = "https://images.test/p/1.jpg?width=300";
        assert_eq!(resolver.resolve(uri, Tier::Optimized), uri);
        assert_eq!(resolver.resolve(uri, Tier::Low), uri);
    }

    #[test]
    fn test_non_http_unmodified() {
        let resolver = QualityResolver::default();
        let uri = "file:///data/user/0/app/cache/poster.png";
        assert_eq!(resolver.resolve(uri, Tier::Optimized), uri);
        assert_eq!(resolver.resolve("not a url", Tier::Low), "not a url");
    }

    #[test]
    fn test_empty_and_original() {
        let resolver = QualityResolver::default();
        assert_eq!(resolver.resolve("", Tier::Optimized), "");
        assert_eq!(resolver.resolve("   ", Tier::Original), "");
        assert_eq!(resolver.resolve(CLOUDINARY, Tier::Original), CLOUDINARY);
    }

    #[test]
    fn test_resolve_is_deterministic_and_idempotent() {
        let resolver = QualityResolver::default();
        let inputs = [
            CLOUDINARY,
            "https://images.test/p/1.jpg",
            "https://images.test/p/1.jpg?token=abc",
            "https://res.cloudinary.com/demo/video/upload/v1/clip.mp4",
            "https://res.cloudinary.com/demo/image/upload/e_commerce/shoe.jpg",
            "https://res.cloudinary.com/demo/image/upload/v1/a.jpg?from=/upload/b",
            "asset://logo.png",
        ];
        for uri in inputs {
            for tier in Tier::ALL {
                let once = resolver.resolve(uri, tier);
                assert_eq!(once, resolver.resolve(uri, tier));
                assert_eq!(once, resolver.resolve(&once, tier), "{uri} @ {tier}");
            }
        }
    }

    #[test]
    fn test_video_poster_frames() {
        assert_eq!(
            poster_frame_uri("https://cdn.test/v/clip.MP4?sig=1"),
            "https://cdn.test/v/clip.jpg?sig=1"
        );
        assert_eq!(
            poster_frame_uri("https://res.cloudinary.com/demo/video/upload/v1/clip"),
            "https://res.cloudinary.com/demo/video/upload/v1/clip.jpg"
        );
        assert_eq!(poster_frame_uri("https://cdn.test/a.webp"), "https://cdn.test/a.webp");
        assert_eq!(poster_frame_uri("https://cdn.test/a"), "https://cdn.test/a");

        let resolver = QualityResolver::default();
        assert_eq!(
            resolver.resolve("https://res.cloudinary.com/demo/video/upload/v1/clip.mp4", Tier::Low),
            "https://res.cloudinary.com/demo/video/upload/f_auto,q_auto:eco,c_limit,w_400/v1/clip.jpg"
        );
    }

    #[test]
    fn test_resolve_chain_from_low() {
        let chain = QualityResolver::default().resolve_chain(&QualityRequest::new("https://img.test/a.jpg", Tier::Low));
        assert_eq!(
            chain,
            vec![
                (Tier::Low, "https://img.test/a.jpg?w=400&q=60".to_string()),
                (Tier::Original, "https://img.test/a.jpg".to_string()),
            ]
        );
    }

    #[test]
    fn test_transform_host_subdomain() {
        let mut config = ResolverConfig::default();
        config.transform_hosts.push("example.com".to_string());
        let resolver = QualityResolver::new(config);
        let resolved = resolver.resolve("https://cdn.example.com/img/upload/photo.jpg", Tier::Optimized);
        assert_eq!(
            resolved,
            "https://cdn.example.com/img/upload/f_auto,q_auto:best,c_limit,w_800/photo.jpg"
        );
    }
}
