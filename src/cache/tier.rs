//! Quality tiers and per-request tier selection.
//!
//! A tier is a size/quality preset for one source image. Tiers are the unit
//! of degradation: a display surface only ever moves from a richer tier to a
//! cheaper one, never back up.

use serde::{Deserialize, Serialize};

/// Identifies which quality preset a resolved URI was built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Tier 0: bounded width, high quality.
    #[default]
    Optimized,
    /// Tier 1: half width, eco quality.
    Low,
    /// Tier 2: the untouched source URI.
    Original,
}

impl Tier {
    /// All tiers in degradation order.
    pub const ALL: [Tier; 3] = [Tier::Optimized, Tier::Low, Tier::Original];

    /// Returns the numeric tier level (lower = richer transform).
    pub fn level(&self) -> u8 {
        match self {
            Tier::Optimized => 0,
            Tier::Low => 1,
            Tier::Original => 2,
        }
    }

    /// Returns the next tier to try after a failure, or None if already at the source.
    pub fn demote(&self) -> Option<Tier> {
        match self {
            Tier::Optimized => Some(Tier::Low),
            Tier::Low => Some(Tier::Original),
            Tier::Original => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Optimized => write!(f, "optimized"),
            Tier::Low => write!(f, "low"),
            Tier::Original => write!(f, "original"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimized" => Ok(Tier::Optimized),
            "low" => Ok(Tier::Low),
            "original" => Ok(Tier::Original),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// A canonical URI paired with the tier it should be rendered at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityRequest {
    /// The untransformed source URI.
    #[serde(rename = "uri")]
    pub canonical_uri: String,

    /// The requested tier.
    #[serde(default)]
    pub tier: Tier,
}

impl QualityRequest {
    pub fn new(canonical_uri: impl Into<String>, tier: Tier) -> Self {
        Self {
            canonical_uri: canonical_uri.into(),
            tier,
        }
    }

    /// The same source at the next cheaper tier.
    pub fn degraded(&self) -> Option<QualityRequest> {
        self.tier.demote().map(|tier| QualityRequest {
            canonical_uri: self.canonical_uri.clone(),
            tier,
        })
    }
}
