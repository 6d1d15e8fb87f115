//! Banner asset and placement decision models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// 8-bit RGB color, rendered as `0xrrggbb` for the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Error parsing a color string.
#[derive(Debug, Clone, Error)]
#[error("Invalid color: {0} (expected 0xRRGGBB, #RRGGBB or RRGGBB)")]
pub struct ColorParseError(pub String);

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .or_else(|| trimmed.strip_prefix('#'))
            .unwrap_or(trimmed);

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(s.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorParseError(s.to_string()))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// Vertical band the banner occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerPosition {
    Top,
    Bottom,
}

impl BannerPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BannerPosition::Top => "top",
            BannerPosition::Bottom => "bottom",
        }
    }
}

impl fmt::Display for BannerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compositing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerMode {
    /// Composite the banner over the footage.
    Overlay,
    /// Shrink the footage and reserve a dedicated band for the banner.
    Strip,
}

impl BannerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BannerMode::Overlay => "overlay",
            BannerMode::Strip => "strip",
        }
    }
}

impl fmt::Display for BannerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located banner file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerAsset {
    pub path: PathBuf,
    /// Video banner (looped) rather than a still image
    pub is_motion: bool,
    /// Median of the four corner pixels, when it could be sampled
    pub sampled_corner_color: Option<Rgb>,
    /// Native pixel size, when it could be read
    pub native_size: Option<(u32, u32)>,
}

/// Immutable result of the placement heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub asset: BannerAsset,
    pub position: BannerPosition,
    pub mode: BannerMode,
    /// Height of the banner band in pixels
    pub strip_height: u32,
    /// Minimum distance between the banner and the canvas edges
    pub margin_px: u32,
    /// Maximum banner width as a fraction of the frame width
    pub width_ratio: f64,
    /// Band height as a fraction of the frame height
    pub strip_ratio: f64,
    /// Color removed from the banner, if any
    pub chroma_key_color: Option<Rgb>,
}
