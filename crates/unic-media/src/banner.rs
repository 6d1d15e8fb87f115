//! Banner asset location and placement heuristic.
//!
//! A placement is decided once per run: where the banner goes (top or
//! bottom), how it is composited (overlay or strip), the band geometry and
//! the color keyed out of the asset.

use image::{GenericImageView, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use unic_models::{BannerAsset, BannerMode, BannerPosition, PlacementDecision, Rgb, VideoInfo};

use crate::command::{FfmpegCommand, MediaEngine};
use crate::config::BannerConfig;
use crate::density::{BandDensity, TextDensityAnalyzer};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::expand_tilde;

/// Asset base names, in search order.
pub const BANNER_NAMES: [&str; 5] = ["banner", "overlay", "ad", "promo", "advert"];
/// Asset extensions, in search order.
pub const BANNER_EXTENSIONS: [&str; 8] = [".mp4", ".mov", ".webm", ".m4v", ".png", ".webp", ".jpg", ".jpeg"];
/// Extensions treated as looping video banners.
pub const MOTION_EXTENSIONS: [&str; 4] = ["mp4", "mov", "webm", "m4v"];

/// Both bands denser than this switch to strip mode.
pub const STRIP_DENSITY_THRESHOLD: f64 = 0.055;
/// Upper bound of the margin as a fraction of the smaller frame side.
const MAX_MARGIN_RATIO: f64 = 0.08;
const MIN_MARGIN_PX: u32 = 2;
/// Longest side of the thumbnail the corner color is sampled from.
const CORNER_THUMBNAIL: u32 = 64;

/// Result of [`BannerPlacementEngine::decide`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed { decision: PlacementDecision, reason: String },
    NotFound { reason: String },
    Disabled { reason: String },
}

impl PlacementOutcome {
    pub fn decision(&self) -> Option<&PlacementDecision> {
        match self {
            PlacementOutcome::Placed { decision, .. } => Some(decision),
            _ => None,
        }
    }

    pub fn into_decision(self) -> Option<PlacementDecision> {
        match self {
            PlacementOutcome::Placed { decision, .. } => Some(decision),
            _ => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            PlacementOutcome::Placed { reason, .. }
            | PlacementOutcome::NotFound { reason }
            | PlacementOutcome::Disabled { reason } => reason,
        }
    }
}

/// Decides banner placement from configuration and frame content.
pub struct BannerPlacementEngine {
    config: BannerConfig,
    engine: Arc<dyn MediaEngine>,
    analyzer: TextDensityAnalyzer,
    work_dir: PathBuf,
}

impl BannerPlacementEngine {
    pub fn new(config: BannerConfig, engine: Arc<dyn MediaEngine>, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let analyzer = TextDensityAnalyzer::new(Arc::clone(&engine), work_dir.clone());
        Self {
            config,
            engine,
            analyzer,
            work_dir,
        }
    }

    pub fn config(&self) -> &BannerConfig {
        &self.config
    }

    /// Decide the placement for `input`.
    ///
    /// Fails only when the banner is missing and the configuration demands one.
    pub async fn decide(&self, input: &Path, info: &VideoInfo) -> MediaResult<PlacementOutcome> {
        if !self.config.enabled {
            return Ok(PlacementOutcome::Disabled {
                reason: "banner disabled".to_string(),
            });
        }

        let Some(path) = self.locate_asset() else {
            if self.config.fail_on_missing {
                return Err(MediaError::BannerNotFound(self.search_description()));
            }
            debug!("No banner asset in {}", self.search_description());
            return Ok(PlacementOutcome::NotFound {
                reason: "banner not found".to_string(),
            });
        };

        let (position, mode) = match (self.config.position.fixed(), self.config.mode.fixed()) {
            (Some(position), Some(mode)) => (position, mode),
            (position, mode) => {
                let density = self.analyzer.analyze(input, info.duration).await;
                (
                    position.unwrap_or_else(|| choose_position(density)),
                    mode.unwrap_or_else(|| choose_mode(density)),
                )
            }
        };

        let (margin_px, strip_height) = placement_geometry(info, self.config.margin_ratio, self.config.strip_ratio);

        let is_motion = is_motion_asset(&path);
        let (sampled_corner_color, native_size) = self.inspect_asset(&path, is_motion).await;

        let decision = PlacementDecision {
            asset: BannerAsset {
                path,
                is_motion,
                sampled_corner_color,
                native_size,
            },
            position,
            mode,
            strip_height,
            margin_px,
            width_ratio: self.config.width_ratio,
            strip_ratio: self.config.strip_ratio,
            chroma_key_color: self.config.chromakey_color.or(sampled_corner_color),
        };
        let reason = format!("banner {}/{}", position, mode);

        info!(
            asset = %decision.asset.path.display(),
            position = %position,
            mode = %mode,
            strip_height,
            margin_px,
            "Banner placement decided"
        );

        Ok(PlacementOutcome::Placed { decision, reason })
    }

    /// Explicit path when configured, otherwise the first candidate in the search directory.
    pub fn locate_asset(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.path {
            let path = expand_tilde(path);
            return path.exists().then_some(path);
        }
        find_banner_in(&self.config.search_dir)
    }

    fn search_description(&self) -> String {
        match &self.config.path {
            Some(path) => path.display().to_string(),
            None => self.config.search_dir.display().to_string(),
        }
    }

    /// Sample the corner color and native size; failures leave both unset.
    async fn inspect_asset(&self, path: &Path, is_motion: bool) -> (Option<Rgb>, Option<(u32, u32)>) {
        match self.try_inspect_asset(path, is_motion).await {
            Ok((color, size)) => (Some(color), Some(size)),
            Err(e) => {
                warn!("Failed to sample banner corners for {}: {}", path.display(), e);
                (None, None)
            }
        }
    }

    async fn try_inspect_asset(&self, path: &Path, is_motion: bool) -> MediaResult<(Rgb, (u32, u32))> {
        if !is_motion {
            return decode_corners(path.to_path_buf()).await;
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("banner_probe_")
            .tempdir_in(&self.work_dir)?;
        let frame = scratch.path().join("frame.png");

        let cmd = FfmpegCommand::new(path, &frame).frames(1);
        self.engine.run(&cmd).await?;

        decode_corners(frame).await
    }
}

/// First existing `<dir>/<name><ext>` in search order.
pub fn find_banner_in(dir: &Path) -> Option<PathBuf> {
    BANNER_NAMES.iter().find_map(|name| {
        BANNER_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{name}{ext}")))
            .find(|candidate| candidate.exists())
    })
}

pub fn is_motion_asset(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MOTION_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `bottom` when the top band is busier, otherwise `top`.
pub fn choose_position(density: BandDensity) -> BannerPosition {
    if density.top > density.bottom {
        BannerPosition::Bottom
    } else {
        BannerPosition::Top
    }
}

/// `strip` when both bands carry text, otherwise `overlay`.
pub fn choose_mode(density: BandDensity) -> BannerMode {
    if density.top > STRIP_DENSITY_THRESHOLD && density.bottom > STRIP_DENSITY_THRESHOLD {
        BannerMode::Strip
    } else {
        BannerMode::Overlay
    }
}

/// Margin and strip height in pixels for a frame.
///
/// The strip is widened to fit the margins on both sides, capped at the
/// frame height when it is known.
pub fn placement_geometry(info: &VideoInfo, margin_ratio: f64, strip_ratio: f64) -> (u32, u32) {
    let height = info.height;
    let min_dim = info.min_dimension() as f64;

    let margin = ((min_dim * margin_ratio).floor() as u32).max(MIN_MARGIN_PX);
    let max_margin = ((min_dim * MAX_MARGIN_RATIO).floor() as u32).max(MIN_MARGIN_PX);
    let margin = margin.min(max_margin);

    let mut strip = ((height as f64 * strip_ratio).floor() as u32).max(2);
    let required = 2 * margin + 2;
    if strip <= required {
        strip = if height > 0 { height.min(required) } else { required };
    }

    (margin, strip)
}

async fn decode_corners(path: PathBuf) -> MediaResult<(Rgb, (u32, u32))> {
    tokio::task::spawn_blocking(move || {
        let image = image::open(&path)?;
        let size = image.dimensions();
        let thumb = image.thumbnail(CORNER_THUMBNAIL, CORNER_THUMBNAIL).to_rgb8();
        Ok((median_corner_color(&thumb), size))
    })
    .await
    .map_err(|e| MediaError::internal(format!("corner sampling task failed: {e}")))?
}

/// Per-channel median of the four corner pixels.
pub fn median_corner_color(image: &RgbImage) -> Rgb {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Rgb::new(0, 0, 0);
    }
    let corners = [
        image.get_pixel(0, 0),
        image.get_pixel(w - 1, 0),
        image.get_pixel(0, h - 1),
        image.get_pixel(w - 1, h - 1),
    ];

    let channel = |c: usize| {
        let mut values = corners.map(|p| p[c] as u16);
        values.sort_unstable();
        ((values[1] + values[2]) / 2) as u8
    };

    Rgb::new(channel(0), channel(1), channel(2))
}
