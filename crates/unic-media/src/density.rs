//! Edge-gradient text density of the top and bottom frame bands.
//!
//! Frames are extracted by the media engine into a scratch directory and
//! decoded as stills. A band with many strong gradients is likely to carry
//! captions or on-screen graphics.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, MediaEngine};
use crate::error::MediaResult;

/// Default number of sampled frames.
pub const DEFAULT_SAMPLES: u32 = 8;
/// Default band height as a fraction of the frame height.
pub const DEFAULT_BAND_RATIO: f64 = 0.18;
/// Width frames are downscaled to before analysis.
pub const SAMPLE_WIDTH: u32 = 320;
/// Gradients never count as edges below this magnitude.
const MIN_EDGE_THRESHOLD: f32 = 8.0;
/// Percentile of the gradient distribution used as the adaptive threshold.
const EDGE_PERCENTILE: f64 = 85.0;

/// Mean band densities across the sampled frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandDensity {
    pub top: f64,
    pub bottom: f64,
}

impl BandDensity {
    /// Neutral result used when nothing could be measured.
    pub const NEUTRAL: BandDensity = BandDensity { top: 0.0, bottom: 0.0 };

    pub fn is_neutral(&self) -> bool {
        self.top == 0.0 && self.bottom == 0.0
    }
}

/// Samples frames and measures edge density in the top and bottom bands.
pub struct TextDensityAnalyzer {
    engine: Arc<dyn MediaEngine>,
    work_dir: PathBuf,
    samples: u32,
    band_ratio: f64,
}

impl TextDensityAnalyzer {
    pub fn new(engine: Arc<dyn MediaEngine>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            work_dir: work_dir.into(),
            samples: DEFAULT_SAMPLES,
            band_ratio: DEFAULT_BAND_RATIO,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_band_ratio(mut self, band_ratio: f64) -> Self {
        self.band_ratio = band_ratio.clamp(0.0, 1.0);
        self
    }

    /// Measure band densities; any failure yields [`BandDensity::NEUTRAL`].
    ///
    /// `duration` spreads the samples evenly over the clip when known.
    pub async fn analyze(&self, path: &Path, duration: f64) -> BandDensity {
        match self.try_analyze(path, duration).await {
            Ok(density) => density,
            Err(e) => {
                warn!("Failed to extract frames for density analysis: {}", e);
                BandDensity::NEUTRAL
            }
        }
    }

    async fn try_analyze(&self, path: &Path, duration: f64) -> MediaResult<BandDensity> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        // Removed on drop, whichever branch returns
        let scratch = tempfile::Builder::new()
            .prefix("density_")
            .tempdir_in(&self.work_dir)?;

        let cmd = FfmpegCommand::new(path, scratch.path().join("frame_%03d.jpg"))
            .video_filter(sample_filter(self.samples, duration))
            .frames(self.samples);
        self.engine.run(&cmd).await?;

        let frames = list_frames(scratch.path()).await?;
        if frames.is_empty() {
            debug!(path = %path.display(), "No frames extracted for density analysis");
            return Ok(BandDensity::NEUTRAL);
        }

        let band_ratio = self.band_ratio;
        let density = tokio::task::spawn_blocking(move || measure_frames(&frames, band_ratio))
            .await
            .map_err(|e| crate::error::MediaError::internal(format!("density task failed: {e}")))??;

        debug!(
            path = %path.display(),
            top = density.top,
            bottom = density.bottom,
            "Measured text density"
        );
        Ok(density)
    }
}

/// Frame-sampling filter: `samples` frames evenly over `duration`.
fn sample_filter(samples: u32, duration: f64) -> String {
    let rate = if duration > 0.0 {
        format!("{:.6}", samples as f64 / duration)
    } else {
        "1".to_string()
    };
    format!("fps={},scale={}:-1", rate, SAMPLE_WIDTH)
}

async fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame_") && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}

fn measure_frames(frames: &[PathBuf], band_ratio: f64) -> MediaResult<BandDensity> {
    let mut top_sum = 0.0;
    let mut bottom_sum = 0.0;

    for frame in frames {
        let image = image::open(frame)?.to_rgb8();
        let (top, bottom) = band_densities(&image, band_ratio);
        top_sum += top;
        bottom_sum += bottom;
    }

    let count = frames.len() as f64;
    Ok(BandDensity {
        top: top_sum / count,
        bottom: bottom_sum / count,
    })
}

/// Edge density of the top and bottom bands of one frame.
pub fn band_densities(image: &RgbImage, band_ratio: f64) -> (f64, f64) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return (0.0, 0.0);
    }

    let band = ((height as f64 * band_ratio) as u32).clamp(1, height);
    let gray = luma(image);
    let w = width as usize;

    let top = &gray[..band as usize * w];
    let bottom = &gray[(height - band) as usize * w..];

    (edge_density(top, w, band as usize), edge_density(bottom, w, band as usize))
}

/// Mean of the three channels, row-major.
fn luma(image: &RgbImage) -> Vec<f32> {
    image
        .pixels()
        .map(|p| (p[0] as f32 + p[1] as f32 + p[2] as f32) / 3.0)
        .collect()
}

/// Fraction of pixels whose gradient exceeds `max(8, p85(gradient))`.
///
/// The gradient is |dx| + |dy| with the last column/row repeated so the map
/// keeps the input size.
pub fn edge_density(gray: &[f32], width: usize, height: usize) -> f64 {
    if width == 0 || height == 0 || gray.len() < width * height {
        return 0.0;
    }

    let mut grad = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let gx_col = if width > 1 { x.min(width - 2) } else { 0 };
            let gy_row = if height > 1 { y.min(height - 2) } else { 0 };

            let gx = if width > 1 {
                (gray[y * width + gx_col + 1] - gray[y * width + gx_col]).abs()
            } else {
                0.0
            };
            let gy = if height > 1 {
                (gray[(gy_row + 1) * width + x] - gray[gy_row * width + x]).abs()
            } else {
                0.0
            };
            grad[y * width + x] = gx + gy;
        }
    }

    let threshold = MIN_EDGE_THRESHOLD.max(percentile(&grad, EDGE_PERCENTILE));
    let edges = grad.iter().filter(|&&g| g > threshold).count();
    edges as f64 / grad.len() as f64
}

/// Linearly interpolated percentile (`p` in 0..=100).
fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
