//! Probed video geometry.

use serde::{Deserialize, Serialize};

/// Stream geometry of a probed input.
///
/// Zero values mean the probe failed; consumers treat them as "unknown"
/// rather than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    /// Frame rate (fps)
    pub fps: f64,
    /// Whether the container carries an audio stream
    pub has_audio: bool,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

impl VideoInfo {
    /// Conservative defaults used when probing fails.
    ///
    /// Audio is assumed present so the encode keeps any audio track it finds.
    pub const fn unknown() -> Self {
        Self {
            width: 0,
            height: 0,
            duration: 0.0,
            fps: 0.0,
            has_audio: true,
        }
    }

    /// Whether both frame dimensions are known.
    pub fn has_geometry(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Smaller frame dimension, never below 1.
    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height).max(1)
    }
}
