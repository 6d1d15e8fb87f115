//! Transcode ladder step record.

use serde::{Deserialize, Serialize};

/// Encoder settings for one ladder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeAttempt {
    /// Zero-based step index
    pub iteration: usize,
    /// Maximum output width in pixels, `None` keeps the source width
    pub scale_limit: Option<u32>,
    /// Target video bitrate (bits/second)
    pub video_bitrate: u64,
    /// Audio bitrate (bits/second)
    pub audio_bitrate: u64,
    /// Rate-control ceiling (bits/second)
    pub max_rate: u64,
    /// Rate-control buffer (bits)
    pub buffer_size: u64,
}
