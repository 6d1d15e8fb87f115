//! FFprobe video information.
//!
//! Probing never fails: a missing binary or unreadable output degrades to
//! [`VideoInfo::unknown`] so later stages fall back to conservative defaults.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

use unic_models::VideoInfo;

/// Default FFprobe binary name.
pub const DEFAULT_FFPROBE_BINARY: &str = "ffprobe";

/// Stream-geometry prober seam.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> VideoInfo;
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Prober backed by `ffprobe`, with an `ffmpeg -i` banner fallback.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: String,
    ffmpeg: String,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self {
            ffprobe: DEFAULT_FFPROBE_BINARY.to_string(),
            ffmpeg: crate::command::DEFAULT_FFMPEG_BINARY.to_string(),
        }
    }
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn probe_json(&self, path: &Path) -> Option<VideoInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Probe binary not available ({}): {}", self.ffprobe, e);
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                "Probe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        match serde_json::from_slice::<FfprobeOutput>(&output.stdout) {
            Ok(probe) => Some(info_from_probe(&probe)),
            Err(e) => {
                warn!("Unreadable ffprobe output for {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn probe_banner(&self, path: &Path) -> VideoInfo {
        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            // ffmpeg exits non-zero without an output file; the stream banner is still printed
            Ok(output) => parse_stream_banner(&String::from_utf8_lossy(&output.stderr)),
            Err(e) => {
                warn!("FFmpeg binary not available while probing ({}): {}", self.ffmpeg, e);
                VideoInfo::unknown()
            }
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> VideoInfo {
        let info = match self.probe_json(path).await {
            Some(info) => info,
            None => self.probe_banner(path).await,
        };
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration = info.duration,
            fps = info.fps,
            has_audio = info.has_audio,
            "Probed video"
        );
        info
    }
}

fn info_from_probe(probe: &FfprobeOutput) -> VideoInfo {
    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite())
        .unwrap_or(0.0)
        .max(0.0);

    let fps = video
        .and_then(|s| s.avg_frame_rate.as_deref().or(s.r_frame_rate.as_deref()))
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    VideoInfo {
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        duration,
        fps,
        has_audio,
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97"); `n/0` yields 0.
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return Some(if den > 0.0 { num / den } else { 0.0 });
    }
    s.trim().parse().ok()
}

fn banner_patterns() -> &'static (Regex, Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"Duration: (\d+):(\d+):(\d+(?:\.\d+)?)").expect("valid duration regex"),
            Regex::new(r"Video:.*?(\d{2,5})x(\d{2,5})").expect("valid resolution regex"),
            Regex::new(r"(\d+(?:\.\d+)?) fps").expect("valid fps regex"),
        )
    })
}

/// Parse the stream banner `ffmpeg -i` prints to stderr.
fn parse_stream_banner(text: &str) -> VideoInfo {
    let (duration_re, video_re, fps_re) = banner_patterns();

    let duration = duration_re
        .captures(text)
        .and_then(|c| {
            let hours: f64 = c.get(1)?.as_str().parse().ok()?;
            let minutes: f64 = c.get(2)?.as_str().parse().ok()?;
            let seconds: f64 = c.get(3)?.as_str().parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        })
        .unwrap_or(0.0);

    let (width, height) = video_re
        .captures(text)
        .and_then(|c| Some((c.get(1)?.as_str().parse().ok()?, c.get(2)?.as_str().parse().ok()?)))
        .unwrap_or((0, 0));

    let fps = fps_re
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse().ok())
        .unwrap_or(0.0);

    VideoInfo {
        width,
        height,
        duration,
        fps,
        has_audio: text.contains("Audio:"),
    }
}
