//! Remote video acquisition using yt-dlp.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Format selector: ≤1080p mp4 with best audio, falling back to any single file.
pub const YTDLP_FORMAT: &str = "b[ext=mp4][height<=1080]+ba/best[ext=mp4]/best";

/// A downloaded source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedVideo {
    pub path: PathBuf,
    /// Display name derived from the remote title
    pub title: String,
}

/// Remote video acquisition seam.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dir: &Path) -> MediaResult<DownloadedVideo>;
}

/// Downloader backed by the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    binary: String,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }
}

impl YtDlpDownloader {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn args(url: &str, dir: &Path) -> Vec<String> {
        let template = dir.join("yt_%(id)s.%(ext)s");
        vec![
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            YTDLP_FORMAT.to_string(),
            "--restrict-filenames".to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "before_dl:title".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, url: &str, dir: &Path) -> MediaResult<DownloadedVideo> {
        which::which(&self.binary).map_err(|_| MediaError::YtDlpNotFound)?;
        tokio::fs::create_dir_all(dir).await?;

        info!(url = %url, dir = %dir.display(), "Downloading video");

        let output = Command::new(&self.binary)
            .args(Self::args(url, dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            let message = stderr.lines().last().unwrap_or("Unknown error");
            return Err(MediaError::download_failed(format!("yt-dlp failed: {}", message)));
        }

        let (path, title) = parse_print_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| MediaError::download_failed("yt-dlp reported no output file"))?;

        if !path.exists() {
            return Err(MediaError::download_failed("Output file not created"));
        }

        info!(output = %path.display(), title = %title, "Downloaded video");
        Ok(DownloadedVideo { path, title })
    }
}

/// Title (first line) and final path (last line) printed by yt-dlp.
fn parse_print_output(stdout: &str) -> Option<(PathBuf, String)> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let path = PathBuf::from(*lines.last()?);
    let title = if lines.len() > 1 { lines[0] } else { "video" };
    Some((path, format!("{}.mp4", title)))
}

fn youtube_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(https?://)?(www\.)?(youtube\.com|youtu\.be)/[^\s]+").expect("valid youtube regex")
    })
}

/// First YouTube link in free text, normalized to `https://`.
pub fn extract_youtube_url(text: &str) -> Option<String> {
    let found = youtube_pattern().find(text)?;
    let url = found.as_str().trim_end_matches([')', ',', '.']);
    if url.to_lowercase().starts_with("http") {
        Some(url.to_string())
    } else {
        Some(format!("https://{}", url))
    }
}
