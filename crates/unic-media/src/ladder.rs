//! Size-constrained two-pass transcode ladder.
//!
//! Each step lowers the bitrate and, from the second step on, caps the
//! output width. The first output at or under the byte budget wins.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use unic_models::TranscodeAttempt;

use crate::command::{null_device, FfmpegCommand, MediaEngine};
use crate::config::LadderConfig;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{file_size, remove_if_exists};
use crate::probe::MediaProber;

/// Width caps per step; `None` keeps the source width.
pub const SCALE_STEPS: [Option<u32>; 4] = [None, Some(720), Some(540), Some(480)];
/// Audio bitrate per step (bits/second).
pub const AUDIO_STEPS: [u64; 4] = [128_000, 112_000, 96_000, 96_000];

const MIN_TOTAL_BITRATE: u64 = 250_000;
const MIN_VIDEO_BITRATE: u64 = 200_000;
/// Container and muxing overhead reserved from the total (bits/second).
const CONTAINER_OVERHEAD: u64 = 120_000;
const STEP_DECAY: f64 = 0.9;
/// Bytes per second assumed when the duration cannot be probed.
const FALLBACK_BYTES_PER_SECOND: f64 = 4_000_000.0;
const PASS_LOG_SUFFIXES: [&str; 4] = ["-0.log", "-0.log.mbtree", "-0.log.temp", "-0.log.mbtree.temp"];

/// Re-encodes a file to fit a byte budget.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Produce a new file no larger than `target_bytes`.
    async fn compress(&self, source: &Path, target_bytes: u64) -> MediaResult<PathBuf>;
}

/// Bitrate settings for every step of one ladder run.
pub fn plan_attempts(target_bytes: u64, duration: f64, max_iterations: usize) -> Vec<TranscodeAttempt> {
    let duration = if duration > 0.0 { duration } else { 1.0 };
    let base_total = ((target_bytes as f64 * 8.0 / duration) as u64).max(MIN_TOTAL_BITRATE);

    (0..max_iterations.min(SCALE_STEPS.len()))
        .map(|iteration| {
            let audio_bitrate = AUDIO_STEPS[iteration];
            let effective = ((base_total as f64 * STEP_DECAY.powi(iteration as i32)) as u64).max(MIN_VIDEO_BITRATE);
            let video_bitrate = effective
                .saturating_sub(audio_bitrate + CONTAINER_OVERHEAD)
                .max(MIN_VIDEO_BITRATE);

            TranscodeAttempt {
                iteration,
                scale_limit: SCALE_STEPS[iteration],
                video_bitrate,
                audio_bitrate,
                max_rate: video_bitrate * 12 / 10,
                buffer_size: video_bitrate * 2,
            }
        })
        .collect()
}

/// Cap the width at `limit`, keeping the aspect with an even height.
pub fn scale_filter(limit: u32) -> String {
    format!("scale=min({},iw):-2:flags=lanczos", limit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Analysis,
    Final,
}

/// Two-pass libx264 ladder over the media engine.
pub struct TranscodeLadder {
    engine: Arc<dyn MediaEngine>,
    prober: Arc<dyn MediaProber>,
    config: LadderConfig,
}

impl TranscodeLadder {
    pub fn new(engine: Arc<dyn MediaEngine>, prober: Arc<dyn MediaProber>, config: LadderConfig) -> Self {
        Self { engine, prober, config }
    }

    pub fn config(&self) -> &LadderConfig {
        &self.config
    }

    fn pass_command(
        &self,
        source: &Path,
        output: &Path,
        attempt: &TranscodeAttempt,
        passlog: &Path,
        pass: Pass,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(source, output);
        if let Some(limit) = attempt.scale_limit {
            cmd = cmd.video_filter(scale_filter(limit));
        }

        cmd = cmd
            .video_codec("libx264")
            .output_args([
                "-b:v".to_string(),
                attempt.video_bitrate.to_string(),
                "-maxrate".to_string(),
                attempt.max_rate.to_string(),
                "-bufsize".to_string(),
                attempt.buffer_size.to_string(),
            ])
            .preset(self.config.preset.as_str())
            .output_args(["-profile:v", "high", "-pix_fmt", "yuv420p"])
            .output_arg("-passlogfile")
            .output_arg(passlog.to_string_lossy());

        match pass {
            Pass::Analysis => cmd.output_args(["-pass", "1", "-an", "-f", "mp4"]),
            Pass::Final => cmd
                .output_args(["-pass", "2"])
                .audio_codec("aac")
                .audio_bitrate(attempt.audio_bitrate.to_string())
                .output_args(["-movflags", "+faststart"]),
        }
    }

    async fn source_duration(&self, source: &Path) -> f64 {
        let info = self.prober.probe(source).await;
        if info.duration > 0.0 {
            return info.duration;
        }
        let bytes = file_size(source).await.unwrap_or(0);
        (bytes as f64 / FALLBACK_BYTES_PER_SECOND).max(1.0)
    }

    async fn run_attempts(
        &self,
        source: &Path,
        output: &Path,
        passlog: &Path,
        target_bytes: u64,
        attempts: &[TranscodeAttempt],
    ) -> MediaResult<PathBuf> {
        let mut best_bytes: Option<u64> = None;

        for attempt in attempts {
            metrics::counter!("unic_ladder_attempts_total").increment(1);
            info!(
                iteration = attempt.iteration,
                scale_limit = ?attempt.scale_limit,
                video_bitrate = attempt.video_bitrate,
                audio_bitrate = attempt.audio_bitrate,
                "Transcode ladder step"
            );

            for pass in [Pass::Analysis, Pass::Final] {
                let target = if pass == Pass::Analysis { Path::new(null_device()) } else { output };
                let cmd = self.pass_command(source, target, attempt, passlog, pass);
                if let Err(e) = self.engine.run(&cmd).await {
                    remove_if_exists(output).await;
                    return Err(e);
                }
            }

            let size = file_size(output).await?;
            if size <= target_bytes {
                info!(iteration = attempt.iteration, size, target_bytes, "Transcode fits budget");
                return Ok(output.to_path_buf());
            }

            debug!(iteration = attempt.iteration, size, target_bytes, "Transcode still oversized");
            best_bytes = Some(best_bytes.map_or(size, |best| best.min(size)));
            remove_if_exists(output).await;
        }

        warn!(target_bytes, best = ?best_bytes, "Transcode ladder exhausted");
        Err(MediaError::BudgetExceeded {
            target_bytes,
            best_bytes,
            attempts: attempts.len(),
        })
    }
}

#[async_trait]
impl Compressor for TranscodeLadder {
    async fn compress(&self, source: &Path, target_bytes: u64) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let duration = self.source_duration(source).await;
        let attempts = plan_attempts(target_bytes, duration, self.config.max_iterations);

        let token = Uuid::new_v4().simple().to_string();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let output = self
            .config
            .work_dir
            .join(format!("{}_compressed_{}.mp4", stem, &token[..8]));
        let passlog = self.config.work_dir.join(format!("passlog_{}", token));

        let result = self
            .run_attempts(source, &output, &passlog, target_bytes, &attempts)
            .await;
        cleanup_pass_logs(&passlog).await;
        result
    }
}

/// Remove the encoder's statistics files for `base`.
async fn cleanup_pass_logs(base: &Path) {
    for suffix in PASS_LOG_SUFFIXES {
        let mut path = OsString::from(base.as_os_str());
        path.push(suffix);
        remove_if_exists(PathBuf::from(path)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{portrait_info, FakeEngine, FixedProber};
    use tempfile::TempDir;
    use unic_models::VideoInfo;

    /// Writes `-b:v × num / den` bytes on the final pass and a pass log on both.
    fn sized_engine(num: u64, den: u64) -> FakeEngine {
        FakeEngine::with_handler(move |cmd| {
            if let Some(base) = cmd.output_value("-passlogfile") {
                std::fs::write(format!("{base}-0.log"), b"stats").unwrap();
                std::fs::write(format!("{base}-0.log.mbtree"), b"tree").unwrap();
            }
            if cmd.output_value("-pass") == Some("2") {
                let bitrate: u64 = cmd.output_value("-b:v").unwrap().parse().unwrap();
                std::fs::write(cmd.output_path(), vec![0u8; (bitrate * num / den) as usize]).unwrap();
            }
            Ok(())
        })
    }

    fn ladder(engine: Arc<FakeEngine>, work_dir: &Path, info: VideoInfo) -> TranscodeLadder {
        let config = LadderConfig {
            work_dir: work_dir.to_path_buf(),
            ..LadderConfig::default()
        };
        TranscodeLadder::new(engine, Arc::new(FixedProber(info)), config)
    }

    fn remaining_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_plan_reference_budget() {
        let plan = plan_attempts(10_000_000, 40.0, 4);
        let video: Vec<u64> = plan.iter().map(|a| a.video_bitrate).collect();
        assert_eq!(video, vec![1_752_000, 1_568_000, 1_404_000, 1_242_000]);
        assert_eq!(plan[0].scale_limit, None);
        assert_eq!(plan[3].scale_limit, Some(480));
        assert_eq!(plan[0].max_rate, 2_102_400);
        assert_eq!(plan[0].buffer_size, 3_504_000);
        assert_eq!(plan[2].audio_bitrate, 96_000);
    }

    #[test]
    fn test_plan_floors() {
        let plan = plan_attempts(1_000, 10.0, 4);
        assert!(plan.iter().all(|a| a.video_bitrate == 200_000));
        assert_eq!(plan_attempts(1_000, 10.0, 9).len(), 4);
        assert_eq!(plan_attempts(1_000, 10.0, 2).len(), 2);
        assert!(plan_attempts(1_000, 10.0, 0).is_empty());
    }

    #[test]
    fn test_scale_filter() {
        assert_eq!(scale_filter(720), "scale=min(720,iw):-2:flags=lanczos");
    }

    #[tokio::test]
    async fn test_returns_first_fitting_step() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"source").unwrap();
        let work = dir.path().join("work");

        // Step 0 writes 1_051_200 bytes, step 1 writes 940_800
        let engine = Arc::new(sized_engine(6, 10));
        let ladder = ladder(engine.clone(), &work, VideoInfo { duration: 4.0, ..portrait_info() });

        let output = ladder.compress(&source, 1_000_000).await.unwrap();
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 940_800);
        assert_eq!(engine.call_count(), 4);

        let second_final = &engine.calls()[3];
        assert_eq!(second_final.output_value("-vf"), Some("scale=min(720,iw):-2:flags=lanczos"));
        assert_eq!(second_final.output_value("-b:a"), Some("112000"));

        let first_analysis = &engine.calls()[0];
        assert_eq!(first_analysis.output_path(), Path::new(null_device()));
        assert_eq!(first_analysis.output_value("-f"), Some("mp4"));

        // Only the fitting output survives
        assert_eq!(remaining_files(&work).len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"source").unwrap();
        let work = dir.path().join("work");

        let engine = Arc::new(sized_engine(1, 1));
        let ladder = ladder(engine.clone(), &work, portrait_info());

        let err = ladder.compress(&source, 10).await.unwrap_err();
        match err {
            MediaError::BudgetExceeded {
                target_bytes,
                best_bytes,
                attempts,
            } => {
                assert_eq!(target_bytes, 10);
                assert_eq!(attempts, 4);
                assert_eq!(best_bytes, Some(200_000));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.call_count(), 8);
        assert!(remaining_files(&work).is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_cleans_up() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        let engine = Arc::new(FakeEngine::with_handler(|cmd| {
            if let Some(base) = cmd.output_value("-passlogfile") {
                std::fs::write(format!("{base}-0.log"), b"stats").unwrap();
            }
            Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)))
        }));
        let ladder = ladder(engine.clone(), &work, portrait_info());

        let err = ladder.compress(&dir.path().join("missing.mp4"), 1_000).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegFailed { .. }));
        assert_eq!(engine.call_count(), 1);
        assert!(remaining_files(&work).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_duration_uses_file_size() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, vec![0u8; 1_024]).unwrap();

        let engine = Arc::new(sized_engine(1, 1_000_000));
        let ladder = ladder(engine.clone(), dir.path(), VideoInfo::unknown());
        ladder.compress(&source, 5_000_000).await.unwrap();

        // One-second fallback: 40 Mbit/s total budget
        let bitrate: u64 = engine.calls()[0].output_value("-b:v").unwrap().parse().unwrap();
        assert_eq!(bitrate, 40_000_000 - 128_000 - 120_000);
    }
}
