//! Per-run variant pipeline.
//!
//! A run probes the input once, decides the banner placement once, then
//! renders variants strictly in index order. In session runs each variant
//! is delivered and deleted before the next one is rendered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use unic_media::fs_utils::{expand_tilde, move_file, remove_if_exists};
use unic_media::{
    extract_youtube_url, run_seed, variant_file_name, BannerConfig, BannerPlacementEngine, Downloader,
    FilterGraphSynthesizer, MediaEngine, MediaError, MediaProber, VariantEncoder, VariantJob,
    VariantParameterGenerator,
};
use unic_models::{PlacementDecision, UserId, VariantParams, VideoInfo};

use crate::config::WorkerConfig;
use crate::delivery::DeliveryRetrier;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::session::SessionStore;

/// One rendered variant of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVariant {
    /// 1-based variant index
    pub index: u32,
    pub params: VariantParams,
    pub path: PathBuf,
}

/// Input ready for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredInput {
    pub path: PathBuf,
    pub display_name: String,
    /// Fetched into the work dir, and owned by the run
    pub downloaded: bool,
}

/// Resolve a local path or YouTube link to a local input file.
pub async fn acquire_input(input: &str, downloader: &dyn Downloader, dir: &Path) -> WorkerResult<AcquiredInput> {
    if let Some(url) = extract_youtube_url(input) {
        let video = downloader.download(&url, dir).await?;
        return Ok(AcquiredInput {
            path: video.path,
            display_name: video.title,
            downloaded: true,
        });
    }

    let path = expand_tilde(Path::new(input));
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path).into());
    }
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input.mp4".to_string());

    Ok(AcquiredInput {
        path,
        display_name,
        downloaded: false,
    })
}

/// Seed for variant `index` (1-based): consecutive seeds from an override,
/// otherwise a fresh random seed.
pub fn variant_seed(index: u32, override_seed: Option<u64>) -> u64 {
    run_seed(override_seed.map(|seed| seed.saturating_add(u64::from(index.saturating_sub(1)))))
}

/// Placement and synthesis state shared by all variants of a run.
struct PreparedRun {
    info: VideoInfo,
    decision: Option<PlacementDecision>,
    synthesizer: FilterGraphSynthesizer,
}

/// Renders seeded variants of one input.
pub struct VariantPipeline {
    engine: Arc<dyn MediaEngine>,
    prober: Arc<dyn MediaProber>,
    banner: BannerConfig,
    generator: VariantParameterGenerator,
    encoder: VariantEncoder,
    work_root: PathBuf,
}

impl VariantPipeline {
    pub fn new(config: &WorkerConfig, engine: Arc<dyn MediaEngine>, prober: Arc<dyn MediaProber>) -> Self {
        Self {
            encoder: VariantEncoder::new(Arc::clone(&engine)).with_encoding(config.encoding.clone()),
            engine,
            prober,
            banner: config.banner.clone(),
            generator: VariantParameterGenerator::new(config.variant_ranges),
            work_root: config.work_dir.clone(),
        }
    }

    fn run_dir(&self) -> WorkerResult<tempfile::TempDir> {
        std::fs::create_dir_all(&self.work_root)?;
        Ok(tempfile::Builder::new().prefix("run_").tempdir_in(&self.work_root)?)
    }

    async fn prepare(&self, input: &Path, run_dir: &Path, logger: &RunLogger) -> WorkerResult<PreparedRun> {
        let info = self.prober.probe(input).await;
        if !info.has_geometry() {
            logger.log_warning("input geometry unknown, using engine defaults");
        }

        let placement = BannerPlacementEngine::new(self.banner.clone(), Arc::clone(&self.engine), run_dir);
        let outcome = placement.decide(input, &info).await?;
        let synthesizer = FilterGraphSynthesizer::new(&self.banner, info);
        match outcome.decision() {
            Some(decision) => {
                logger.log_progress(&format!("banner decision: {}", outcome.reason()));
                let preview = decision
                    .asset
                    .native_size
                    .and_then(|native| synthesizer.preview(decision, native));
                if let Some(p) = preview {
                    tracing::debug!(
                        canvas_w = p.canvas_w,
                        canvas_h = p.canvas_h,
                        banner_w = p.banner_w,
                        banner_h = p.banner_h,
                        x = p.x,
                        y = p.y,
                        "Banner layout"
                    );
                }
            }
            None => logger.log_warning(&format!("banner skipped: {}", outcome.reason())),
        }

        Ok(PreparedRun {
            info,
            synthesizer,
            decision: outcome.into_decision(),
        })
    }

    async fn render(
        &self,
        run: &PreparedRun,
        input: &Path,
        output: &Path,
        seed: u64,
    ) -> WorkerResult<VariantParams> {
        let params = self.generator.generate(seed);
        let graph = run.synthesizer.build(run.decision.as_ref(), &params);
        let job = VariantJob {
            input,
            output,
            graph: &graph,
            banner: run.decision.as_ref().map(|d| &d.asset),
            has_audio: run.info.has_audio,
            pitch_factor: params.pitch_factor,
        };
        self.encoder.encode(&job).await?;
        Ok(params)
    }

    /// Render `variants` files into `outdir` as `variant_<index>_<seed>.mp4`.
    ///
    /// Each variant is encoded in the run directory and moved into `outdir`
    /// once complete. The first encode failure aborts the run.
    pub async fn run_batch(
        &self,
        input: &Path,
        outdir: &Path,
        variants: u32,
        seed_override: Option<u64>,
    ) -> WorkerResult<Vec<RenderedVariant>> {
        let logger = RunLogger::new(short_run_id(), "batch");
        let span = logger.create_span();

        async {
            logger.log_start(&format!("{} variant(s) of {}", variants, input.display()));
            tokio::fs::create_dir_all(outdir).await?;
            let run_dir = self.run_dir()?;
            let run = self.prepare(input, run_dir.path(), &logger).await?;

            let mut rendered = Vec::with_capacity(variants as usize);
            for index in 1..=variants {
                let seed = variant_seed(index, seed_override);
                let name = variant_file_name(index, seed);
                let working = run_dir.path().join(&name);
                let output = outdir.join(&name);

                let params = match self.render(&run, input, &working, seed).await {
                    Ok(params) => params,
                    Err(e) => {
                        logger.log_error(&format!("variant {} failed: {}", index, e));
                        return Err(e);
                    }
                };
                move_file(&working, &output).await?;
                logger.log_progress(&format!("generated {}", output.display()));
                tracing::info!("{}", params.as_report());
                rendered.push(RenderedVariant { index, params, path: output });
            }

            logger.log_completion(&format!("{} variant(s) rendered", rendered.len()));
            Ok(rendered)
        }
        .instrument(span)
        .await
    }

    /// Process the staged session of `user`: render, deliver and delete
    /// each variant in turn.
    ///
    /// The input file, the run directory and the session entry are released
    /// on every exit path once processing has begun.
    pub async fn run_session(
        &self,
        sessions: &SessionStore,
        user: UserId,
        delivery: &DeliveryRetrier,
    ) -> WorkerResult<u32> {
        let session = sessions.begin_processing(user).await?;
        let logger = RunLogger::new(short_run_id(), "session");
        let span = logger.create_span();

        let result = async {
            logger.log_start(&format!(
                "{} variant(s) of {} for user {}",
                session.variants, session.original_name, user
            ));
            let run_dir = self.run_dir()?;
            let run = self.prepare(&session.input_path, run_dir.path(), &logger).await?;

            for index in 1..=session.variants {
                let seed = variant_seed(index, None);
                let output = run_dir.path().join(variant_file_name(index, seed));

                let params = match self.render(&run, &session.input_path, &output, seed).await {
                    Ok(params) => params,
                    Err(e) => {
                        notify(delivery, &format!("FFmpeg error (variant {}): {}", index, e)).await;
                        return Err(e);
                    }
                };

                let caption = format!("Variant {}/{}\n{}", index, session.variants, params.as_report());
                let delivered = delivery.deliver(&output, &caption).await;
                remove_if_exists(&output).await;
                let outcome = delivered?;
                logger.log_progress(&format!(
                    "variant {} delivered after {} send(s){}",
                    index,
                    outcome.attempts_used,
                    if outcome.was_compressed() { ", compressed" } else { "" }
                ));
            }

            notify(delivery, "Done ✅").await;
            Ok(session.variants)
        }
        .instrument(span)
        .await;

        remove_if_exists(&session.input_path).await;
        sessions.finish(user).await;

        match &result {
            Ok(count) => logger.log_completion(&format!("{} variant(s) delivered", count)),
            Err(e) => {
                logger.log_error(&e.to_string());
                if !matches!(e, WorkerError::Delivery(_)) && !e.is_encode_failure() {
                    notify(delivery, &format!("Processing failed: {}", e)).await;
                }
            }
        }
        result
    }
}

async fn notify(delivery: &DeliveryRetrier, text: &str) {
    if let Err(e) = delivery.transport().send_message(text).await {
        tracing::warn!("Failed to send notice: {}", e);
    }
}

fn short_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::testing::{portrait_info, FakeCompressor, FixedProber, ScriptedTransport, WritingEngine};
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use unic_media::{DownloadedVideo, MediaResult};
    use unic_models::SessionState;

    const USER: UserId = UserId(11);

    fn config(work: &TempDir) -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.work_dir = work.path().join("work");
        config.banner.enabled = false;
        config
    }

    fn pipeline(config: &WorkerConfig, engine: Arc<WritingEngine>) -> VariantPipeline {
        VariantPipeline::new(config, engine, Arc::new(FixedProber(portrait_info())))
    }

    fn retrier(transport: Arc<ScriptedTransport>, dir: &Path) -> DeliveryRetrier {
        DeliveryRetrier::new(
            transport,
            Arc::new(FakeCompressor::new(dir, 10)),
            DeliveryConfig {
                max_upload_bytes: 1_000,
                attempts: 3,
                backoff_base: Duration::ZERO,
            },
        )
    }

    fn work_dir_entries(config: &WorkerConfig) -> usize {
        std::fs::read_dir(&config.work_dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_variant_seed() {
        assert_eq!(variant_seed(1, Some(42)), 42);
        assert_eq!(variant_seed(3, Some(42)), 44);
        let random = variant_seed(1, None);
        assert!((1..=10_000_000).contains(&random));
    }

    #[tokio::test]
    async fn test_batch_writes_one_file_per_variant() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let engine = Arc::new(WritingEngine::ok());
        let outdir = dir.path().join("out");

        let rendered = pipeline(&config, engine.clone())
            .run_batch(Path::new("in.mp4"), &outdir, 3, Some(100))
            .await
            .unwrap();

        let names: Vec<String> = rendered
            .iter()
            .map(|v| v.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["variant_1_100.mp4", "variant_2_101.mp4", "variant_3_102.mp4"]);
        assert!(rendered.iter().all(|v| v.path.exists()));
        assert_eq!(rendered[1].params.seed, 101);
        assert_eq!(engine.calls().len(), 3);
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn test_batch_aborts_on_encode_failure() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let engine = Arc::new(WritingEngine::failing_from(2));
        let outdir = dir.path().join("out");

        let err = pipeline(&config, engine.clone())
            .run_batch(Path::new("in.mp4"), &outdir, 3, Some(5))
            .await
            .unwrap_err();

        assert!(err.is_encode_failure());
        assert_eq!(engine.calls().len(), 2);
        assert!(outdir.join("variant_1_5.mp4").exists());
        assert!(!outdir.join("variant_2_6.mp4").exists());
    }

    #[tokio::test]
    async fn test_session_delivers_each_variant_and_releases_everything() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"source").unwrap();

        let sessions = SessionStore::default();
        let mut state = SessionState::new(&input, "clip.mp4");
        state.variants = 2;
        sessions.stage(USER, state).await.unwrap();

        let transport = Arc::new(ScriptedTransport::new(1_000, vec![]));
        let delivery = retrier(transport.clone(), dir.path());

        let count = pipeline(&config, Arc::new(WritingEngine::ok()))
            .run_session(&sessions, USER, &delivery)
            .await
            .unwrap();

        assert_eq!(count, 2);
        let captions = transport.sent_captions();
        assert_eq!(captions.len(), 2);
        assert!(captions[0].starts_with("Variant 1/2\nseed: "));
        assert!(captions[1].starts_with("Variant 2/2\n"));
        assert!(transport.sent_paths().iter().all(|p| !p.exists()));
        assert_eq!(transport.messages(), vec!["Done ✅".to_string()]);
        assert!(!input.exists());
        assert!(sessions.is_empty().await);
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn test_session_encode_failure_notifies_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"source").unwrap();

        let sessions = SessionStore::default();
        sessions.stage(USER, SessionState::new(&input, "clip.mp4")).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(1_000, vec![]));
        let delivery = retrier(transport.clone(), dir.path());

        let err = pipeline(&config, Arc::new(WritingEngine::failing_from(1)))
            .run_session(&sessions, USER, &delivery)
            .await
            .unwrap_err();

        assert!(err.is_encode_failure());
        assert!(transport.sent_paths().is_empty());
        let messages = transport.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("FFmpeg error (variant 1)"));
        assert!(!input.exists());
        assert!(sessions.is_empty().await);
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn test_session_delivery_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"source").unwrap();

        let sessions = SessionStore::default();
        let mut state = SessionState::new(&input, "clip.mp4");
        state.variants = 3;
        sessions.stage(USER, state).await.unwrap();

        let transport = Arc::new(ScriptedTransport::new(
            1_000,
            vec![Err(TransportError::EntityTooLarge), Err(TransportError::EntityTooLarge)],
        ));
        let delivery = retrier(transport.clone(), dir.path());

        let err = pipeline(&config, Arc::new(WritingEngine::ok()))
            .run_session(&sessions, USER, &delivery)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Delivery(_)));
        assert_eq!(transport.sent_paths().len(), 2);
        assert!(!transport.messages().iter().any(|m| m.starts_with("Done")));
        assert!(sessions.is_empty().await);
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn test_session_requires_staged_input() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let sessions = SessionStore::default();
        let transport = Arc::new(ScriptedTransport::new(1_000, vec![]));
        let delivery = retrier(transport, dir.path());

        let err = pipeline(&config, Arc::new(WritingEngine::ok()))
            .run_session(&sessions, USER, &delivery)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Session(crate::error::SessionError::NoSession)));
    }

    struct FakeDownloader;

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, url: &str, dir: &Path) -> MediaResult<DownloadedVideo> {
            let path = dir.join("yt_abc.mp4");
            tokio::fs::write(&path, url.as_bytes()).await?;
            Ok(DownloadedVideo {
                path,
                title: "Clip.mp4".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_acquire_input() {
        let dir = TempDir::new().unwrap();

        let acquired = acquire_input("see youtu.be/abc", &FakeDownloader, dir.path()).await.unwrap();
        assert!(acquired.downloaded);
        assert_eq!(acquired.display_name, "Clip.mp4");
        assert_eq!(std::fs::read(&acquired.path).unwrap(), b"https://youtu.be/abc");

        let local = dir.path().join("local.mp4");
        std::fs::write(&local, b"x").unwrap();
        let acquired = acquire_input(local.to_str().unwrap(), &FakeDownloader, dir.path())
            .await
            .unwrap();
        assert!(!acquired.downloaded);
        assert_eq!(acquired.display_name, "local.mp4");

        let err = acquire_input("/nonexistent/clip.mp4", &FakeDownloader, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Media(MediaError::FileNotFound(_))));
    }
}
