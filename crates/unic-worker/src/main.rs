//! `unic` batch CLI.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use unic_media::fs_utils::remove_if_exists;
use unic_media::{check_binary, FfmpegRunner, FfprobeProber, TranscodeLadder, YtDlpDownloader};
use unic_worker::{
    acquire_input, init_tracing, DeliveryRetrier, TelegramTransport, VariantPipeline, WorkerConfig,
};

/// Render seeded, banner-composited variants of a vertical video.
#[derive(Debug, Parser)]
#[command(name = "unic", version)]
struct Args {
    /// Input video path or YouTube link
    #[arg(long)]
    input: String,

    /// Output directory
    #[arg(long)]
    outdir: PathBuf,

    /// Number of variants
    #[arg(long, default_value_t = 1)]
    variants: u32,

    /// Seed for the first variant; later variants use consecutive seeds
    #[arg(long)]
    seed: Option<u64>,

    /// Deliver each variant to this Telegram chat (requires BOT_TOKEN)
    #[arg(long)]
    chat_id: Option<i64>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run(Args::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if args.variants == 0 {
        bail!("--variants must be at least 1");
    }

    let config = WorkerConfig::from_env();
    info!(
        work_dir = %config.work_dir.display(),
        banner_enabled = config.banner.enabled,
        max_upload_bytes = config.delivery.max_upload_bytes,
        "Worker config loaded"
    );

    check_binary(&config.ffmpeg_binary).context("FFmpeg is required")?;
    let mut runner = FfmpegRunner::new().with_binary(&config.ffmpeg_binary);
    if let Some(secs) = config.ffmpeg_timeout_secs {
        runner = runner.with_timeout(secs);
    }
    let engine = Arc::new(runner);
    let prober = Arc::new(FfprobeProber::new(&config.ffprobe_binary, &config.ffmpeg_binary));

    let downloads = config.work_dir.join("downloads");
    let input = acquire_input(&args.input, &YtDlpDownloader::default(), &downloads)
        .await
        .context("Failed to acquire input")?;
    info!(input = %input.path.display(), name = %input.display_name, "Input ready");

    let pipeline = VariantPipeline::new(&config, engine.clone(), prober.clone());
    let result = pipeline
        .run_batch(&input.path, &args.outdir, args.variants, args.seed)
        .await;

    if input.downloaded {
        remove_if_exists(&input.path).await;
    }
    let rendered = result.context("Variant rendering failed")?;

    let Some(chat_id) = args.chat_id else {
        return Ok(());
    };

    let token = config
        .bot_token
        .clone()
        .context("BOT_TOKEN is required for --chat-id")?;
    let transport = Arc::new(
        TelegramTransport::new(token, chat_id)?.with_max_upload_bytes(config.delivery.max_upload_bytes),
    );
    let ladder = Arc::new(TranscodeLadder::new(engine, prober, config.ladder.clone()));
    let delivery = DeliveryRetrier::new(transport, ladder, config.delivery.clone());

    for variant in &rendered {
        let caption = format!(
            "Variant {}/{}\n{}",
            variant.index,
            rendered.len(),
            variant.params.as_report()
        );
        let outcome = delivery
            .deliver(&variant.path, &caption)
            .await
            .with_context(|| format!("Failed to deliver {}", variant.path.display()))?;
        info!(
            path = %variant.path.display(),
            attempts = outcome.attempts_used,
            compressed = outcome.was_compressed(),
            "Variant delivered"
        );
    }

    Ok(())
}
