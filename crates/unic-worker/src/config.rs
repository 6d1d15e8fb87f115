//! Worker configuration.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use unic_media::config::{env_parse, env_string};
use unic_media::{BannerConfig, LadderConfig, VariantRanges};
use unic_models::EncodingConfig;

/// Bytes per MiB, used for the upload limit.
pub const MIB: u64 = 1024 * 1024;

/// Delivery retry settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Largest file the transport accepts
    pub max_upload_bytes: u64,
    /// Send attempts for generic API errors
    pub attempts: u32,
    /// Linear backoff base; attempt `n` waits `n * backoff_base`
    pub backoff_base: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 49 * MIB,
            attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_upload_bytes: env_parse("UNIC_MAX_UPLOAD_MB", 49u64) * MIB,
            attempts: env_parse("UNIC_DELIVERY_ATTEMPTS", defaults.attempts).max(1),
            backoff_base: Duration::from_secs(env_parse("UNIC_DELIVERY_BACKOFF_SECS", 2)),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    /// Per-command FFmpeg timeout in seconds
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Root for per-run scratch directories and downloaded inputs
    pub work_dir: PathBuf,
    pub banner: BannerConfig,
    pub ladder: LadderConfig,
    pub variant_ranges: VariantRanges,
    pub encoding: EncodingConfig,
    pub delivery: DeliveryConfig,
    pub min_variants: u32,
    pub max_variants: u32,
    /// Telegram bot token
    pub bot_token: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let ladder = LadderConfig::default();
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            ffmpeg_timeout_secs: None,
            work_dir: ladder.work_dir.clone(),
            banner: BannerConfig::default(),
            ladder,
            variant_ranges: VariantRanges::default(),
            encoding: EncodingConfig::default(),
            delivery: DeliveryConfig::default(),
            min_variants: 1,
            max_variants: 5,
            bot_token: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ladder = LadderConfig::from_env();
        let min_variants = env_parse("UNIC_MIN_VARIANTS", defaults.min_variants).max(1);

        Self {
            ffmpeg_binary: env_string("UNIC_FFMPEG_BINARY").unwrap_or(defaults.ffmpeg_binary),
            ffprobe_binary: env_string("UNIC_FFPROBE_BINARY").unwrap_or(defaults.ffprobe_binary),
            ffmpeg_timeout_secs: env_string("UNIC_FFMPEG_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
            work_dir: ladder.work_dir.clone(),
            banner: BannerConfig::from_env(),
            ladder,
            variant_ranges: defaults.variant_ranges,
            encoding: match env_string("UNIC_RENDER_PROFILE").as_deref() {
                Some("fast") => EncodingConfig::fast(),
                _ => defaults.encoding,
            },
            delivery: DeliveryConfig::from_env(),
            min_variants,
            max_variants: env_parse("UNIC_MAX_VARIANTS", defaults.max_variants).max(min_variants),
            bot_token: env_string("BOT_TOKEN").or_else(|| env_string("UNIC_BOT_TOKEN")),
        }
    }

    /// Variant counts a session may choose.
    pub fn variant_range(&self) -> RangeInclusive<u32> {
        self.min_variants..=self.max_variants
    }
}
