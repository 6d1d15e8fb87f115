//! Variant encode command assembly.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

use unic_models::{BannerAsset, EncodingConfig};

use crate::command::{FfmpegCommand, MediaEngine};
use crate::error::MediaResult;
use crate::fs_utils::remove_if_exists;
use crate::graph::{Filter, FilterChain};
use crate::synth::SynthesizedGraph;

/// Sample rate the pitch shift is computed against.
pub const AUDIO_BASE_SAMPLE_RATE: u32 = 48_000;
/// Floor for the shifted sample rate.
pub const MIN_AUDIO_SAMPLE_RATE: u32 = 8_000;

/// Output file name of a batch variant.
pub fn variant_file_name(index: u32, seed: u64) -> String {
    format!("variant_{}_{}.mp4", index, seed)
}

/// Pitch shift by resampling, with the tempo restored.
pub fn pitch_filter(pitch_factor: f64) -> FilterChain {
    let shifted = ((AUDIO_BASE_SAMPLE_RATE as f64 * pitch_factor).round() as u32).max(MIN_AUDIO_SAMPLE_RATE);

    FilterChain::new()
        .filter(Filter::Resample {
            rate: AUDIO_BASE_SAMPLE_RATE,
            sample_format: Some("s32"),
        })
        .filter(Filter::SetRate(shifted))
        .filter(Filter::Resample {
            rate: AUDIO_BASE_SAMPLE_RATE,
            sample_format: None,
        })
        .filter(Filter::Tempo(1.0 / pitch_factor))
}

/// Everything one variant render needs.
#[derive(Debug, Clone, Copy)]
pub struct VariantJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub graph: &'a SynthesizedGraph,
    /// Second input, present when a banner was placed
    pub banner: Option<&'a BannerAsset>,
    pub has_audio: bool,
    pub pitch_factor: f64,
}

/// Renders variants through the media engine.
pub struct VariantEncoder {
    engine: Arc<dyn MediaEngine>,
    encoding: EncodingConfig,
}

impl VariantEncoder {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            encoding: EncodingConfig::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    /// Assemble the engine command for `job`.
    pub fn command(&self, job: &VariantJob<'_>) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(job.input, job.output);

        if let Some(banner) = job.banner {
            let looping: [&str; 2] = if banner.is_motion {
                ["-stream_loop", "-1"]
            } else {
                ["-loop", "1"]
            };
            cmd = cmd.add_input(&banner.path).input_args(looping);
        }

        cmd = cmd
            .filter_complex(job.graph.graph.to_string())
            .map(job.graph.map_spec())
            .output_args(self.encoding.video_args());

        cmd = if job.has_audio {
            cmd.audio_filter(pitch_filter(job.pitch_factor).to_string())
                .output_args(self.encoding.audio_args())
                .map("0:a?")
        } else {
            cmd.output_arg("-an")
        };

        cmd.output_args(["-shortest", "-movflags", "+faststart", "-map_metadata", "-1"])
    }

    /// Render one variant. A failed render leaves no output behind.
    pub async fn encode(&self, job: &VariantJob<'_>) -> MediaResult<()> {
        let cmd = self.command(job);
        debug!(output = %job.output.display(), "Rendering variant");

        match self.engine.run(&cmd).await {
            Ok(()) => {
                metrics::counter!("unic_variant_encodes_total", "status" => "success").increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("unic_variant_encodes_total", "status" => "failure").increment(1);
                error!(
                    output = %job.output.display(),
                    diagnostic = e.diagnostic().unwrap_or(""),
                    "Variant encode failed: {}",
                    e
                );
                remove_if_exists(job.output).await;
                Err(e)
            }
        }
    }
}
