//! FFmpeg CLI wrapper for the uniquifier pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a mockable engine seam
//! - Text-density sampling of the frame edges
//! - Banner discovery, placement and layout
//! - Filter-graph synthesis for per-variant distortion
//! - Variant rendering with pitch-shifted audio
//! - Size-constrained two-pass transcoding
//! - yt-dlp based acquisition of remote sources

pub mod banner;
pub mod command;
pub mod config;
pub mod density;
pub mod download;
pub mod encode;
pub mod error;
pub mod fs_utils;
pub mod graph;
pub mod ladder;
pub mod probe;
pub mod progress;
pub mod synth;
pub mod variant;

#[cfg(test)]
pub(crate) mod testing;

pub use banner::{BannerPlacementEngine, PlacementOutcome};
pub use command::{check_binary, FfmpegCommand, FfmpegRunner, MediaEngine};
pub use config::{BannerConfig, LadderConfig, ModeSetting, PositionSetting, Range, VariantRanges};
pub use density::{BandDensity, TextDensityAnalyzer};
pub use download::{extract_youtube_url, DownloadedVideo, Downloader, YtDlpDownloader};
pub use encode::{variant_file_name, VariantEncoder, VariantJob};
pub use error::{MediaError, MediaResult};
pub use graph::{Expr, Filter, FilterChain, FilterGraph};
pub use ladder::{Compressor, TranscodeLadder};
pub use probe::{FfprobeProber, MediaProber};
pub use synth::{FilterGraphSynthesizer, LayoutPreview, SynthesizedGraph};
pub use variant::{run_seed, VariantParameterGenerator};
