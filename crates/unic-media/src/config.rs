//! Media-stage configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use unic_models::{BannerMode, BannerPosition, Rgb};

/// Parse an environment variable, falling back on absence or parse failure.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag (`1`, `true`, `yes`, `y`, `on`, case-insensitive).
pub fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

/// Read a non-empty string.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Configured banner position; `Auto` defers to text density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionSetting {
    Top,
    Bottom,
    #[default]
    Auto,
}

impl PositionSetting {
    /// Parse case-insensitively; unknown values become `Auto`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "top" => PositionSetting::Top,
            "bottom" => PositionSetting::Bottom,
            _ => PositionSetting::Auto,
        }
    }

    pub fn fixed(&self) -> Option<BannerPosition> {
        match self {
            PositionSetting::Top => Some(BannerPosition::Top),
            PositionSetting::Bottom => Some(BannerPosition::Bottom),
            PositionSetting::Auto => None,
        }
    }
}

/// Configured compositing mode; `Auto` defers to text density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSetting {
    #[default]
    Auto,
    Overlay,
    Strip,
}

impl ModeSetting {
    /// Parse case-insensitively; unknown values become `Auto`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "overlay" => ModeSetting::Overlay,
            "strip" => ModeSetting::Strip,
            _ => ModeSetting::Auto,
        }
    }

    pub fn fixed(&self) -> Option<BannerMode> {
        match self {
            ModeSetting::Overlay => Some(BannerMode::Overlay),
            ModeSetting::Strip => Some(BannerMode::Strip),
            ModeSetting::Auto => None,
        }
    }
}

/// Banner placement configuration.
#[derive(Debug, Clone)]
pub struct BannerConfig {
    pub enabled: bool,
    /// Explicit asset path; disables the directory search when set
    pub path: Option<PathBuf>,
    /// Directory searched for `banner.*`, `overlay.*`, ...
    pub search_dir: PathBuf,
    pub position: PositionSetting,
    pub mode: ModeSetting,
    pub strip_ratio: f64,
    pub width_ratio: f64,
    pub margin_ratio: f64,
    pub chromakey_enabled: bool,
    pub chromakey_similarity: f64,
    pub chromakey_blend: f64,
    /// Explicit key color; sampled from the asset corners when unset
    pub chromakey_color: Option<Rgb>,
    pub fail_on_missing: bool,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            search_dir: PathBuf::from("."),
            position: PositionSetting::Auto,
            mode: ModeSetting::Auto,
            strip_ratio: 0.20,
            width_ratio: 0.86,
            margin_ratio: 0.03,
            chromakey_enabled: true,
            chromakey_similarity: 0.18,
            chromakey_blend: 0.02,
            chromakey_color: None,
            fail_on_missing: false,
        }
    }
}

impl BannerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let chromakey_color = env_string("UNIC_CHROMAKEY_COLOR").and_then(|s| match s.parse::<Rgb>() {
            Ok(color) => Some(color),
            Err(e) => {
                tracing::warn!("Ignoring UNIC_CHROMAKEY_COLOR: {}", e);
                None
            }
        });

        Self {
            enabled: env_bool("UNIC_BANNER_ENABLED", defaults.enabled),
            path: env_string("UNIC_BANNER_PATH").map(PathBuf::from),
            search_dir: env_string("UNIC_BANNER_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.search_dir),
            position: env_string("UNIC_BANNER_POSITION")
                .map(|s| PositionSetting::parse_lenient(&s))
                .unwrap_or_default(),
            mode: env_string("UNIC_BANNER_STRIP_MODE")
                .map(|s| ModeSetting::parse_lenient(&s))
                .unwrap_or_default(),
            strip_ratio: env_parse("UNIC_BANNER_STRIP_RATIO", defaults.strip_ratio),
            width_ratio: env_parse("UNIC_BANNER_WIDTH_RATIO", defaults.width_ratio),
            margin_ratio: env_parse("UNIC_BANNER_MARGIN_RATIO", defaults.margin_ratio),
            chromakey_enabled: env_bool("UNIC_CHROMAKEY_ENABLED", defaults.chromakey_enabled),
            chromakey_similarity: env_parse("UNIC_CHROMAKEY_SIMILARITY", defaults.chromakey_similarity),
            chromakey_blend: env_parse("UNIC_CHROMAKEY_BLEND", defaults.chromakey_blend),
            chromakey_color,
            fail_on_missing: env_bool("UNIC_FAIL_ON_MISSING_BANNER", defaults.fail_on_missing),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub fn with_position(mut self, position: PositionSetting) -> Self {
        self.position = position;
        self
    }

    pub fn with_mode(mut self, mode: ModeSetting) -> Self {
        self.mode = mode;
        self
    }
}

/// Uniform draw range `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    /// Build a range, swapping reversed bounds.
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

/// Ranges the per-variant distortion is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantRanges {
    pub zoom: Range,
    pub brightness: Range,
    pub saturation_delta: Range,
    pub noise: Range,
    pub pitch_shift: Range,
}

impl Default for VariantRanges {
    fn default() -> Self {
        Self {
            zoom: Range::new(1.02, 1.05),
            brightness: Range::new(-0.015, 0.015),
            saturation_delta: Range::new(-0.02, 0.02),
            noise: Range::new(0.003, 0.012),
            pitch_shift: Range::new(-0.015, 0.015),
        }
    }
}

/// Settings for the size-constrained transcode ladder.
#[derive(Debug, Clone)]
pub struct LadderConfig {
    /// Maximum number of ladder steps tried
    pub max_iterations: usize,
    /// x264 preset for both passes
    pub preset: String,
    /// Directory for pass logs and compressed outputs
    pub work_dir: PathBuf,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            preset: "slow".to_string(),
            work_dir: std::env::temp_dir().join("unic"),
        }
    }
}

impl LadderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_parse("UNIC_TRANSCODE_MAX_ITERATIONS", defaults.max_iterations),
            preset: env_string("UNIC_TRANSCODE_PRESET").unwrap_or(defaults.preset),
            work_dir: env_string("UNIC_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for value in ["1", "true", "YES", "y", " on "] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", "", "maybe"] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn test_position_lenient() {
        assert_eq!(PositionSetting::parse_lenient("TOP"), PositionSetting::Top);
        assert_eq!(PositionSetting::parse_lenient("bottom"), PositionSetting::Bottom);
        assert_eq!(PositionSetting::parse_lenient("middle"), PositionSetting::Auto);
        assert_eq!(PositionSetting::Auto.fixed(), None);
    }

    #[test]
    fn test_mode_lenient() {
        assert_eq!(ModeSetting::parse_lenient("Strip"), ModeSetting::Strip);
        assert_eq!(ModeSetting::parse_lenient("overlay"), ModeSetting::Overlay);
        assert_eq!(ModeSetting::parse_lenient("sideways"), ModeSetting::Auto);
        assert_eq!(ModeSetting::Strip.fixed(), Some(BannerMode::Strip));
    }

    #[test]
    fn test_range_swaps_reversed_bounds() {
        let range = Range::new(0.5, -0.5);
        assert_eq!(range.low, -0.5);
        assert_eq!(range.high, 0.5);
    }

    #[test]
    fn test_banner_defaults() {
        let config = BannerConfig::default();
        assert!(config.enabled);
        assert!((config.strip_ratio - 0.20).abs() < 1e-9);
        assert!((config.width_ratio - 0.86).abs() < 1e-9);
        assert!(!config.fail_on_missing);
    }
}
