//! Per-variant distortion parameters.

use serde::{Deserialize, Serialize};

/// Distortion applied to one derivative clip.
///
/// Fully determined by `seed` and the configured ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantParams {
    pub seed: u64,
    /// Scale-up factor before the center crop, always above 1.0
    pub zoom: f64,
    /// Signed brightness offset
    pub brightness: f64,
    /// Saturation multiplier around 1.0
    pub saturation_factor: f64,
    /// Raw noise draw in [0, 1)
    pub noise_value: f64,
    /// Per-pixel noise strength, at least 1
    pub noise_level: u32,
    /// Audio pitch multiplier, within [0.98, 1.02]
    pub pitch_factor: f64,
}

impl VariantParams {
    pub fn saturation_delta(&self) -> f64 {
        self.saturation_factor - 1.0
    }

    /// Human-readable summary attached to delivered clips.
    pub fn as_report(&self) -> String {
        format!(
            "seed: {}\nzoom: {:.3}\nbrightness: {:+.3}\nsaturation: {:+.3}\nnoise: {:.3}\nmetadata stripped: yes\n",
            self.seed,
            self.zoom,
            self.brightness,
            self.saturation_delta(),
            self.noise_value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_format() {
        let params = VariantParams {
            seed: 123,
            zoom: 1.0312,
            brightness: -0.004,
            saturation_factor: 1.011,
            noise_value: 0.0071,
            noise_level: 1,
            pitch_factor: 1.0,
        };
        let report = params.as_report();
        assert!(report.starts_with("seed: 123\n"));
        assert!(report.contains("zoom: 1.031"));
        assert!(report.contains("brightness: -0.004"));
        assert!(report.contains("saturation: +0.011"));
        assert!(report.ends_with("metadata stripped: yes\n"));
    }
}
