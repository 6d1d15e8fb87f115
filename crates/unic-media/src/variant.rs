//! Seeded per-variant distortion parameters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use unic_models::VariantParams;

use crate::config::{Range, VariantRanges};

/// Inclusive bounds of the audio pitch multiplier.
pub const PITCH_FACTOR_BOUNDS: (f64, f64) = (0.98, 1.02);
/// Smallest zoom the generator will produce.
const MIN_ZOOM: f64 = 1.001;
/// Upper bound of run seeds drawn when no override is given.
pub const MAX_RUN_SEED: u64 = 10_000_000;

/// Draws [`VariantParams`] from the configured ranges.
#[derive(Debug, Clone, Default)]
pub struct VariantParameterGenerator {
    ranges: VariantRanges,
}

impl VariantParameterGenerator {
    pub fn new(ranges: VariantRanges) -> Self {
        let zoom = Range::new(ranges.zoom.low.max(MIN_ZOOM), ranges.zoom.high.max(MIN_ZOOM));
        Self {
            ranges: VariantRanges { zoom, ..ranges },
        }
    }

    pub fn ranges(&self) -> &VariantRanges {
        &self.ranges
    }

    /// Generate the parameters for `seed`. Same seed, same parameters.
    pub fn generate(&self, seed: u64) -> VariantParams {
        let mut rng = StdRng::seed_from_u64(seed);

        // Draw order is part of the contract
        let zoom = draw(&mut rng, self.ranges.zoom);
        let brightness = draw(&mut rng, self.ranges.brightness);
        let saturation_delta = draw(&mut rng, self.ranges.saturation_delta);
        let noise = draw(&mut rng, self.ranges.noise);
        let pitch_shift = draw(&mut rng, self.ranges.pitch_shift);

        let (pitch_low, pitch_high) = PITCH_FACTOR_BOUNDS;

        VariantParams {
            seed,
            zoom: zoom.max(MIN_ZOOM),
            brightness,
            saturation_factor: 1.0 + saturation_delta,
            noise_value: noise,
            noise_level: ((noise * 256.0).floor() as u32).max(1),
            pitch_factor: (1.0 + pitch_shift).clamp(pitch_low, pitch_high),
        }
    }
}

fn draw(rng: &mut StdRng, range: Range) -> f64 {
    let range = Range::new(range.low, range.high);
    if range.low == range.high {
        return range.low;
    }
    rng.random_range(range.low..=range.high)
}

/// Seed for one run: the override when given, otherwise random in `1..=10_000_000`.
pub fn run_seed(override_seed: Option<u64>) -> u64 {
    override_seed.unwrap_or_else(|| rand::rng().random_range(1..=MAX_RUN_SEED))
}
