use std::fmt;

use ndarray::ArrayView1;
use serde::{Serialize, Serializer};

use crate::shared::constants::{FALLBACK_SCORE, MIN_SAMPLES, SCORE_NORMALIZER};

/// Bounded variability score in `[0.0, 1.0]`, rounded to two decimals.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct StressScore(f64);

impl StressScore {
    /// Neutral score reported whenever analysis cannot produce a real one.
    pub const FALLBACK: StressScore = StressScore(FALLBACK_SCORE);

    /// Clamps `raw` into `[0, 1]` and rounds it to two decimals, ties to
    /// even. Non-finite input becomes the fallback.
    pub fn new(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self::FALLBACK;
        }
        let clamped = raw.clamp(0.0, 1.0);
        Self((clamped * 100.0).round_ties_even() / 100.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::FALLBACK
    }
}

impl Default for StressScore {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for StressScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for StressScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

/// Maps a red-intensity series to a [`StressScore`].
pub struct StressScoreCalculator;

impl StressScoreCalculator {
    /// `min(σ / 20, 1)` over the population standard deviation `σ`.
    ///
    /// Fewer than two samples, or any non-finite sample, gives the fallback.
    pub fn finalize(series: &[f64]) -> StressScore {
        if series.len() < MIN_SAMPLES || series.iter().any(|v| !v.is_finite()) {
            return StressScore::FALLBACK;
        }
        let sigma = ArrayView1::from(series).std(0.0);
        StressScore::new((sigma / SCORE_NORMALIZER).min(1.0))
    }
}
