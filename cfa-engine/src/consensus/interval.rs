//! Confidence Interval Estimator
//!
//! Multi-source: weighted bootstrap of the consensus mean. Each resample
//! draws source indices with replacement, renormalizes the drawn weights by
//! their own sum, and records the weighted mean. The bounds are the `α/2` and
//! `1 − α/2` percentiles of those means (`α = 1 − confidence`). This captures
//! uncertainty over *which sources contributed*, not noise within a source.
//!
//! Single source: fixed heuristic band `[p − 0.05, p + 0.05]` clamped to
//! `[0, 1]`. Not statistically derived.
//!
//! Bootstrap bounds are not clamped.

use rand::Rng;

use super::aggregator::weighted_mean;

/// Half-width of the single-source band
pub const SINGLE_SOURCE_HALF_WIDTH: f64 = 0.05;
pub const DEFAULT_CONFIDENCE: f64 = 0.90;
pub const DEFAULT_RESAMPLES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Bootstrap parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSettings {
    /// Confidence level in (0, 1)
    pub confidence: f64,
    /// Number of resamples (>= 1)
    pub resamples: usize,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            resamples: DEFAULT_RESAMPLES,
        }
    }
}

/// Pick the single-source band or the bootstrap, by source count
pub fn estimate_interval<R: Rng + ?Sized>(
    probabilities: &[f64],
    normalized_weights: &[f64],
    settings: &BootstrapSettings,
    rng: &mut R,
) -> ConfidenceInterval {
    match probabilities {
        [] => ConfidenceInterval { lower: 0.0, upper: 1.0 },
        [p] => single_source_interval(*p),
        _ => bootstrap_interval(probabilities, normalized_weights, settings, rng),
    }
}

pub fn single_source_interval(probability: f64) -> ConfidenceInterval {
    ConfidenceInterval {
        lower: (probability - SINGLE_SOURCE_HALF_WIDTH).max(0.0),
        upper: (probability + SINGLE_SOURCE_HALF_WIDTH).min(1.0),
    }
}

/// Weighted bootstrap of the mean
pub fn bootstrap_interval<R: Rng + ?Sized>(
    probabilities: &[f64],
    normalized_weights: &[f64],
    settings: &BootstrapSettings,
    rng: &mut R,
) -> ConfidenceInterval {
    let n = probabilities.len();
    let resamples = settings.resamples.max(1);

    let mut means = Vec::with_capacity(resamples);
    let mut drawn_probs = vec![0.0; n];
    let mut drawn_weights = vec![0.0; n];

    for _ in 0..resamples {
        for slot in 0..n {
            let idx = rng.gen_range(0..n);
            drawn_probs[slot] = probabilities[idx];
            drawn_weights[slot] = normalized_weights[idx];
        }

        let total: f64 = drawn_weights.iter().sum();
        if total > 0.0 {
            drawn_weights.iter_mut().for_each(|w| *w /= total);
        } else {
            drawn_weights.fill(1.0 / n as f64);
        }

        means.push(weighted_mean(&drawn_probs, &drawn_weights));
    }

    means.sort_by(|a, b| a.total_cmp(b));

    let alpha = 1.0 - settings.confidence;
    ConfidenceInterval {
        lower: percentile(&means, alpha / 2.0),
        upper: percentile(&means, 1.0 - alpha / 2.0),
    }
}

/// Percentile of sorted data with linear interpolation between closest ranks
///
/// `q` is a fraction in `[0, 1]`; rank = `q × (n − 1)`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_single_source_band() {
        let ci = single_source_interval(0.6);
        assert!((ci.lower - 0.55).abs() < 1e-12);
        assert!((ci.upper - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_single_source_band_clamped() {
        let low = single_source_interval(0.02);
        assert_eq!(low.lower, 0.0);
        assert!((low.upper - 0.07).abs() < 1e-12);

        let high = single_source_interval(0.99);
        assert_eq!(high.upper, 1.0);
        assert!((high.lower - 0.94).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_dispatches_single_source() {
        let ci = estimate_interval(&[0.3], &[1.0], &BootstrapSettings::default(), &mut rng(1));
        assert_eq!(ci, single_source_interval(0.3));
    }

    #[test]
    fn test_bootstrap_lower_not_above_upper() {
        let settings = BootstrapSettings::default();
        for seed in 0..20 {
            let ci = bootstrap_interval(&[0.6, 0.4, 0.5], &[0.25, 0.25, 0.5], &settings, &mut rng(seed));
            assert!(ci.lower <= ci.upper, "seed {}: {:?}", seed, ci);
        }
    }

    #[test]
    fn test_bootstrap_bounds_within_source_range() {
        let probabilities = [0.2, 0.35, 0.8, 0.55];
        let weights = [0.1, 0.2, 0.3, 0.4];
        let ci = bootstrap_interval(&probabilities, &weights, &BootstrapSettings::default(), &mut rng(3));

        assert!(ci.lower >= 0.2 - 1e-12);
        assert!(ci.upper <= 0.8 + 1e-12);
    }

    #[test]
    fn test_bootstrap_reproducible_with_seed() {
        let settings = BootstrapSettings::default();
        let a = bootstrap_interval(&[0.6, 0.4, 0.5], &[0.25, 0.25, 0.5], &settings, &mut rng(42));
        let b = bootstrap_interval(&[0.6, 0.4, 0.5], &[0.25, 0.25, 0.5], &settings, &mut rng(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bootstrap_converges_with_more_resamples() {
        // Symmetric input: resampled means are centred on the weighted mean 0.5
        let probabilities = [0.6, 0.4, 0.5];
        let weights = [0.25, 0.25, 0.5];
        let settings = BootstrapSettings {
            confidence: 0.90,
            resamples: 20_000,
        };

        let a = bootstrap_interval(&probabilities, &weights, &settings, &mut rng(11));
        let b = bootstrap_interval(&probabilities, &weights, &settings, &mut rng(12));

        assert!(a.contains(0.5) && b.contains(0.5));
        assert!((a.lower - b.lower).abs() < 0.01, "{:?} vs {:?}", a, b);
        assert!((a.upper - b.upper).abs() < 0.01, "{:?} vs {:?}", a, b);

        let midpoint = (a.lower + a.upper) / 2.0;
        assert!((midpoint - 0.5).abs() < 0.01, "midpoint {}", midpoint);
    }

    #[test]
    fn test_higher_confidence_widens_interval() {
        let probabilities = [0.1, 0.3, 0.6, 0.9];
        let weights = [0.25; 4];
        let narrow = BootstrapSettings { confidence: 0.50, resamples: 5000 };
        let wide = BootstrapSettings { confidence: 0.99, resamples: 5000 };

        let n = bootstrap_interval(&probabilities, &weights, &narrow, &mut rng(5));
        let w = bootstrap_interval(&probabilities, &weights, &wide, &mut rng(5));
        assert!(w.width() > n.width());
    }

    #[test]
    fn test_zero_weight_resample_falls_back_to_equal() {
        // Source 0 has zero weight; resamples drawing only index 0 must not produce NaN
        let ci = bootstrap_interval(&[0.2, 0.8], &[0.0, 1.0], &BootstrapSettings::default(), &mut rng(9));
        assert!(!ci.lower.is_nan() && !ci.upper.is_nan());
        assert!(ci.lower >= 0.2 - 1e-12 && ci.upper <= 0.8 + 1e-12);
    }

    #[test]
    fn test_identical_sources_collapse_interval() {
        let ci = bootstrap_interval(&[0.4, 0.4, 0.4], &[0.2, 0.3, 0.5], &BootstrapSettings::default(), &mut rng(1));
        assert!((ci.lower - 0.4).abs() < 1e-12);
        assert!((ci.upper - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 1.0), 5.0);
        assert_eq!(percentile(&data, 0.5), 3.0);
        assert!((percentile(&data, 0.05) - 1.2).abs() < 1e-12);
        assert!((percentile(&data, 0.95) - 4.8).abs() < 1e-12);
    }
}
