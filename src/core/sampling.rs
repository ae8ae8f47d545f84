use rand_core::{RngCore, impls};
use statrs::distribution::{ContinuousCDF, Normal};

use super::error::SimulationError;
use super::types::{SCORE_LOWER_BOUND, SCORE_UPPER_BOUND};

pub const EVALUATION_STREAM: u64 = 1;
pub const INDIVIDUAL_STREAM: u64 = 2;
pub const POPULATION_STREAM: u64 = 3;

pub fn derive_seed(base_seed: u64, stream: u64, index: u64) -> u64 {
    let mixed = base_seed ^ (stream << 32) ^ index;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// xorshift64* generator. Cheap to construct, so every trial gets its own.
#[derive(Debug, Clone)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        impls::fill_bytes_via_next(self, dst)
    }
}

/// Uniform draw on the open interval (0, 1).
pub fn unit_f64<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    const DENOM: f64 = (1_u64 << 53) as f64;
    let v = rng.next_u64() >> 11;
    ((v as f64) + 0.5) / DENOM
}

/// Normal distribution conditioned on `[lower, upper]`, sampled by inverting the CDF.
#[derive(Debug, Clone)]
pub struct TruncatedNormal {
    mean: f64,
    std_dev: f64,
    lower: f64,
    upper: f64,
    standard: Normal,
    // Intervals sitting wholly in the upper tail are sampled mirrored, where the CDF keeps precision.
    reflected: bool,
    cdf_lower: f64,
    cdf_upper: f64,
}

impl TruncatedNormal {
    pub fn new(mean: f64, std_dev: f64, lower: f64, upper: f64) -> Result<Self, SimulationError> {
        if !mean.is_finite() || !std_dev.is_finite() {
            return Err(SimulationError::InvalidDistribution { mean, std_dev });
        }
        if std_dev <= 0.0 {
            return Err(SimulationError::InvalidStdDev(std_dev));
        }
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(SimulationError::InvalidBounds { lower, upper });
        }

        let standard =
            Normal::new(0.0, 1.0).map_err(|e| SimulationError::Distribution(e.to_string()))?;
        let alpha = (lower - mean) / std_dev;
        let beta = (upper - mean) / std_dev;
        let reflected = alpha > 0.0;
        let (lo, hi) = if reflected {
            (-beta, -alpha)
        } else {
            (alpha, beta)
        };

        Ok(Self {
            mean,
            std_dev,
            lower,
            upper,
            cdf_lower: standard.cdf(lo),
            cdf_upper: standard.cdf(hi),
            standard,
            reflected,
        })
    }

    /// Truncated to the `[0, 10]` range shared by talent, effort and luck.
    pub fn bounded(mean: f64, std_dev: f64) -> Result<Self, SimulationError> {
        Self::new(mean, std_dev, SCORE_LOWER_BOUND, SCORE_UPPER_BOUND)
    }

    pub fn sample<R: RngCore + ?Sized>(&self, rng: &mut R) -> f64 {
        let mass = self.cdf_upper - self.cdf_lower;
        if mass.is_nan() || mass <= 0.0 {
            // All mass sits at the bound nearest the mean once it underflows f64.
            return self.mean.clamp(self.lower, self.upper);
        }

        let p = self.cdf_lower + unit_f64(rng) * mass;
        let z = self.standard.inverse_cdf(p.clamp(self.cdf_lower, self.cdf_upper));
        let z = if self.reflected { -z } else { z };
        // Clamp only absorbs rounding at the interval edges.
        (self.mean + self.std_dev * z).clamp(self.lower, self.upper)
    }

    pub fn sample_n<R: RngCore + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.sample(rng)).collect()
    }
}

pub fn truncated_normal<R: RngCore + ?Sized>(
    mean: f64,
    std_dev: f64,
    count: usize,
    rng: &mut R,
) -> Result<Vec<f64>, SimulationError> {
    Ok(TruncatedNormal::bounded(mean, std_dev)?.sample_n(rng, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, proptest};
    use statrs::distribution::Continuous;

    fn sample_mean(dist: &TruncatedNormal, seed: u64, count: usize) -> f64 {
        let mut rng = SimRng::new(seed);
        dist.sample_n(&mut rng, count).iter().sum::<f64>() / count as f64
    }

    fn analytic_mean(mean: f64, std_dev: f64, lower: f64, upper: f64) -> f64 {
        let n = Normal::new(0.0, 1.0).expect("standard normal");
        let alpha = (lower - mean) / std_dev;
        let beta = (upper - mean) / std_dev;
        let z = n.cdf(beta) - n.cdf(alpha);
        mean + std_dev * (n.pdf(alpha) - n.pdf(beta)) / z
    }

    proptest! {
        #[test]
        fn prop_samples_stay_within_bounds(
            seed in any::<u64>(),
            mean in -20.0_f64..30.0,
            std_dev in 0.001_f64..50.0,
        ) {
            let dist = TruncatedNormal::bounded(mean, std_dev).expect("valid params");
            let mut rng = SimRng::new(seed);
            for value in dist.sample_n(&mut rng, 200) {
                prop_assert!((0.0..=10.0).contains(&value), "sample {value} outside [0, 10]");
            }
        }
    }

    #[test]
    fn rejects_non_positive_std_dev() {
        assert_eq!(
            TruncatedNormal::bounded(5.0, 0.0).err(),
            Some(SimulationError::InvalidStdDev(0.0))
        );
        assert_eq!(
            TruncatedNormal::bounded(5.0, -2.0).err(),
            Some(SimulationError::InvalidStdDev(-2.0))
        );
        let mut rng = SimRng::new(1);
        assert!(truncated_normal(5.0, 0.0, 10, &mut rng).is_err());
    }

    #[test]
    fn rejects_non_finite_parameters_and_inverted_bounds() {
        assert!(matches!(
            TruncatedNormal::bounded(f64::NAN, 1.0),
            Err(SimulationError::InvalidDistribution { .. })
        ));
        assert!(matches!(
            TruncatedNormal::new(5.0, 1.0, 10.0, 0.0),
            Err(SimulationError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn accepts_mean_outside_bounds() {
        let dist = TruncatedNormal::bounded(12.0, 2.0).expect("mean outside bounds is allowed");
        let mut rng = SimRng::new(3);
        let samples = dist.sample_n(&mut rng, 1_000);
        assert!(samples.iter().all(|v| (0.0..=10.0).contains(v)));
        assert!(samples.iter().sum::<f64>() / 1_000.0 > 8.0);
    }

    #[test]
    fn tiny_std_dev_concentrates_near_clamped_mean() {
        for (mean, expected) in [(5.0, 5.0), (-3.0, 0.0), (14.0, 10.0), (0.2, 0.2)] {
            let dist = TruncatedNormal::bounded(mean, 1e-6).expect("valid params");
            let mut rng = SimRng::new(9);
            for value in dist.sample_n(&mut rng, 100) {
                assert!(
                    (value - expected).abs() < 1e-3,
                    "mean {mean}: expected near {expected}, got {value}"
                );
            }
        }
    }

    #[test]
    fn symmetric_truncation_keeps_the_mean() {
        let dist = TruncatedNormal::bounded(5.0, 2.0).expect("valid params");
        let mean = sample_mean(&dist, 11, 200_000);
        assert!((mean - 5.0).abs() < 0.02, "sample mean {mean}");
    }

    #[test]
    fn asymmetric_truncation_matches_analytic_mean() {
        for (mean, std_dev) in [(9.0, 2.0), (1.0, 3.0), (11.0, 1.5)] {
            let dist = TruncatedNormal::bounded(mean, std_dev).expect("valid params");
            let expected = analytic_mean(mean, std_dev, 0.0, 10.0);
            let actual = sample_mean(&dist, 17, 200_000);
            assert!(
                (actual - expected).abs() < 0.03,
                "N({mean}, {std_dev}): expected {expected}, got {actual}"
            );
        }
    }

    #[test]
    fn does_not_pile_mass_on_the_bounds() {
        let dist = TruncatedNormal::bounded(5.0, 20.0).expect("valid params");
        let mut rng = SimRng::new(5);
        let samples = dist.sample_n(&mut rng, 10_000);
        let at_bounds = samples.iter().filter(|v| **v == 0.0 || **v == 10.0).count();
        assert_eq!(at_bounds, 0);
        // Nearly flat over [0, 10] when sigma dwarfs the interval.
        let low_half = samples.iter().filter(|v| **v < 5.0).count();
        assert!((4_700..=5_300).contains(&low_half), "low half {low_half}");
    }

    #[test]
    fn same_seed_reproduces_samples() {
        let dist = TruncatedNormal::bounded(5.0, 2.0).expect("valid params");
        let a = dist.sample_n(&mut SimRng::new(123), 50);
        let b = dist.sample_n(&mut SimRng::new(123), 50);
        let c = dist.sample_n(&mut SimRng::new(124), 50);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unit_draws_are_open_interval() {
        let mut rng = SimRng::new(0);
        for _ in 0..10_000 {
            let u = unit_f64(&mut rng);
            assert!(u > 0.0 && u < 1.0);
        }
    }

    #[test]
    fn derive_seed_changes_per_stream_and_index() {
        let a = derive_seed(42, INDIVIDUAL_STREAM, 0);
        let b = derive_seed(42, POPULATION_STREAM, 0);
        let c = derive_seed(42, INDIVIDUAL_STREAM, 1);
        let d = derive_seed(43, INDIVIDUAL_STREAM, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn fill_bytes_draws_from_the_stream() {
        let mut rng = SimRng::new(77);
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        assert!(bytes.iter().any(|b| *b != 0));
    }
}
