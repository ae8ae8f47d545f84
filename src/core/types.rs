use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::error::SimulationError;

pub const DEFAULT_TOTAL_SIMULATIONS: u32 = 100_000;
pub const DEFAULT_BATCH_SIZE: u32 = 10_000;
pub const DEFAULT_POPULATION_SIZE: u32 = 10_000;
pub const DEFAULT_DISTRIBUTION_MEAN: f64 = 5.0;
pub const DEFAULT_DISTRIBUTION_STD_DEV: f64 = 2.0;
pub const SCORE_LOWER_BOUND: f64 = 0.0;
pub const SCORE_UPPER_BOUND: f64 = 10.0;
pub const MIN_PERCENTILE: u32 = 1;
pub const MAX_PERCENTILE: u32 = 99;

/// Upper limits for sizes supplied by external callers.
pub const MAX_ATTEMPTS: u32 = 50;
pub const MAX_ATTEMPT_COUNTS: usize = 20;
pub const MAX_TOTAL_SIMULATIONS: u32 = 1_000_000;
pub const MAX_POPULATION_SIZE: u32 = 1_000_000;

/// Tolerance for the weight-sum check, matching numpy's `isclose` defaults.
pub const WEIGHT_SUM_ABS_TOLERANCE: f64 = 1e-8;
pub const WEIGHT_SUM_REL_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    pub talent: f64,
    pub effort: f64,
    pub luck: f64,
}

impl Weights {
    pub fn new(talent: f64, effort: f64, luck: f64) -> Self {
        Self {
            talent,
            effort,
            luck,
        }
    }

    pub fn sum(&self) -> f64 {
        self.talent + self.effort + self.luck
    }

    pub fn sums_to_one(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_ABS_TOLERANCE + WEIGHT_SUM_REL_TOLERANCE
    }

    fn validate(&self) -> Result<(), SimulationError> {
        for (name, value) in [
            ("talent", self.talent),
            ("effort", self.effort),
            ("luck", self.luck),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::new(0.24, 0.24, 0.52)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParameterWarning {
    WeightSum { sum: f64 },
}

impl fmt::Display for ParameterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterWarning::WeightSum { sum } => write!(
                f,
                "weights for talent, effort and luck should sum to 1 (got {sum:.4})"
            ),
        }
    }
}

/// One run's inputs. Built once from external input and never mutated while simulating.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub talent: f64,
    pub effort: f64,
    pub weights: Weights,
    pub percentile: u32,
    pub attempts: Vec<u32>,
}

impl Parameters {
    /// Rejects invalid input outright; a weight sum away from 1 only yields a warning.
    pub fn validate(&self) -> Result<Vec<ParameterWarning>, SimulationError> {
        check_range("talent", self.talent, SCORE_LOWER_BOUND, SCORE_UPPER_BOUND)?;
        check_range("effort", self.effort, SCORE_LOWER_BOUND, SCORE_UPPER_BOUND)?;
        check_range(
            "percentile",
            self.percentile as f64,
            MIN_PERCENTILE as f64,
            MAX_PERCENTILE as f64,
        )?;
        self.weights.validate()?;

        if self.attempts.is_empty() {
            return Err(SimulationError::EmptyAttempts);
        }
        if self.attempts.contains(&0) {
            return Err(SimulationError::ZeroAttempts);
        }

        let mut warnings = Vec::new();
        if !self.weights.sums_to_one() {
            warnings.push(ParameterWarning::WeightSum {
                sum: self.weights.sum(),
            });
        }
        Ok(warnings)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            talent: 5.0,
            effort: 5.0,
            weights: Weights::default(),
            percentile: 10,
            attempts: vec![10, 20, 30],
        }
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), SimulationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(SimulationError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionParams {
    pub mean: f64,
    pub std_dev: f64,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            mean: DEFAULT_DISTRIBUTION_MEAN,
            std_dev: DEFAULT_DISTRIBUTION_STD_DEV,
        }
    }
}

/// How often a population member's talent and effort are redrawn.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopulationResampling {
    /// Talent and effort drawn once per member for each attempt-count evaluation; luck per attempt.
    #[default]
    PerEvaluation,
    /// Talent, effort and luck all redrawn for every attempt.
    PerAttempt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub total_simulations: u32,
    pub batch_size: u32,
    pub population_size: u32,
    pub luck: DistributionParams,
    pub trait_distribution: DistributionParams,
    pub population_resampling: PopulationResampling,
    pub seed: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.total_simulations == 0 {
            return Err(SimulationError::InvalidConfig("total simulations"));
        }
        if self.batch_size == 0 {
            return Err(SimulationError::InvalidConfig("batch size"));
        }
        if self.population_size == 0 {
            return Err(SimulationError::InvalidConfig("population size"));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_simulations: DEFAULT_TOTAL_SIMULATIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            population_size: DEFAULT_POPULATION_SIZE,
            luck: DistributionParams::default(),
            trait_distribution: DistributionParams::default(),
            population_resampling: PopulationResampling::default(),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempts: u32,
    pub threshold: f64,
    pub success_count: u32,
    pub total_simulations: u32,
    /// Percentage of individual trials at or above the threshold.
    pub probability: f64,
    pub individual_mean: f64,
    pub individual_median: f64,
    pub population_median: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub percentile: u32,
    pub warnings: Vec<ParameterWarning>,
    pub results: Vec<AttemptResult>,
}

impl SimulationReport {
    /// Attempt count to probability. A repeated attempt count keeps its last evaluation.
    pub fn as_map(&self) -> BTreeMap<u32, f64> {
        self.results
            .iter()
            .map(|r| (r.attempts, r.probability))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid_without_warnings() {
        let warnings = Parameters::default().validate().expect("valid defaults");
        assert!(warnings.is_empty());
    }

    #[test]
    fn weight_sum_off_by_more_than_tolerance_warns() {
        let params = Parameters {
            weights: Weights::new(0.5, 0.5, 0.5),
            ..Parameters::default()
        };
        let warnings = params.validate().expect("warning is not fatal");
        assert_eq!(warnings, vec![ParameterWarning::WeightSum { sum: 1.5 }]);
        assert!(warnings[0].to_string().contains("sum to 1"));
    }

    #[test]
    fn weight_sum_within_float_noise_does_not_warn() {
        let params = Parameters {
            weights: Weights::new(0.1, 0.2, 0.7),
            ..Parameters::default()
        };
        assert!(params.validate().expect("valid").is_empty());
    }

    #[test]
    fn rejects_zero_attempt_count() {
        let params = Parameters {
            attempts: vec![10, 0],
            ..Parameters::default()
        };
        assert_eq!(params.validate(), Err(SimulationError::ZeroAttempts));
    }

    #[test]
    fn rejects_empty_attempt_list() {
        let params = Parameters {
            attempts: Vec::new(),
            ..Parameters::default()
        };
        assert_eq!(params.validate(), Err(SimulationError::EmptyAttempts));
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        let talent = Parameters {
            talent: 10.5,
            ..Parameters::default()
        };
        assert!(matches!(
            talent.validate(),
            Err(SimulationError::OutOfRange { name: "talent", .. })
        ));

        let effort = Parameters {
            effort: f64::NAN,
            ..Parameters::default()
        };
        assert!(matches!(
            effort.validate(),
            Err(SimulationError::OutOfRange { name: "effort", .. })
        ));

        for percentile in [0, 100] {
            let params = Parameters {
                percentile,
                ..Parameters::default()
            };
            assert!(matches!(
                params.validate(),
                Err(SimulationError::OutOfRange {
                    name: "percentile",
                    ..
                })
            ));
        }
    }

    #[test]
    fn rejects_negative_weight() {
        let params = Parameters {
            weights: Weights::new(-0.1, 0.6, 0.5),
            ..Parameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SimulationError::InvalidWeight { name: "talent", .. })
        ));
    }

    #[test]
    fn config_rejects_zero_sizes() {
        let mut config = SimulationConfig::default();
        config.batch_size = 0;
        assert_eq!(
            config.validate(),
            Err(SimulationError::InvalidConfig("batch size"))
        );
    }

    #[test]
    fn report_map_is_keyed_by_attempt_count() {
        let result = |attempts, probability| AttemptResult {
            attempts,
            threshold: 0.0,
            success_count: 0,
            total_simulations: 1,
            probability,
            individual_mean: 0.0,
            individual_median: 0.0,
            population_median: 0.0,
        };
        let report = SimulationReport {
            percentile: 10,
            warnings: Vec::new(),
            results: vec![result(20, 40.0), result(10, 25.0)],
        };
        let map = report.as_map();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(map[&20], 40.0);
    }
}
