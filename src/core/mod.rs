mod achievement;
mod engine;
mod error;
mod sampling;
mod types;

pub use achievement::{
    achievement_score, grand_achievement, population_grand_achievements, weighted_power,
};
pub use engine::{evaluate_attempts, percentile, run};
pub use error::SimulationError;
pub use sampling::{SimRng, TruncatedNormal, derive_seed, truncated_normal, unit_f64};
pub use types::{
    AttemptResult, DEFAULT_BATCH_SIZE, DEFAULT_DISTRIBUTION_MEAN, DEFAULT_DISTRIBUTION_STD_DEV,
    DEFAULT_POPULATION_SIZE, DEFAULT_TOTAL_SIMULATIONS, DistributionParams, MAX_ATTEMPT_COUNTS,
    MAX_ATTEMPTS, MAX_PERCENTILE, MAX_POPULATION_SIZE, MAX_TOTAL_SIMULATIONS, MIN_PERCENTILE,
    ParameterWarning, Parameters, PopulationResampling, SCORE_LOWER_BOUND, SCORE_UPPER_BOUND,
    SimulationConfig, SimulationReport, Weights,
};
