use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::achievement::{grand_achievement, population_grand_achievements};
use super::error::SimulationError;
use super::sampling::{
    EVALUATION_STREAM, INDIVIDUAL_STREAM, POPULATION_STREAM, SimRng, TruncatedNormal, derive_seed,
};
use super::types::{AttemptResult, Parameters, SimulationConfig, SimulationReport};

struct Distributions {
    luck: TruncatedNormal,
    traits: TruncatedNormal,
}

impl Distributions {
    fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        Ok(Self {
            luck: TruncatedNormal::bounded(config.luck.mean, config.luck.std_dev)?,
            traits: TruncatedNormal::bounded(
                config.trait_distribution.mean,
                config.trait_distribution.std_dev,
            )?,
        })
    }
}

/// Evaluates every requested attempt count, in request order.
///
/// All validation happens up front; an error means no sampling was done.
pub fn run(
    params: &Parameters,
    config: &SimulationConfig,
) -> Result<SimulationReport, SimulationError> {
    let warnings = params.validate()?;
    config.validate()?;
    let distributions = Distributions::from_config(config)?;

    for warning in &warnings {
        warn!(%warning, "continuing with the given weights");
    }
    info!(
        attempts = ?params.attempts,
        percentile = params.percentile,
        total_simulations = config.total_simulations,
        population_size = config.population_size,
        seed = config.seed,
        "running achievement simulation"
    );

    let results = params
        .attempts
        .iter()
        .enumerate()
        .map(|(evaluation, &attempts)| {
            evaluate(params, config, &distributions, evaluation as u64, attempts)
        })
        .collect();

    Ok(SimulationReport {
        percentile: params.percentile,
        warnings,
        results,
    })
}

/// Evaluates a single attempt count, independent of the parameter set's attempt list.
pub fn evaluate_attempts(
    params: &Parameters,
    config: &SimulationConfig,
    attempts: u32,
) -> Result<AttemptResult, SimulationError> {
    let params = Parameters {
        attempts: vec![attempts],
        ..params.clone()
    };
    params.validate()?;
    config.validate()?;
    let distributions = Distributions::from_config(config)?;
    Ok(evaluate(&params, config, &distributions, 0, attempts))
}

fn evaluate(
    params: &Parameters,
    config: &SimulationConfig,
    distributions: &Distributions,
    evaluation: u64,
    attempts: u32,
) -> AttemptResult {
    let evaluation_seed = derive_seed(config.seed, EVALUATION_STREAM, evaluation);

    let mut individual = individual_outcomes(
        params,
        config,
        &distributions.luck,
        attempts,
        evaluation_seed,
    );

    let mut population_rng = SimRng::new(derive_seed(evaluation_seed, POPULATION_STREAM, 0));
    let mut population = population_grand_achievements(
        config.population_size as usize,
        attempts,
        &params.weights,
        &distributions.traits,
        &distributions.luck,
        config.population_resampling,
        &mut population_rng,
    );

    let threshold = percentile(&mut population, 100.0 - params.percentile as f64);
    let success_count = individual.iter().filter(|v| **v >= threshold).count() as u32;
    let probability = success_count as f64 / config.total_simulations as f64 * 100.0;
    let individual_mean = individual.iter().sum::<f64>() / individual.len() as f64;

    debug!(attempts, threshold, success_count, probability, "attempt count evaluated");

    AttemptResult {
        attempts,
        threshold,
        success_count,
        total_simulations: config.total_simulations,
        probability,
        individual_mean,
        individual_median: percentile(&mut individual, 50.0),
        population_median: percentile(&mut population, 50.0),
    }
}

/// Grand achievements for the fixed individual, one per trial.
///
/// Trials are filled batch by batch, in parallel. Each trial seeds its own stream from its
/// index, so the outcome set does not depend on the batch size.
fn individual_outcomes(
    params: &Parameters,
    config: &SimulationConfig,
    luck: &TruncatedNormal,
    attempts: u32,
    evaluation_seed: u64,
) -> Vec<f64> {
    let batch_size = config.batch_size as usize;
    let mut outcomes = vec![0.0; config.total_simulations as usize];

    // The last chunk carries the remainder when the batch size does not divide the total.
    outcomes
        .par_chunks_mut(batch_size)
        .enumerate()
        .for_each(|(batch, chunk)| {
            let first_trial = batch * batch_size;
            for (offset, slot) in chunk.iter_mut().enumerate() {
                let trial = (first_trial + offset) as u64;
                let mut rng = SimRng::new(derive_seed(evaluation_seed, INDIVIDUAL_STREAM, trial));
                *slot = grand_achievement(
                    params.talent,
                    params.effort,
                    attempts,
                    &params.weights,
                    luck,
                    &mut rng,
                );
            }
        });

    outcomes
}

/// Linear interpolation between closest ranks; `p` is in percent. Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
