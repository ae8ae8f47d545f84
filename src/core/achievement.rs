use rand_core::RngCore;

use super::sampling::TruncatedNormal;
use super::types::{PopulationResampling, Weights};

/// `base^weight`, with a zero weight always contributing a factor of 1 (including `0^0`).
#[inline]
pub fn weighted_power(base: f64, weight: f64) -> f64 {
    if weight == 0.0 {
        1.0
    } else if base == 0.0 {
        0.0
    } else {
        base.powf(weight)
    }
}

#[inline]
pub fn achievement_score(talent: f64, effort: f64, luck: f64, weights: &Weights) -> f64 {
    weighted_power(talent, weights.talent)
        * weighted_power(effort, weights.effort)
        * weighted_power(luck, weights.luck)
}

/// Sum of `attempts` single-attempt scores, each with a freshly drawn luck value.
pub fn grand_achievement<R: RngCore + ?Sized>(
    talent: f64,
    effort: f64,
    attempts: u32,
    weights: &Weights,
    luck: &TruncatedNormal,
    rng: &mut R,
) -> f64 {
    // Talent and effort are fixed for the trial, so their factor is computed once.
    let fixed = weighted_power(talent, weights.talent) * weighted_power(effort, weights.effort);
    (0..attempts)
        .map(|_| fixed * weighted_power(luck.sample(rng), weights.luck))
        .sum()
}

/// Grand achievement of every member of a synthetic population.
pub fn population_grand_achievements<R: RngCore + ?Sized>(
    population_size: usize,
    attempts: u32,
    weights: &Weights,
    traits: &TruncatedNormal,
    luck: &TruncatedNormal,
    resampling: PopulationResampling,
    rng: &mut R,
) -> Vec<f64> {
    let mut totals = vec![0.0; population_size];
    let mut talent = Vec::new();
    let mut effort = Vec::new();
    if resampling == PopulationResampling::PerEvaluation {
        talent = traits.sample_n(rng, population_size);
        effort = traits.sample_n(rng, population_size);
    }

    for _ in 0..attempts {
        if resampling == PopulationResampling::PerAttempt {
            talent = traits.sample_n(rng, population_size);
            effort = traits.sample_n(rng, population_size);
        }
        let luck_draws = luck.sample_n(rng, population_size);
        for (i, total) in totals.iter_mut().enumerate() {
            *total += achievement_score(talent[i], effort[i], luck_draws[i], weights);
        }
    }
    totals
}
