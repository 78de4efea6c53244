//! Resampling strategies
//!
//! Resampling draws a new population of N particles with replacement, each index selected with probability
//! proportional to its weight, and resets every weight to [`INITIAL_WEIGHT`]. The default strategy is
//! multinomial resampling (N independent categorical draws); the lower-variance systematic, stratified, and
//! residual schemes are available as well.
//!
//! The categorical distribution is undefined when every weight is zero. The [`DegeneracyPolicy`] decides whether
//! such a step fails or falls back to uniform resampling.

use crate::error::{FilterError, Result};
use crate::particle::{INITIAL_WEIGHT, Particle};

use log::warn;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleResamplingStrategy {
    #[default]
    Multinomial,
    Systematic,
    Stratified,
    Residual,
}

/// Behaviour when every particle weight is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DegeneracyPolicy {
    /// Abort the step with [`FilterError::DegenerateWeights`]
    #[default]
    Fail,
    /// Resample uniformly over the current particles
    Uniform,
}

impl ParticleResamplingStrategy {
    /// Draws `weights.len()` indices into `weights`.
    ///
    /// # Errors
    /// * [`FilterError::NumericalInstability`] if a weight is negative or not finite.
    /// * [`FilterError::DegenerateWeights`] if every weight is zero.
    pub fn resample_indices<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let total = validate_weights(weights)?;
        let n = weights.len();
        match self {
            ParticleResamplingStrategy::Multinomial => multinomial_indices(weights, n, rng),
            ParticleResamplingStrategy::Systematic => {
                let offset = rng.random::<f64>();
                let positions = (0..n).map(|i| (i as f64 + offset) / n as f64);
                Ok(cumulative_search(weights, total, positions))
            }
            ParticleResamplingStrategy::Stratified => {
                let positions: Vec<f64> = (0..n)
                    .map(|i| (i as f64 + rng.random::<f64>()) / n as f64)
                    .collect();
                Ok(cumulative_search(weights, total, positions.into_iter()))
            }
            ParticleResamplingStrategy::Residual => residual_indices(weights, total, rng),
        }
    }
}

/// Checks that the weights form a usable categorical distribution and returns their sum.
fn validate_weights(weights: &[f64]) -> Result<f64> {
    if let Some((index, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(FilterError::numerical(format!(
            "particle {index} has invalid weight {w}"
        )));
    }
    let total: f64 = weights.iter().sum();
    if !total.is_finite() {
        return Err(FilterError::numerical("sum of particle weights overflowed"));
    }
    if total <= 0.0 {
        return Err(FilterError::DegenerateWeights {
            num_particles: weights.len(),
        });
    }
    Ok(total)
}

fn multinomial_indices<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let distribution =
        WeightedIndex::new(weights).map_err(|e| FilterError::numerical(e.to_string()))?;
    Ok((0..count).map(|_| distribution.sample(rng)).collect())
}

/// Maps sorted positions in [0, 1) onto the normalized cumulative weights.
fn cumulative_search(
    weights: &[f64],
    total: f64,
    positions: impl Iterator<Item = f64>,
) -> Vec<usize> {
    let last = weights.len() - 1;
    let mut indices = Vec::with_capacity(weights.len());
    let mut i = 0;
    let mut cumsum = weights[0] / total;
    for position in positions {
        while position >= cumsum && i < last {
            i += 1;
            cumsum += weights[i] / total;
        }
        indices.push(i);
    }
    indices
}

fn residual_indices<R: Rng + ?Sized>(
    weights: &[f64],
    total: f64,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(n);
    let mut residual = vec![0.0; n];
    for (i, &w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residual[i] = expected - copies as f64;
    }
    let remaining = n.saturating_sub(indices.len());
    if remaining > 0 {
        if residual.iter().all(|r| *r <= 0.0) {
            // Rounding can leave no fractional mass; fill from the full distribution instead
            indices.extend(multinomial_indices(weights, remaining, rng)?);
        } else {
            indices.extend(multinomial_indices(&residual, remaining, rng)?);
        }
    }
    indices.truncate(n);
    Ok(indices)
}

/// Draws a replacement particle set.
///
/// Selected poses are copied into a new set whose ids are their positions `0..N` and whose weights are
/// [`INITIAL_WEIGHT`]. The input slice is never modified, so on error the caller still holds the old set.
pub fn resample<R: Rng + ?Sized>(
    particles: &[Particle],
    strategy: ParticleResamplingStrategy,
    policy: DegeneracyPolicy,
    rng: &mut R,
) -> Result<Vec<Particle>> {
    let n = particles.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let weights: Vec<f64> = particles.iter().map(|p| p.weight).collect();
    let indices = match strategy.resample_indices(&weights, rng) {
        Ok(indices) => indices,
        Err(FilterError::DegenerateWeights { num_particles })
            if policy == DegeneracyPolicy::Uniform =>
        {
            warn!("All {num_particles} particle weights are zero; resampling uniformly");
            (0..n).map(|_| rng.random_range(0..n)).collect()
        }
        Err(e) => return Err(e),
    };
    Ok(indices
        .into_iter()
        .enumerate()
        .map(|(id, source)| Particle::new(id, particles[source].pose(), INITIAL_WEIGHT))
        .collect())
}
