//! Particles and best-estimate extraction
//!
//! A [`Particle`] is one pose hypothesis with an unnormalized importance weight. The weights of the set are the
//! only input to resampling, and are read directly from the particles so there is a single source of truth.

use crate::Pose;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Weight assigned on initialization and after resampling
pub const INITIAL_WEIGHT: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// Position of the particle within its set
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Heading in radians (not wrapped)
    pub theta: f64,
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Particle {
        Particle {
            id,
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            weight,
        }
    }
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
    pub fn set_pose(&mut self, pose: Pose) {
        self.x = pose.x;
        self.y = pose.y;
        self.theta = pose.theta;
    }
}

/// Policy used to collapse the particle set into a single pose estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleAveragingStrategy {
    WeightedAverage,
    UnweightedAverage,
    #[default]
    HighestWeight,
}

impl ParticleAveragingStrategy {
    /// Pose estimate of the set, or `None` for an empty set.
    ///
    /// Headings are averaged on the unit circle, so averaged estimates report a heading in (-pi, pi]. The
    /// highest-weight estimate returns the particle's pose unchanged; ties go to the lowest index.
    pub fn estimate(&self, particles: &[Particle]) -> Option<Pose> {
        if particles.is_empty() {
            return None;
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let total: f64 = particles.iter().map(|p| p.weight).sum();
                if total > 0.0 && total.is_finite() {
                    Some(mean_pose(particles.iter().map(|p| (p, p.weight / total))))
                } else {
                    Some(unweighted_average(particles))
                }
            }
            ParticleAveragingStrategy::UnweightedAverage => Some(unweighted_average(particles)),
            ParticleAveragingStrategy::HighestWeight => {
                let mut best = &particles[0];
                for particle in &particles[1..] {
                    if particle.weight > best.weight {
                        best = particle;
                    }
                }
                Some(best.pose())
            }
        }
    }
}

fn unweighted_average(particles: &[Particle]) -> Pose {
    let share = 1.0 / particles.len() as f64;
    mean_pose(particles.iter().map(|p| (p, share)))
}

fn mean_pose<'a>(weighted: impl Iterator<Item = (&'a Particle, f64)>) -> Pose {
    let (mut x, mut y, mut sin, mut cos) = (0.0, 0.0, 0.0, 0.0);
    for (particle, w) in weighted {
        x += w * particle.x;
        y += w * particle.y;
        sin += w * particle.theta.sin();
        cos += w * particle.theta.cos();
    }
    Pose::new(x, y, sin.atan2(cos))
}

/// Effective sample size of an unnormalized weight set: $(\sum w_i)^2 / \sum w_i^2$.
///
/// Equals N for uniform weights and 1 when a single particle carries all the weight. Returns 0 for a set whose
/// weights are all zero.
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let sum: f64 = particles.iter().map(|p| p.weight).sum();
    let sum_of_squares: f64 = particles.iter().map(|p| p.weight * p.weight).sum();
    if sum_of_squares > 0.0 {
        sum * sum / sum_of_squares
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    fn particles() -> Vec<Particle> {
        vec![
            Particle::new(0, Pose::new(0.0, 0.0, 0.1), 1.0),
            Particle::new(1, Pose::new(2.0, 4.0, -0.1), 3.0),
            Particle::new(2, Pose::new(4.0, 2.0, 0.0), 0.0),
        ]
    }

    #[test]
    fn test_particle_pose_accessors() {
        let mut particle = Particle::new(7, Pose::new(1.0, 2.0, 3.0), INITIAL_WEIGHT);
        assert_eq!(particle.pose(), Pose::new(1.0, 2.0, 3.0));
        particle.set_pose(Pose::new(-1.0, 0.5, 10.0));
        assert_eq!(particle.theta, 10.0);
        assert_eq!(particle.id, 7);
    }

    #[test]
    fn test_highest_weight_estimate() {
        let pose = ParticleAveragingStrategy::HighestWeight
            .estimate(&particles())
            .unwrap();
        assert_eq!(pose, Pose::new(2.0, 4.0, -0.1));
    }

    #[test]
    fn test_weighted_average_estimate() {
        let pose = ParticleAveragingStrategy::WeightedAverage
            .estimate(&particles())
            .unwrap();
        assert_approx_eq!(pose.x, 1.5, 1e-12);
        assert_approx_eq!(pose.y, 3.0, 1e-12);
        assert!(pose.theta < 0.0);
    }

    #[test]
    fn test_unweighted_average_estimate() {
        let pose = ParticleAveragingStrategy::UnweightedAverage
            .estimate(&particles())
            .unwrap();
        assert_approx_eq!(pose.x, 2.0, 1e-12);
        assert_approx_eq!(pose.y, 2.0, 1e-12);
        assert_approx_eq!(pose.theta, 0.0, 1e-12);
    }

    #[test]
    fn test_average_heading_across_branch_cut() {
        let set = vec![
            Particle::new(0, Pose::new(0.0, 0.0, PI - 0.1), 1.0),
            Particle::new(1, Pose::new(0.0, 0.0, -PI + 0.1), 1.0),
        ];
        let pose = ParticleAveragingStrategy::UnweightedAverage
            .estimate(&set)
            .unwrap();
        assert_approx_eq!(pose.theta.abs(), PI, 1e-9);
    }

    #[test]
    fn test_weighted_average_falls_back_on_zero_weights() {
        let mut set = particles();
        set.iter_mut().for_each(|p| p.weight = 0.0);
        let pose = ParticleAveragingStrategy::WeightedAverage
            .estimate(&set)
            .unwrap();
        assert_approx_eq!(pose.x, 2.0, 1e-12);
    }

    #[test]
    fn test_empty_estimate() {
        assert!(ParticleAveragingStrategy::default().estimate(&[]).is_none());
    }

    #[test]
    fn test_effective_sample_size() {
        let uniform: Vec<Particle> = (0..100)
            .map(|i| Particle::new(i, Pose::default(), INITIAL_WEIGHT))
            .collect();
        assert_approx_eq!(effective_sample_size(&uniform), 100.0, 1e-9);

        let mut single = uniform.clone();
        single.iter_mut().skip(1).for_each(|p| p.weight = 0.0);
        assert_approx_eq!(effective_sample_size(&single), 1.0, 1e-12);

        single[0].weight = 0.0;
        assert_eq!(effective_sample_size(&single), 0.0);
    }
}
