//! Landmark measurement model (weight update)
//!
//! Each particle is scored by how well the observations, as seen from its own pose, line up with the map. For one
//! particle the update
//!
//! 1. transforms every vehicle-frame observation into the map frame using the particle's pose,
//! 2. keeps the map landmarks strictly within sensor range of the particle,
//! 3. associates every transformed observation with its nearest in-range landmark, and
//! 4. multiplies the bivariate (independent-axis) Gaussian likelihood of every residual:
//!
//! $$
//! p(dx, dy) = \frac{1}{2 \pi \sigma_x \sigma_y} \exp\left( -\left( \frac{dx^2}{2 \sigma_x^2} + \frac{dy^2}{2 \sigma_y^2} \right) \right)
//! $$
//!
//! A particle without any landmark in range cannot explain a non-empty observation set and receives a weight of
//! zero. An empty observation set carries no evidence and yields a weight of one.

use crate::association::associate;
use crate::error::{FilterError, Result};
use crate::map::LandmarkMap;
use crate::observation::{LandmarkObservation, transform_observations};
use crate::particle::Particle;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Range sensor model: maximum detection range and per-axis measurement noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkMeasurementModel {
    /// Maximum distance (m) at which a landmark can be detected
    pub sensor_range: f64,
    /// Standard deviations `[x (m), y (m)]` of a landmark detection
    pub std_landmark: [f64; 2],
}

impl LandmarkMeasurementModel {
    /// # Errors
    /// Returns [`FilterError::Configuration`] if the sensor range is not a positive finite number or if either
    /// standard deviation is not strictly positive (both divide the likelihood).
    pub fn new(sensor_range: f64, std_landmark: [f64; 2]) -> Result<Self> {
        let model = LandmarkMeasurementModel {
            sensor_range,
            std_landmark,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sensor_range.is_finite() && self.sensor_range > 0.0) {
            return Err(FilterError::configuration(format!(
                "sensor range must be positive and finite, got {}",
                self.sensor_range
            )));
        }
        if let Some(sigma) = self
            .std_landmark
            .iter()
            .find(|s| !(s.is_finite() && **s > 0.0))
        {
            return Err(FilterError::configuration(format!(
                "landmark standard deviations must be positive and finite, got {sigma}"
            )));
        }
        Ok(())
    }

    /// Likelihood of a single map-frame residual `(dx, dy)`.
    pub fn likelihood(&self, dx: f64, dy: f64) -> f64 {
        let [sigma_x, sigma_y] = self.std_landmark;
        let exponent = dx * dx / (2.0 * sigma_x * sigma_x) + dy * dy / (2.0 * sigma_y * sigma_y);
        (-exponent).exp() / (2.0 * PI * sigma_x * sigma_y)
    }

    /// Importance weight of one particle for the given vehicle-frame observations.
    pub fn particle_weight(
        &self,
        particle: &Particle,
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> f64 {
        let mut transformed = transform_observations(observations, &particle.pose());
        let candidates = map.in_range(particle.x, particle.y, self.sensor_range);
        if associate(&candidates, &mut transformed).is_err() {
            return 0.0;
        }
        transformed.iter().fold(1.0, |weight, observation| {
            let landmark = &candidates[observation.id as usize];
            weight * self.likelihood(observation.x - landmark.x, observation.y - landmark.y)
        })
    }

    /// Scores every particle in parallel without touching the set, in particle order.
    pub fn compute_weights(
        &self,
        particles: &[Particle],
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Vec<f64> {
        particles
            .par_iter()
            .map(|particle| self.particle_weight(particle, observations, map))
            .collect()
    }

    /// Recomputes the weight of every particle.
    ///
    /// Particles are scored in parallel; each task reads the shared map and observations and writes only the
    /// weight of its own particle.
    pub fn update_weights(
        &self,
        particles: &mut [Particle],
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) {
        particles.par_iter_mut().for_each(|particle| {
            particle.weight = self.particle_weight(particle, observations, map);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapLandmark;
    use crate::particle::INITIAL_WEIGHT;
    use crate::Pose;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> LandmarkMeasurementModel {
        LandmarkMeasurementModel::new(50.0, [0.3, 0.3]).unwrap()
    }

    fn map() -> LandmarkMap {
        LandmarkMap::new(vec![
            MapLandmark::new(1, 5.0, 3.0),
            MapLandmark::new(2, 2.0, 1.0),
            MapLandmark::new(3, 6.0, 1.0),
            MapLandmark::new(4, 7.0, 4.0),
            MapLandmark::new(5, 4.0, 7.0),
        ])
    }

    /// Vehicle-frame observations of every map landmark as seen from `pose`.
    fn observe(pose: &Pose, map: &LandmarkMap) -> Vec<LandmarkObservation> {
        let inverse = pose.to_isometry().inverse();
        map.landmarks()
            .iter()
            .map(|l| {
                let p = inverse * nalgebra::Point2::new(l.x, l.y);
                LandmarkObservation::detection(p.x, p.y)
            })
            .collect()
    }

    #[test]
    fn test_likelihood_peak_and_decay() {
        let model = model();
        let peak = model.likelihood(0.0, 0.0);
        assert_approx_eq!(peak, 1.0 / (2.0 * PI * 0.09), 1e-12);
        assert!(model.likelihood(0.3, 0.0) < peak);
        assert_approx_eq!(model.likelihood(0.3, 0.0), peak * (-0.5f64).exp(), 1e-12);
    }

    #[test]
    fn test_worked_example_weight() {
        // Particle at (4, 5) facing -90 degrees observing three landmarks
        let model = LandmarkMeasurementModel::new(50.0, [0.3, 0.3]).unwrap();
        let particle = Particle::new(0, Pose::new(4.0, 5.0, -PI / 2.0), INITIAL_WEIGHT);
        let observations = vec![
            LandmarkObservation::detection(2.0, 2.0),
            LandmarkObservation::detection(3.0, -2.0),
            LandmarkObservation::detection(4.0, 2.2),
        ];
        let weight = model.particle_weight(&particle, &observations, &map());
        // Map-frame residuals (1, 0), (0, 1) and (0.2, 0) against landmarks 1, 2 and 3
        let expected = model.likelihood(1.0, 0.0)
            * model.likelihood(0.0, 1.0)
            * model.likelihood(0.2, 0.0);
        assert_approx_eq!(weight, expected, 1e-12);
        assert!(weight > 0.0);
    }

    #[test]
    fn test_true_pose_has_maximum_weight() {
        let map = map();
        let truth = Pose::new(4.5, 3.5, 0.4);
        let observations = observe(&truth, &map);
        let model = model();
        let mut particles: Vec<Particle> = [
            (0.0, 0.0, 0.0),
            (0.2, 0.0, 0.0),
            (0.0, -0.3, 0.0),
            (0.0, 0.0, 0.05),
            (-0.4, 0.4, -0.1),
            (1.0, 1.0, 0.2),
        ]
        .iter()
        .enumerate()
        .map(|(i, (dx, dy, dt))| {
            Particle::new(i, Pose::new(truth.x + dx, truth.y + dy, truth.theta + dt), 1.0)
        })
        .collect();
        model.update_weights(&mut particles, &observations, &map);
        let best = particles
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .unwrap();
        assert_eq!(best.id, 0);
        assert_approx_eq!(
            best.weight,
            model.likelihood(0.0, 0.0).powi(map.len() as i32),
            1e-6
        );
    }

    #[test]
    fn test_no_landmarks_in_range_gives_zero_weight() {
        let model = LandmarkMeasurementModel::new(1.0, [0.3, 0.3]).unwrap();
        let particle = Particle::new(0, Pose::new(100.0, 100.0, 0.0), INITIAL_WEIGHT);
        let observations = vec![LandmarkObservation::detection(1.0, 1.0)];
        assert_eq!(model.particle_weight(&particle, &observations, &map()), 0.0);
    }

    #[test]
    fn test_empty_observations_give_unit_weight() {
        let model = model();
        let particle = Particle::new(0, Pose::new(100.0, 100.0, 0.0), 0.25);
        assert_eq!(model.particle_weight(&particle, &[], &map()), 1.0);
    }

    #[test]
    fn test_more_in_range_landmarks_than_observations() {
        // Only landmark 4 is observed; it is the fourth in-range candidate
        let map = map();
        let particle = Particle::new(0, Pose::new(0.0, 0.0, 0.0), INITIAL_WEIGHT);
        let observations = vec![LandmarkObservation::detection(7.0, 4.0)];
        let weight = model().particle_weight(&particle, &observations, &map);
        assert_approx_eq!(weight, model().likelihood(0.0, 0.0), 1e-9);
    }

    #[test]
    fn test_compute_weights_matches_update() {
        let map = map();
        let truth = Pose::new(4.5, 3.5, 0.4);
        let observations = observe(&truth, &map);
        let model = model();
        let mut particles: Vec<Particle> = (0..4)
            .map(|i| {
                let pose = Pose::new(truth.x + 0.1 * i as f64, truth.y, truth.theta);
                Particle::new(i, pose, 1.0)
            })
            .collect();
        let weights = model.compute_weights(&particles, &observations, &map);
        assert!(particles.iter().all(|p| p.weight == 1.0));
        model.update_weights(&mut particles, &observations, &map);
        let updated: Vec<f64> = particles.iter().map(|p| p.weight).collect();
        assert_eq!(weights, updated);
    }

    #[test]
    fn test_invalid_model_parameters() {
        assert!(LandmarkMeasurementModel::new(0.0, [0.3, 0.3]).is_err());
        assert!(LandmarkMeasurementModel::new(f64::NAN, [0.3, 0.3]).is_err());
        assert!(LandmarkMeasurementModel::new(50.0, [0.0, 0.3]).is_err());
        assert!(LandmarkMeasurementModel::new(50.0, [0.3, -1.0]).is_err());
    }
}
