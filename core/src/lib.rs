//! Landmark-based Monte Carlo localization toolbox
//!
//! This crate implements the classic "kidnapped vehicle" localization problem: a vehicle drives through a
//! world populated with known, identifiable landmarks. Its initial pose is only roughly known (e.g. from a GPS
//! fix) and it reports noisy velocity and yaw-rate controls along with noisy range sensor detections of the
//! landmarks around it. A particle filter (sequential importance resampling) is used to converge onto and track
//! the true pose of the vehicle.
//!
//! This crate is primarily built off of three dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rigid-body transforms between the vehicle and map frames.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides the seedable random number generation for initialization, process noise, and resampling.
//! - [`rayon`](https://crates.io/crates/rayon): Provides the data parallelism for the per-particle weight update.
//!
//! All other functionality (CSV data sets, configuration files, the pose dump) is auxiliary I/O.
//!
//! ## Crate overview
//!
//! - [association]: Nearest-neighbor data association between observations and candidate landmarks.
//! - [config]: Filter configuration and validation, loadable from TOML/JSON/YAML.
//! - [error]: The [FilterError] type shared by every fallible operation.
//! - [filter]: The [ParticleFilter] itself, owning the particle set and its random number generator.
//! - [map]: The read-only landmark map.
//! - [motion]: The constant-turn-rate-and-velocity (CTRV) motion model used for prediction.
//! - [observation]: Landmark observations and the vehicle-to-map frame transform.
//! - [particle]: Particles and best-estimate extraction from a particle set.
//! - [resampling]: Resampling strategies and the degenerate-weight policy.
//! - [sim]: CSV data set loading and the simulation loop used by the command line harness.
//! - [weights]: The bivariate Gaussian landmark measurement model.
//!
//! ## Coordinate and state definitions
//!
//! The pose of the vehicle is the three-state vector
//!
//! $$
//! x = [p_x, p_y, \theta]
//! $$
//!
//! where $p_x$ and $p_y$ are the map-frame position (meters) and $\theta$ is the heading (radians) measured
//! counter-clockwise from the map's x-axis. Headings are never wrapped by the filter; every trigonometric
//! operation is valid for unbounded angles. Observations are reported in the vehicle frame, where the x-axis
//! points along the heading of the vehicle and the y-axis points to its left.
//!
//! ## Filter cycle
//!
//! Each time step runs the three stages of the recursive Bayesian filter:
//!
//! 1. **Prediction**: every particle is moved with the control input via the CTRV model and perturbed with
//!    process noise.
//! 2. **Update**: every particle transforms the observations into the map frame using its own pose, associates
//!    each one with the nearest landmark in sensor range and is weighted by the product of the per-observation
//!    Gaussian likelihoods.
//! 3. **Resampling**: a new population is drawn with replacement, proportional to weight.

pub mod association;
pub mod config;
pub mod error;
pub mod filter;
pub mod map;
pub mod motion;
pub mod observation;
pub mod particle;
pub mod resampling;
pub mod sim;
pub mod weights;

pub use crate::error::{FilterError, Result};
pub use crate::filter::ParticleFilter;

use nalgebra::{Isometry2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// Planar pose of the vehicle (or of a single hypothesis of it) in the map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the map x-axis in meters
    pub x: f64,
    /// Position along the map y-axis in meters
    pub y: f64,
    /// Heading in radians, counter-clockwise from the map x-axis
    pub theta: f64,
}

impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4} rad)", self.x, self.y, self.theta)
    }
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }

    /// Rigid-body transform taking vehicle-frame coordinates into the map frame.
    pub fn to_isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.theta)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }

    /// Euclidean distance between the positions of two poses (heading is ignored).
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<Vector3<f64>> for Pose {
    fn from(vector: Vector3<f64>) -> Self {
        Pose::new(vector[0], vector[1], vector[2])
    }
}

/// Wrap an angle into the interval (-pi, pi].
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::Point2;

    #[test]
    fn test_pose_isometry_matches_closed_form() {
        let pose = Pose::new(4.0, 5.0, -PI / 2.0);
        let point = pose.to_isometry() * Point2::new(2.0, 2.0);
        // x' = px + ox cos(t) - oy sin(t), y' = py + oy cos(t) + ox sin(t)
        assert_approx_eq!(point.x, 6.0, 1e-12);
        assert_approx_eq!(point.y, 3.0, 1e-12);
    }

    #[test]
    fn test_pose_distance_ignores_heading() {
        let a = Pose::new(0.0, 0.0, 1.0);
        let b = Pose::new(3.0, 4.0, -2.0);
        assert_approx_eq!(a.distance_to(&b), 5.0, 1e-12);
    }

    #[test]
    fn test_pose_vector_round_trip() {
        let pose = Pose::new(1.5, -2.5, 0.25);
        assert_eq!(Pose::from(pose.to_vector()), pose);
    }

    #[test]
    fn test_wrap_to_pi() {
        assert_approx_eq!(wrap_to_pi(0.0), 0.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(5.0 * PI / 2.0), PI / 2.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(-3.0 * PI / 2.0), PI / 2.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(7.0 * PI / 4.0), -PI / 4.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(-PI), PI, 1e-12);
    }
}
