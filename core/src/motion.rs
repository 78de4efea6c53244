//! Motion model (prediction)
//!
//! Particles are propagated with the constant-turn-rate-and-velocity (CTRV) model. For a time step $\Delta t$,
//! velocity $v$ and yaw rate $\omega$:
//!
//! $$
//! x(+) = x(-) + \frac{v}{\omega} \left( \sin(\theta + \omega \Delta t) - \sin\theta \right), \quad
//! y(+) = y(-) + \frac{v}{\omega} \left( \cos\theta - \cos(\theta + \omega \Delta t) \right), \quad
//! \theta(+) = \theta + \omega \Delta t
//! $$
//!
//! When $|\omega|$ falls below a small threshold the model degenerates to straight-line motion,
//! $x(+) = x(-) + v \Delta t \cos\theta$ and $y(+) = y(-) + v \Delta t \sin\theta$, which avoids the division by a
//! near-zero yaw rate. Zero-mean Gaussian process noise is added to every axis after the deterministic update.

use crate::error::{FilterError, Result};
use crate::particle::Particle;
use crate::Pose;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Yaw rates with a magnitude below this value use the straight-line branch
pub const DEFAULT_YAW_RATE_THRESHOLD: f64 = 1e-3;

/// Commanded velocity (m/s) and yaw rate (rad/s) applied over one time step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    pub velocity: f64,
    pub yaw_rate: f64,
}

impl ControlInput {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        ControlInput { velocity, yaw_rate }
    }
}

/// Deterministic part of the CTRV update.
pub fn propagate_pose(
    pose: &Pose,
    delta_t: f64,
    control: &ControlInput,
    yaw_rate_threshold: f64,
) -> Pose {
    let theta = pose.theta;
    if control.yaw_rate.abs() < yaw_rate_threshold {
        let distance = control.velocity * delta_t;
        Pose::new(
            pose.x + distance * theta.cos(),
            pose.y + distance * theta.sin(),
            theta,
        )
    } else {
        let k = control.velocity / control.yaw_rate;
        let phi = theta + control.yaw_rate * delta_t;
        Pose::new(
            pose.x + k * (phi.sin() - theta.sin()),
            pose.y + k * (theta.cos() - phi.cos()),
            phi,
        )
    }
}

/// Zero-mean Gaussian noise generator for the three pose axes.
#[derive(Clone, Copy, Debug)]
pub struct PoseNoise {
    x: Normal<f64>,
    y: Normal<f64>,
    theta: Normal<f64>,
}

impl PoseNoise {
    /// Builds the noise model from per-axis standard deviations `[x, y, theta]`.
    ///
    /// # Errors
    /// Returns [`FilterError::Configuration`] if any standard deviation is negative or not finite.
    pub fn new(std: &[f64; 3]) -> Result<Self> {
        validate_std(std, "pose")?;
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| FilterError::configuration(e.to_string()))
        };
        Ok(PoseNoise {
            x: normal(std[0])?,
            y: normal(std[1])?,
            theta: normal(std[2])?,
        })
    }

    /// Draws one independent sample per axis.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Pose {
        Pose::new(
            self.x.sample(rng),
            self.y.sample(rng),
            self.theta.sample(rng),
        )
    }
}

/// Rejects standard deviation vectors containing negative or non-finite entries.
pub(crate) fn validate_std(std: &[f64], name: &str) -> Result<()> {
    if let Some(sigma) = std.iter().find(|s| !s.is_finite() || **s < 0.0) {
        return Err(FilterError::configuration(format!(
            "{name} standard deviations must be finite and non-negative, got {sigma}"
        )));
    }
    Ok(())
}

/// Predict step: moves every particle with the control input and adds process noise.
///
/// Each particle receives a fresh noise draw per axis. The particles are visited in order so the outcome is fully
/// determined by the state of `rng`. A non-positive `delta_t` is accepted and produces a stationary or reversed
/// update.
///
/// # Arguments
/// * `particles` - Particle set to update in place
/// * `delta_t` - Time step in seconds
/// * `std` - Process noise standard deviations `[x (m), y (m), theta (rad)]`
/// * `control` - Commanded velocity and yaw rate
/// * `yaw_rate_threshold` - Yaw rate magnitude below which the straight-line branch is used
/// * `rng` - Random number generator
pub fn predict<R: Rng + ?Sized>(
    particles: &mut [Particle],
    delta_t: f64,
    std: &[f64; 3],
    control: &ControlInput,
    yaw_rate_threshold: f64,
    rng: &mut R,
) -> Result<()> {
    let noise = PoseNoise::new(std)?;
    for particle in particles.iter_mut() {
        let pose = propagate_pose(&particle.pose(), delta_t, control, yaw_rate_threshold);
        let perturbation = noise.sample(rng);
        particle.set_pose(Pose::new(
            pose.x + perturbation.x,
            pose.y + perturbation.y,
            pose.theta + perturbation.theta,
        ));
    }
    Ok(())
}
