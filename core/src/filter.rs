//! Sequential importance resampling (SIR) particle filter
//!
//! [`ParticleFilter`] owns the particle set, its configuration, and the random number generator used by every
//! stochastic stage. The set does not exist until [`ParticleFilter::initialize`] is called; every other
//! operation on an uninitialized filter is a [`FilterError::Precondition`] error. Once initialized the set always
//! holds exactly N particles: failed operations leave the previous set in place.
//!
//! ```no_run
//! use kidnapped::{ParticleFilter, Pose};
//! use kidnapped::config::FilterConfig;
//! use kidnapped::map::LandmarkMap;
//! use kidnapped::motion::ControlInput;
//!
//! let config = FilterConfig { seed: Some(42), ..Default::default() };
//! let mut filter = ParticleFilter::new(config).unwrap();
//! let map = LandmarkMap::from_csv("map.csv").unwrap();
//! filter.initialize_from_config(&Pose::new(6.3, 1.9, 0.0)).unwrap();
//! filter.step(0.1, &ControlInput::new(4.0, 0.01), &[], &map).unwrap();
//! let estimate = filter.estimate();
//! ```

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::map::LandmarkMap;
use crate::motion::{self, ControlInput, PoseNoise};
use crate::observation::LandmarkObservation;
use crate::particle::{self, INITIAL_WEIGHT, Particle};
use crate::resampling;
use crate::weights::LandmarkMeasurementModel;
use crate::Pose;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Landmark-based Monte Carlo localization filter.
#[derive(Clone, Debug)]
pub struct ParticleFilter {
    config: FilterConfig,
    particles: Option<Vec<Particle>>,
    rng: StdRng,
}

impl ParticleFilter {
    /// Creates an uninitialized filter.
    ///
    /// The random number generator is seeded from `config.seed`, or from the operating system when no seed is
    /// configured.
    ///
    /// # Errors
    /// Returns [`FilterError::Configuration`] if the configuration does not validate.
    pub fn new(config: FilterConfig) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self::new_with_seed(config, seed)
    }

    /// Creates an uninitialized filter with an explicit seed, ignoring `config.seed`.
    pub fn new_with_seed(config: FilterConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        debug!(
            "Creating particle filter with {} particles (seed {seed})",
            config.num_particles
        );
        Ok(ParticleFilter {
            config,
            particles: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }

    pub fn is_initialized(&self) -> bool {
        self.particles.is_some()
    }

    /// The current particle set; empty before initialization.
    pub fn particles(&self) -> &[Particle] {
        self.particles.as_deref().unwrap_or(&[])
    }

    /// Weights of the current particle set, in particle order.
    pub fn weights(&self) -> Vec<f64> {
        self.particles().iter().map(|p| p.weight).collect()
    }

    fn particles_mut(&mut self, operation: &str) -> Result<&mut Vec<Particle>> {
        self.particles.as_mut().ok_or_else(|| {
            FilterError::precondition(format!("{operation} called before initialization"))
        })
    }

    /// Creates the particle set around an approximate pose.
    ///
    /// Every particle is drawn independently from $N(x, \sigma_x)$, $N(y, \sigma_y)$, $N(\theta, \sigma_\theta)$
    /// and starts with a weight of one. Zero standard deviations produce exact copies of `pose`.
    ///
    /// # Arguments
    /// * `pose` - Approximate initial pose (e.g. a GPS fix)
    /// * `std` - Standard deviations `[x (m), y (m), theta (rad)]`
    ///
    /// # Errors
    /// * [`FilterError::Precondition`] if the filter is already initialized.
    /// * [`FilterError::Configuration`] if a standard deviation is negative or not finite.
    pub fn initialize(&mut self, pose: &Pose, std: &[f64; 3]) -> Result<()> {
        if self.particles.is_some() {
            return Err(FilterError::precondition("filter is already initialized"));
        }
        let noise = PoseNoise::new(std)?;
        let particles = (0..self.config.num_particles)
            .map(|id| {
                let offset = noise.sample(&mut self.rng);
                let sampled = Pose::new(
                    pose.x + offset.x,
                    pose.y + offset.y,
                    pose.theta + offset.theta,
                );
                Particle::new(id, sampled, INITIAL_WEIGHT)
            })
            .collect();
        debug!("Initialized {} particles around {pose}", self.config.num_particles);
        self.particles = Some(particles);
        Ok(())
    }

    /// [`ParticleFilter::initialize`] with the configured initial position uncertainty.
    pub fn initialize_from_config(&mut self, pose: &Pose) -> Result<()> {
        let std = self.config.std_position;
        self.initialize(pose, &std)
    }

    /// Moves every particle with the control input and adds process noise.
    ///
    /// # Arguments
    /// * `delta_t` - Time step in seconds
    /// * `std` - Process noise standard deviations `[x (m), y (m), theta (rad)]`
    /// * `velocity` - Commanded velocity in m/s
    /// * `yaw_rate` - Commanded yaw rate in rad/s
    pub fn predict(
        &mut self,
        delta_t: f64,
        std: &[f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<()> {
        let threshold = self.config.yaw_rate_threshold;
        let control = ControlInput::new(velocity, yaw_rate);
        let particles = self.particles.as_mut().ok_or_else(|| {
            FilterError::precondition("predict called before initialization")
        })?;
        motion::predict(particles, delta_t, std, &control, threshold, &mut self.rng)
    }

    /// Recomputes every particle weight from the vehicle-frame observations.
    ///
    /// # Arguments
    /// * `sensor_range` - Maximum landmark detection range in meters
    /// * `std_landmark` - Landmark measurement standard deviations `[x (m), y (m)]`
    /// * `observations` - Detections in the vehicle frame; their ids are ignored
    /// * `map` - Landmark map
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: &[f64; 2],
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Result<()> {
        let model = LandmarkMeasurementModel::new(sensor_range, *std_landmark)?;
        let particles = self.particles_mut("update_weights")?;
        let weights = model.compute_weights(particles, observations, map);
        if let Some((bad, weight)) = particles
            .iter()
            .zip(&weights)
            .find(|(_, w)| !w.is_finite())
        {
            return Err(FilterError::numerical(format!(
                "particle {} received non-finite weight {weight}",
                bad.id
            )));
        }
        for (particle, weight) in particles.iter_mut().zip(weights) {
            particle.weight = weight;
        }
        debug!(
            "Weight update with {} observations: effective sample size {:.1}",
            observations.len(),
            particle::effective_sample_size(particles)
        );
        Ok(())
    }

    /// Replaces the particle set with a weight-proportional draw of N particles.
    ///
    /// # Errors
    /// * [`FilterError::DegenerateWeights`] if every weight is zero and the degeneracy policy is `Fail`.
    /// * [`FilterError::NumericalInstability`] if a weight is negative or not finite.
    pub fn resample(&mut self) -> Result<()> {
        let strategy = self.config.resampling_strategy;
        let policy = self.config.degeneracy_policy;
        let current = self.particles.as_ref().ok_or_else(|| {
            FilterError::precondition("resample called before initialization")
        })?;
        let resampled = resampling::resample(current, strategy, policy, &mut self.rng)?;
        self.particles = Some(resampled);
        Ok(())
    }

    /// Runs one full predict, update, resample cycle using the configured noise and sensor parameters.
    pub fn step(
        &mut self,
        delta_t: f64,
        control: &ControlInput,
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Result<()> {
        let std_motion = self.config.std_motion;
        self.predict(delta_t, &std_motion, control.velocity, control.yaw_rate)?;
        self.update_and_resample(observations, map)
    }

    /// Update and resample with the configured sensor parameters, without a prediction.
    pub fn update_and_resample(
        &mut self,
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Result<()> {
        let sensor_range = self.config.sensor_range;
        let std_landmark = self.config.std_landmark;
        self.update_weights(sensor_range, &std_landmark, observations, map)?;
        self.resample()
    }

    /// Best pose estimate under the configured averaging strategy, `None` before initialization.
    pub fn estimate(&self) -> Option<Pose> {
        self.config.averaging_strategy.estimate(self.particles())
    }

    pub fn effective_sample_size(&self) -> f64 {
        particle::effective_sample_size(self.particles())
    }

    /// Appends one `x y theta` line per particle to `path`, creating the file if needed.
    pub fn write_particles<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for particle in self.particles() {
            writeln!(writer, "{} {} {}", particle.x, particle.y, particle.theta)?;
        }
        writer.flush()
    }
}
