//! Simulation utilities and CSV data loading for landmark localization
//!
//! This module provides:
//! - Record structs for the control, observation, and ground truth CSV logs
//! - [`Dataset`], the in-memory form of one recorded drive together with its landmark map
//! - [`SimulationConfig`], the file-backed configuration of a localization run
//! - [`run_localization`], which replays a data set through a [`ParticleFilter`]
//! - [`LocalizationResult`] for storing, scoring, and exporting the per-step estimates

use crate::config::{FilterConfig, read_config, write_config};
use crate::error::FilterError;
use crate::filter::ParticleFilter;
use crate::map::LandmarkMap;
use crate::motion::ControlInput;
use crate::observation::LandmarkObservation;
use crate::{Pose, wrap_to_pi};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn read_records<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn write_records<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row of the control log: the velocity and yaw rate commanded for a step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Velocity in m/s
    pub velocity: f64,
    /// Yaw rate in rad/s
    pub yaw_rate: f64,
}

impl ControlRecord {
    /// Reads a CSV file with a `velocity,yaw_rate` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        write_records(records, path)
    }
}

impl From<ControlRecord> for ControlInput {
    fn from(record: ControlRecord) -> Self {
        ControlInput::new(record.velocity, record.yaw_rate)
    }
}

/// One vehicle-frame landmark detection, tagged with the step it was made on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub step: usize,
    /// Forward distance to the landmark in meters
    pub x: f64,
    /// Leftward distance to the landmark in meters
    pub y: f64,
}

impl ObservationRecord {
    /// Reads a CSV file with a `step,x,y` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        write_records(records, path)
    }

    /// Groups records into one observation list per step, `0..num_steps`, preserving file order.
    ///
    /// # Errors
    /// Returns an error if a record refers to a step outside `0..num_steps`.
    pub fn group_by_step(
        records: &[Self],
        num_steps: usize,
    ) -> Result<Vec<Vec<LandmarkObservation>>, Box<dyn Error>> {
        let mut grouped = vec![Vec::new(); num_steps];
        for record in records {
            let slot = grouped.get_mut(record.step).ok_or_else(|| {
                format!(
                    "observation for step {} but the data set only has {num_steps} steps",
                    record.step
                )
            })?;
            slot.push(LandmarkObservation::detection(record.x, record.y));
        }
        Ok(grouped)
    }
}

/// One row of the ground truth log.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl GroundTruthRecord {
    /// Reads a CSV file with an `x,y,theta` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        write_records(records, path)
    }
}

impl From<GroundTruthRecord> for Pose {
    fn from(record: GroundTruthRecord) -> Self {
        Pose::new(record.x, record.y, record.theta)
    }
}

/// A recorded drive: the map plus one control, one observation list, and optionally one true pose per step.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub map: LandmarkMap,
    pub controls: Vec<ControlInput>,
    pub observations: Vec<Vec<LandmarkObservation>>,
    pub ground_truth: Option<Vec<Pose>>,
}

impl Dataset {
    /// Loads the files named by `config`.
    ///
    /// The number of steps is the number of control rows. A ground truth log, when given, must cover every step.
    pub fn load(config: &SimulationConfig) -> Result<Self, Box<dyn Error>> {
        let map = LandmarkMap::from_csv(&config.map_file)?;
        let controls: Vec<ControlInput> = ControlRecord::from_csv(&config.controls_file)?
            .into_iter()
            .map(ControlInput::from)
            .collect();
        let records = ObservationRecord::from_csv(&config.observations_file)?;
        let observations = ObservationRecord::group_by_step(&records, controls.len())?;
        let ground_truth = match &config.ground_truth_file {
            Some(path) => Some(
                GroundTruthRecord::from_csv(path)?
                    .into_iter()
                    .map(Pose::from)
                    .collect::<Vec<_>>(),
            ),
            None => None,
        };
        let dataset = Dataset {
            map,
            controls,
            observations,
            ground_truth,
        };
        dataset.validate()?;
        info!(
            "Loaded {} steps with {} landmarks and {} observations",
            dataset.num_steps(),
            dataset.map.len(),
            records.len()
        );
        Ok(dataset)
    }

    pub fn num_steps(&self) -> usize {
        self.controls.len()
    }

    /// Checks that the per-step series line up.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.observations.len() != self.num_steps() {
            return Err(format!(
                "{} observation steps for {} control steps",
                self.observations.len(),
                self.num_steps()
            )
            .into());
        }
        if let Some(truth) = &self.ground_truth {
            if truth.len() < self.num_steps() {
                return Err(format!(
                    "ground truth has {} rows for {} steps",
                    truth.len(),
                    self.num_steps()
                )
                .into());
            }
        }
        Ok(())
    }
}

fn default_delta_t() -> f64 {
    0.1
}

fn default_trials() -> usize {
    1
}

/// Logging options of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Configuration of a localization run: inputs, outputs, and the filter itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub map_file: PathBuf,
    pub controls_file: PathBuf,
    pub observations_file: PathBuf,
    #[serde(default)]
    pub ground_truth_file: Option<PathBuf>,
    /// Time between steps in seconds
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,
    /// Initialization pose; the first ground truth row is used when absent
    #[serde(default)]
    pub initial_pose: Option<Pose>,
    /// Destination of the per-step estimate CSV
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    /// Destination of the appended `x y theta` particle dump
    #[serde(default)]
    pub particles_file: Option<PathBuf>,
    /// Number of independent trials; trial i seeds its filter with seed + i
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            map_file: PathBuf::from("data/map_data.csv"),
            controls_file: PathBuf::from("data/control_data.csv"),
            observations_file: PathBuf::from("data/observation_data.csv"),
            ground_truth_file: Some(PathBuf::from("data/gt_data.csv")),
            delta_t: default_delta_t(),
            initial_pose: None,
            output_file: Some(PathBuf::from("localization_results.csv")),
            particles_file: None,
            trials: default_trials(),
            filter: FilterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Write the configuration to a file; the format is chosen by extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_config(self, path)
    }

    /// Read the configuration from a file; the format is chosen by extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_config(path)
    }
}

/// Absolute estimation error of one step. The heading error is the wrapped angular distance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseError {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl PoseError {
    pub fn between(estimate: &Pose, truth: &Pose) -> Self {
        PoseError {
            x: (estimate.x - truth.x).abs(),
            y: (estimate.y - truth.y).abs(),
            theta: wrap_to_pi(estimate.theta - truth.theta).abs(),
        }
    }

    /// Euclidean position error in meters
    pub fn position(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub estimate: Pose,
    /// Effective sample size after the weight update, before resampling
    pub effective_sample_size: f64,
    pub num_observations: usize,
    pub error: Option<PoseError>,
}

/// Per-step estimates of a localization run.
#[derive(Clone, Debug, Default)]
pub struct LocalizationResult {
    pub steps: Vec<StepResult>,
}

impl LocalizationResult {
    pub fn final_estimate(&self) -> Option<Pose> {
        self.steps.last().map(|s| s.estimate)
    }

    /// Mean of the per-step errors, `None` when no step was scored against ground truth.
    pub fn mean_error(&self) -> Option<PoseError> {
        let errors: Vec<&PoseError> = self.steps.iter().filter_map(|s| s.error.as_ref()).collect();
        if errors.is_empty() {
            return None;
        }
        let n = errors.len() as f64;
        Some(PoseError {
            x: errors.iter().map(|e| e.x).sum::<f64>() / n,
            y: errors.iter().map(|e| e.y).sum::<f64>() / n,
            theta: errors.iter().map(|e| e.theta).sum::<f64>() / n,
        })
    }

    /// Writes one row per step. Error columns are left empty for unscored steps.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            "step,x,y,theta,effective_sample_size,num_observations,error_x,error_y,error_theta"
        )?;
        for step in &self.steps {
            let (ex, ey, et) = match &step.error {
                Some(e) => (
                    format!("{:.6}", e.x),
                    format!("{:.6}", e.y),
                    format!("{:.6}", e.theta),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            writeln!(
                file,
                "{},{:.6},{:.6},{:.6},{:.3},{},{},{},{}",
                step.step,
                step.estimate.x,
                step.estimate.y,
                step.estimate.theta,
                step.effective_sample_size,
                step.num_observations,
                ex,
                ey,
                et
            )?;
        }
        Ok(())
    }
}

/// Replays a data set through `filter`.
///
/// Step 0 initializes the filter around `initial_pose` (or the first ground truth pose) with the configured
/// position uncertainty; every later step `k` predicts with control row `k - 1`. Every step then updates the
/// weights, records the estimate, and resamples. When `particles_file` is given the particle set is appended to
/// it after every step.
///
/// # Errors
/// Any [`FilterError`] raised by the filter aborts the run, as does a failure to write the particle dump. A run
/// with neither an initial pose nor ground truth is a [`FilterError::Precondition`] error.
pub fn run_localization(
    filter: &mut ParticleFilter,
    dataset: &Dataset,
    delta_t: f64,
    initial_pose: Option<Pose>,
    particles_file: Option<&Path>,
) -> Result<LocalizationResult, Box<dyn Error>> {
    let truth = dataset.ground_truth.as_deref();
    let mut result = LocalizationResult::default();
    let sensor_range = filter.config().sensor_range;
    let std_landmark = filter.config().std_landmark;
    let std_motion = filter.config().std_motion;

    for step in 0..dataset.num_steps() {
        if step == 0 {
            let pose = initial_pose
                .or_else(|| truth.and_then(|t| t.first().copied()))
                .ok_or_else(|| {
                    FilterError::precondition("no initial pose and no ground truth to initialize from")
                })?;
            filter.initialize_from_config(&pose)?;
        } else {
            let control = &dataset.controls[step - 1];
            filter.predict(delta_t, &std_motion, control.velocity, control.yaw_rate)?;
        }

        let observations = &dataset.observations[step];
        filter.update_weights(sensor_range, &std_landmark, observations, &dataset.map)?;
        let estimate = filter
            .estimate()
            .ok_or_else(|| FilterError::precondition("filter has no particles"))?;
        let effective_sample_size = filter.effective_sample_size();
        filter.resample()?;

        if let Some(path) = particles_file {
            filter.write_particles(path)?;
        }

        let error = truth
            .and_then(|t| t.get(step))
            .map(|t| PoseError::between(&estimate, t));
        if let Some(e) = &error {
            debug!(
                "Step {step}: estimate {estimate}, position error {:.3} m, heading error {:.4} rad",
                e.position(),
                e.theta
            );
        }
        result.steps.push(StepResult {
            step,
            estimate,
            effective_sample_size,
            num_observations: observations.len(),
            error,
        });
    }
    Ok(result)
}
