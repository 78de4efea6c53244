//! KIDNAPPED SIM: A command line harness for landmark-based Monte Carlo localization.
//!
//! The harness replays a recorded drive (landmark map, control log, observation log, and optionally ground
//! truth) through the particle filter and writes the per-step pose estimates to a CSV file. When ground truth
//! is available every step is scored against it.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Specifying parameters via command-line flags

mod common;

use clap::{Args, Parser, Subcommand};
use common::{
    init_logger, resolve_logging, trial_output_path, validate_input_path, validate_output_path,
};
use kidnapped::ParticleFilter;
use kidnapped::config::FilterConfig;
use kidnapped::particle::ParticleAveragingStrategy;
use kidnapped::resampling::{DegeneracyPolicy, ParticleResamplingStrategy};
use kidnapped::sim::{
    Dataset, LocalizationResult, LoggingConfig, SimulationConfig, run_localization,
};
use kidnapped::Pose;
use log::{error, info, warn};
use rayon::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LONG_ABOUT: &str = "KIDNAPPED SIM: A command line harness for landmark-based Monte Carlo localization.

A vehicle with a roughly known initial pose drives through a map of known landmarks. The particle filter
fuses its velocity and yaw-rate controls with noisy vehicle-frame detections of the landmarks to recover
and track its pose.

Data sets are CSV files with headers:
  map:          id,x,y
  controls:     velocity,yaw_rate      (one row per step)
  observations: step,x,y               (vehicle frame)
  ground truth: x,y,theta              (optional, one row per step)

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Specifying parameters via command-line flags";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A command line harness for landmark-based Monte Carlo localization.", long_about = LONG_ABOUT)]
struct Cli {
    /// Run simulation from a configuration file (TOML/JSON/YAML)
    /// This option overrides any subcommand arguments
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (ignored if --config is provided)
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Run trials in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the particle filter on a recorded data set",
        long_about = "Run the particle filter on a recorded data set. Step 0 initializes the particles around the initial pose (or the first ground truth row); every later step predicts with the previous control row. Every step then weights the particles against the observations and resamples."
    )]
    Run(RunArgs),

    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Data set and filter arguments
#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Landmark map CSV file (id,x,y)
    #[arg(long, value_parser)]
    map: PathBuf,

    /// Control log CSV file (velocity,yaw_rate)
    #[arg(long, value_parser)]
    controls: PathBuf,

    /// Observation log CSV file (step,x,y)
    #[arg(long, value_parser)]
    observations: PathBuf,

    /// Ground truth CSV file (x,y,theta)
    #[arg(long, value_parser)]
    ground_truth: Option<PathBuf>,

    /// Output CSV file path
    /// When running several trials, output filenames are generated as: {output_stem}_{trial}.csv
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Append the particle set (x y theta per line) to this file after every step
    #[arg(long, value_parser)]
    particles: Option<PathBuf>,

    /// Initial pose as x,y,theta; defaults to the first ground truth row
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    initial_pose: Option<Vec<f64>>,

    /// Time between steps in seconds
    #[arg(long, default_value_t = 0.1)]
    delta_t: f64,

    /// Number of particles
    #[arg(short = 'n', long, default_value_t = kidnapped::config::DEFAULT_NUM_PARTICLES)]
    num_particles: usize,

    /// Random seed; trial i uses seed + i. Drawn from the operating system when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Number of independent trials
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Maximum landmark detection range in meters
    #[arg(long, default_value_t = 50.0)]
    sensor_range: f64,

    /// Landmark measurement standard deviations as x,y
    #[arg(long, value_delimiter = ',', default_values_t = [0.3, 0.3])]
    std_landmark: Vec<f64>,

    /// Initial pose standard deviations as x,y,theta
    #[arg(long, value_delimiter = ',', default_values_t = [0.3, 0.3, 0.01])]
    std_position: Vec<f64>,

    /// Process noise standard deviations as x,y,theta
    #[arg(long, value_delimiter = ',', default_values_t = [0.3, 0.3, 0.01])]
    std_motion: Vec<f64>,

    #[arg(long, value_enum, default_value_t = ParticleResamplingStrategy::Multinomial)]
    resampling: ParticleResamplingStrategy,

    #[arg(long, value_enum, default_value_t = ParticleAveragingStrategy::HighestWeight)]
    averaging: ParticleAveragingStrategy,

    /// Behaviour when every particle weight is zero
    #[arg(long, value_enum, default_value_t = DegeneracyPolicy::Fail)]
    degeneracy: DegeneracyPolicy,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Destination of the template; the format follows the extension (.toml/.json/.yaml/.yml)
    #[arg(short, long, default_value = "kidnapped.toml")]
    output: PathBuf,
}

fn to_array<const N: usize>(values: &[f64], name: &str) -> Result<[f64; N], Box<dyn Error>> {
    <[f64; N]>::try_from(values)
        .map_err(|_| format!("{name} expects {N} values, got {}", values.len()).into())
}

impl RunArgs {
    fn to_config(&self) -> Result<SimulationConfig, Box<dyn Error>> {
        let initial_pose = match &self.initial_pose {
            Some(values) => {
                let [x, y, theta] = to_array::<3>(values, "--initial-pose")?;
                Some(Pose::new(x, y, theta))
            }
            None => None,
        };
        let filter = FilterConfig {
            num_particles: self.num_particles,
            seed: self.seed,
            sensor_range: self.sensor_range,
            std_landmark: to_array(&self.std_landmark, "--std-landmark")?,
            std_position: to_array(&self.std_position, "--std-position")?,
            std_motion: to_array(&self.std_motion, "--std-motion")?,
            resampling_strategy: self.resampling,
            averaging_strategy: self.averaging,
            degeneracy_policy: self.degeneracy,
            ..Default::default()
        };
        let config = SimulationConfig {
            map_file: self.map.clone(),
            controls_file: self.controls.clone(),
            observations_file: self.observations.clone(),
            ground_truth_file: self.ground_truth.clone(),
            delta_t: self.delta_t,
            initial_pose,
            output_file: Some(self.output.clone()),
            particles_file: self.particles.clone(),
            trials: self.trials,
            filter,
            logging: LoggingConfig::default(),
        };
        Ok(config)
    }
}

/// Runs one trial and writes its outputs.
fn run_trial(
    config: &SimulationConfig,
    dataset: &Dataset,
    trial: usize,
    num_trials: usize,
) -> Result<LocalizationResult, Box<dyn Error>> {
    let mut filter_config = config.filter.clone();
    filter_config.seed = config.filter.seed.map(|seed| seed.wrapping_add(trial as u64));
    let mut filter = ParticleFilter::new(filter_config)?;

    let per_trial = |path: &Path| {
        if num_trials > 1 {
            trial_output_path(path, trial)
        } else {
            path.to_path_buf()
        }
    };
    let particles_file = config.particles_file.as_deref().map(per_trial);
    if let Some(path) = &particles_file {
        validate_output_path(path)?;
        if path.exists() {
            warn!("Appending particles to existing file {}", path.display());
        }
    }

    let result = run_localization(
        &mut filter,
        dataset,
        config.delta_t,
        config.initial_pose,
        particles_file.as_deref(),
    )?;

    if let Some(output) = config.output_file.as_deref().map(per_trial) {
        validate_output_path(&output)?;
        result.to_csv(&output)?;
        info!("Trial {trial}: results written to {}", output.display());
    }
    match result.mean_error() {
        Some(mean) => info!(
            "Trial {trial}: mean error x {:.4} m, y {:.4} m, heading {:.4} rad",
            mean.x, mean.y, mean.theta
        ),
        None => info!(
            "Trial {trial}: final estimate {}",
            result.final_estimate().unwrap_or_default()
        ),
    }
    Ok(result)
}

/// Trial errors collected by the parallel runner. A trial that panicked while holding the lock poisons it;
/// the errors recorded so far are still reported.
fn take_trial_errors(errors: Mutex<Vec<(usize, String)>>) -> Vec<(usize, String)> {
    errors.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_simulation(config: &SimulationConfig, parallel: bool) -> Result<(), Box<dyn Error>> {
    let num_trials = config.trials.max(1);
    validate_input_path(&config.map_file)?;
    validate_input_path(&config.controls_file)?;
    validate_input_path(&config.observations_file)?;
    if let Some(path) = &config.ground_truth_file {
        validate_input_path(path)?;
    }
    config.filter.validate()?;

    let dataset = Dataset::load(config)?;
    info!(
        "Running {num_trials} trial(s) with {} particles",
        config.filter.num_particles
    );

    if parallel && num_trials > 1 {
        let errors = Mutex::new(Vec::new());
        (0..num_trials).into_par_iter().for_each(|trial| {
            if let Err(e) = run_trial(config, &dataset, trial, num_trials) {
                error!("Trial {trial} failed: {e}");
                errors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((trial, e.to_string()));
            }
        });
        let errors = take_trial_errors(errors);
        if !errors.is_empty() {
            for (trial, err) in &errors {
                error!("  trial {trial}: {err}");
            }
            return Err(format!("{} trial(s) failed", errors.len()).into());
        }
    } else {
        let mut failures = 0usize;
        for trial in 0..num_trials {
            if let Err(e) = run_trial(config, &dataset, trial, num_trials) {
                error!("Trial {trial} failed: {e}");
                failures += 1;
            }
        }
        if failures > 0 {
            return Err(format!("{failures} trial(s) failed").into());
        }
    }
    Ok(())
}

fn run_from_config(
    config_path: &Path,
    cli_log_file: Option<&PathBuf>,
    parallel: bool,
) -> Result<(), Box<dyn Error>> {
    let config = SimulationConfig::from_file(config_path)?;
    init_logger(&resolve_logging(&config.logging, cli_log_file))?;
    info!("Loaded configuration from {}", config_path.display());
    run_simulation(&config, parallel)
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    validate_output_path(&args.output)?;
    SimulationConfig::default().to_file(&args.output)?;
    println!("Template configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // If --config is provided, the logger settings come from the file unless given on the command line
    if let Some(ref config_path) = cli.config {
        return run_from_config(config_path, cli.log_file.as_ref(), cli.parallel);
    }

    init_logger(&LoggingConfig {
        level: cli.log_level.clone(),
        file: cli.log_file.clone(),
    })?;

    match cli.command {
        Some(Command::Run(args)) => {
            info!(
                "Running localization on map {} with observations {}",
                args.map.display(),
                args.observations.display()
            );
            let config = args.to_config()?;
            run_simulation(&config, cli.parallel)
        }
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}
