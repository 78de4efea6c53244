//! Filter configuration
//!
//! [`FilterConfig`] gathers every tunable parameter of the particle filter. Configurations can be written to and
//! read from TOML, JSON, or YAML files; the format is chosen by the file extension.

use crate::error::{FilterError, Result};
use crate::motion::{DEFAULT_YAW_RATE_THRESHOLD, validate_std};
use crate::particle::ParticleAveragingStrategy;
use crate::resampling::{DegeneracyPolicy, ParticleResamplingStrategy};
use crate::weights::LandmarkMeasurementModel;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Default number of particles
pub const DEFAULT_NUM_PARTICLES: usize = 300;

fn default_num_particles() -> usize {
    DEFAULT_NUM_PARTICLES
}
fn default_sensor_range() -> f64 {
    50.0
}
fn default_std_landmark() -> [f64; 2] {
    [0.3, 0.3]
}
fn default_std_position() -> [f64; 3] {
    [0.3, 0.3, 0.01]
}
fn default_yaw_rate_threshold() -> f64 {
    DEFAULT_YAW_RATE_THRESHOLD
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles N, fixed for the lifetime of the filter
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,

    /// Random number generator seed. When absent a seed is drawn from the operating system.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Maximum landmark detection range in meters
    #[serde(default = "default_sensor_range")]
    pub sensor_range: f64,

    /// Landmark measurement standard deviations `[x (m), y (m)]`
    #[serde(default = "default_std_landmark")]
    pub std_landmark: [f64; 2],

    /// Initial pose uncertainty `[x (m), y (m), theta (rad)]` used to spread the particles
    #[serde(default = "default_std_position")]
    pub std_position: [f64; 3],

    /// Process noise `[x (m), y (m), theta (rad)]` added on every prediction
    #[serde(default = "default_std_position")]
    pub std_motion: [f64; 3],

    /// Yaw rates below this magnitude use the straight-line motion branch
    #[serde(default = "default_yaw_rate_threshold")]
    pub yaw_rate_threshold: f64,

    #[serde(default)]
    pub resampling_strategy: ParticleResamplingStrategy,

    #[serde(default)]
    pub averaging_strategy: ParticleAveragingStrategy,

    #[serde(default)]
    pub degeneracy_policy: DegeneracyPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            seed: None,
            sensor_range: default_sensor_range(),
            std_landmark: default_std_landmark(),
            std_position: default_std_position(),
            std_motion: default_std_position(),
            yaw_rate_threshold: default_yaw_rate_threshold(),
            resampling_strategy: ParticleResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            degeneracy_policy: DegeneracyPolicy::default(),
        }
    }
}

impl FilterConfig {
    /// Checks every parameter, returning the first problem found.
    ///
    /// # Errors
    /// [`FilterError::Configuration`] when the particle count is zero, a standard deviation is negative or not
    /// finite, a landmark standard deviation is zero, the sensor range is not positive, or the yaw rate threshold
    /// is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::configuration(
                "number of particles must be positive",
            ));
        }
        validate_std(&self.std_position, "initial position")?;
        validate_std(&self.std_motion, "process noise")?;
        self.measurement_model().validate()?;
        if !(self.yaw_rate_threshold.is_finite() && self.yaw_rate_threshold > 0.0) {
            return Err(FilterError::configuration(format!(
                "yaw rate threshold must be positive and finite, got {}",
                self.yaw_rate_threshold
            )));
        }
        Ok(())
    }

    pub fn measurement_model(&self) -> LandmarkMeasurementModel {
        LandmarkMeasurementModel {
            sensor_range: self.sensor_range,
            std_landmark: self.std_landmark,
        }
    }

    /// Write the configuration to a file; the format is chosen by extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_config(self, path)
    }

    /// Read the configuration from a file; the format is chosen by extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_config(path)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "unsupported file extension")
}

/// Serializes `value` to JSON, YAML, or TOML depending on the extension of `path`.
pub fn write_config<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let path = path.as_ref();
    let contents = match extension(path).as_deref() {
        Some("json") => serde_json::to_string_pretty(value).map_err(io::Error::other)?,
        Some("yaml") | Some("yml") => serde_yaml::to_string(value).map_err(io::Error::other)?,
        Some("toml") => toml::to_string(value).map_err(io::Error::other)?,
        _ => return Err(unsupported_extension()),
    };
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())
}

/// Deserializes a JSON, YAML, or TOML file depending on the extension of `path`.
pub fn read_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let path = path.as_ref();
    let ext = extension(path);
    if !matches!(ext.as_deref(), Some("json" | "yaml" | "yml" | "toml")) {
        return Err(unsupported_extension());
    }
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    match ext.as_deref() {
        Some("json") => serde_json::from_str(&contents).map_err(io::Error::other),
        Some("toml") => toml::from_str(&contents).map_err(io::Error::other),
        _ => serde_yaml::from_str(&contents).map_err(io::Error::other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = FilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_particles, 300);
        assert_eq!(config.averaging_strategy, ParticleAveragingStrategy::HighestWeight);
        assert_eq!(config.resampling_strategy, ParticleResamplingStrategy::Multinomial);
        assert_eq!(config.degeneracy_policy, DegeneracyPolicy::Fail);
    }

    #[test]
    fn test_invalid_configs() {
        let invalid = [
            FilterConfig {
                num_particles: 0,
                ..Default::default()
            },
            FilterConfig {
                std_position: [0.3, -0.3, 0.01],
                ..Default::default()
            },
            FilterConfig {
                std_motion: [0.3, 0.3, f64::NAN],
                ..Default::default()
            },
            FilterConfig {
                std_landmark: [0.0, 0.3],
                ..Default::default()
            },
            FilterConfig {
                sensor_range: -1.0,
                ..Default::default()
            },
            FilterConfig {
                yaw_rate_threshold: 0.0,
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(FilterError::Configuration { .. })),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_zero_noise_is_valid() {
        let config = FilterConfig {
            std_position: [0.0; 3],
            std_motion: [0.0; 3],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip_all_formats() {
        let dir = tempdir().unwrap();
        let config = FilterConfig {
            num_particles: 42,
            seed: Some(7),
            resampling_strategy: ParticleResamplingStrategy::Systematic,
            degeneracy_policy: DegeneracyPolicy::Uniform,
            ..Default::default()
        };
        for name in ["filter.toml", "filter.json", "filter.yaml", "filter.yml"] {
            let path = dir.path().join(name);
            config.to_file(&path).unwrap();
            let loaded = FilterConfig::from_file(&path).unwrap();
            assert_eq!(loaded, config, "{name}");
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "num_particles = 100\nseed = 3\n").unwrap();
        let loaded = FilterConfig::from_file(&path).unwrap();
        assert_eq!(loaded.num_particles, 100);
        assert_eq!(loaded.seed, Some(3));
        assert_eq!(loaded.sensor_range, 50.0);
        assert_eq!(loaded.std_landmark, [0.3, 0.3]);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.ini");
        let err = FilterConfig::default().to_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = FilterConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
