//! Common utility functions for the simulation harness.
//!
//! This module contains shared utilities for the CLI including:
//! - Logger initialization
//! - Input and output path validation
//! - Per-trial output file naming

use kidnapped::sim::LoggingConfig;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Initialize the logger from the logging block of a run configuration.
///
/// Lines carry a millisecond timestamp, the level, and the module that emitted them, e.g.
/// `2025-01-01 12:00:00.000 [INFO] kidnapped::sim - Loaded 42 landmarks`. The log file, when configured, is
/// opened in append mode so several runs can share one file.
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(logging: &LoggingConfig) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_log_level(&logging.level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if let Some(log_path) = &logging.file {
        validate_output_path(log_path)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

/// Logging block of a run: the file's settings, with a `--log-file` given on the command line taking
/// precedence over the file's destination.
pub fn resolve_logging(file: &LoggingConfig, cli_log_file: Option<&PathBuf>) -> LoggingConfig {
    LoggingConfig {
        level: file.level.clone(),
        file: cli_log_file.cloned().or_else(|| file.file.clone()),
    }
}

fn parse_log_level(log_level: &str) -> log::LevelFilter {
    log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    })
}

/// Validate that an input data file exists.
///
/// # Errors
/// Returns an error if the path does not exist or is not a file.
pub fn validate_input_path(input: &Path) -> Result<(), Box<dyn Error>> {
    if !input.exists() {
        return Err(format!("Input path '{}' does not exist.", input.display()).into());
    }
    if !input.is_file() {
        return Err(format!("Input path '{}' is not a file.", input.display()).into());
    }
    Ok(())
}

/// Create the parent directories of an output file if needed.
///
/// # Errors
/// Returns an error if the path names an existing directory or directory creation fails.
pub fn validate_output_path(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.is_dir() {
        return Err(format!("Output path '{}' is a directory.", output.display()).into());
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Output path of one trial in a multi-trial run: `{stem}_{trial}.{ext}` next to `output`.
pub fn trial_output_path(output: &Path, trial: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_{trial}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{trial}"),
    };
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_validate_input_path_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("map_data.csv");
        File::create(&file_path).unwrap();

        assert!(validate_input_path(&file_path).is_ok());
    }

    #[test]
    fn test_validate_input_path_directory_rejected() {
        let dir = tempdir().unwrap();
        assert!(validate_input_path(dir.path()).is_err());
    }

    #[test]
    fn test_validate_input_path_nonexistent() {
        let result = validate_input_path(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_output_path_creates_parent() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("nested").join("results.csv");
        validate_output_path(&output).unwrap();
        assert!(dir.path().join("nested").is_dir());
        assert!(validate_output_path(dir.path()).is_err());
    }

    #[test]
    fn test_trial_output_path() {
        let output = Path::new("out/results.csv");
        assert_eq!(trial_output_path(output, 3), PathBuf::from("out/results_3.csv"));
        assert_eq!(
            trial_output_path(Path::new("results"), 0),
            PathBuf::from("results_0")
        );
    }

    #[test]
    fn test_resolve_logging_prefers_cli_file() {
        let file = LoggingConfig {
            level: "debug".to_string(),
            file: Some(PathBuf::from("from_config.log")),
        };
        let cli = PathBuf::from("from_cli.log");
        let resolved = resolve_logging(&file, Some(&cli));
        assert_eq!(resolved.level, "debug");
        assert_eq!(resolved.file, Some(cli));
        assert_eq!(resolve_logging(&file, None), file);
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_log_level("not-a-level"), log::LevelFilter::Info);
    }
}
