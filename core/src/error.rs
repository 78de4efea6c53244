//! Error types for the particle filter
//!
//! Every fallible operation of the filter returns [`Result`]. An error aborts the current step and leaves the
//! particle set exactly as it was before the step started.

use thiserror::Error;

/// Errors that can occur while configuring or running the filter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Invalid filter parameters (particle count, standard deviations, sensor range)
    #[error("Configuration error: {description}")]
    Configuration {
        /// Description of the configuration issue
        description: String,
    },

    /// An operation was invoked in the wrong filter state
    #[error("Precondition violated: {description}")]
    Precondition {
        /// Description of the violated precondition
        description: String,
    },

    /// Observations could not be associated because no candidate landmarks were supplied
    #[error("Association failed: {observations} observation(s) but no candidate landmarks")]
    EmptyCandidates {
        /// Number of observations left unmatched
        observations: usize,
    },

    /// Every particle weight is zero so the resampling distribution is undefined
    #[error("Degenerate weights: all {num_particles} particle weights are zero")]
    DegenerateWeights {
        /// Size of the particle set
        num_particles: usize,
    },

    /// Non-finite or negative values detected in the particle weights
    #[error("Numerical instability: {description}")]
    NumericalInstability {
        /// Description of the issue
        description: String,
    },
}

impl FilterError {
    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        FilterError::Configuration {
            description: description.into(),
        }
    }

    pub(crate) fn precondition(description: impl Into<String>) -> Self {
        FilterError::Precondition {
            description: description.into(),
        }
    }

    pub(crate) fn numerical(description: impl Into<String>) -> Self {
        FilterError::NumericalInstability {
            description: description.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FilterError>;
