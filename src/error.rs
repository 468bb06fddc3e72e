//! Custom error types for the sweep.
//!
//! This module defines the primary error type, `SweepError`. Using the `thiserror` crate,
//! it gives every failure of a vibrations sweep a single, matchable shape, from parameter
//! validation through collaborator failures reported by the machine.
//!
//! ## Error Hierarchy
//!
//! - **Validation** (`InsufficientTravelDistance`, `UnsupportedKinematics`,
//!   `MissingPrerequisite`, `ParameterOutOfRange`, `InvalidIncrement`): raised before any
//!   machine state is mutated. The sweep never starts.
//! - **Resource** (`SensorNotFound`): the requested or auto-resolved accelerometer is not
//!   attached. Raised per angle, before that angle's first recording.
//! - **Synchronization** (`SynchronizationViolation`): a recording was started while another
//!   was open, or stopped when none was open. This is a broken invariant, never retried.
//! - **Machine** (`MachineBusy`, `Hardware`, `Pipeline`): collaborator failures. `Hardware`
//!   and `Pipeline` wrap the `anyhow::Error` returned by the capability traits.
//! - **Ambient** (`Config`, `Io`): configuration loading and file output.
//!
//! Every variant aborts the whole sweep. The velocity-limit restore still runs if the
//! snapshot had been captured (see `procedures::velocity_limits`).

use thiserror::Error;

/// Convenience alias for results using the sweep error type.
pub type SweepResult<T> = std::result::Result<T, SweepError>;

/// Broad classification of a [`SweepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input or prerequisite rejected before touching the machine
    Validation,
    /// A required device could not be found
    ResourceNotFound,
    /// Recording start/stop pairing was broken
    SynchronizationViolation,
    /// Failure reported by a machine collaborator or the environment
    Machine,
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum SweepError {
    #[error(
        "The size of the movement is too small for the given speed ({travel_time:.3}s < {minimum}s)! Increase SIZE or decrease MAX_SPEED!"
    )]
    InsufficientTravelDistance { travel_time: f64, minimum: f64 },

    #[error(
        "Kinematics '{0}' is not supported: only Cartesian, CoreXY and CoreXZ kinematics are supported for the vibrations measurement"
    )]
    UnsupportedKinematics(String),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Parameter {name}={value} is below the minimum of {minimum}")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        minimum: f64,
    },

    #[error("Speed increment must be strictly positive (got {0})")]
    InvalidIncrement(f64),

    #[error("Accelerometer [{0}] not found!")]
    SensorNotFound(String),

    #[error("Recording synchronization violated: {0}")]
    SynchronizationViolation(String),

    #[error("Machine is busy: another sweep holds the velocity limits")]
    MachineBusy,

    #[error("Hardware error: {0}")]
    Hardware(#[source] anyhow::Error),

    #[error("Analysis pipeline error: {0}")]
    Pipeline(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SweepError::InsufficientTravelDistance { .. }
            | SweepError::UnsupportedKinematics(_)
            | SweepError::MissingPrerequisite(_)
            | SweepError::ParameterOutOfRange { .. }
            | SweepError::InvalidIncrement(_)
            | SweepError::Config(_)
            | SweepError::Configuration(_) => ErrorKind::Validation,
            SweepError::SensorNotFound(_) => ErrorKind::ResourceNotFound,
            SweepError::SynchronizationViolation(_) => ErrorKind::SynchronizationViolation,
            SweepError::MachineBusy
            | SweepError::Hardware(_)
            | SweepError::Pipeline(_)
            | SweepError::Io(_) => ErrorKind::Machine,
        }
    }

    /// Whether the error was raised before the machine could have been mutated.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
