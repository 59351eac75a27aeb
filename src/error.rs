//! Typed errors for the control core.
//!
//! Plumbing (database, settings files, startup) uses `anyhow`; these enums cover the
//! failures that the sampler and the control surface branch on.

use thiserror::Error;

/// A single failed acquisition. Scoped to one cycle and never escalated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("sensor {0} is disabled")]
    Disabled(String),

    #[error("sensor read timed out after {0} ms")]
    Timeout(u64),

    #[error("sensor I/O error: {0}")]
    Io(String),

    #[error("sensor returned an invalid value: {0}")]
    InvalidValue(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("actuator {0} unreachable: {1}")]
    Unreachable(String, String),

    #[error("actuator {0} rejected command: {1}")]
    Rejected(String, String),
}

/// Configuration error raised while validating a schedule before it is swapped in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("invalid time format '{0}', expected HH:MM")]
    InvalidTimeFormat(String),

    #[error("invalid time '{0}': hour must be 0-23 and minute 0-59")]
    TimeOutOfRange(String),

    #[error("window '{id}': {reason}")]
    InvalidWindow { id: String, reason: String },

    #[error("duplicate window id '{0}'")]
    DuplicateId(String),
}

/// Rejections produced by the operator control surface.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("override duration must be between 1 and {max} seconds, got {got}")]
    InvalidDuration { got: u64, max: u64 },

    #[error("unknown setting key: {0}")]
    UnknownSetting(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("simulated sensor not available (sensor_mode is '{0}')")]
    SimulationUnavailable(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
