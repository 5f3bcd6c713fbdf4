use thiserror::Error;

use crate::types::{OperationState, Position};

/// Why the arbiter refused an actuation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("actuator busy: {} in progress", .0.as_str())]
    Busy(OperationState),
    #[error("already {}", .0.as_str())]
    AlreadyThere(Position),
    #[error("endstops disagree; position is ambiguous")]
    AmbiguousPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid temperature reading {reading}")]
pub struct SensorInvalid {
    pub reading: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SettingsError {
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("close temperature {low} must stay below open temperature {high}")]
    ThresholdOrder { low: f32, high: f32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outcome of a menu event the caller should surface.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EventError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
