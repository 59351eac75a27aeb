//! Controller output types.

use serde::{Deserialize, Serialize};

/// Illuminance band resolved from the schedule for the current time of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub min_lux: f64,
    pub max_lux: f64,
    pub window_label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlAction {
    On,
    Off,
    Noop,
    Blocked,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::On => "ON",
            ControlAction::Off => "OFF",
            ControlAction::Noop => "NOOP",
            ControlAction::Blocked => "BLOCKED",
        }
    }

    pub fn from_state(on: bool) -> Self {
        if on {
            ControlAction::On
        } else {
            ControlAction::Off
        }
    }

    /// Desired relay state for switching actions, `None` for the rest.
    pub fn desired_state(&self) -> Option<bool> {
        match self {
            ControlAction::On => Some(true),
            ControlAction::Off => Some(false),
            ControlAction::Noop | ControlAction::Blocked => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDecision {
    pub action: ControlAction,
    pub reason: String,
    pub thresholds: Option<Thresholds>,
    pub avg_lux: Option<f64>,
}

impl ControlDecision {
    pub fn new(
        action: ControlAction,
        reason: impl Into<String>,
        thresholds: Option<Thresholds>,
        avg_lux: Option<f64>,
    ) -> Self {
        Self {
            action,
            reason: reason.into(),
            thresholds,
            avg_lux,
        }
    }
}
