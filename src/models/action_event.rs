//! Relay switch audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ControlDecision;

/// Appended only when the actuator was actually toggled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    pub ts_utc: DateTime<Utc>,
    pub actuator_id: String,
    pub state: bool,
    pub reason: String,
    pub avg_lux: Option<f64>,
    pub min_lux: Option<f64>,
    pub max_lux: Option<f64>,
    pub window_label: Option<String>,
}

impl ActionEvent {
    pub fn from_decision(
        ts_utc: DateTime<Utc>,
        actuator_id: impl Into<String>,
        state: bool,
        decision: &ControlDecision,
    ) -> Self {
        let thresholds = decision.thresholds.as_ref();
        Self {
            ts_utc,
            actuator_id: actuator_id.into(),
            state,
            reason: decision.reason.clone(),
            avg_lux: decision.avg_lux,
            min_lux: thresholds.map(|t| t.min_lux),
            max_lux: thresholds.map(|t| t.max_lux),
            window_label: thresholds.map(|t| t.window_label.clone()),
        }
    }
}
