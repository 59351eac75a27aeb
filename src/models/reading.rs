//! Sensor reading data model.
//!
//! One `Reading` is produced per sampling cycle, successful or not, and persisted as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub ts_utc: DateTime<Utc>,
    pub sensor_id: String,
    /// Absent when the acquisition failed.
    pub value: Option<f64>,
    pub unit: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl Reading {
    pub fn success(
        ts_utc: DateTime<Utc>,
        sensor_id: impl Into<String>,
        unit: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            ts_utc,
            sensor_id: sensor_id.into(),
            value: Some(value),
            unit: unit.into(),
            ok: true,
            error: None,
        }
    }

    pub fn failure(
        ts_utc: DateTime<Utc>,
        sensor_id: impl Into<String>,
        unit: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            ts_utc,
            sensor_id: sensor_id.into(),
            value: None,
            unit: unit.into(),
            ok: false,
            error: Some(error.into()),
        }
    }

    /// The value to feed into the rolling buffer, if this reading is usable.
    pub fn usable_value(&self) -> Option<f64> {
        if self.ok {
            self.value
        } else {
            None
        }
    }
}
