//! Read-model of the most recent sampling cycle.
//!
//! The loop is the only writer. Snapshots are published whole through a `watch` channel, so
//! observers never see a half-written record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{ControlAction, Reading, Thresholds};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub mode: String,
    pub last_reading: Option<Reading>,
    pub avg_lux: Option<f64>,
    pub light_state: bool,
    pub controller_enabled: bool,
    pub override_active: bool,
    pub active_window_label: Option<String>,
    pub active_min_lux: Option<f64>,
    pub active_max_lux: Option<f64>,
    pub last_decision: Option<ControlAction>,
    pub last_reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LiveState {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            last_reading: None,
            avg_lux: None,
            light_state: false,
            controller_enabled: true,
            override_active: false,
            active_window_label: None,
            active_min_lux: None,
            active_max_lux: None,
            last_decision: None,
            last_reason: None,
            updated_at: None,
        }
    }

    pub fn set_thresholds(&mut self, thresholds: Option<&Thresholds>) {
        self.active_window_label = thresholds.map(|t| t.window_label.clone());
        self.active_min_lux = thresholds.map(|t| t.min_lux);
        self.active_max_lux = thresholds.map(|t| t.max_lux);
    }
}

/// Writer half, owned by the sampler.
pub struct LivePublisher {
    tx: watch::Sender<LiveState>,
}

/// Cloneable reader half handed to the command layer.
#[derive(Clone)]
pub struct LiveHandle {
    rx: watch::Receiver<LiveState>,
}

pub fn live_channel(initial: LiveState) -> (LivePublisher, LiveHandle) {
    let (tx, rx) = watch::channel(initial);
    (LivePublisher { tx }, LiveHandle { rx })
}

impl LivePublisher {
    pub fn current(&self) -> LiveState {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, state: LiveState) {
        self.tx.send_replace(state);
    }
}

impl LiveHandle {
    pub fn snapshot(&self) -> LiveState {
        self.rx.borrow().clone()
    }

    /// Waits for the next published cycle.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
