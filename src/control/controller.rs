//! Lux decision state machine.
//!
//! `decide` is a pure function of the controller's own state plus its arguments. It never
//! touches the actuator; the sampler applies the decision and reports back through
//! `mark_switched` only when the relay actually toggled.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ControlAction, ControlDecision, Thresholds};

pub const REASON_DISABLED: &str = "Controller disabled";
pub const REASON_OVERRIDE: &str = "Manual override";
pub const REASON_SENSOR_FAULT: &str = "Sensor fault (fail-safe)";
pub const REASON_OUTSIDE_WINDOW: &str = "Outside control window";
pub const REASON_MIN_INTERVAL: &str = "Min switch interval not met";
pub const REASON_WITHIN_BAND: &str = "Within band";

/// Tunables read on every decision. Hot-swappable through `update_config`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    pub hysteresis_lux: f64,
    pub min_switch_interval_secs: u64,
    /// Relay state applied while sensor data is unavailable.
    pub fail_safe_light_state: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hysteresis_lux: 50.0,
            min_switch_interval_secs: 60,
            fail_safe_light_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    pub enabled: bool,
    pub override_active: bool,
    pub override_state: Option<bool>,
    pub override_until_utc: Option<DateTime<Utc>>,
    pub last_switch_utc: Option<DateTime<Utc>>,
    pub last_avg_lux: Option<f64>,
    pub last_thresholds: Option<Thresholds>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            enabled: true,
            override_active: false,
            override_state: None,
            override_until_utc: None,
            last_switch_utc: None,
            last_avg_lux: None,
            last_thresholds: None,
        }
    }
}

pub struct LuxController {
    state: ControllerState,
    config: ControllerConfig,
}

impl LuxController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            state: ControllerState::default(),
            config,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn snapshot(&self) -> ControllerState {
        self.state.clone()
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    pub fn update_config(&mut self, config: ControllerConfig) {
        self.config = config;
    }

    pub fn enable(&mut self) {
        self.state.enabled = true;
    }

    pub fn disable(&mut self) {
        self.state.enabled = false;
    }

    pub fn set_override(&mut self, on: bool, until_utc: DateTime<Utc>) {
        self.state.override_active = true;
        self.state.override_state = Some(on);
        self.state.override_until_utc = Some(until_utc);
    }

    pub fn cancel_override(&mut self) {
        self.state.override_active = false;
        self.state.override_state = None;
        self.state.override_until_utc = None;
    }

    /// Must only be called after the relay was actually toggled.
    pub fn mark_switched(&mut self, now_utc: DateTime<Utc>) {
        self.state.last_switch_utc = Some(now_utc);
    }

    /// Returns the forced state of a live override. An expired override is cleared here,
    /// on first evaluation past its deadline.
    fn active_override(&mut self, now_utc: DateTime<Utc>) -> Option<bool> {
        if !self.state.override_active {
            return None;
        }
        let (Some(until), Some(state)) = (self.state.override_until_utc, self.state.override_state)
        else {
            return None;
        };
        if now_utc >= until {
            self.cancel_override();
            return None;
        }
        Some(state)
    }

    fn within_min_interval(&self, now_utc: DateTime<Utc>) -> bool {
        let min_interval = i64::try_from(self.config.min_switch_interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        self.state
            .last_switch_utc
            .map(|last| now_utc - last < min_interval)
            .unwrap_or(false)
    }

    /// The checks below run in a fixed order that encodes the safety policy.
    pub fn decide(
        &mut self,
        now_utc: DateTime<Utc>,
        avg_lux: Option<f64>,
        thresholds: Option<Thresholds>,
        current_light_state: bool,
        sensor_ok: bool,
    ) -> ControlDecision {
        self.state.last_avg_lux = avg_lux;
        self.state.last_thresholds = thresholds.clone();

        if !self.state.enabled {
            return ControlDecision::new(ControlAction::Blocked, REASON_DISABLED, thresholds, avg_lux);
        }

        if let Some(forced) = self.active_override(now_utc) {
            return ControlDecision::new(
                ControlAction::from_state(forced),
                REASON_OVERRIDE,
                thresholds,
                avg_lux,
            );
        }

        let avg = match avg_lux {
            Some(avg) if sensor_ok => avg,
            _ => {
                return ControlDecision::new(
                    ControlAction::from_state(self.config.fail_safe_light_state),
                    REASON_SENSOR_FAULT,
                    thresholds,
                    avg_lux,
                );
            }
        };

        let Some(band) = thresholds else {
            return ControlDecision::new(ControlAction::Noop, REASON_OUTSIDE_WINDOW, None, avg_lux);
        };

        if self.within_min_interval(now_utc) {
            return ControlDecision::new(ControlAction::Noop, REASON_MIN_INTERVAL, Some(band), avg_lux);
        }

        let h = self.config.hysteresis_lux;
        if avg < band.min_lux - h && !current_light_state {
            let reason = format!("Avg lux {avg:.1} below min-hys ({:.1})", band.min_lux - h);
            return ControlDecision::new(ControlAction::On, reason, Some(band), avg_lux);
        }
        if avg > band.max_lux + h && current_light_state {
            let reason = format!("Avg lux {avg:.1} above max+hys ({:.1})", band.max_lux + h);
            return ControlDecision::new(ControlAction::Off, reason, Some(band), avg_lux);
        }

        ControlDecision::new(ControlAction::Noop, REASON_WITHIN_BAND, Some(band), avg_lux)
    }
}
