use std::f64::consts::PI;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::ports::Sensor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Manual,
    Sine,
    Step,
    Ramp,
    Random,
}

/// Waveform parameters. Periods are in seconds and clamped to at least one second.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternConfig {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub baseline: f64,
    pub amplitude: f64,
    pub period_s: f64,
    pub noise: f64,
    pub step_low: f64,
    pub step_high: f64,
    pub step_period_s: f64,
    pub ramp_min: f64,
    pub ramp_max: f64,
    pub ramp_period_s: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            kind: PatternKind::Manual,
            baseline: 3000.0,
            amplitude: 1500.0,
            period_s: 600.0,
            noise: 50.0,
            step_low: 2500.0,
            step_high: 6500.0,
            step_period_s: 120.0,
            ramp_min: 2000.0,
            ramp_max: 7000.0,
            ramp_period_s: 600.0,
        }
    }
}

impl PatternConfig {
    /// Noise-free waveform value `t` seconds into the pattern.
    pub fn value_at(&self, t: f64) -> f64 {
        match self.kind {
            PatternKind::Manual | PatternKind::Random => self.baseline,
            PatternKind::Sine => {
                let period = self.period_s.max(1.0);
                self.baseline + self.amplitude * (2.0 * PI * t / period).sin()
            }
            PatternKind::Step => {
                let period = self.step_period_s.max(1.0);
                if t.rem_euclid(period) / period >= 0.5 {
                    self.step_high
                } else {
                    self.step_low
                }
            }
            PatternKind::Ramp => {
                let period = self.ramp_period_s.max(1.0);
                let frac = t.rem_euclid(period) / period;
                self.ramp_min + (self.ramp_max - self.ramp_min) * frac
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SensorStatus {
    pub enabled: bool,
    pub mode: PatternKind,
    pub manual_lux: f64,
    pub pattern: PatternConfig,
    pub failure_rate: f64,
}

struct SimState {
    enabled: bool,
    manual: bool,
    manual_lux: f64,
    pattern: PatternConfig,
    failure_rate: f64,
    rng: StdRng,
}

/// Lux source driven by a fixed value or a synthetic waveform.
pub struct SimulatedLuxSensor {
    id: String,
    started: Instant,
    state: Mutex<SimState>,
}

impl SimulatedLuxSensor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started: Instant::now(),
            state: Mutex::new(SimState {
                enabled: true,
                manual: true,
                manual_lux: 3500.0,
                pattern: PatternConfig::default(),
                failure_rate: 0.0,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enable(&self) {
        self.lock().enabled = true;
    }

    pub fn disable(&self) {
        self.lock().enabled = false;
    }

    pub fn set_manual(&self, lux: f64) {
        let mut state = self.lock();
        state.manual = true;
        state.manual_lux = lux.max(0.0);
    }

    pub fn set_pattern(&self, pattern: PatternConfig) {
        let mut state = self.lock();
        state.manual = pattern.kind == PatternKind::Manual;
        if state.manual {
            state.manual_lux = pattern.baseline.max(0.0);
        }
        state.pattern = pattern;
    }

    /// Probability in `[0, 1]` that a read fails.
    pub fn set_failure_rate(&self, rate: f64) {
        self.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    pub fn status(&self) -> SensorStatus {
        let state = self.lock();
        SensorStatus {
            enabled: state.enabled,
            mode: if state.manual {
                PatternKind::Manual
            } else {
                state.pattern.kind
            },
            manual_lux: state.manual_lux,
            pattern: state.pattern.clone(),
            failure_rate: state.failure_rate,
        }
    }
}

impl Sensor for SimulatedLuxSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn unit(&self) -> &str {
        "lux"
    }

    fn read(&self) -> Result<f64, SensorError> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut guard = self.lock();
        let state = &mut *guard;

        if !state.enabled {
            return Err(SensorError::Disabled(self.id.clone()));
        }
        if state.failure_rate > 0.0 && state.rng.gen_bool(state.failure_rate) {
            return Err(SensorError::Io("simulated read failure".into()));
        }

        // Noise applies in every mode, manual included.
        let pattern = &state.pattern;
        let mut value = if state.manual {
            state.manual_lux
        } else {
            pattern.value_at(elapsed)
        };
        if !state.manual && pattern.kind == PatternKind::Random && pattern.amplitude > 0.0 {
            value += state.rng.gen_range(-pattern.amplitude..=pattern.amplitude);
        }
        if pattern.noise > 0.0 {
            value += state.rng.gen_range(-pattern.noise..=pattern.noise);
        }
        Ok(value.max(0.0))
    }
}
