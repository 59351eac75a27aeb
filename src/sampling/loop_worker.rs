use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    control::{LuxController, SchedulePolicy},
    error::SensorError,
    models::{ActionEvent, ControlDecision, Reading},
    ports::{Actuator, Clock, Repository, Sensor},
};

use super::buffer::RollingAverage;
use super::live::{LivePublisher, LiveState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub sample_interval: Duration,
    pub avg_samples: usize,
    pub timezone: Tz,
}

/// Everything the loop talks to, composed once at startup.
pub struct SamplerDeps {
    pub sensor: Arc<dyn Sensor>,
    pub actuator: Arc<dyn Actuator>,
    pub repo: Arc<dyn Repository>,
    pub schedule: Arc<SchedulePolicy>,
    pub controller: Arc<Mutex<LuxController>>,
    pub clock: Arc<dyn Clock>,
}

/// Owns the rolling buffer and is the single writer of the live snapshot.
pub struct Sampler {
    deps: SamplerDeps,
    config: SamplerConfig,
    buffer: RollingAverage,
    live: LivePublisher,
}

impl Sampler {
    pub fn new(deps: SamplerDeps, config: SamplerConfig, live: LivePublisher) -> Self {
        Self {
            buffer: RollingAverage::new(config.avg_samples),
            deps,
            config,
            live,
        }
    }

    pub fn buffer(&self) -> &RollingAverage {
        &self.buffer
    }

    /// Runs until cancelled, then hands the sampler back so it can be restarted with its
    /// buffer intact.
    pub async fn run(mut self, cancel_token: CancellationToken) -> Self {
        log_info!(
            "sampler loop started (sample_interval={:?} avg_samples={} sensor={} actuator={})",
            self.config.sample_interval,
            self.buffer.capacity(),
            self.deps.sensor.id(),
            self.deps.actuator.id()
        );

        let mut ticker = tokio::time::interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_info!("sampler loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let cycle_start = Instant::now();
                    self.run_cycle().await;
                    log_debug!("cycle completed in {}ms", cycle_start.elapsed().as_millis());
                }
            }
        }
        self
    }

    /// One full cycle. Never fails: every fault is logged and the next cycle proceeds.
    pub async fn run_cycle(&mut self) {
        let reading = self.acquire().await;

        // Persisted before any decision logic so the audit trail covers every cycle.
        if let Err(err) = self.deps.repo.insert_reading(&reading).await {
            log_error!("failed to persist reading: {err:?}");
        }

        let mut draft = self.live.current();
        draft.last_reading = Some(reading.clone());
        draft.updated_at = Some(reading.ts_utc);

        if let Err(err) = self.evaluate(&reading, &mut draft).await {
            log_error!("sampler cycle error: {err:?}");
        }

        self.live.publish(draft);
    }

    async fn acquire(&self) -> Reading {
        let sensor = Arc::clone(&self.deps.sensor);
        let result = tokio::task::spawn_blocking(move || sensor.read()).await;
        let ts = self.deps.clock.now_utc();
        let sensor_id = self.deps.sensor.id();
        let unit = self.deps.sensor.unit();

        let outcome = match result {
            Ok(Ok(value)) if value.is_finite() => Ok(value),
            Ok(Ok(value)) => Err(SensorError::InvalidValue(value.to_string())),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(SensorError::Other(format!("sensor worker failed: {join_err}"))),
        };

        match outcome {
            Ok(value) => {
                log_debug!("sensor read ok: {value:.3} {unit} (sensor={sensor_id})");
                Reading::success(ts, sensor_id, unit, value)
            }
            Err(err) => {
                log_warn!("sensor read failed (sensor={sensor_id}): {err}");
                Reading::failure(ts, sensor_id, unit, err.to_string())
            }
        }
    }

    async fn evaluate(&mut self, reading: &Reading, draft: &mut LiveState) -> Result<()> {
        if let Some(value) = reading.usable_value() {
            self.buffer.push(value);
        }
        let avg_lux = self.buffer.average();
        draft.avg_lux = avg_lux;
        if avg_lux.is_none() && !self.buffer.is_empty() {
            log_debug!(
                "rolling average warming up ({}/{})",
                self.buffer.len(),
                self.buffer.capacity()
            );
        }

        let now = self.deps.clock.now_utc();
        let local = now.with_timezone(&self.config.timezone);
        let thresholds = self.deps.schedule.active_thresholds(&local);
        draft.set_thresholds(thresholds.as_ref());

        // Operator flags are shown even when the actuator cannot be read this cycle.
        {
            let controller = self.deps.controller.lock().await;
            draft.controller_enabled = controller.state().enabled;
            draft.override_active = controller.state().override_active;
        }

        let observed = self
            .deps
            .actuator
            .get_state()
            .await
            .context("failed to read actuator state")?;
        draft.light_state = observed;

        let decision = {
            let mut controller = self.deps.controller.lock().await;
            let decision = controller.decide(now, avg_lux, thresholds, observed, reading.ok);
            draft.controller_enabled = controller.state().enabled;
            draft.override_active = controller.state().override_active;
            decision
        };
        draft.last_decision = Some(decision.action);
        draft.last_reason = Some(decision.reason.clone());
        self.live.publish(draft.clone());

        log_debug!(
            "decision {} ({}) avg={:?} light={}",
            decision.action.as_str(),
            decision.reason,
            avg_lux,
            observed
        );

        self.apply(now, &decision, observed, draft).await
    }

    async fn apply(
        &self,
        now: DateTime<Utc>,
        decision: &ControlDecision,
        observed: bool,
        draft: &mut LiveState,
    ) -> Result<()> {
        let Some(desired) = decision.action.desired_state() else {
            return Ok(());
        };
        if desired == observed {
            return Ok(());
        }

        self.deps
            .actuator
            .set_state(desired, &decision.reason)
            .await
            .with_context(|| format!("failed to switch light {}", decision.action.as_str()))?;

        self.deps.controller.lock().await.mark_switched(now);
        draft.light_state = desired;

        log_info!(
            "light switched {} on {}: {}",
            decision.action.as_str(),
            self.deps.actuator.id(),
            decision.reason
        );

        let event = ActionEvent::from_decision(now, self.deps.actuator.id(), desired, decision);
        self.deps
            .repo
            .insert_action(&event)
            .await
            .context("failed to persist action event")?;

        Ok(())
    }
}
