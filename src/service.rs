//! Transport-agnostic control surface.
//!
//! `AppContext` is the composition root: it is built once at startup and handed to
//! `LuxService`, which owns the controller, the schedule and the sampling task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use log::info;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    control::{load_schedule_file, ControllerState, LuxController, SchedulePolicy, WindowSpec},
    db::Database,
    devices::{PatternConfig, SensorStatus, SimulatedLightActuator, SimulatedLuxSensor},
    error::CommandError,
    models::{ActionEvent, Reading},
    ports::{Actuator, Clock, Repository, Sensor, SystemClock, TimeRange},
    sampling::{live_channel, LiveHandle, LiveState, Sampler, SamplerController, SamplerDeps},
    settings::{Settings, SettingsStore, RESTART_REQUIRED_KEYS},
};

pub const MAX_OVERRIDE_SECS: u64 = 24 * 60 * 60;
pub const MAX_QUERY_LIMIT: usize = 20_000;

pub struct Devices {
    pub sensor: Arc<dyn Sensor>,
    pub actuator: Arc<dyn Actuator>,
    /// Present only when the sensor is simulated, for the operator sim controls.
    pub sim_sensor: Option<Arc<SimulatedLuxSensor>>,
}

impl Devices {
    pub fn simulated(settings: &Settings) -> Self {
        let sim_sensor = Arc::new(SimulatedLuxSensor::new(settings.sensor_id.clone()));
        let sensor: Arc<dyn Sensor> = sim_sensor.clone();
        Self {
            sensor,
            actuator: Arc::new(SimulatedLightActuator::new(settings.actuator_id.clone())),
            sim_sensor: Some(sim_sensor),
        }
    }
}

pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub db: Database,
    pub devices: Devices,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Opens the database, applies stored setting overrides and builds the devices.
    pub async fn open(settings: SettingsStore) -> Result<Self> {
        let db = Database::new(settings.get().sqlite_path)?;

        let overrides = db
            .get_all_settings()
            .await
            .context("failed to load stored settings")?;
        let applied = settings.apply_overrides(&overrides);
        if !applied.is_empty() {
            info!("Applied stored settings: {}", applied.join(", "));
        }

        let devices = Devices::simulated(&settings.get());
        Ok(Self {
            settings: Arc::new(settings),
            db,
            devices,
            clock: Arc::new(SystemClock),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub applied: BTreeMap<String, Value>,
    pub restart_required: Vec<String>,
}

struct SamplerSlot {
    runner: SamplerController,
    idle: Option<Sampler>,
}

pub struct LuxService {
    settings: Arc<SettingsStore>,
    db: Database,
    schedule: Arc<SchedulePolicy>,
    controller: Arc<Mutex<LuxController>>,
    clock: Arc<dyn Clock>,
    live: LiveHandle,
    sim_sensor: Option<Arc<SimulatedLuxSensor>>,
    sampler: Mutex<SamplerSlot>,
}

impl LuxService {
    pub fn new(ctx: AppContext) -> Result<Self> {
        let settings = ctx.settings.get();
        let windows = load_schedule_file(&settings.schedule_path, settings.default_band());
        let schedule = Arc::new(SchedulePolicy::new(windows)?);
        let controller = Arc::new(Mutex::new(LuxController::new(settings.controller_config())));
        let (publisher, live) = live_channel(LiveState::new(settings.mode.clone()));

        let deps = SamplerDeps {
            sensor: ctx.devices.sensor,
            actuator: ctx.devices.actuator,
            repo: Arc::new(ctx.db.clone()),
            schedule: Arc::clone(&schedule),
            controller: Arc::clone(&controller),
            clock: Arc::clone(&ctx.clock),
        };
        let sampler = Sampler::new(deps, settings.sampler_config()?, publisher);

        Ok(Self {
            settings: ctx.settings,
            db: ctx.db,
            schedule,
            controller,
            clock: ctx.clock,
            live,
            sim_sensor: ctx.devices.sim_sensor,
            sampler: Mutex::new(SamplerSlot {
                runner: SamplerController::new(),
                idle: Some(sampler),
            }),
        })
    }

    pub async fn start(&self) -> Result<()> {
        let mut slot = self.sampler.lock().await;
        if slot.runner.is_running() {
            bail!("sampler already running");
        }
        let sampler = slot
            .idle
            .take()
            .ok_or_else(|| anyhow!("sampler is not available"))?;
        slot.runner.start(sampler)?;
        info!("Sampler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.sampler.lock().await;
        if let Some(sampler) = slot.runner.stop().await? {
            slot.idle = Some(sampler);
            info!("Sampler stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.sampler.lock().await.runner.is_running()
    }

    // ---- controller ----

    pub async fn controller_state(&self) -> ControllerState {
        self.controller.lock().await.snapshot()
    }

    pub async fn enable_controller(&self) -> ControllerState {
        let mut controller = self.controller.lock().await;
        controller.enable();
        info!("Controller enabled");
        controller.snapshot()
    }

    pub async fn disable_controller(&self) -> ControllerState {
        let mut controller = self.controller.lock().await;
        controller.disable();
        info!("Controller disabled");
        controller.snapshot()
    }

    pub async fn set_override(
        &self,
        on: bool,
        duration_secs: u64,
    ) -> Result<ControllerState, CommandError> {
        if !(1..=MAX_OVERRIDE_SECS).contains(&duration_secs) {
            return Err(CommandError::InvalidDuration {
                got: duration_secs,
                max: MAX_OVERRIDE_SECS,
            });
        }
        // Bounded by MAX_OVERRIDE_SECS above, so the cast cannot truncate.
        let until = self.clock.now_utc() + Duration::seconds(duration_secs as i64);

        let mut controller = self.controller.lock().await;
        controller.set_override(on, until);
        info!(
            "Override set: light {} until {}",
            if on { "ON" } else { "OFF" },
            until.to_rfc3339()
        );
        Ok(controller.snapshot())
    }

    pub async fn cancel_override(&self) -> ControllerState {
        let mut controller = self.controller.lock().await;
        controller.cancel_override();
        info!("Override cancelled");
        controller.snapshot()
    }

    // ---- schedule ----

    pub fn schedule(&self) -> Vec<WindowSpec> {
        self.schedule.windows().iter().map(|w| w.to_spec()).collect()
    }

    pub fn replace_schedule(&self, specs: Vec<WindowSpec>) -> Result<usize, CommandError> {
        let band = self.settings.get().default_band();
        let count = self.schedule.replace_specs(specs, band)?;
        info!("Schedule replaced with {count} windows");
        Ok(count)
    }

    // ---- live state and history ----

    pub fn live(&self) -> LiveState {
        self.live.snapshot()
    }

    pub fn live_handle(&self) -> LiveHandle {
        self.live.clone()
    }

    pub async fn recent_readings(&self, minutes: i64, limit: usize) -> Result<Vec<Reading>> {
        let range = TimeRange::last_minutes(self.clock.now_utc(), minutes);
        self.readings_between(range, limit).await
    }

    pub async fn readings_between(&self, range: TimeRange, limit: usize) -> Result<Vec<Reading>> {
        Repository::query_readings(&self.db, range, clamp_limit(limit)).await
    }

    pub async fn recent_actions(&self, minutes: i64, limit: usize) -> Result<Vec<ActionEvent>> {
        let range = TimeRange::last_minutes(self.clock.now_utc(), minutes);
        self.actions_between(range, limit).await
    }

    pub async fn actions_between(&self, range: TimeRange, limit: usize) -> Result<Vec<ActionEvent>> {
        Repository::query_actions(&self.db, range, clamp_limit(limit)).await
    }

    // ---- settings ----

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    /// Casts every key into one candidate and validates it as a whole before anything is
    /// stored. Controller tunables take effect immediately; the rest are reported back as
    /// needing a restart.
    pub async fn update_settings(
        &self,
        updates: HashMap<String, Value>,
    ) -> Result<SettingsUpdate, CommandError> {
        let updates: BTreeMap<String, Value> = updates.into_iter().collect();
        let (candidate, applied) = self.settings.get().with_updates(&updates)?;

        let mut encoded = HashMap::new();
        for (key, value) in &applied {
            let json = serde_json::to_string(value)
                .with_context(|| format!("failed to encode setting {key}"))?;
            encoded.insert(key.clone(), json);
        }
        self.db
            .set_settings_batch(encoded)
            .await
            .context("failed to persist settings")?;

        self.settings.replace(candidate.clone());
        self.controller
            .lock()
            .await
            .update_config(candidate.controller_config());

        let restart_required: Vec<String> = applied
            .keys()
            .filter(|key| RESTART_REQUIRED_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();
        info!(
            "Settings updated: {:?} (restart required for {:?})",
            applied.keys().collect::<Vec<_>>(),
            restart_required
        );

        Ok(SettingsUpdate {
            applied,
            restart_required,
        })
    }

    // ---- simulated sensor ----

    fn sim_sensor(&self) -> Result<&SimulatedLuxSensor, CommandError> {
        self.sim_sensor
            .as_deref()
            .ok_or_else(|| CommandError::SimulationUnavailable(self.settings.get().sensor_mode))
    }

    pub fn sensor_status(&self) -> Result<SensorStatus, CommandError> {
        Ok(self.sim_sensor()?.status())
    }

    pub fn set_sensor_enabled(&self, enabled: bool) -> Result<SensorStatus, CommandError> {
        let sensor = self.sim_sensor()?;
        if enabled {
            sensor.enable();
        } else {
            sensor.disable();
        }
        Ok(sensor.status())
    }

    pub fn set_manual_lux(&self, lux: f64) -> Result<SensorStatus, CommandError> {
        if !lux.is_finite() {
            return Err(CommandError::InvalidSetting {
                key: "lux".into(),
                reason: format!("{lux} is not a finite number"),
            });
        }
        let sensor = self.sim_sensor()?;
        sensor.set_manual(lux);
        Ok(sensor.status())
    }

    pub fn set_sensor_pattern(&self, pattern: PatternConfig) -> Result<SensorStatus, CommandError> {
        let sensor = self.sim_sensor()?;
        sensor.set_pattern(pattern);
        Ok(sensor.status())
    }

    pub fn set_sensor_failure_rate(&self, rate: f64) -> Result<SensorStatus, CommandError> {
        let sensor = self.sim_sensor()?;
        sensor.set_failure_rate(rate);
        Ok(sensor.status())
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}
