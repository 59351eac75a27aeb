#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Duration;

use growlux::control::{parse_hhmm, ControllerConfig, LuxController, SchedulePolicy, TimeWindow};
use growlux::error::{ActuatorError, SensorError};
use growlux::models::{ActionEvent, Reading};
use growlux::ports::{Actuator, BoxFuture, ManualClock, Repository, Sensor, TimeRange};
use growlux::sampling::{live_channel, LiveHandle, LiveState, Sampler, SamplerConfig, SamplerDeps};

/// What the fakes saw, in the order they saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    InsertReading,
    GetState,
    SetState(bool),
    /// Carries the controller's last switch time as seen when the event was written.
    InsertAction(Option<DateTime<Utc>>),
}

#[derive(Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

/// Replays queued results, then keeps returning the fallback value.
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Result<f64, SensorError>>>,
    fallback: Mutex<f64>,
}

impl ScriptedSensor {
    pub fn constant(value: f64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(value),
        }
    }

    pub fn push(&self, result: Result<f64, SensorError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set(&self, value: f64) {
        *self.fallback.lock().unwrap() = value;
    }
}

impl Sensor for ScriptedSensor {
    fn id(&self) -> &str {
        "lux_test"
    }

    fn unit(&self) -> &str {
        "lux"
    }

    fn read(&self) -> Result<f64, SensorError> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Ok(*self.fallback.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeActuator {
    journal: Journal,
    on: AtomicBool,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    commands: Mutex<Vec<(bool, String)>>,
}

impl FakeActuator {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    pub fn force(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<(bool, String)> {
        self.commands.lock().unwrap().clone()
    }
}

impl Actuator for FakeActuator {
    fn id(&self) -> &str {
        "light_test"
    }

    fn get_state(&self) -> BoxFuture<'_, Result<bool, ActuatorError>> {
        Box::pin(async move {
            self.journal.record(Event::GetState);
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(ActuatorError::Unreachable("light_test".into(), "offline".into()));
            }
            Ok(self.is_on())
        })
    }

    fn set_state<'a>(&'a self, on: bool, reason: &'a str) -> BoxFuture<'a, Result<(), ActuatorError>> {
        Box::pin(async move {
            self.commands.lock().unwrap().push((on, reason.to_string()));
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(ActuatorError::Rejected("light_test".into(), "relay stuck".into()));
            }
            self.force(on);
            self.journal.record(Event::SetState(on));
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    journal: Journal,
    controller: Option<Arc<tokio::sync::Mutex<LuxController>>>,
    readings: Mutex<Vec<Reading>>,
    actions: Mutex<Vec<ActionEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn with_journal(journal: Journal, controller: Arc<tokio::sync::Mutex<LuxController>>) -> Self {
        Self {
            journal,
            controller: Some(controller),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<ActionEvent> {
        self.actions.lock().unwrap().clone()
    }
}

fn most_recent<T: Clone>(rows: &[T], range: TimeRange, limit: usize, ts: fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let matching: Vec<T> = rows.iter().filter(|r| range.contains(&ts(r))).cloned().collect();
    let skip = matching.len().saturating_sub(limit);
    matching.into_iter().skip(skip).collect()
}

impl Repository for MemoryRepository {
    fn insert_reading<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.readings.lock().unwrap().push(reading.clone());
            self.journal.record(Event::InsertReading);
            Ok(())
        })
    }

    fn insert_action<'a>(&'a self, action: &'a ActionEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.actions.lock().unwrap().push(action.clone());
            let last_switch = match &self.controller {
                Some(controller) => controller.lock().await.state().last_switch_utc,
                None => None,
            };
            self.journal.record(Event::InsertAction(last_switch));
            Ok(())
        })
    }

    fn query_readings(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<Reading>>> {
        Box::pin(async move { Ok(most_recent(&self.readings(), range, limit, |r| r.ts_utc)) })
    }

    fn query_actions(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<ActionEvent>>> {
        Box::pin(async move { Ok(most_recent(&self.actions(), range, limit, |a| a.ts_utc)) })
    }
}

/// 09:00 UTC, inside the test "day" window.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn day_window() -> TimeWindow {
    TimeWindow {
        id: "day".into(),
        start: parse_hhmm("06:00").unwrap(),
        end: parse_hhmm("18:00").unwrap(),
        min_lux: 3000.0,
        max_lux: 6000.0,
        enabled: true,
        priority: 10,
        label: "Day".into(),
    }
}

pub struct Harness {
    pub sampler: Sampler,
    pub sensor: Arc<ScriptedSensor>,
    pub actuator: Arc<FakeActuator>,
    pub repo: Arc<MemoryRepository>,
    pub clock: Arc<ManualClock>,
    pub controller: Arc<tokio::sync::Mutex<LuxController>>,
    pub live: LiveHandle,
    pub journal: Journal,
}

impl Harness {
    pub fn new(lux: f64, avg_samples: usize) -> Self {
        Self::with_interval(lux, avg_samples, Duration::from_secs(5))
    }

    pub fn with_interval(lux: f64, avg_samples: usize, sample_interval: Duration) -> Self {
        let journal = Journal::default();
        let sensor = Arc::new(ScriptedSensor::constant(lux));
        let controller = Arc::new(tokio::sync::Mutex::new(LuxController::new(
            ControllerConfig::default(),
        )));
        let actuator = Arc::new(FakeActuator::with_journal(journal.clone()));
        let repo = Arc::new(MemoryRepository::with_journal(journal.clone(), controller.clone()));
        let clock = Arc::new(ManualClock::new(t0()));
        let schedule = Arc::new(SchedulePolicy::new(vec![day_window()]).unwrap());
        let (publisher, live) = live_channel(LiveState::new("test"));

        let deps = SamplerDeps {
            sensor: sensor.clone(),
            actuator: actuator.clone(),
            repo: repo.clone(),
            schedule,
            controller: controller.clone(),
            clock: clock.clone(),
        };
        let config = SamplerConfig {
            sample_interval,
            avg_samples,
            timezone: chrono_tz::UTC,
        };

        Self {
            sampler: Sampler::new(deps, config, publisher),
            sensor,
            actuator,
            repo,
            clock,
            controller,
            live,
            journal,
        }
    }

    /// Runs one cycle, then moves the clock forward by one sample interval.
    pub async fn cycle(&mut self) {
        self.sampler.run_cycle().await;
        self.clock.advance(chrono::Duration::seconds(5));
    }
}
