//! Collaborator contracts consumed by the control core.
//!
//! Everything here is composed once at startup and handed to the sampler as trait objects.
//! Async operations return boxed futures rather than going through `async_trait`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::error::{ActuatorError, SensorError};
use crate::models::{ActionEvent, Reading};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Scalar illuminance source.
///
/// `read` is blocking and is dispatched onto a worker thread by the sampler, so a slow
/// transport never stalls the runtime. Implementations own their timeouts and must fail
/// fast rather than hang.
pub trait Sensor: Send + Sync {
    fn id(&self) -> &str;

    fn unit(&self) -> &str {
        ""
    }

    fn read(&self) -> Result<f64, SensorError>;
}

/// The single boolean relay under control.
pub trait Actuator: Send + Sync {
    fn id(&self) -> &str;

    /// Observed device state. This is authoritative over anything the controller remembers.
    fn get_state(&self) -> BoxFuture<'_, Result<bool, ActuatorError>>;

    fn set_state<'a>(&'a self, on: bool, reason: &'a str) -> BoxFuture<'a, Result<(), ActuatorError>>;
}

/// Inclusive UTC time range for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `minutes` leading up to `end`, never shorter than one minute.
    pub fn last_minutes(end: DateTime<Utc>, minutes: i64) -> Self {
        let start = Duration::try_minutes(minutes.max(1))
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

/// Append-only audit store.
///
/// Queries return the most recent `limit` rows inside the range, ordered oldest first.
pub trait Repository: Send + Sync {
    fn insert_reading<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<()>>;

    fn insert_action<'a>(&'a self, action: &'a ActionEvent) -> BoxFuture<'a, Result<()>>;

    fn query_readings(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<Reading>>>;

    fn query_actions(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<ActionEvent>>>;
}

/// Wall-clock source, swappable so decisions can be driven by synthetic timestamps.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
