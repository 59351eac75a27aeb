use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Duration;

use crate::control::{Band, ControllerConfig};
use crate::error::CommandError;
use crate::sampling::SamplerConfig;

/// Keys that are stored but only take effect after a restart.
pub const RESTART_REQUIRED_KEYS: &[&str] = &[
    "app_name",
    "timezone",
    "mode",
    "sample_seconds",
    "avg_samples",
    "sqlite_path",
    "schedule_path",
    "sensor_mode",
    "sensor_id",
    "actuator_id",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    /// IANA zone used to resolve schedule windows.
    pub timezone: String,
    pub mode: String,

    pub sample_seconds: u64,
    /// Readings per rolling average (6 × 5 s = 30 s).
    pub avg_samples: usize,

    pub hysteresis_lux: f64,
    pub min_switch_interval_seconds: u64,

    /// Band applied to schedule entries that omit their own bounds.
    pub default_min_lux: f64,
    pub default_max_lux: f64,

    pub fail_safe_light_state: bool,

    pub sqlite_path: PathBuf,
    pub schedule_path: PathBuf,

    pub sensor_mode: String,
    pub sensor_id: String,
    pub actuator_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Spirulina Lux Control".into(),
            timezone: "Asia/Kuala_Lumpur".into(),
            mode: "sim".into(),
            sample_seconds: 5,
            avg_samples: 6,
            hysteresis_lux: 50.0,
            min_switch_interval_seconds: 60,
            default_min_lux: 3000.0,
            default_max_lux: 6000.0,
            fail_safe_light_state: false,
            sqlite_path: PathBuf::from("growlux.sqlite3"),
            schedule_path: PathBuf::from("default_schedule.json"),
            sensor_mode: "sim".into(),
            sensor_id: "lux_sim_01".into(),
            actuator_id: "light_sim_01".into(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.sample_seconds == 0 {
            bail!("sample_seconds must be at least 1");
        }
        if self.avg_samples == 0 {
            bail!("avg_samples must be at least 1");
        }
        if !self.hysteresis_lux.is_finite() || self.hysteresis_lux < 0.0 {
            bail!("hysteresis_lux must be a non-negative number");
        }
        if !self.default_min_lux.is_finite()
            || !self.default_max_lux.is_finite()
            || self.default_min_lux > self.default_max_lux
        {
            bail!(
                "default band {}..{} is invalid",
                self.default_min_lux,
                self.default_max_lux
            );
        }
        if self.sensor_mode != "sim" {
            bail!("unsupported sensor_mode '{}'", self.sensor_mode);
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("unknown timezone '{}': {err}", self.timezone))
    }

    pub fn default_band(&self) -> Band {
        Band {
            min_lux: self.default_min_lux,
            max_lux: self.default_max_lux,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            hysteresis_lux: self.hysteresis_lux,
            min_switch_interval_secs: self.min_switch_interval_seconds,
            fail_safe_light_state: self.fail_safe_light_state,
        }
    }

    pub fn sampler_config(&self) -> Result<SamplerConfig> {
        Ok(SamplerConfig {
            sample_interval: Duration::from_secs(self.sample_seconds),
            avg_samples: self.avg_samples,
            timezone: self.tz()?,
        })
    }

    /// Applies a batch of loosely typed values, casting each to its field's type, and
    /// validates the result once. Returns the new settings and the typed values; `self` is
    /// never modified.
    pub fn with_updates(
        &self,
        updates: &BTreeMap<String, Value>,
    ) -> Result<(Settings, BTreeMap<String, Value>), CommandError> {
        let mut fields = self.to_fields()?;
        let mut applied = BTreeMap::new();
        for (key, raw) in updates {
            let typed = cast_field(&fields, key, raw)?;
            fields.insert(key.clone(), typed.clone());
            applied.insert(key.clone(), typed);
        }

        let keys = applied.keys().cloned().collect::<Vec<_>>().join(", ");
        let updated = Self::from_fields(fields).map_err(|err| CommandError::InvalidSetting {
            key: keys.clone(),
            reason: format!("{err:#}"),
        })?;
        updated.validate().map_err(|err| CommandError::InvalidSetting {
            key: keys,
            reason: err.to_string(),
        })?;
        Ok((updated, applied))
    }

    fn to_fields(&self) -> Result<Map<String, Value>, CommandError> {
        match serde_json::to_value(self).context("failed to serialize settings")? {
            Value::Object(map) => Ok(map),
            _ => Err(CommandError::Other(anyhow::anyhow!("settings are not an object"))),
        }
    }

    fn from_fields(fields: Map<String, Value>) -> Result<Settings> {
        serde_json::from_value(Value::Object(fields)).context("settings do not deserialize")
    }
}

fn cast_field(fields: &Map<String, Value>, key: &str, raw: &Value) -> Result<Value, CommandError> {
    let current = fields
        .get(key)
        .ok_or_else(|| CommandError::UnknownSetting(key.to_string()))?;
    cast_like(current, raw).ok_or_else(|| CommandError::InvalidSetting {
        key: key.to_string(),
        reason: format!("cannot interpret {raw} as {}", type_name(current)),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a number",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        _ => "a value",
    }
}

fn cast_like(template: &Value, raw: &Value) -> Option<Value> {
    match template {
        Value::Bool(_) => match raw {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => {
                let s = s.to_ascii_lowercase();
                Some(Value::Bool(matches!(s.as_str(), "true" | "1" | "yes")))
            }
            Value::Number(n) => Some(Value::Bool(n.as_f64() != Some(0.0))),
            _ => None,
        },
        Value::Number(n) if n.is_f64() => {
            let v = match raw {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            serde_json::Number::from_f64(v).map(Value::Number)
        }
        Value::Number(_) => {
            let v = match raw {
                Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_u64))?,
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<u64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(whole_u64))?
                }
                _ => return None,
            };
            Some(Value::from(v))
        }
        Value::String(_) => match raw {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        _ => None,
    }
}

/// `6.0` counts as an integer, `6.5` and negatives do not.
fn whole_u64(v: f64) -> Option<u64> {
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then(|| v as u64)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings from a JSON file; a missing file yields the defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            Settings::default()
        };
        data.validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            path: PathBuf::new(),
            data: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, settings: Settings) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Applies overrides persisted in the database as one unit. Entries that are unknown or
    /// cannot be cast are skipped; if the remaining set does not validate, none of it applies.
    pub fn apply_overrides(&self, overrides: &HashMap<String, String>) -> Vec<String> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let fields = match guard.to_fields() {
            Ok(fields) => fields,
            Err(err) => {
                warn!("Ignoring stored settings: {err}");
                return Vec::new();
            }
        };

        let mut updates = BTreeMap::new();
        for (key, encoded) in overrides {
            let raw = match serde_json::from_str::<Value>(encoded) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("Ignoring stored setting {key}: {err}");
                    continue;
                }
            };
            match cast_field(&fields, key, &raw) {
                Ok(_) => {
                    updates.insert(key.clone(), raw);
                }
                Err(err) => warn!("Ignoring stored setting {key}: {err}"),
            }
        }

        match guard.with_updates(&updates) {
            Ok((updated, applied)) => {
                *guard = updated;
                applied.into_keys().collect()
            }
            Err(err) => {
                warn!("Ignoring all stored settings: {err}");
                Vec::new()
            }
        }
    }
}
