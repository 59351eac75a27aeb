//! Time-of-day schedule of acceptable illuminance bands.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, TimeZone};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::models::Thresholds;

/// A min/max illuminance pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub min_lux: f64,
    pub max_lux: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub min_lux: f64,
    pub max_lux: f64,
    pub enabled: bool,
    /// Higher wins when windows overlap.
    pub priority: i32,
    pub label: String,
}

impl TimeWindow {
    /// Half-open interval test; `start > end` wraps past midnight.
    pub fn matches(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            format!("{}-{}", format_hhmm(self.start), format_hhmm(self.end))
        } else {
            self.label.clone()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_lux: self.min_lux,
            max_lux: self.max_lux,
            window_label: self.display_label(),
        }
    }

    pub fn to_spec(&self) -> WindowSpec {
        WindowSpec {
            id: self.id.clone(),
            start_time: format_hhmm(self.start),
            end_time: format_hhmm(self.end),
            min_lux: Some(self.min_lux),
            max_lux: Some(self.max_lux),
            enabled: self.enabled,
            priority: self.priority,
            label: self.label.clone(),
        }
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        if self.id.trim().is_empty() {
            return Err(ScheduleError::InvalidWindow {
                id: self.id.clone(),
                reason: "id must not be empty".into(),
            });
        }
        if !self.min_lux.is_finite() || !self.max_lux.is_finite() {
            return Err(ScheduleError::InvalidWindow {
                id: self.id.clone(),
                reason: "lux bounds must be finite".into(),
            });
        }
        if self.min_lux > self.max_lux {
            return Err(ScheduleError::InvalidWindow {
                id: self.id.clone(),
                reason: format!("min_lux {} exceeds max_lux {}", self.min_lux, self.max_lux),
            });
        }
        Ok(())
    }
}

/// Operator-facing window description with "HH:MM" times.
///
/// Band fields may be omitted, in which case the configured default band applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub min_lux: Option<f64>,
    #[serde(default)]
    pub max_lux: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub label: String,
}

fn default_enabled() -> bool {
    true
}

impl WindowSpec {
    pub fn into_window(self, default_band: Band) -> Result<TimeWindow, ScheduleError> {
        Ok(TimeWindow {
            start: parse_hhmm(&self.start_time)?,
            end: parse_hhmm(&self.end_time)?,
            min_lux: self.min_lux.unwrap_or(default_band.min_lux),
            max_lux: self.max_lux.unwrap_or(default_band.max_lux),
            enabled: self.enabled,
            priority: self.priority,
            label: self.label,
            id: self.id,
        })
    }
}

/// On-disk schedule document: `{"windows": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleFile {
    pub windows: Vec<WindowSpec>,
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime, ScheduleError> {
    let (hour, minute) = value
        .trim()
        .split_once(':')
        .ok_or_else(|| ScheduleError::InvalidTimeFormat(value.to_string()))?;
    let hour: u32 = hour
        .parse()
        .map_err(|_| ScheduleError::InvalidTimeFormat(value.to_string()))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| ScheduleError::InvalidTimeFormat(value.to_string()))?;
    if hour > 23 || minute > 59 {
        return Err(ScheduleError::TimeOutOfRange(value.to_string()));
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| ScheduleError::TimeOutOfRange(value.to_string()))
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Built-in daytime schedule used when no schedule file can be loaded.
pub fn default_windows() -> Vec<TimeWindow> {
    let window = |id: &str, start: u32, end: u32, min_lux: f64, max_lux: f64, label: &str| TimeWindow {
        id: id.to_string(),
        start: NaiveTime::from_hms_opt(start, 0, 0).unwrap_or(NaiveTime::MIN),
        end: NaiveTime::from_hms_opt(end, 0, 0).unwrap_or(NaiveTime::MIN),
        min_lux,
        max_lux,
        enabled: true,
        priority: 10,
        label: label.to_string(),
    };

    vec![
        window("morning", 7, 11, 3000.0, 6000.0, "Morning"),
        window("midday", 11, 15, 3500.0, 6500.0, "Midday"),
        window("afternoon", 15, 19, 3200.0, 6200.0, "Afternoon"),
    ]
}

/// Ordered window set, swapped as a whole so readers never observe a partial update.
pub struct SchedulePolicy {
    windows: RwLock<Arc<Vec<TimeWindow>>>,
}

impl SchedulePolicy {
    pub fn new(windows: Vec<TimeWindow>) -> Result<Self, ScheduleError> {
        validate_all(&windows)?;
        Ok(Self {
            windows: RwLock::new(Arc::new(windows)),
        })
    }

    pub fn windows(&self) -> Vec<TimeWindow> {
        self.current().as_ref().clone()
    }

    /// Validates every entry first; on error the current schedule stays authoritative.
    pub fn replace(&self, windows: Vec<TimeWindow>) -> Result<usize, ScheduleError> {
        validate_all(&windows)?;
        let count = windows.len();
        let mut guard = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(windows);
        Ok(count)
    }

    pub fn replace_specs(
        &self,
        specs: Vec<WindowSpec>,
        default_band: Band,
    ) -> Result<usize, ScheduleError> {
        let windows = specs
            .into_iter()
            .map(|spec| spec.into_window(default_band))
            .collect::<Result<Vec<_>, _>>()?;
        self.replace(windows)
    }

    pub fn active_thresholds<Tz: TimeZone>(&self, local: &DateTime<Tz>) -> Option<Thresholds> {
        self.thresholds_at(local.time())
    }

    pub fn thresholds_at(&self, t: NaiveTime) -> Option<Thresholds> {
        let windows = self.current();
        windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.enabled && w.matches(t))
            // Earlier declaration wins ties: the smaller index must compare greater.
            .max_by_key(|(index, w)| (w.priority, std::cmp::Reverse(*index)))
            .map(|(_, w)| w.thresholds())
    }

    fn current(&self) -> Arc<Vec<TimeWindow>> {
        let guard = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }
}

fn validate_all(windows: &[TimeWindow]) -> Result<(), ScheduleError> {
    let mut seen = HashSet::new();
    for window in windows {
        window.validate()?;
        if !seen.insert(window.id.as_str()) {
            return Err(ScheduleError::DuplicateId(window.id.clone()));
        }
    }
    Ok(())
}

fn read_schedule_file(path: &Path, default_band: Band) -> Result<Vec<TimeWindow>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule file {}", path.display()))?;
    let file: ScheduleFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse schedule file {}", path.display()))?;
    let windows = file
        .windows
        .into_iter()
        .map(|spec| spec.into_window(default_band))
        .collect::<Result<Vec<_>, _>>()?;
    validate_all(&windows)?;
    Ok(windows)
}

/// Startup schedule. Any problem with the file falls back to [`default_windows`].
pub fn load_schedule_file(path: &Path, default_band: Band) -> Vec<TimeWindow> {
    match read_schedule_file(path, default_band) {
        Ok(windows) => {
            info!("Loaded {} schedule windows from {}", windows.len(), path.display());
            windows
        }
        Err(err) => {
            warn!("Using built-in schedule: {err:#}");
            default_windows()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Kuala_Lumpur;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(id: &str, start: &str, end: &str, priority: i32, min_lux: f64) -> TimeWindow {
        TimeWindow {
            id: id.into(),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
            min_lux,
            max_lux: min_lux + 3000.0,
            enabled: true,
            priority,
            label: String::new(),
        }
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let w = window("night", "22:00", "02:00", 0, 100.0);
        assert!(w.matches(at(23, 30)));
        assert!(w.matches(at(1, 59)));
        assert!(w.matches(at(22, 0)));
        assert!(!w.matches(at(2, 0)));
        assert!(!w.matches(at(12, 0)));
    }

    #[test]
    fn daytime_window_is_half_open() {
        let w = window("day", "07:00", "11:00", 0, 100.0);
        assert!(w.matches(at(7, 0)));
        assert!(w.matches(at(10, 59)));
        assert!(!w.matches(at(11, 0)));
        assert!(!w.matches(at(6, 59)));
    }

    #[test]
    fn higher_priority_wins_regardless_of_order() {
        let low = window("low", "06:00", "18:00", 5, 1000.0);
        let high = window("high", "08:00", "12:00", 10, 2000.0);

        let forward = SchedulePolicy::new(vec![low.clone(), high.clone()]).unwrap();
        let reverse = SchedulePolicy::new(vec![high, low]).unwrap();

        assert_eq!(forward.thresholds_at(at(9, 0)).unwrap().min_lux, 2000.0);
        assert_eq!(reverse.thresholds_at(at(9, 0)).unwrap().min_lux, 2000.0);
        // Outside the high-priority window the low one still applies.
        assert_eq!(forward.thresholds_at(at(13, 0)).unwrap().min_lux, 1000.0);
    }

    #[test]
    fn equal_priority_resolves_to_first_declared() {
        let first = window("first", "06:00", "18:00", 3, 1000.0);
        let second = window("second", "08:00", "12:00", 3, 2000.0);
        let policy = SchedulePolicy::new(vec![first, second]).unwrap();
        assert_eq!(policy.thresholds_at(at(9, 0)).unwrap().min_lux, 1000.0);
    }

    #[test]
    fn disabled_windows_are_ignored() {
        let mut w = window("day", "07:00", "11:00", 0, 100.0);
        w.enabled = false;
        let policy = SchedulePolicy::new(vec![w]).unwrap();
        assert!(policy.thresholds_at(at(8, 0)).is_none());
    }

    #[test]
    fn no_match_returns_none() {
        let policy = SchedulePolicy::new(default_windows()).unwrap();
        assert!(policy.thresholds_at(at(3, 0)).is_none());
    }

    #[test]
    fn label_falls_back_to_bounds() {
        let policy = SchedulePolicy::new(vec![window("w", "22:00", "02:00", 0, 100.0)]).unwrap();
        assert_eq!(policy.thresholds_at(at(23, 0)).unwrap().window_label, "22:00-02:00");

        let policy = SchedulePolicy::new(default_windows()).unwrap();
        assert_eq!(policy.thresholds_at(at(12, 0)).unwrap().window_label, "Midday");
    }

    #[test]
    fn local_time_is_used_for_matching() {
        let policy = SchedulePolicy::new(default_windows()).unwrap();
        // 01:30 UTC is 09:30 in Kuala Lumpur (UTC+8).
        let utc = Utc.with_ymd_and_hms(2024, 6, 1, 1, 30, 0).unwrap();
        let local = utc.with_timezone(&Kuala_Lumpur);
        assert_eq!(policy.active_thresholds(&local).unwrap().window_label, "Morning");
        assert!(policy.active_thresholds(&utc).is_none());
    }

    #[test]
    fn failed_replace_keeps_previous_schedule() {
        let policy = SchedulePolicy::new(default_windows()).unwrap();
        let specs = vec![
            WindowSpec {
                id: "ok".into(),
                start_time: "06:00".into(),
                end_time: "08:00".into(),
                min_lux: Some(1.0),
                max_lux: Some(2.0),
                enabled: true,
                priority: 0,
                label: String::new(),
            },
            WindowSpec {
                id: "bad".into(),
                start_time: "24:00".into(),
                end_time: "08:00".into(),
                min_lux: None,
                max_lux: None,
                enabled: true,
                priority: 0,
                label: String::new(),
            },
        ];
        let band = Band { min_lux: 3000.0, max_lux: 6000.0 };

        let err = policy.replace_specs(specs, band).unwrap_err();
        assert_eq!(err, ScheduleError::TimeOutOfRange("24:00".into()));
        assert_eq!(policy.windows(), default_windows());
    }

    #[test]
    fn replace_rejects_inverted_band_and_duplicates() {
        let policy = SchedulePolicy::new(Vec::new()).unwrap();

        let mut inverted = window("w", "06:00", "08:00", 0, 100.0);
        inverted.max_lux = 50.0;
        assert!(matches!(
            policy.replace(vec![inverted]),
            Err(ScheduleError::InvalidWindow { .. })
        ));

        let dup = window("same", "06:00", "08:00", 0, 100.0);
        assert_eq!(
            policy.replace(vec![dup.clone(), dup]),
            Err(ScheduleError::DuplicateId("same".into()))
        );
        assert!(policy.windows().is_empty());
    }

    #[test]
    fn specs_take_default_band_when_omitted() {
        let spec: WindowSpec = serde_json::from_str(
            r#"{"id":"eve","start_time":"18:00","end_time":"21:30","priority":2}"#,
        )
        .unwrap();
        let w = spec
            .into_window(Band { min_lux: 3000.0, max_lux: 6000.0 })
            .unwrap();
        assert_eq!(w.min_lux, 3000.0);
        assert_eq!(w.max_lux, 6000.0);
        assert!(w.enabled);
        assert_eq!(w.end, at(21, 30));
        assert_eq!(w.to_spec().end_time, "21:30");
    }

    #[test]
    fn parse_hhmm_rejects_malformed_input() {
        assert!(matches!(parse_hhmm("7"), Err(ScheduleError::InvalidTimeFormat(_))));
        assert!(matches!(parse_hhmm("ab:cd"), Err(ScheduleError::InvalidTimeFormat(_))));
        assert!(matches!(parse_hhmm("12:60"), Err(ScheduleError::TimeOutOfRange(_))));
        assert_eq!(parse_hhmm(" 07:05 ").unwrap(), at(7, 5));
    }

    #[test]
    fn windows_returns_a_copy() {
        let policy = SchedulePolicy::new(default_windows()).unwrap();
        let mut copy = policy.windows();
        copy.clear();
        assert_eq!(policy.windows().len(), 3);
    }

    #[test]
    fn schedule_file_fills_missing_bands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        fs::write(
            &path,
            r#"{"windows":[{"id":"dawn","start_time":"05:30","end_time":"08:00","max_lux":5000},
                           {"id":"night","start_time":"22:00","end_time":"02:00","enabled":false}]}"#,
        )
        .unwrap();
        let band = Band { min_lux: 1000.0, max_lux: 2000.0 };

        let windows = load_schedule_file(&path, band);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].min_lux, 1000.0);
        assert_eq!(windows[0].max_lux, 5000.0);
        assert!(!windows[1].enabled);
    }

    #[test]
    fn broken_schedule_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let band = Band { min_lux: 3000.0, max_lux: 6000.0 };

        assert_eq!(load_schedule_file(&dir.path().join("missing.json"), band), default_windows());

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"windows":[{"id":"x","start_time":"25:00","end_time":"08:00"}]}"#).unwrap();
        assert_eq!(load_schedule_file(&path, band), default_windows());
    }
}
