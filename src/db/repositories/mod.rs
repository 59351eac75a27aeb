mod actions;
mod readings;
mod settings;

use anyhow::Result;

use crate::db::connection::Database;
use crate::models::{ActionEvent, Reading};
use crate::ports::{BoxFuture, Repository, TimeRange};

impl Repository for Database {
    fn insert_reading<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<()>> {
        Box::pin(Database::insert_reading(self, reading))
    }

    fn insert_action<'a>(&'a self, action: &'a ActionEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(Database::insert_action(self, action))
    }

    fn query_readings(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<Reading>>> {
        Box::pin(Database::query_readings(self, range, limit))
    }

    fn query_actions(&self, range: TimeRange, limit: usize) -> BoxFuture<'_, Result<Vec<ActionEvent>>> {
        Box::pin(Database::query_actions(self, range, limit))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;

    fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("growlux.sqlite3")).unwrap();
        (dir, db)
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn readings_round_trip_including_failures() {
        let (_dir, db) = open();
        db.insert_reading(&Reading::success(t0(), "lux_sim", "lux", 2900.5))
            .await
            .unwrap();
        db.insert_reading(&Reading::failure(
            t0() + Duration::seconds(5),
            "lux_sim",
            "lux",
            "timeout",
        ))
        .await
        .unwrap();

        let rows = db
            .query_readings(TimeRange::new(t0(), t0() + Duration::minutes(1)), 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, Some(2900.5));
        assert!(rows[0].ok);
        assert_eq!(rows[1].value, None);
        assert!(!rows[1].ok);
        assert_eq!(rows[1].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn queries_keep_the_most_recent_rows_oldest_first() {
        let (_dir, db) = open();
        for i in 0..10 {
            db.insert_reading(&Reading::success(
                t0() + Duration::seconds(i * 5),
                "lux_sim",
                "lux",
                i as f64,
            ))
            .await
            .unwrap();
        }

        let range = TimeRange::new(t0(), t0() + Duration::minutes(5));
        let rows = db.query_readings(range, 3).await.unwrap();
        let values: Vec<_> = rows.iter().filter_map(|r| r.value).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);

        let narrow = TimeRange::new(t0() + Duration::seconds(10), t0() + Duration::seconds(20));
        let rows = db.query_readings(narrow, 100).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn actions_round_trip_through_the_trait() {
        let (_dir, db) = open();
        let repo: &dyn Repository = &db;
        let event = ActionEvent {
            ts_utc: t0(),
            actuator_id: "light_sim_01".into(),
            state: true,
            reason: "Avg lux 2900.0 below min-hys (2950.0)".into(),
            avg_lux: Some(2900.0),
            min_lux: Some(3000.0),
            max_lux: Some(6000.0),
            window_label: Some("Morning".into()),
        };
        repo.insert_action(&event).await.unwrap();

        let rows = repo
            .query_actions(TimeRange::last_minutes(t0() + Duration::seconds(1), 10), 10)
            .await
            .unwrap();
        assert_eq!(rows, vec![event]);
    }

    #[tokio::test]
    async fn settings_upsert_overwrites() {
        let (_dir, db) = open();
        let mut updates = HashMap::new();
        updates.insert("hysteresis_lux".to_string(), "75.0".to_string());
        db.set_settings_batch(updates.clone()).await.unwrap();

        updates.insert("hysteresis_lux".to_string(), "80.0".to_string());
        updates.insert("fail_safe_light_state".to_string(), "true".to_string());
        db.set_settings_batch(updates).await.unwrap();

        let stored = db.get_all_settings().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["hysteresis_lux"], "80.0");
    }
}
