use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime, to_i64},
};
use crate::models::ActionEvent;
use crate::ports::TimeRange;

fn row_to_action(row: &Row) -> Result<ActionEvent, rusqlite::Error> {
    let ts_utc: String = row.get("ts_utc")?;
    let state: i64 = row.get("state")?;

    Ok(ActionEvent {
        ts_utc: parse_datetime(&ts_utc, "ts_utc").map_err(conversion_error)?,
        actuator_id: row.get("actuator_id")?,
        state: state != 0,
        reason: row.get("reason")?,
        avg_lux: row.get("avg_lux")?,
        min_lux: row.get("min_lux")?,
        max_lux: row.get("max_lux")?,
        window_label: row.get("window_label")?,
    })
}

impl Database {
    pub async fn insert_action(&self, action: &ActionEvent) -> Result<()> {
        let record = action.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO actions (ts_utc, actuator_id, state, reason, avg_lux, min_lux, max_lux, window_label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    format_datetime(&record.ts_utc),
                    record.actuator_id,
                    record.state as i64,
                    record.reason,
                    record.avg_lux,
                    record.min_lux,
                    record.max_lux,
                    record.window_label,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent `limit` switch events inside `range`, returned oldest first.
    pub async fn query_actions(&self, range: TimeRange, limit: usize) -> Result<Vec<ActionEvent>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ts_utc, actuator_id, state, reason, avg_lux, min_lux, max_lux, window_label
                 FROM actions
                 WHERE ts_utc >= ?1 AND ts_utc <= ?2
                 ORDER BY ts_utc DESC, id DESC
                 LIMIT ?3",
            )?;

            let rows = stmt.query_map(
                params![format_datetime(&range.start), format_datetime(&range.end), limit],
                row_to_action,
            )?;

            let mut actions = Vec::new();
            for action in rows {
                actions.push(action?);
            }
            actions.reverse();

            Ok(actions)
        })
        .await
    }
}
