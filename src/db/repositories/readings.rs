use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime, to_i64},
};
use crate::models::Reading;
use crate::ports::TimeRange;

fn row_to_reading(row: &Row) -> Result<Reading, rusqlite::Error> {
    let ts_utc: String = row.get("ts_utc")?;
    let ok: i64 = row.get("ok")?;

    Ok(Reading {
        ts_utc: parse_datetime(&ts_utc, "ts_utc").map_err(conversion_error)?,
        sensor_id: row.get("sensor_id")?,
        value: row.get("value")?,
        unit: row.get("unit")?,
        ok: ok != 0,
        error: row.get("error")?,
    })
}

impl Database {
    pub async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        let record = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (ts_utc, sensor_id, value, unit, ok, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    format_datetime(&record.ts_utc),
                    record.sensor_id,
                    record.value,
                    record.unit,
                    record.ok as i64,
                    record.error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent `limit` readings inside `range`, returned oldest first.
    pub async fn query_readings(&self, range: TimeRange, limit: usize) -> Result<Vec<Reading>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ts_utc, sensor_id, value, unit, ok, error
                 FROM readings
                 WHERE ts_utc >= ?1 AND ts_utc <= ?2
                 ORDER BY ts_utc DESC, id DESC
                 LIMIT ?3",
            )?;

            let rows = stmt.query_map(
                params![format_datetime(&range.start), format_datetime(&range.end), limit],
                row_to_reading,
            )?;

            let mut readings = Vec::new();
            for reading in rows {
                readings.push(reading?);
            }
            readings.reverse();

            Ok(readings)
        })
        .await
    }
}
