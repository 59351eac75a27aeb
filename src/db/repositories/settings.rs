use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{connection::Database, helpers::format_datetime};

impl Database {
    /// Runtime setting overrides, values JSON-encoded.
    pub async fn get_all_settings(&self) -> Result<HashMap<String, String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut settings = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                settings.insert(key, value);
            }
            Ok(settings)
        })
        .await
    }

    pub async fn set_settings_batch(&self, updates: HashMap<String, String>) -> Result<()> {
        let now = format_datetime(&Utc::now());
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &updates {
                tx.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )
                .with_context(|| format!("failed to upsert setting {key}"))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
