//! Read access to an extracted package snapshot.
//!
//! The snapshot schema is owned upstream and loosely typed: ids show up as
//! INTEGER in some packages and TEXT in others, coordinates occasionally as
//! TEXT. Column reads here accept any of those representations.

use std::path::PathBuf;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::{ParkError, Result};
use crate::models::{CalendarRow, PoiDetails, PoiKind, PoiRecord, SnapshotHandle};

const LEGEND_KEY_PREFIX: &str = "calendar.dateType.legend.";

pub struct PoiRepository {
    pool: SqlitePool,
    path: PathBuf,
}

impl PoiRepository {
    /// Open `handle`'s snapshot read-only.
    pub async fn open(handle: &SnapshotHandle) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&handle.path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| ParkError::Snapshot {
                source,
                path: handle.path.clone(),
            })?;

        Ok(Self {
            pool,
            path: handle.path.clone(),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn pois(&self, kind: PoiKind) -> Result<Vec<PoiRecord>> {
        let sql = match kind {
            PoiKind::Attraction => {
                "SELECT drupal_id, title, experience, latitude, longitude, min_age, min_size, min_size_unaccompanied FROM attractions"
            }
            PoiKind::Restaurant => {
                "SELECT drupal_id, title, meal_types, latitude, longitude, menu_url, mobile_url FROM restaurants"
            }
            PoiKind::Show => "SELECT drupal_id, title, duration, latitude, longitude FROM shows",
        };

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.snapshot_error(e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(drupal_id) = text(row, "drupal_id") else {
                tracing::warn!(?kind, "skipping row without drupal_id");
                continue;
            };

            let details = match kind {
                PoiKind::Attraction => PoiDetails::Attraction {
                    experience: text(row, "experience"),
                    min_age: integer(row, "min_age"),
                    min_size: integer(row, "min_size"),
                    min_size_unaccompanied: integer(row, "min_size_unaccompanied"),
                },
                PoiKind::Restaurant => PoiDetails::Restaurant {
                    meal_types: text(row, "meal_types"),
                    menu_url: text(row, "menu_url"),
                    mobile_url: text(row, "mobile_url"),
                },
                PoiKind::Show => PoiDetails::Show {
                    duration: text(row, "duration"),
                },
            };

            records.push(PoiRecord {
                drupal_id,
                title: text(row, "title").unwrap_or_default(),
                latitude: real(row, "latitude"),
                longitude: real(row, "longitude"),
                details,
            });
        }

        Ok(records)
    }

    /// Calendar rows dated `from` or later, ordered by date.
    pub async fn calendar_rows(&self, from: NaiveDate) -> Result<Vec<CalendarRow>> {
        let rows = sqlx::query("SELECT day, type FROM calendar_items WHERE day >= ? ORDER BY day")
            .bind(from.format("%Y-%m-%d").to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.snapshot_error(e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let day = text(row, "day").unwrap_or_default();
            let date = day
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            match (date, text(row, "type")) {
                (Some(date), Some(day_type)) => out.push(CalendarRow { date, day_type }),
                _ => tracing::warn!(day = %day, "skipping unreadable calendar row"),
            }
        }
        Ok(out)
    }

    /// `(day type, legend text)` pairs from the `labels` table.
    pub async fn legend_labels(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM labels WHERE key LIKE ?")
            .bind(format!("{LEGEND_KEY_PREFIX}%"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.snapshot_error(e))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let key = text(row, "key")?;
                let type_key = key.strip_prefix(LEGEND_KEY_PREFIX)?.to_string();
                Some((type_key, text(row, "value").unwrap_or_default()))
            })
            .collect())
    }

    fn snapshot_error(&self, source: sqlx::Error) -> ParkError {
        ParkError::Snapshot {
            source,
            path: self.path.clone(),
        }
    }
}

fn text(row: &SqliteRow, column: &str) -> Option<String> {
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return value.map(|v| v.to_string());
    }
    row.try_get::<Option<f64>, _>(column)
        .ok()
        .flatten()
        .map(|v| v.to_string())
}

fn integer(row: &SqliteRow, column: &str) -> Option<i64> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return value;
    }
    if let Ok(Some(value)) = row.try_get::<Option<f64>, _>(column) {
        return Some(value as i64);
    }
    text(row, column).and_then(|s| s.trim().parse().ok())
}

fn real(row: &SqliteRow, column: &str) -> Option<f64> {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return value;
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>(column) {
        return Some(value as f64);
    }
    text(row, column).and_then(|s| s.trim().parse().ok())
}
