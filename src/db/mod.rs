use chrono::{Duration, Local, NaiveDate, TimeZone};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::geo_sample::GeoSample;

pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub async fn init_pool(path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Durable store of GPS samples keyed by timestamp. Each sample also carries
/// the id of the session that recorded it.
#[derive(Clone)]
pub struct SampleBuffer {
    pool: DbPool,
}

impl SampleBuffer {
    pub async fn open(pool: DbPool) -> Result<Self, sqlx::Error> {
        sqlx::query(queries::CREATE_GEO_SAMPLES)
            .execute(&pool)
            .await?;
        sqlx::query(queries::CREATE_GEO_SAMPLES_SESSION_INDEX)
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Self::open(pool).await.unwrap()
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn append(&self, session_id: Uuid, sample: &GeoSample) -> Result<(), sqlx::Error> {
        sqlx::query(queries::UPSERT_GEO_SAMPLE)
            .bind(sample.timestamp)
            .bind(session_id.to_string())
            .bind(sample.latitude)
            .bind(sample.longitude)
            .bind(sample.accuracy)
            .bind(sample.speed)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<GeoSample>, sqlx::Error> {
        sqlx::query_as::<_, GeoSample>(queries::SELECT_ALL_SAMPLES)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn samples_for_session(&self, session_id: Uuid) -> Result<Vec<GeoSample>, sqlx::Error> {
        sqlx::query_as::<_, GeoSample>(queries::SELECT_SESSION_SAMPLES)
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
    }

    pub async fn pending_sessions(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows = sqlx::query(queries::SELECT_SESSION_IDS)
            .fetch_all(&self.pool)
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("session_id")?;
            match Uuid::parse_str(&raw) {
                Ok(id) => sessions.push(id),
                Err(e) => warn!("Skipping samples with malformed session id '{}': {}", raw, e),
            }
        }
        Ok(sessions)
    }

    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        let result = sqlx::query(queries::DELETE_ALL_SAMPLES)
            .execute(&self.pool)
            .await?;
        info!("Cleared {} buffered samples", result.rows_affected());
        Ok(())
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(queries::DELETE_SESSION_SAMPLES)
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
        debug!("Deleted {} samples of session {}", result.rows_affected(), session_id);
        Ok(result.rows_affected())
    }

    /// Removes every sample recorded on `date` in the local time zone.
    pub async fn delete_by_date(&self, date: NaiveDate) -> Result<u64, sqlx::Error> {
        self.delete_by_date_in(date, &Local).await
    }

    pub async fn delete_by_date_in<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> Result<u64, sqlx::Error> {
        let (start, end) = day_bounds_ms(date, tz);
        let result = sqlx::query(queries::DELETE_SAMPLES_BETWEEN)
            .bind(start)
            .bind(end)
            .execute(&self.pool)
            .await?;
        info!("Deleted {} samples recorded on {}", result.rows_affected(), date);
        Ok(result.rows_affected())
    }

    pub async fn estimate_size(&self) -> Result<usize, sqlx::Error> {
        let samples = self.get_all().await?;
        Ok(samples.iter().map(GeoSample::serialized_len).sum())
    }
}

fn day_bounds_ms<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (i64, i64) {
    let next = date.succ_opt().unwrap_or(date);
    (local_midnight_ms(date, tz), local_midnight_ms(next, tz))
}

fn local_midnight_ms<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> i64 {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    // Midnight can fall into a DST gap; the day then starts at the first valid instant.
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geo_sample::sample_at;
    use chrono::Utc;

    #[tokio::test]
    async fn test_get_all_returns_samples_in_order() {
        let buffer = SampleBuffer::in_memory().await;
        let session = Uuid::new_v4();
        for ts in [3000, 1000, 2000, 0] {
            buffer.append(session, &sample_at(ts)).await.unwrap();
        }

        let timestamps: Vec<i64> = buffer
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(timestamps, vec![0, 1000, 2000, 3000]);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_overwrites() {
        let buffer = SampleBuffer::in_memory().await;
        let session = Uuid::new_v4();
        buffer.append(session, &sample_at(1000)).await.unwrap();

        let mut again = sample_at(1000);
        again.speed = None;
        again.accuracy = 30.0;
        buffer.append(session, &again).await.unwrap();

        let all = buffer.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], again);
    }

    #[tokio::test]
    async fn test_samples_are_scoped_by_session() {
        let buffer = SampleBuffer::in_memory().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        buffer.append(first, &sample_at(0)).await.unwrap();
        buffer.append(first, &sample_at(1000)).await.unwrap();
        buffer.append(second, &sample_at(5000)).await.unwrap();

        assert_eq!(buffer.samples_for_session(first).await.unwrap().len(), 2);
        assert_eq!(buffer.pending_sessions().await.unwrap(), vec![first, second]);

        assert_eq!(buffer.delete_session(first).await.unwrap(), 2);
        assert_eq!(buffer.pending_sessions().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn test_delete_by_date_only_touches_that_day() {
        let buffer = SampleBuffer::in_memory().await;
        let session = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let at = |d: NaiveDate, h: u32| {
            Utc.from_utc_datetime(&d.and_hms_opt(h, 0, 0).unwrap())
                .timestamp_millis()
        };

        let previous = day.pred_opt().unwrap();
        for ts in [at(previous, 23), at(day, 0), at(day, 12), at(day, 23), at(day.succ_opt().unwrap(), 0)] {
            buffer.append(session, &sample_at(ts)).await.unwrap();
        }

        let removed = buffer.delete_by_date_in(day, &Utc).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(buffer.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_estimate_size_and_clear() {
        let buffer = SampleBuffer::in_memory().await;
        assert_eq!(buffer.estimate_size().await.unwrap(), 0);

        let session = Uuid::new_v4();
        buffer.append(session, &sample_at(0)).await.unwrap();
        buffer.append(session, &sample_at(1000)).await.unwrap();
        let expected = sample_at(0).serialized_len() + sample_at(1000).serialized_len();
        assert_eq!(buffer.estimate_size().await.unwrap(), expected);

        buffer.clear().await.unwrap();
        assert!(buffer.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_buffer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("geolocations.sqlite");
        let session = Uuid::new_v4();

        let buffer = SampleBuffer::open(init_pool(&path).await.unwrap()).await.unwrap();
        buffer.append(session, &sample_at(42)).await.unwrap();
        drop(buffer);

        let reopened = SampleBuffer::open(init_pool(&path).await.unwrap()).await.unwrap();
        assert_eq!(reopened.samples_for_session(session).await.unwrap(), vec![sample_at(42)]);
    }
}
