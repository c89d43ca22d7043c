use chrono::NaiveDate;
use sqlx::Row;

use teller_core::domain::metrics::DailyMetric;

use super::{DailyMetricStore, RepositoryError};
use crate::DbPool;

pub struct SqlDailyMetricStore {
    pool: DbPool,
}

impl SqlDailyMetricStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DailyMetricStore for SqlDailyMetricStore {
    async fn upsert(&self, metric: DailyMetric) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO daily_metrics (metric_date, sessions_ended, escalated_sessions, \
             total_duration_secs, average_duration_secs) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(metric_date) DO UPDATE SET
                sessions_ended = excluded.sessions_ended,
                escalated_sessions = excluded.escalated_sessions,
                total_duration_secs = excluded.total_duration_secs,
                average_duration_secs = excluded.average_duration_secs",
        )
        .bind(metric.date.to_string())
        .bind(i64::from(metric.sessions_ended))
        .bind(i64::from(metric.escalated_sessions))
        .bind(metric.total_duration_secs)
        .bind(metric.average_duration_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, date: NaiveDate) -> Result<Option<DailyMetric>, RepositoryError> {
        let row = sqlx::query(
            "SELECT metric_date, sessions_ended, escalated_sessions, total_duration_secs, \
             average_duration_secs FROM daily_metrics WHERE metric_date = ?",
        )
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let metric_date = row
                .get::<String, _>("metric_date")
                .parse::<NaiveDate>()
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            Ok(DailyMetric {
                date: metric_date,
                sessions_ended: row.get::<i64, _>("sessions_ended") as u32,
                escalated_sessions: row.get::<i64, _>("escalated_sessions") as u32,
                total_duration_secs: row.get("total_duration_secs"),
                average_duration_secs: row.get("average_duration_secs"),
            })
        })
        .transpose()
    }
}
