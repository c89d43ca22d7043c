//! Out-of-band daily rollups. Never runs in the turn path; folds sessions
//! that ended on a calendar date into one `daily_metrics` row.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use teller_core::domain::metrics::DailyMetric;
use teller_core::errors::EngineError;
use teller_db::{DailyMetricStore, SessionStore};

pub struct MetricsAggregator {
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<dyn DailyMetricStore>,
}

impl MetricsAggregator {
    pub fn new(sessions: Arc<dyn SessionStore>, metrics: Arc<dyn DailyMetricStore>) -> Self {
        Self { sessions, metrics }
    }

    /// Recompute and upsert the rollup for one date. Idempotent: re-running
    /// replaces the row with the same fold.
    pub async fn rollup(&self, date: NaiveDate) -> Result<DailyMetric, EngineError> {
        let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let end = start + chrono::Duration::days(1);

        let ended = self
            .sessions
            .list_ended_between(start, end)
            .await
            .map_err(EngineError::storage)?;
        let metric = DailyMetric::fold(date, &ended);

        self.metrics.upsert(metric.clone()).await.map_err(EngineError::storage)?;
        tracing::info!(
            event_name = "metrics.daily_rollup",
            date = %date,
            sessions_ended = metric.sessions_ended,
            escalated_sessions = metric.escalated_sessions,
            "daily metrics rolled up"
        );
        Ok(metric)
    }
}
