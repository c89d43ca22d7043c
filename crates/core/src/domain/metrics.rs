use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::session::Session;

/// One row per calendar date, folded from sessions that ended on that date.
/// Produced out of band by the metrics aggregator, never in the turn path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub sessions_ended: u32,
    pub escalated_sessions: u32,
    pub total_duration_secs: i64,
    pub average_duration_secs: i64,
}

impl DailyMetric {
    pub fn fold(date: NaiveDate, sessions: &[Session]) -> Self {
        let sessions_ended = sessions.len() as u32;
        let escalated_sessions = sessions.iter().filter(|session| session.escalated).count() as u32;
        let total_duration_secs =
            sessions.iter().filter_map(|session| session.duration_secs).sum::<i64>();
        let average_duration_secs = if sessions_ended == 0 {
            0
        } else {
            total_duration_secs / i64::from(sessions_ended)
        };

        Self { date, sessions_ended, escalated_sessions, total_duration_secs, average_duration_secs }
    }
}
