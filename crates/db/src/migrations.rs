use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const BASELINE_TABLES: &[&str] = &["sessions", "turns", "compliance_events", "daily_metrics"];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in BASELINE_TABLES {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected table `{table}` to exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
        )
        .fetch_one(&pool)
        .await
        .expect("check sessions table removed")
        .get::<i64, _>("count");

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn turn_numbers_are_unique_per_session() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO sessions (session_id, caller_id, channel, bank_id, current_agent, \
             status, escalated, marketing_consent, started_at) \
             VALUES ('CA-1', '+15555550100', 'voice', 'fcb', 'customer_service', 'active', 0, 0, \
             '2026-02-12T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert session");

        let insert_turn = "INSERT INTO turns (session_id, turn_number, role, content, \
             agent_name, metadata_json, occurred_at) \
             VALUES ('CA-1', 1, 'caller', 'hello', 'customer_service', '{}', \
             '2026-02-12T00:00:01Z')";

        sqlx::query(insert_turn).execute(&pool).await.expect("first turn");
        let duplicate = sqlx::query(insert_turn).execute(&pool).await;
        assert!(duplicate.is_err(), "duplicate (session_id, turn_number) must be rejected");
    }
}
