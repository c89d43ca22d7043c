use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use teller_agent::behaviors::AgentRegistry;
use teller_core::audit::TracingAuditSink;
use teller_core::config::{AppConfig, ConfigError, LoadOptions};
use teller_core::errors::EngineError;
use teller_core::policy::CompliancePolicy;
use teller_core::routing::IntentRouter;
use teller_db::{
    connect_with_settings, migrations, DbPool, SqlComplianceStore, SqlDailyMetricStore,
    SqlSessionStore, SqlTurnStore,
};
use teller_engine::{
    ComplianceEmitter, ConversationLogger, MetricsAggregator, Orchestrator, Reconciler,
    SessionManager,
};

use crate::llm::ChatCompletionsClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<MetricsAggregator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    LlmClient(anyhow::Error),
    #[error("startup reconciliation failed: {0}")]
    Reconcile(#[source] EngineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let session_store = Arc::new(SqlSessionStore::new(db_pool.clone()));
    let turn_store = Arc::new(SqlTurnStore::new(db_pool.clone()));
    let compliance_store = Arc::new(SqlComplianceStore::new(db_pool.clone()));
    let metric_store = Arc::new(SqlDailyMetricStore::new(db_pool.clone()));

    let llm = Arc::new(
        ChatCompletionsClient::from_config(&config.llm).map_err(BootstrapError::LlmClient)?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        SessionManager::new(session_store.clone()),
        IntentRouter::default(),
        CompliancePolicy::default(),
        AgentRegistry::new(llm, config.bank.name.clone()),
        ComplianceEmitter::new(compliance_store),
        ConversationLogger::new(turn_store.clone()),
        Arc::new(TracingAuditSink),
        config.engine.clone(),
    ));

    // Complete any status flips a previous process crashed in the middle of
    // before taking traffic.
    let reconciler = Reconciler::new(
        Arc::new(SessionManager::new(session_store.clone())),
        session_store.clone(),
        turn_store,
    );
    let report = reconciler.reconcile().await.map_err(BootstrapError::Reconcile)?;
    info!(
        event_name = "system.bootstrap.reconciled",
        correlation_id = "bootstrap",
        scanned = report.scanned,
        escalations_completed = report.escalations_completed,
        ends_completed = report.ends_completed,
        "startup reconciliation pass finished"
    );

    let metrics = Arc::new(MetricsAggregator::new(session_store, metric_store));

    Ok(Application { config, db_pool, orchestrator, metrics })
}
