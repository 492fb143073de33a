//! The question-answering service.
//!
//! `StatsService` owns the connection pool and runs each question through
//! generation, validation, execution and normalization. Callers only ever
//! see an answer string; failures collapse into one configured answer.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{Manager, Pool};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::contract::SchemaContract;
use crate::error::{RejectionError, ServiceError, DEFAULT_ERROR_ANSWER};
use crate::llm::{CompletionService, LlmClient};
use crate::query::{normalize, validate, QueryExecutor, ScalarConnection, SqlGenerator};
use crate::repository::{build_pool, PgManager, PoolSettings, PoolStatus};

/// Lifecycle of a [`StatsService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No pool yet.
    Uninitialized,
    /// Pool open, questions are answered.
    Ready,
    /// Pool released. Terminal.
    Closed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Ready => "ready",
            ServiceState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct StatsService<M: Manager = PgManager> {
    generator: SqlGenerator,
    contract: Arc<SchemaContract>,
    executor: QueryExecutor,
    manager: M,
    settings: PoolSettings,
    pool: OnceCell<Pool<M>>,
    closed: AtomicBool,
    error_answer: String,
}

impl StatsService<PgManager> {
    /// Service backed by PostgreSQL and the configured completion provider.
    ///
    /// Fails on invalid pool bounds or missing credentials. No connection is
    /// opened until [`StatsService::initialize`] or the first question.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        config.validate()?;

        let completion = Arc::new(LlmClient::new(config.llm.clone())?);
        let manager = PgManager::from_config(&config.database)?;

        Ok(Self::with_parts(
            completion,
            manager,
            PoolSettings::from(&config.database),
            Duration::from_secs(config.database.statement_timeout_secs),
        )
        .with_error_answer(&config.service.error_answer))
    }
}

impl<M> StatsService<M>
where
    M: Manager + Clone,
    M::Type: ScalarConnection,
    M::Error: Display,
{
    /// Assemble a service from its collaborators, using the built-in
    /// schema contract.
    pub fn with_parts(
        completion: Arc<dyn CompletionService>,
        manager: M,
        settings: PoolSettings,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            generator: SqlGenerator::new(completion),
            contract: Arc::new(SchemaContract::builtin().clone()),
            executor: QueryExecutor::new(statement_timeout, settings.acquire_timeout),
            manager,
            settings,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
            error_answer: DEFAULT_ERROR_ANSWER.to_string(),
        }
    }

    pub fn with_contract(mut self, contract: SchemaContract) -> Self {
        self.contract = Arc::new(contract);
        self
    }

    pub fn with_error_answer(mut self, answer: &str) -> Self {
        self.error_answer = answer.to_string();
        self
    }

    pub fn contract(&self) -> &SchemaContract {
        &self.contract
    }

    /// Open the pool. Safe to call repeatedly and concurrently; only one
    /// pool is ever created.
    pub async fn initialize(&self) -> Result<(), ServiceError> {
        self.ready_pool().await.map(|_| ())
    }

    async fn ready_pool(&self) -> Result<&Pool<M>, ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }

        let pool = self
            .pool
            .get_or_try_init(|| async {
                let pool = build_pool(self.manager.clone(), &self.settings).await?;
                info!(
                    "Service ready (schema contract {}, fingerprint {})",
                    self.contract.version(),
                    self.contract.short_fingerprint()
                );
                Ok::<_, ServiceError>(pool)
            })
            .await?;

        // close() may have run while the pool was being built
        if self.closed.load(Ordering::SeqCst) {
            pool.close();
            return Err(ServiceError::Closed);
        }
        Ok(pool)
    }

    /// Answer one question.
    ///
    /// Returns the normalized scalar, or the uniform error answer when any
    /// stage fails. Failures are logged, never returned.
    pub async fn process_query(&self, question: &str) -> String {
        match self.answer(question).await {
            Ok(answer) => answer,
            Err(ServiceError::Rejection(e)) => {
                warn!(
                    "Rejected SQL for query '{}': {} ({})",
                    question, e.sql, e.reason
                );
                self.error_answer.clone()
            }
            Err(e) => {
                error!("Failed to answer query '{}': {}", question, e);
                self.error_answer.clone()
            }
        }
    }

    async fn answer(&self, question: &str) -> Result<String, ServiceError> {
        let pool = self.ready_pool().await?;

        let sql = self.generator.generate(question, &self.contract).await?;
        let query = validate(&sql).map_err(|reason| RejectionError {
            reason,
            sql: sql.clone(),
        })?;

        let value = self.executor.execute(&query, pool).await?;
        Ok(normalize(&value))
    }

    pub fn state(&self) -> ServiceState {
        if self.closed.load(Ordering::SeqCst) {
            ServiceState::Closed
        } else if self.pool.initialized() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    /// Pool occupancy, once the pool exists.
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.pool.get().map(PoolStatus::of)
    }

    /// Release the pool. Further questions get the error answer.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pool) = self.pool.get() {
            pool.close();
            info!("Database pool closed");
        }
    }
}
