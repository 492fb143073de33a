//! Service-level error taxonomy.
//!
//! Every variant ends in the same uniform answer for the caller; the
//! variants exist for logging and tests.

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::query::{ExecutionError, GenerationError, RejectionReason};
use crate::repository::PoolError;

/// The answer given for every failure.
pub const DEFAULT_ERROR_ANSWER: &str = "Ошибка";

/// A candidate query refused by the SELECT-only gate.
#[derive(Debug, Clone, Error)]
#[error("rejected SQL ({reason}): {sql}")]
pub struct RejectionError {
    pub reason: RejectionReason,
    pub sql: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("completion client: {0}")]
    Client(#[from] LlmError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Rejection(#[from] RejectionError),

    #[error("execution failed: {0}")]
    Execution(ExecutionError),

    #[error("database pool: {0}")]
    Pool(#[from] PoolError),

    #[error("service is closed")]
    Closed,
}

impl From<ExecutionError> for ServiceError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Pool(e) => ServiceError::Pool(e),
            other => ServiceError::Execution(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_failures_keep_their_category() {
        let err = ServiceError::from(ExecutionError::Pool(PoolError::Timeout(
            Duration::from_secs(5),
        )));
        assert!(matches!(err, ServiceError::Pool(PoolError::Timeout(_))));

        let err = ServiceError::from(ExecutionError::Database("boom".to_string()));
        assert!(matches!(err, ServiceError::Execution(_)));
    }

    #[test]
    fn test_rejection_message_carries_sql() {
        let err = RejectionError {
            reason: RejectionReason::NotSelect,
            sql: "DELETE FROM videos;".to_string(),
        };
        assert!(err.to_string().contains("DELETE FROM videos;"));
    }
}
