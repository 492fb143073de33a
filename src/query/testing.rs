//! In-process connection manager for exercising the pool without a database.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, RecycleResult};

use super::executor::{ExecutionError, ScalarConnection};
use super::normalizer::ScalarValue;

/// What a fake connection answers for one query.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Value(Option<String>),
    Fail(String),
    Shape(usize, usize),
    Hang,
}

impl FakeReply {
    pub fn value(text: &str) -> Self {
        FakeReply::Value(Some(text.to_string()))
    }

    pub fn null() -> Self {
        FakeReply::Value(None)
    }

    pub fn fail(message: &str) -> Self {
        FakeReply::Fail(message.to_string())
    }

    pub fn shape(rows: usize, columns: usize) -> Self {
        FakeReply::Shape(rows, columns)
    }

    pub fn hang() -> Self {
        FakeReply::Hang
    }
}

type Responder = Arc<dyn Fn(&str) -> FakeReply + Send + Sync>;

pub struct FakeConnection {
    respond: Responder,
}

#[async_trait]
impl ScalarConnection for FakeConnection {
    async fn query_scalar(&mut self, sql: &str) -> Result<ScalarValue, ExecutionError> {
        match (self.respond)(sql) {
            FakeReply::Value(cell) => Ok(ScalarValue::from_text(cell.as_deref())),
            FakeReply::Fail(message) => Err(ExecutionError::Database(message)),
            FakeReply::Shape(rows, columns) => Err(ExecutionError::Shape { rows, columns }),
            FakeReply::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
pub struct FakeError(pub String);

impl std::fmt::Display for FakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Manager handing out [`FakeConnection`]s.
#[derive(Clone)]
pub struct FakeManager {
    respond: Responder,
    created: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
}

impl FakeManager {
    pub fn new(respond: impl Fn(&str) -> FakeReply + Send + Sync + 'static) -> Self {
        Self {
            respond: Arc::new(respond),
            created: Arc::new(AtomicUsize::new(0)),
            unreachable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A manager whose every connection attempt fails.
    pub fn unreachable() -> Self {
        let manager = Self::new(|_| FakeReply::null());
        manager.unreachable.store(true, Ordering::SeqCst);
        manager
    }

    /// Number of connections created so far.
    pub fn created(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.created)
    }
}

impl managed::Manager for FakeManager {
    type Type = FakeConnection;
    type Error = FakeError;

    async fn create(&self) -> Result<FakeConnection, FakeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FakeError("connection refused".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            respond: Arc::clone(&self.respond),
        })
    }

    async fn recycle(&self, _conn: &mut FakeConnection, _: &Metrics) -> RecycleResult<FakeError> {
        Ok(())
    }
}
