//! vidstats - natural-language analytics over video engagement statistics.
//!
//! Questions are translated into a single read-only SQL aggregate by an LLM,
//! checked by a SELECT-only gate, executed against PostgreSQL and answered
//! with one scalar value.

pub mod config;
pub mod contract;
pub mod error;
pub mod llm;
pub mod query;
pub mod repository;
pub mod service;

pub use config::Config;
pub use contract::SchemaContract;
pub use error::ServiceError;
pub use service::{ServiceState, StatsService};
