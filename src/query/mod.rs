//! The question-answering pipeline: generate, validate, execute, normalize.

pub mod executor;
pub mod generator;
pub mod normalizer;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{ExecutionError, QueryExecutor, ScalarConnection};
pub use generator::{strip_code_fence, GenerationError, SqlGenerator};
pub use normalizer::{normalize, ScalarValue};
pub use validator::{validate, RejectionReason, ValidatedQuery};
