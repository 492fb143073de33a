//! LLM integration for SQL generation.
//!
//! The completion service is opaque to the rest of the crate: it receives
//! the schema contract as the system turn and the question as the user turn.

mod client;

pub use client::{
    encode_credentials, CompletionService, GigaChatAuth, LlmClient, LlmConfig, LlmError,
    LlmProvider,
};
