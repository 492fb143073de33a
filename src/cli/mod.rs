//! Command-line host for the question-answering service.

mod commands;

pub use commands::{is_verbose, run};
