//! Natural language to SQL through the completion service.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::{error, info};

use crate::contract::SchemaContract;
use crate::llm::{CompletionService, LlmError};

/// Errors raised while generating a candidate query.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("completion was empty")]
    Empty,
}

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^```(?:(?:sql|postgres(?:ql)?|pgsql)\b|[a-z0-9_+-]*[ \t]*\r?\n)?")
        .expect("valid opening fence pattern")
});

/// Remove a surrounding Markdown code fence and whitespace.
///
/// Handles "```sql\n...\n```", "```\n...\n```", "```sql SELECT ...```", a
/// fence without the closing half, and single-line "```SELECT 1```".
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(m) = OPENING_FENCE.find(text) {
        text = &text[m.end()..];
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    text.trim()
}

/// Turns questions into candidate SQL under a schema contract.
#[derive(Clone)]
pub struct SqlGenerator {
    completion: Arc<dyn CompletionService>,
}

impl SqlGenerator {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Ask the completion service for one SQL statement answering
    /// `question`. The result is not validated.
    pub async fn generate(
        &self,
        question: &str,
        contract: &SchemaContract,
    ) -> Result<String, GenerationError> {
        let raw = self
            .completion
            .complete(contract.system_prompt(), question)
            .await
            .map_err(|e| {
                error!("Error generating SQL: {}", e);
                GenerationError::Completion(e)
            })?;

        let sql = strip_code_fence(&raw);
        if sql.is_empty() {
            error!("Empty completion for query '{}'", question);
            return Err(GenerationError::Empty);
        }

        info!("Generated SQL for query '{}': {}", question, sql);
        Ok(sql.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, ()>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for Canned {
        async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.reply
                .clone()
                .map_err(|_| LlmError::Connection("connection refused".to_string()))
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("SELECT 1;"), "SELECT 1;");
        assert_eq!(strip_code_fence("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fence("```SQL\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fence("```\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fence("  ```postgresql\r\nSELECT 1;\r\n```  "), "SELECT 1;");
        assert_eq!(strip_code_fence("```SELECT 1;```"), "SELECT 1;");
        assert_eq!(strip_code_fence("```sql\nSELECT 1;"), "SELECT 1;");
        assert_eq!(strip_code_fence("```"), "");
        assert_eq!(
            strip_code_fence("```sql SELECT COUNT(*) FROM videos;```"),
            "SELECT COUNT(*) FROM videos;"
        );
        assert_eq!(strip_code_fence("```postgresql\tSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fence("```sqlite\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(
            strip_code_fence("```sql\nSELECT COUNT(*)\nFROM videos;\n```"),
            "SELECT COUNT(*)\nFROM videos;"
        );
    }

    #[tokio::test]
    async fn test_sends_contract_and_question() {
        let canned = Canned::ok("```sql\nSELECT COUNT(*) FROM videos;\n```");
        let generator = SqlGenerator::new(canned.clone());
        let contract = SchemaContract::from_text("t", "schema text");

        let sql = generator
            .generate("Сколько всего видео есть в системе?", &contract)
            .await
            .unwrap();

        assert_eq!(sql, "SELECT COUNT(*) FROM videos;");
        let seen = canned.seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[(
                "schema text".to_string(),
                "Сколько всего видео есть в системе?".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let generator = SqlGenerator::new(Canned::ok("```sql\n\n```"));
        let err = generator
            .generate("q", SchemaContract::builtin())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Empty));
    }

    #[tokio::test]
    async fn test_service_down() {
        let generator = SqlGenerator::new(Canned::down());
        let err = generator
            .generate("q", SchemaContract::builtin())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Completion(LlmError::Connection(_))
        ));
    }
}
