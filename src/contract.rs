//! Schema contract given to the SQL generator.
//!
//! Everything the model is told about the database lives in this file: the
//! two tables, the translation rules and the worked examples. Editing any of
//! them changes generation behaviour for every question, so bump
//! [`CONTRACT_VERSION`] together with the edit.

use std::fmt::Write as _;
use std::sync::LazyLock;

use sha2::{Digest, Sha256};

/// Revision of the built-in contract.
pub const CONTRACT_VERSION: &str = "2025.11.2";

/// A column as presented to the model.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
}

/// A table as presented to the model.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [Column],
}

/// A worked question/SQL pair.
#[derive(Debug, Clone, Copy)]
pub struct Example {
    pub question: &'static str,
    pub sql: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str, description: &'static str) -> Column {
    Column {
        name,
        sql_type,
        description,
    }
}

const PREAMBLE: &str = "Ты — эксперт-аналитик баз данных PostgreSQL. Твоя задача — сгенерировать один единственный SQL-запрос для ответа на вопрос пользователя на естественном языке на основе предоставленной схемы базы данных.";

/// Tables the generated SQL may read.
pub const TABLES: &[Table] = &[
    Table {
        name: "videos",
        description: "Сводная статистика по каждому видео",
        columns: &[
            col("id", "UUID", "Идентификатор видео"),
            col("creator_id", "UUID", "Идентификатор автора"),
            col("video_created_at", "TIMESTAMPTZ", "Дата и время публикации видео"),
            col("views_count", "INTEGER", "Общее количество просмотров"),
            col("likes_count", "INTEGER", "Общее количество лайков"),
            col("comments_count", "INTEGER", "Общее количество комментариев"),
            col("reports_count", "INTEGER", "Общее количество жалоб"),
            col("created_at", "TIMESTAMPTZ", "Время создания записи в базе"),
            col("updated_at", "TIMESTAMPTZ", "Время последнего обновления записи"),
        ],
    },
    Table {
        name: "video_snapshots",
        description: "Ежечасные снимки статистики видео",
        columns: &[
            col("id", "UUID", "Идентификатор снимка (снэпшота)"),
            col("video_id", "UUID", "Ссылка на videos.id"),
            col("views_count", "INTEGER", "Количество просмотров на момент снимка"),
            col("likes_count", "INTEGER", "Количество лайков на момент снимка"),
            col("comments_count", "INTEGER", "Количество комментариев на момент снимка"),
            col("reports_count", "INTEGER", "Количество жалоб на момент снимка"),
            col("delta_views_count", "INTEGER", "Прирост просмотров с момента предыдущего снимка"),
            col("delta_likes_count", "INTEGER", "Прирост лайков с момента предыдущего снимка"),
            col("delta_comments_count", "INTEGER", "Прирост комментариев с момента предыдущего снимка"),
            col("delta_reports_count", "INTEGER", "Прирост жалоб с момента предыдущего снимка"),
            col("created_at", "TIMESTAMPTZ", "Время создания снимка (ежечасно)"),
            col("updated_at", "TIMESTAMPTZ", "Время обновления записи"),
        ],
    },
];

/// Translation rules, numbered in the rendered prompt.
pub const RULES: &[&str] = &[
    "Верни ТОЛЬКО SQL-запрос. Не включай форматирование markdown (например, ```sql), пояснения или любой другой текст.",
    "Запрос должен возвращать ОДНО ЧИСЛО (количество, сумму и т.д.).",
    "Используй синтаксис PostgreSQL.",
    "Для фильтрации дат по полям TIMESTAMPTZ используй приведение типов `::date`. Пример: `created_at::date = '2025-11-28'`.",
    "\"Сколько видео\" обычно означает `COUNT(*)`.",
    "\"На сколько выросли просмотры\" или \"прирост просмотров\" означает `SUM(delta_views_count)` из таблицы `video_snapshots`.",
    "\"Сколько разных видео получили новые просмотры\" означает `COUNT(DISTINCT video_id)` из таблицы `video_snapshots` где `delta_views_count > 0`.",
    "Будь внимателен с диапазонами дат. \"с 1 по 5 ноября включительно\" означает `date >= '2025-11-01' AND date <= '2025-11-05'`.",
    "Текущий год — 2025, если не указано иное.",
    "Если пользователь спрашивает про конкретный id автора (creator_id), используй его в конструкции WHERE.",
];

pub const EXAMPLES: &[Example] = &[
    Example {
        question: "Сколько всего видео есть в системе?",
        sql: "SELECT COUNT(*) FROM videos;",
    },
    Example {
        question: "На сколько просмотров в сумме выросли все видео 28 ноября 2025?",
        sql: "SELECT SUM(delta_views_count) FROM video_snapshots WHERE created_at::date = '2025-11-28';",
    },
    Example {
        question: "Сколько разных видео получали новые просмотры 27 ноября 2025?",
        sql: "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE created_at::date = '2025-11-27' AND delta_views_count > 0;",
    },
];

/// Rendered system instruction plus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    version: String,
    text: String,
    fingerprint: String,
}

static BUILTIN: LazyLock<SchemaContract> =
    LazyLock::new(|| SchemaContract::from_text(CONTRACT_VERSION, render(TABLES, RULES, EXAMPLES)));

impl SchemaContract {
    /// The contract compiled into this binary.
    pub fn builtin() -> &'static SchemaContract {
        &BUILTIN
    }

    /// Wrap an already rendered instruction.
    pub fn from_text(version: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = fingerprint(&text);
        Self {
            version: version.into(),
            text,
            fingerprint,
        }
    }

    /// Text sent as the system turn.
    pub fn system_prompt(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 of the rendered text, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// First 12 hex digits of the fingerprint, for log lines.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..12]
    }
}

fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render tables, rules and examples into the system instruction.
pub fn render(tables: &[Table], rules: &[&str], examples: &[Example]) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(PREAMBLE);
    out.push_str("\n\nСХЕМА БАЗЫ ДАННЫХ:\n");

    for table in tables {
        let _ = writeln!(out, "\nТаблица \"{}\" ({}):", table.name, table.description);
        for column in table.columns {
            let _ = writeln!(
                out,
                "- {} ({}): {}",
                column.name, column.sql_type, column.description
            );
        }
    }

    out.push_str("\nПРАВИЛА:\n");
    for (i, rule) in rules.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, rule);
    }

    out.push_str("\nПРИМЕРЫ:\n");
    for example in examples {
        let _ = writeln!(out, "User: \"{}\"", example.question);
        let _ = writeln!(out, "SQL: {}\n", example.sql);
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::validate;

    #[test]
    fn test_builtin_lists_every_column() {
        let prompt = SchemaContract::builtin().system_prompt();
        for table in TABLES {
            assert!(prompt.contains(&format!("Таблица \"{}\"", table.name)));
            for column in table.columns {
                assert!(
                    prompt.contains(&format!("- {} ({})", column.name, column.sql_type)),
                    "missing column {}.{}",
                    table.name,
                    column.name
                );
            }
        }
    }

    #[test]
    fn test_rules_are_numbered() {
        let prompt = SchemaContract::builtin().system_prompt();
        assert!(prompt.contains("1. Верни ТОЛЬКО SQL-запрос"));
        assert!(prompt.contains("9. Текущий год — 2025"));
        assert!(prompt.contains(&format!("{}. ", RULES.len())));
    }

    #[test]
    fn test_examples_pass_the_gate() {
        for example in EXAMPLES {
            assert!(
                validate(example.sql).is_ok(),
                "example rejected: {}",
                example.sql
            );
        }
    }

    #[test]
    fn test_fingerprint() {
        let contract = SchemaContract::builtin();
        assert_eq!(contract.version(), CONTRACT_VERSION);
        assert_eq!(contract.fingerprint().len(), 64);
        assert_eq!(contract.short_fingerprint().len(), 12);

        let same = SchemaContract::from_text("x", contract.system_prompt());
        assert_eq!(same.fingerprint(), contract.fingerprint());

        let edited = SchemaContract::from_text("x", format!("{} ", contract.system_prompt()));
        assert_ne!(edited.fingerprint(), contract.fingerprint());
    }
}
