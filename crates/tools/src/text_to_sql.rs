//! Text-to-SQL: turn a natural-language question into a read-only statement
//! and run it.
//!
//! [`TextToSql`] composes two independent capabilities, a
//! [`QueryGenerator`] that writes the statement and a [`StatementExecutor`]
//! that runs it, so either side can be swapped (another model, another
//! database driver, a scripted stub in tests).

use async_trait::async_trait;
use sleuth_core::error::ToolError;
use sleuth_core::message::Message;
use sleuth_core::provider::{Provider, ProviderRequest};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

const TOOL_NAME: &str = "database_query";

/// Writes a SQL statement answering a question.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<String, ToolError>;
}

/// Runs a SQL statement and returns its rows.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<QueryRows, ToolError>;
}

/// A tabular query result with cells decoded into JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a row count followed by a pipe-delimited table, showing at
    /// most `max_rows` rows.
    pub fn render(&self, max_rows: usize) -> String {
        let mut out = match self.rows.len() {
            1 => "1 row".to_string(),
            n => format!("{n} rows"),
        };
        if self.columns.is_empty() {
            return out;
        }

        out.push('\n');
        out.push_str(&self.columns.join(" | "));
        out.push('\n');
        out.push_str(&vec!["---"; self.columns.len()].join(" | "));

        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            out.push('\n');
            out.push_str(&cells.join(" | "));
        }

        if self.rows.len() > max_rows {
            let _ = write!(out, "\n... ({} more rows not shown)", self.rows.len() - max_rows);
        }
        out
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".into(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The outcome of answering one question.
#[derive(Debug, Clone)]
pub struct SqlAnswer {
    pub statement: String,
    pub rows: QueryRows,
}

pub struct TextToSql {
    generator: Arc<dyn QueryGenerator>,
    executor: Arc<dyn StatementExecutor>,
}

impl TextToSql {
    pub fn new(generator: Arc<dyn QueryGenerator>, executor: Arc<dyn StatementExecutor>) -> Self {
        Self { generator, executor }
    }

    /// Generate a statement for `question`, check it is read-only, run it.
    pub async fn answer(&self, question: &str) -> Result<SqlAnswer, ToolError> {
        let statement = self.generator.generate(question).await?;
        let statement = ensure_read_only(&statement)?;
        info!(statement = %statement, "Running generated statement");

        let rows = self.executor.execute(&statement).await?;
        debug!(rows = rows.len(), "Statement returned");

        Ok(SqlAnswer { statement, rows })
    }
}

/// Keywords that modify data or schema. Matched as whole words outside
/// string literals, quoted identifiers and comments.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "COPY", "CALL", "LOCK",
];

/// Accept a single `SELECT` or `WITH` statement; return it without the
/// trailing semicolon.
///
/// This is a first filter only: the executor's connections are read-only at
/// the database level as well.
pub fn ensure_read_only(statement: &str) -> Result<String, ToolError> {
    let trimmed = statement.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err(ToolError::StatementRejected("empty statement".into()));
    }

    let code = mask_literals(trimmed);
    if code.contains(';') {
        return Err(ToolError::StatementRejected(
            "multiple statements are not allowed".into(),
        ));
    }

    let mut words = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase);

    match words.next().as_deref() {
        Some("SELECT" | "WITH") => {}
        _ => {
            return Err(ToolError::StatementRejected(format!(
                "only SELECT queries are allowed, got '{}'",
                truncate(trimmed, 40)
            )));
        }
    }

    if let Some(keyword) = words.find(|w| WRITE_KEYWORDS.contains(&w.as_str())) {
        return Err(ToolError::StatementRejected(format!(
            "{keyword} is not allowed in a read-only query"
        )));
    }

    Ok(trimmed.to_string())
}

/// Blank out string literals, quoted identifiers and comments, keeping the
/// rest of the statement as is.
fn mask_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                // A doubled quote inside a literal closes and reopens it,
                // which masks the same span.
                out.push(' ');
                for inner in chars.by_ref() {
                    out.push(' ');
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pull the statement out of a model reply, fenced or bare.
pub fn extract_sql(reply: &str) -> String {
    if let Some(start) = reply.find("```") {
        let after = &reply[start + 3..];
        let body = after.find("```").map_or(after, |end| &after[..end]);
        // Drop the language tag on the opening fence line
        let body = match body.split_once('\n') {
            Some((tag, rest)) if !tag.trim().contains(' ') => rest,
            _ => body,
        };
        return body.trim().to_string();
    }
    reply.trim().to_string()
}

/// A [`QueryGenerator`] backed by a chat model.
pub struct LlmQueryGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    schema: Option<String>,
    dialect: String,
}

impl LlmQueryGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            schema: None,
            dialect: "SQL".into(),
        }
    }

    /// DDL describing the tables the model may query.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// SQL dialect named in the prompt, e.g. "SQLite" or "PostgreSQL".
    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    fn instructions(&self) -> String {
        let mut prompt = format!(
            "You are a {} expert. Write one read-only SELECT statement that answers \
             the user's question about the credit card transactions database.\n\
             Rules:\n\
             - Reply with the statement only, inside a ```sql fenced block.\n\
             - Never modify data.\n\
             - Cast numeric aggregates (AVG, SUM, ratios) to a floating point type.\n\
             - Prefer aggregates and trends over raw card numbers or personal details.\n",
            self.dialect
        );
        if let Some(schema) = &self.schema {
            let _ = write!(prompt, "\nSchema:\n{}\n", schema.trim());
        }
        prompt
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    async fn generate(&self, question: &str) -> Result<String, ToolError> {
        let request = ProviderRequest {
            temperature: 0.0,
            ..ProviderRequest::simple(
                &self.model,
                vec![Message::system(self.instructions()), Message::user(question)],
            )
        };

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("SQL generation failed: {e}")))?;

        let sql = extract_sql(response.message.content());
        if sql.is_empty() {
            return Err(ToolError::failed(TOOL_NAME, "model returned no SQL"));
        }
        debug!(model = %response.model, sql = %sql, "Generated SQL");
        Ok(sql)
    }
}
