//! Database query tool: answers data questions about the transactions
//! database through [`TextToSql`].

use async_trait::async_trait;
use sleuth_core::error::ToolError;
use sleuth_core::tool::{Tool, ToolResult};

use crate::knowledge::query_argument;
use crate::text_to_sql::TextToSql;

pub struct DatabaseQueryTool {
    sql: TextToSql,
    max_rows: usize,
}

impl DatabaseQueryTool {
    pub fn new(sql: TextToSql, max_rows: usize) -> Self {
        Self { sql, max_rows }
    }
}

#[async_trait]
impl Tool for DatabaseQueryTool {
    fn name(&self) -> &str {
        "database_query"
    }

    fn description(&self) -> &str {
        "Answer questions from the credit card fraud database: statistics, trends and \
         evidence such as average transaction amounts per month, fraud rates by ZIP \
         code or merchant, or which jobs appear more vulnerable to fraud. Pass the \
         question in plain language; the SQL is written for you."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The data question, in natural language"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let question = query_argument(&arguments)?;
        let answer = self.sql.answer(question).await?;

        Ok(ToolResult::answer(answer.rows.render(self.max_rows)).with_query(answer.statement))
    }
}
