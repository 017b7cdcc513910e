//! Knowledge lookup tool: reference passages about fraud patterns, detection
//! methods and investigation practice.

use async_trait::async_trait;
use sleuth_core::error::ToolError;
use sleuth_core::tool::{Tool, ToolResult};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

use crate::retriever::Retriever;

pub struct KnowledgeLookupTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl KnowledgeLookupTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self {
            retriever,
            top_k: top_k.max(1),
        }
    }
}

/// Read the mandatory `query` string argument shared by both tools.
pub(crate) fn query_argument(arguments: &serde_json::Value) -> Result<&str, ToolError> {
    arguments["query"]
        .as_str()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn name(&self) -> &str {
        "knowledge_lookup"
    }

    fn description(&self) -> &str {
        "Retrieve reference material about credit card fraud theory: fraud types, \
         methods used to commit fraud, detection techniques and the impact on \
         cardholders, merchants and issuers. Use for conceptual questions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to look up in the knowledge base"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = query_argument(&arguments)?;

        let chunks = self.retriever.search(query, self.top_k).await?;
        debug!(
            retriever = self.retriever.name(),
            found = chunks.len(),
            "Knowledge lookup finished"
        );

        if chunks.is_empty() {
            return Ok(ToolResult::answer(format!(
                "No reference material found for \"{query}\"."
            )));
        }

        let mut answer = String::from("Relevant passages:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            let _ = write!(answer, "\n[{}] {}", i + 1, chunk.content.trim());
            if let Some(source) = chunk.metadata.get("source").and_then(|s| s.as_str()) {
                let _ = write!(answer, " (source: {source})");
            }
            answer.push('\n');
        }

        Ok(ToolResult::answer(answer).with_chunks(chunks))
    }
}
