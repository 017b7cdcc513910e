//! Shared helpers for agent tests.

use async_trait::async_trait;
use sleuth_core::error::{ProviderError, ToolError};
use sleuth_core::message::{Message, ToolCallRequest};
use sleuth_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use sleuth_core::tool::{Tool, ToolResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A provider that replays scripted assistant turns and records requests.
///
/// Once the script runs out every call fails with a 500.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Message>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let message = self.script.lock().unwrap().pop_front().ok_or(ProviderError::ApiError {
            status_code: 500,
            message: "script exhausted".into(),
        })?;
        Ok(ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "scripted-model".into(),
        })
    }
}

/// A provider whose calls never complete.
pub struct PendingProvider;

#[async_trait]
impl Provider for PendingProvider {
    fn name(&self) -> &str {
        "pending"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// Answers `{"query": q}` with `result for q` and the statement `SELECT 'q'`.
pub struct StubTool {
    name: String,
}

impl StubTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes its query"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        Ok(ToolResult::answer(format!("result for {query}")).with_query(format!("SELECT '{query}'")))
    }
}

/// A plain assistant answer.
pub fn text(content: &str) -> Message {
    Message::assistant(content)
}

/// An assistant turn requesting `(id, tool, query)` calls.
pub fn tool_call(calls: &[(&str, &str, &str)]) -> Message {
    Message::assistant_with_tools(
        "",
        calls
            .iter()
            .map(|(id, name, query)| ToolCallRequest::new(*id, *name, serde_json::json!({"query": query})))
            .collect(),
    )
}
