//! Tool dispatch: run the tool calls of one assistant turn and fold their
//! results into a single [`StateDelta`].
//!
//! A tool can never take the session down. Unknown names, errors and panics
//! all become tool messages the model can read and recover from.

use futures::FutureExt;
use futures::future::join_all;
use sleuth_core::error::ToolError;
use sleuth_core::event::{DomainEvent, EventBus};
use sleuth_core::message::{Message, ToolCallRequest};
use sleuth_core::state::StateDelta;
use sleuth_core::tool::ToolRegistry;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Tool message content for a call naming no registered tool.
pub const UNKNOWN_TOOL_REPLY: &str = "bad tool name, retry";

pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    parallel: bool,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            tools,
            event_bus,
            parallel: true,
        }
    }

    /// Run the calls of one round concurrently (default) or one at a time.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Execute `requests` and return their combined delta.
    ///
    /// Tool messages, chunks and queries come out in request order whatever
    /// order the calls finish in.
    pub async fn dispatch(&self, session_id: &str, requests: &[ToolCallRequest]) -> StateDelta {
        debug!(count = requests.len(), parallel = self.parallel, "Dispatching tool calls");

        let deltas = if self.parallel {
            join_all(requests.iter().map(|request| self.invoke(session_id, request))).await
        } else {
            let mut deltas = Vec::with_capacity(requests.len());
            for request in requests {
                deltas.push(self.invoke(session_id, request).await);
            }
            deltas
        };

        deltas.into_iter().collect()
    }

    async fn invoke(&self, session_id: &str, request: &ToolCallRequest) -> StateDelta {
        let tool = match self.tools.lookup(&request.name) {
            Ok(tool) => Arc::clone(tool),
            Err(_) => {
                warn!(tool = %request.name, call_id = %request.id, "Model requested an unknown tool");
                return StateDelta::message(Message::tool_result(request, UNKNOWN_TOOL_REPLY));
            }
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(request.arguments.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ToolError::Panicked(panic_message(panic))));
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            session_id: session_id.to_string(),
            tool_name: request.name.clone(),
            success: outcome.is_ok(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        match outcome {
            Ok(result) => {
                debug!(tool = %request.name, duration_ms, chunks = result.chunks.len(), "Tool succeeded");
                StateDelta {
                    messages: vec![Message::tool_result(request, result.answer)],
                    chunks: result.chunks,
                    queries: result.query.into_iter().filter(|q| !q.trim().is_empty()).collect(),
                }
            }
            Err(e) => {
                warn!(tool = %request.name, duration_ms, error = %e, "Tool execution failed");
                StateDelta::message(Message::tool_result(request, format!("error during query: {e}")))
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
