//! The agent state machine.
//!
//! ```text
//!            ┌───────────── tools requested ─────────────┐
//!            │                                            ▼
//!   CallModel ──── no tools ───► Done          DispatchTools(requests)
//!       ▲                                                 │
//!       └──────────────────── merge ──────────────────────┘
//! ```
//!
//! Every step produces a [`StateDelta`] that is merged into the session's
//! [`ConversationState`]; the state itself is owned by the caller, so
//! whatever was merged before a failure or timeout is still there.

use sleuth_core::error::{Error, ProviderError};
use sleuth_core::event::{DomainEvent, EventBus};
use sleuth_core::message::{Message, Role, ToolCallRequest};
use sleuth_core::provider::{Provider, ProviderRequest};
use sleuth_core::state::{ConversationState, StateDelta};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::prompt::SYSTEM_PROMPT;

/// True iff `message` is an assistant turn requesting at least one tool.
pub fn requests_tools(message: &Message) -> bool {
    matches!(message, Message::Assistant { tool_calls, .. } if !tool_calls.is_empty())
}

#[derive(Debug)]
enum Step {
    CallModel,
    DispatchTools(Vec<ToolCallRequest>),
    Done,
}

/// Drives a [`ConversationState`] from the user's question to a final
/// assistant answer.
pub struct Orchestrator {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Instruction sent ahead of the transcript
    system_prompt: String,

    /// Runs the tool calls of each round
    dispatcher: ToolDispatcher,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Maximum number of dispatch rounds per session
    max_rounds: u32,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: ToolDispatcher,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            dispatcher,
            event_bus,
            max_rounds: 25,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Replace the default system instruction.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of tool dispatch rounds.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run the state machine to completion and return the final answer text.
    ///
    /// Model failures and the round cap end the run with an error; tool
    /// failures never do.
    pub async fn run(&self, session_id: &str, state: &mut ConversationState) -> Result<String, Error> {
        let mut rounds = 0u32;
        let mut step = Step::CallModel;

        loop {
            step = match step {
                Step::CallModel => {
                    let delta = self.call_model(session_id, state).await?;
                    state.merge(delta);

                    match state.last_message() {
                        Some(message) if requests_tools(message) => {
                            if rounds >= self.max_rounds {
                                warn!(rounds, "Tool round limit reached");
                                return Err(Error::RoundLimitExceeded {
                                    limit: self.max_rounds,
                                });
                            }
                            Step::DispatchTools(message.tool_calls().to_vec())
                        }
                        _ => Step::Done,
                    }
                }
                Step::DispatchTools(requests) => {
                    rounds += 1;
                    debug!(round = rounds, tools = requests.len(), "Dispatching tool round");
                    let delta = self.dispatcher.dispatch(session_id, &requests).await;
                    state.merge(delta);
                    Step::CallModel
                }
                Step::Done => {
                    info!(rounds, "Agent loop finished");
                    return Ok(state.last_assistant_text().unwrap_or_default().to_string());
                }
            };
        }
    }

    /// One model turn: `[system] ++ transcript` plus tool definitions in, one
    /// assistant message out.
    async fn call_model(&self, session_id: &str, state: &ConversationState) -> Result<StateDelta, Error> {
        let mut messages = Vec::with_capacity(state.messages().len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend_from_slice(state.messages());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.dispatcher.tools().definitions(),
        };

        let response = self.provider.complete(request).await?;

        if response.message.role() != Role::Assistant {
            return Err(ProviderError::MalformedResponse(format!(
                "expected an assistant turn, got {:?}",
                response.message.role()
            ))
            .into());
        }

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            session_id: session_id.to_string(),
            model: response.model.clone(),
            tool_calls: response.message.tool_calls().len(),
            tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
            timestamp: chrono::Utc::now(),
        });

        Ok(StateDelta::message(response.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, StubTool, text, tool_call};
    use sleuth_core::tool::{Tool, ToolRegistry};

    fn orchestrator(provider: Arc<ScriptedProvider>, tools: Vec<Arc<dyn Tool>>) -> Orchestrator {
        let bus = Arc::new(EventBus::default());
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new(tools)), bus.clone());
        Orchestrator::new(provider, "scripted-model", dispatcher, bus)
    }

    #[test]
    fn decision_reads_tool_calls_only() {
        let wants = Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("c1", "database_query", serde_json::json!({}))],
        );
        assert!(requests_tools(&wants));
        assert!(requests_tools(&wants));
        assert!(!requests_tools(&Message::assistant("I will call database_query now")));
        assert!(!requests_tools(&Message::user("call a tool")));
        assert!(!requests_tools(&Message::assistant_with_tools("text", vec![])));
    }

    #[tokio::test]
    async fn tool_free_turn_finishes_after_one_call() {
        let provider = ScriptedProvider::new(vec![text("Skimming copies card data.")]);
        let agent = orchestrator(provider.clone(), vec![]);

        let mut state = ConversationState::new(vec![Message::user("What is skimming?")]);
        let answer = agent.run("s", &mut state).await.unwrap();

        assert_eq!(answer, "Skimming copies card data.");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(state.messages().len(), 2);
        assert!(state.chunks().is_empty());
        assert!(state.queries().is_empty());
    }

    #[tokio::test]
    async fn rounds_keep_tool_messages_adjacent() {
        let provider = ScriptedProvider::new(vec![
            tool_call(&[("a1", "stub", "first")]),
            tool_call(&[("b1", "stub", "second"), ("b2", "stub", "third")]),
            text("done"),
        ]);
        let agent = orchestrator(provider.clone(), vec![Arc::new(StubTool::new("stub"))]);

        let mut state = ConversationState::new(vec![Message::user("go")]);
        agent.run("s", &mut state).await.unwrap();

        let roles: Vec<_> = state.messages().iter().map(Message::role).collect();
        assert_eq!(
            roles,
            [
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant
            ]
        );

        // Each tool message answers the assistant turn right before its run
        for (i, message) in state.messages().iter().enumerate() {
            if message.role() != Role::Tool {
                continue;
            }
            let owner = state.messages()[..i]
                .iter()
                .rev()
                .find(|m| m.role() != Role::Tool)
                .unwrap();
            let ids: Vec<_> = owner.tool_calls().iter().map(|c| c.id.as_str()).collect();
            assert!(ids.contains(&message.tool_call_id().unwrap()));
        }

        assert_eq!(state.queries(), ["SELECT 'first'", "SELECT 'second'", "SELECT 'third'"]);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn model_sees_system_prompt_and_tools() {
        let provider = ScriptedProvider::new(vec![text("ok")]);
        let agent = orchestrator(provider.clone(), vec![Arc::new(StubTool::new("stub"))])
            .with_system_prompt("Be brief.");

        let mut state = ConversationState::new(vec![Message::user("hi")]);
        agent.run("s", &mut state).await.unwrap();

        let requests = provider.requests();
        let request = &requests[0];
        assert_eq!(request.messages[0], Message::system("Be brief."));
        assert_eq!(request.messages[1], Message::user("hi"));
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.model, "scripted-model");
    }

    #[tokio::test]
    async fn round_cap_stops_the_loop() {
        let provider = ScriptedProvider::new(vec![
            tool_call(&[("c1", "stub", "1")]),
            tool_call(&[("c2", "stub", "2")]),
            tool_call(&[("c3", "stub", "3")]),
        ]);
        let agent = orchestrator(provider.clone(), vec![Arc::new(StubTool::new("stub"))])
            .with_max_rounds(2);

        let mut state = ConversationState::new(vec![Message::user("loop forever")]);
        let err = agent.run("s", &mut state).await.unwrap_err();

        assert!(matches!(err, Error::RoundLimitExceeded { limit: 2 }));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(state.queries().len(), 2);
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let provider = ScriptedProvider::new(vec![]);
        let agent = orchestrator(provider, vec![]);

        let mut state = ConversationState::new(vec![Message::user("hi")]);
        let err = agent.run("s", &mut state).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(state.messages().len(), 1);
    }

    #[tokio::test]
    async fn non_assistant_reply_is_malformed() {
        let provider = ScriptedProvider::new(vec![Message::user("I am not the assistant")]);
        let agent = orchestrator(provider, vec![]);

        let mut state = ConversationState::new(vec![Message::user("hi")]);
        let err = agent.run("s", &mut state).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::MalformedResponse(_))
        ));
    }
}
