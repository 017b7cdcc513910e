//! Session entry point: one question in, one answer plus evidence out.
//!
//! This is the only place errors become user-facing text. Each call builds
//! a fresh [`ConversationState`], runs the orchestrator under a timeout and
//! reports whatever evidence was merged, even when the run failed.

use serde::{Deserialize, Serialize};
use sleuth_core::error::Error;
use sleuth_core::event::{DomainEvent, EventBus, SessionOutcome};
use sleuth_core::message::{HistoryEntry, Message};
use sleuth_core::state::{ConversationState, EvidenceChunk};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};

use crate::orchestrator::{Orchestrator, requests_tools};

pub const TIMEOUT_REPLY: &str = "Sorry, the model took too long. Please try again.";
pub const ROUND_LIMIT_REPLY: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";
/// Shown when the model finished with an empty answer.
pub const EMPTY_ANSWER_PLACEHOLDER: &str = "...";

/// What a session returns to its caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub chunks: Vec<EvidenceChunk>,
    pub queries: Vec<String>,
}

/// Limits applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Prior history entries kept per call
    pub history_max: usize,
    /// Bound on the whole orchestrator run
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_max: 20,
            timeout: Duration::from_secs(180),
        }
    }
}

impl From<&sleuth_config::AgentConfig> for SessionOptions {
    fn from(config: &sleuth_config::AgentConfig) -> Self {
        Self {
            history_max: config.history_max,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// The analyst agent: shared, immutable after construction, safe to call
/// from many tasks at once.
pub struct AgentService {
    orchestrator: Orchestrator,
    options: SessionOptions,
    event_bus: Arc<EventBus>,
}

impl AgentService {
    pub fn new(orchestrator: Orchestrator, options: SessionOptions, event_bus: Arc<EventBus>) -> Self {
        Self {
            orchestrator,
            options,
            event_bus,
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Names of the registered tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        self.orchestrator
            .dispatcher()
            .tools()
            .names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Answer `query` given the caller's prior `history` (oldest first).
    pub async fn get_response(&self, query: &str, history: &[HistoryEntry]) -> AgentResponse {
        if query.trim().is_empty() {
            return AgentResponse::default();
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("session", session_id = %session_id);

        self.run_session(&session_id, query, history)
            .instrument(span)
            .await
    }

    async fn run_session(&self, session_id: &str, query: &str, history: &[HistoryEntry]) -> AgentResponse {
        let kept = &history[history.len().saturating_sub(self.options.history_max)..];
        let mut seed: Vec<Message> = kept.iter().cloned().map(Message::from).collect();
        seed.push(Message::user(query));
        let mut state = ConversationState::new(seed);

        info!(history = kept.len(), dropped = history.len() - kept.len(), "Session started");
        self.event_bus.publish(DomainEvent::SessionStarted {
            session_id: session_id.to_string(),
            history_len: kept.len(),
            timestamp: chrono::Utc::now(),
        });

        let outcome = tokio::time::timeout(
            self.options.timeout,
            self.orchestrator.run(session_id, &mut state),
        )
        .await;

        let (response, status) = match outcome {
            Ok(Ok(answer)) if answer.trim().is_empty() => {
                (EMPTY_ANSWER_PLACEHOLDER.to_string(), SessionOutcome::Completed)
            }
            Ok(Ok(answer)) => (answer, SessionOutcome::Completed),
            Ok(Err(Error::RoundLimitExceeded { limit })) => {
                warn!(limit, "Session hit the tool round limit");
                (ROUND_LIMIT_REPLY.to_string(), SessionOutcome::RoundLimit)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Session failed");
                (format!("Error: {e}"), SessionOutcome::Failed)
            }
            Err(_) => {
                error!(timeout_secs = self.options.timeout.as_secs(), "Session timed out");
                (TIMEOUT_REPLY.to_string(), SessionOutcome::TimedOut)
            }
        };

        let rounds = state.messages().iter().filter(|m| requests_tools(m)).count() as u32;
        self.event_bus.publish(DomainEvent::SessionFinished {
            session_id: session_id.to_string(),
            outcome: status,
            rounds,
            timestamp: chrono::Utc::now(),
        });

        let (chunks, queries) = state.into_evidence();
        info!(?status, rounds, chunks = chunks.len(), queries = queries.len(), "Session finished");

        AgentResponse {
            response,
            chunks,
            queries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ToolDispatcher;
    use crate::test_support::{PendingProvider, ScriptedProvider, StubTool, text, tool_call};
    use sleuth_core::provider::Provider;
    use sleuth_core::tool::{Tool, ToolRegistry};

    fn service(provider: Arc<dyn Provider>, tools: Vec<Arc<dyn Tool>>, options: SessionOptions) -> AgentService {
        let bus = Arc::new(EventBus::default());
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new(tools)), bus.clone());
        let orchestrator = Orchestrator::new(provider, "scripted-model", dispatcher, bus.clone());
        AgentService::new(orchestrator, options, bus)
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let provider = ScriptedProvider::new(vec![text("unused")]);
        let agent = service(provider.clone(), vec![], SessionOptions::default());

        for query in ["", "   \n\t"] {
            let result = agent.get_response(query, &[HistoryEntry::user("earlier")]).await;
            assert_eq!(result, AgentResponse::default());
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn history_is_truncated_to_most_recent() {
        let provider = ScriptedProvider::new(vec![text("ok")]);
        let options = SessionOptions {
            history_max: 2,
            ..SessionOptions::default()
        };
        let agent = service(provider.clone(), vec![], options);

        let history = [
            HistoryEntry::user("q1"),
            HistoryEntry::assistant("a1"),
            HistoryEntry::user("q2"),
            HistoryEntry::assistant("a2"),
            HistoryEntry::user("q3"),
        ];
        agent.get_response("q4", &history).await;

        let requests = provider.requests();
        let contents: Vec<_> = requests[0].messages.iter().map(Message::content).collect();
        // system + 2 prior + new question
        assert_eq!(contents.len(), 4);
        assert_eq!(&contents[1..], ["a2", "q3", "q4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_times_out() {
        let options = SessionOptions {
            timeout: Duration::from_secs(1),
            ..SessionOptions::default()
        };
        let agent = service(Arc::new(PendingProvider), vec![], options);

        let result = agent.get_response("anything", &[]).await;
        assert_eq!(result.response, TIMEOUT_REPLY);
        assert!(result.chunks.is_empty());
        assert!(result.queries.is_empty());
    }

    #[tokio::test]
    async fn round_limit_has_fixed_reply_and_keeps_evidence() {
        let provider = ScriptedProvider::new(vec![
            tool_call(&[("c1", "stub", "one")]),
            tool_call(&[("c2", "stub", "two")]),
        ]);
        let bus = Arc::new(EventBus::default());
        let tools = ToolRegistry::new([Arc::new(StubTool::new("stub")) as Arc<dyn Tool>]);
        let dispatcher = ToolDispatcher::new(Arc::new(tools), bus.clone());
        let orchestrator =
            Orchestrator::new(provider, "scripted-model", dispatcher, bus.clone()).with_max_rounds(1);
        let agent = AgentService::new(orchestrator, SessionOptions::default(), bus);

        let result = agent.get_response("dig", &[]).await;
        assert_eq!(result.response, ROUND_LIMIT_REPLY);
        assert_eq!(result.queries, ["SELECT 'one'"]);
    }

    #[tokio::test]
    async fn provider_failure_is_reported_with_partial_evidence() {
        // Second model call finds the script exhausted
        let provider = ScriptedProvider::new(vec![tool_call(&[("c1", "stub", "one")])]);
        let agent = service(provider, vec![Arc::new(StubTool::new("stub"))], SessionOptions::default());

        let result = agent.get_response("dig", &[]).await;
        assert!(result.response.starts_with("Error: "), "{}", result.response);
        assert!(result.response.contains("script exhausted"));
        assert_eq!(result.queries, ["SELECT 'one'"]);
    }

    #[tokio::test]
    async fn empty_answer_gets_placeholder() {
        let provider = ScriptedProvider::new(vec![text("")]);
        let agent = service(provider, vec![], SessionOptions::default());
        assert_eq!(agent.get_response("hi", &[]).await.response, EMPTY_ANSWER_PLACEHOLDER);
    }

    #[tokio::test]
    async fn unknown_tool_is_recoverable() {
        let provider = ScriptedProvider::new(vec![
            tool_call(&[("c1", "web_search", "fraud news")]),
            text("I can only use the knowledge base and the database."),
        ]);
        let agent = service(provider.clone(), vec![], SessionOptions::default());

        let result = agent.get_response("search the web", &[]).await;
        assert_eq!(result.response, "I can only use the knowledge base and the database.");
        assert!(result.chunks.is_empty());
        assert!(result.queries.is_empty());

        let requests = provider.requests();
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.content(), "bad tool name, retry");
    }

    #[tokio::test]
    async fn session_events_bracket_the_run() {
        let provider = ScriptedProvider::new(vec![tool_call(&[("c1", "stub", "x")]), text("done")]);
        let agent = service(provider, vec![Arc::new(StubTool::new("stub"))], SessionOptions::default());
        let mut rx = agent.event_bus().subscribe();

        agent.get_response("go", &[]).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match &*event {
                DomainEvent::SessionStarted { .. } => "started",
                DomainEvent::ResponseGenerated { .. } => "response",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::SessionFinished { outcome, rounds, .. } => {
                    assert_eq!(*outcome, SessionOutcome::Completed);
                    assert_eq!(*rounds, 1);
                    "finished"
                }
            });
        }
        assert_eq!(kinds, ["started", "response", "tool", "response", "finished"]);
    }

    /// Records the level and message of every event.
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<std::sync::Mutex<Vec<(tracing::Level, String)>>>);

    impl CapturedEvents {
        fn level_of(&self, message: &str) -> Option<tracing::Level> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .find(|(_, m)| m == message)
                .map(|(level, _)| *level)
        }
    }

    struct MessageField<'a>(&'a mut String);

    impl tracing::field::Visit for MessageField<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedEvents {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            let mut message = String::new();
            event.record(&mut MessageField(&mut message));
            self.0.lock().unwrap().push((*event.metadata().level(), message));
        }
    }

    fn capture() -> (CapturedEvents, tracing::subscriber::DefaultGuard) {
        use tracing_subscriber::layer::SubscriberExt;
        let events = CapturedEvents::default();
        let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        (events, guard)
    }

    #[tokio::test]
    async fn fatal_failures_log_at_error_level() {
        let (events, _guard) = capture();
        let provider = ScriptedProvider::new(vec![]);
        let agent = service(provider, vec![], SessionOptions::default());

        agent.get_response("dig", &[]).await;
        assert_eq!(events.level_of("Session failed"), Some(tracing::Level::ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_log_at_error_level() {
        let (events, _guard) = capture();
        let options = SessionOptions {
            timeout: Duration::from_secs(1),
            ..SessionOptions::default()
        };
        let agent = service(Arc::new(PendingProvider), vec![], options);

        agent.get_response("anything", &[]).await;
        assert_eq!(events.level_of("Session timed out"), Some(tracing::Level::ERROR));
    }

    #[test]
    fn options_from_config() {
        let config = sleuth_config::AgentConfig::default();
        let options = SessionOptions::from(&config);
        assert_eq!(options.history_max, 20);
        assert_eq!(options.timeout, Duration::from_secs(180));
    }
}
