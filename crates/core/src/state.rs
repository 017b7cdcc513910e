//! Conversation state and the deltas merged into it.
//!
//! [`ConversationState`] is the unit of truth carried through one session.
//! It only ever grows: [`ConversationState::merge`] appends a [`StateDelta`]
//! and nothing else can touch the underlying vectors, so the final state is
//! a replayable audit trail of the session.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// An opaque retrieved record (a passage plus whatever metadata the
/// retriever attached to it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub content: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EvidenceChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata key (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The incremental output of one step: new messages, chunks and query
/// statements, each in arrival order.
///
/// Deltas form a monoid: [`StateDelta::default`] is the identity and
/// [`StateDelta::then`] concatenates field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub chunks: Vec<EvidenceChunk>,
    pub queries: Vec<String>,
}

impl StateDelta {
    /// A delta carrying a single message.
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    /// Append `other` after `self`.
    pub fn then(mut self, other: StateDelta) -> Self {
        self.messages.extend(other.messages);
        self.chunks.extend(other.chunks);
        self.queries.extend(other.queries);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.chunks.is_empty() && self.queries.is_empty()
    }
}

impl FromIterator<StateDelta> for StateDelta {
    fn from_iter<I: IntoIterator<Item = StateDelta>>(iter: I) -> Self {
        iter.into_iter().fold(StateDelta::default(), StateDelta::then)
    }
}

/// Transcript plus the two evidence side channels of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
    chunks: Vec<EvidenceChunk>,
    queries: Vec<String>,
}

impl ConversationState {
    /// Seed a state with an initial transcript.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Append a delta. The only mutation a state supports.
    pub fn merge(&mut self, delta: StateDelta) {
        let StateDelta {
            messages,
            chunks,
            queries,
        } = delta;
        self.messages.extend(messages);
        self.chunks.extend(chunks);
        self.queries.extend(queries);
    }

    /// Consuming form of [`merge`](Self::merge).
    pub fn merged(mut self, delta: StateDelta) -> Self {
        self.merge(delta);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chunks(&self) -> &[EvidenceChunk] {
        &self.chunks
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Content of the most recent assistant turn, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Assistant { content, .. } => Some(content.as_str()),
                _ => None,
            })
    }

    /// Split into the two side channels, dropping the transcript.
    pub fn into_evidence(self) -> (Vec<EvidenceChunk>, Vec<String>) {
        (self.chunks, self.queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(msg: &str, chunk: Option<&str>, query: Option<&str>) -> StateDelta {
        StateDelta {
            messages: vec![Message::user(msg)],
            chunks: chunk.into_iter().map(EvidenceChunk::new).collect(),
            queries: query.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn merge_appends_in_arrival_order() {
        let mut state = ConversationState::new(vec![Message::user("q")]);
        state.merge(delta("a", Some("c1"), None));
        state.merge(delta("b", Some("c2"), Some("SELECT 1")));

        let contents: Vec<_> = state.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["q", "a", "b"]);
        assert_eq!(state.chunks()[0].content, "c1");
        assert_eq!(state.chunks()[1].content, "c2");
        assert_eq!(state.queries(), ["SELECT 1"]);
    }

    #[test]
    fn delta_concatenation_is_associative() {
        let (a, b, c) = (
            delta("a", Some("x"), None),
            delta("b", None, Some("q1")),
            delta("c", Some("y"), Some("q2")),
        );
        let left = a.clone().then(b.clone()).then(c.clone());
        let right = a.then(b.then(c));
        assert_eq!(left, right);
    }

    #[test]
    fn default_delta_is_identity() {
        let a = delta("a", Some("x"), Some("q"));
        assert_eq!(a.clone().then(StateDelta::default()), a);
        assert_eq!(StateDelta::default().then(a.clone()), a);

        let state = ConversationState::new(vec![Message::user("q")]);
        assert_eq!(state.clone().merged(StateDelta::default()), state);
    }

    #[test]
    fn merging_sequentially_equals_merging_the_fold() {
        let parts = vec![delta("a", Some("x"), None), delta("b", None, Some("q"))];

        let mut one_by_one = ConversationState::default();
        for d in parts.clone() {
            one_by_one.merge(d);
        }
        let folded = ConversationState::default().merged(parts.into_iter().collect());
        assert_eq!(one_by_one, folded);
    }

    #[test]
    fn last_assistant_text_skips_tool_messages() {
        let req = crate::message::ToolCallRequest::new("1", "t", serde_json::json!({}));
        let state = ConversationState::new(vec![
            Message::user("q"),
            Message::assistant("final"),
            Message::tool_result(&req, "late"),
        ]);
        assert_eq!(state.last_assistant_text(), Some("final"));
    }

    #[test]
    fn chunk_metadata_builder() {
        let chunk = EvidenceChunk::new("passage").with_metadata("source", "guide.pdf");
        assert_eq!(chunk.metadata["source"], "guide.pdf");
    }
}
