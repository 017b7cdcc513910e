//! Passage retrievers backing the knowledge lookup tool.
//!
//! - [`InMemoryRetriever`]: keyword scoring over a fixed document set,
//!   used for local corpora and tests.
//! - [`QdrantRetriever`]: embeds the query through a [`Provider`] and runs a
//!   similarity search against a Qdrant collection over its REST API.

use async_trait::async_trait;
use serde::Deserialize;
use sleuth_core::error::ToolError;
use sleuth_core::provider::{EmbeddingRequest, Provider};
use sleuth_core::state::EvidenceChunk;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Finds the passages most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Return at most `limit` chunks, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EvidenceChunk>, ToolError>;
}

/// A retriever over an in-memory document list.
pub struct InMemoryRetriever {
    documents: Vec<EvidenceChunk>,
}

impl InMemoryRetriever {
    pub fn new(documents: Vec<EvidenceChunk>) -> Self {
        Self { documents }
    }

    /// Load a JSON array of `{content, metadata}` records.
    pub fn from_json_file(path: &Path) -> Result<Self, ToolError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ToolError::failed("knowledge_lookup", format!("{}: {e}", path.display())))?;
        let documents: Vec<EvidenceChunk> = serde_json::from_str(&raw)
            .map_err(|e| ToolError::failed("knowledge_lookup", format!("{}: {e}", path.display())))?;
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EvidenceChunk>, ToolError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, &EvidenceChunk)> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let content = doc.content.to_lowercase();
                let hits: usize = query_terms.iter().map(|t| content.matches(t.as_str()).count()).sum();
                // Longer passages need more hits for the same score
                let score = hits as f64 / (content.len() as f64 / 100.0).max(1.0);
                (hits > 0).then_some((score, doc))
            })
            .collect();

        // Stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        debug!(query = %query, hits = scored.len(), "In-memory retrieval");

        Ok(scored
            .into_iter()
            .map(|(score, doc)| doc.clone().with_metadata("score", score))
            .collect())
    }
}

/// A retriever backed by a Qdrant collection.
///
/// Points are expected to carry the LangChain-style payload
/// `{"page_content": "...", "metadata": {...}}`.
pub struct QdrantRetriever {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
}

impl QdrantRetriever {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            embedder,
            embedding_model: embedding_model.into(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/collections/{}/points/search", self.base_url, self.collection)
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, ToolError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| ToolError::failed("knowledge_lookup", format!("embedding failed: {e}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::failed("knowledge_lookup", "embedding provider returned no vectors"))
    }
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    #[serde(default)]
    result: Vec<QdrantHit>,
}

#[derive(Debug, Deserialize)]
struct QdrantHit {
    id: serde_json::Value,
    score: f64,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl QdrantHit {
    fn into_chunk(self) -> EvidenceChunk {
        let mut payload = self.payload.unwrap_or_default();
        let content = match payload.remove("page_content").or_else(|| payload.remove("content")) {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut metadata = match payload.remove("metadata") {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert("id".into(), self.id);
        metadata.insert("score".into(), self.score.into());
        EvidenceChunk { content, metadata }
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EvidenceChunk>, ToolError> {
        let vector = self.embed(query).await?;

        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        debug!(collection = %self.collection, limit, "Sending Qdrant search");

        let response = self
            .client
            .post(self.search_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::failed("knowledge_lookup", format!("qdrant unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(
                "knowledge_lookup",
                format!("qdrant returned {status}: {body}"),
            ));
        }

        let parsed: QdrantSearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed("knowledge_lookup", format!("bad qdrant response: {e}")))?;

        Ok(parsed.result.into_iter().map(QdrantHit::into_chunk).collect())
    }
}
