//! Faithfulness scoring for a finished answer.
//!
//! A judge model splits the answer into claims and marks each one as
//! supported or not by the evidence the session reported: the retrieved
//! passages plus the rows of every statement, re-run now. The score is the
//! supported share of claims, between 0 and 1.

use serde::{Deserialize, Serialize};
use sleuth_core::error::{Error, ProviderError};
use sleuth_core::message::Message;
use sleuth_core::provider::{Provider, ProviderRequest};
use sleuth_core::state::EvidenceChunk;
use sleuth_tools::text_to_sql::{StatementExecutor, ensure_read_only};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

const JUDGE_INSTRUCTIONS: &str = "\
You check answers written by a fraud analyst assistant against the evidence it used.

1. Break the answer into short, self-contained factual claims.
2. For each claim decide whether the evidence directly supports it. A claim
   that needs outside knowledge or contradicts the evidence is not supported.

Reply with JSON only, in this shape:
{\"claims\": [{\"statement\": \"...\", \"supported\": true}]}
Return an empty list when the answer makes no factual claims.";

/// An answer to score, in the shape `/chat` returns it plus the question.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalRequest {
    pub user_query: String,
    pub response: String,
    #[serde(default)]
    pub chunks: Vec<EvidenceChunk>,
    #[serde(default, alias = "sql")]
    pub queries: Vec<String>,
}

/// The judge's verdict on one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerdict {
    pub statement: String,
    pub supported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaithfulnessScore {
    /// Supported share of claims; `None` when the answer makes no claims.
    pub score: Option<f64>,
    pub claims: Vec<ClaimVerdict>,
}

#[derive(Deserialize)]
struct JudgeReply {
    #[serde(default)]
    claims: Vec<ClaimVerdict>,
}

pub struct FaithfulnessJudge {
    provider: Arc<dyn Provider>,
    model: String,
    executor: Option<Arc<dyn StatementExecutor>>,
    max_rows: usize,
}

impl FaithfulnessJudge {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            executor: None,
            max_rows: 100,
        }
    }

    /// Database used to re-run the answer's statements.
    pub fn with_executor(mut self, executor: Arc<dyn StatementExecutor>, max_rows: usize) -> Self {
        self.executor = Some(executor);
        self.max_rows = max_rows;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn evaluate(&self, request: &EvalRequest) -> Result<FaithfulnessScore, Error> {
        if request.response.trim().is_empty() {
            return Ok(FaithfulnessScore {
                score: None,
                claims: Vec::new(),
            });
        }

        let evidence = self.collect_evidence(request).await?;
        let judge_request = ProviderRequest {
            temperature: 0.0,
            ..ProviderRequest::simple(
                &self.model,
                vec![
                    Message::system(JUDGE_INSTRUCTIONS),
                    Message::user(judge_prompt(request, &evidence)),
                ],
            )
        };

        let reply = self.provider.complete(judge_request).await?;
        let claims = parse_verdicts(reply.message.content())?;
        let score = supported_share(&claims);

        info!(
            model = %reply.model,
            claims = claims.len(),
            evidence = evidence.len(),
            score = ?score,
            "Answer scored"
        );
        Ok(FaithfulnessScore { score, claims })
    }

    async fn collect_evidence(&self, request: &EvalRequest) -> Result<Vec<String>, Error> {
        let mut evidence: Vec<String> = request.chunks.iter().map(|c| c.content.clone()).collect();
        if request.queries.is_empty() {
            return Ok(evidence);
        }

        let executor = self.executor.as_ref().ok_or_else(|| Error::Config {
            message: "statements were given but no database is configured".into(),
        })?;

        for statement in &request.queries {
            let statement = ensure_read_only(statement)?;
            let rows = executor.execute(&statement).await?;
            debug!(statement = %statement, rows = rows.len(), "Re-ran statement for scoring");
            evidence.push(format!("Result of `{statement}`:\n{}", rows.render(self.max_rows)));
        }
        Ok(evidence)
    }
}

fn judge_prompt(request: &EvalRequest, evidence: &[String]) -> String {
    let mut prompt = format!("Question:\n{}\n\nEvidence:\n", request.user_query.trim());
    if evidence.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (i, item) in evidence.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, item.trim());
    }
    let _ = write!(prompt, "\nAnswer:\n{}", request.response.trim());
    prompt
}

/// Read the judge's JSON, tolerating a fenced block or surrounding prose.
fn parse_verdicts(reply: &str) -> Result<Vec<ClaimVerdict>, ProviderError> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(ProviderError::MalformedResponse(
                "judge reply holds no JSON object".into(),
            ));
        }
    };
    serde_json::from_str::<JudgeReply>(json)
        .map(|parsed| parsed.claims)
        .map_err(|e| ProviderError::MalformedResponse(format!("judge reply: {e}")))
}

fn supported_share(claims: &[ClaimVerdict]) -> Option<f64> {
    if claims.is_empty() {
        return None;
    }
    let supported = claims.iter().filter(|c| c.supported).count();
    Some(supported as f64 / claims.len() as f64)
}
