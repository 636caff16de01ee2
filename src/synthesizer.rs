//! Query Synthesizer
//!
//! Sends the request and the schema document to the oracle and parses the reply into a
//! single candidate statement.

use crate::agent_prompts::build_synthesis_prompt;
use crate::error::{ParseFailure, Result, Stage};
use crate::execution_loop::{with_timeout, RepairHint, RetryPolicy};
use crate::json_extract::json_objects;
use crate::llm::{CompletionOracle, OracleCall};
use crate::schema::SchemaDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Statement proposed by the oracle, with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub sql: String,
    pub raw_response: String,
    /// Synthesis attempts it took to get a parseable reply
    pub attempts: u8,
}

/// Pull the statement out of a reply shaped `{"query": [{"SQL": "..."}]}`.
///
/// The first extracted object carrying a non-empty statement wins. The statement is
/// returned exactly as written by the model.
pub fn parse_candidate(raw: &str) -> std::result::Result<String, ParseFailure> {
    let objects = json_objects(raw);
    if objects.is_empty() {
        return Err(ParseFailure::NoJson);
    }

    objects
        .iter()
        .find_map(statement_of)
        .map(str::to_string)
        .ok_or(ParseFailure::NoStatement)
}

fn statement_of(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("query")
        .and_then(|query| query.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("SQL"))
        .and_then(|sql| sql.as_str())
        .filter(|sql| !sql.trim().is_empty())
}

pub struct QuerySynthesizer {
    oracle: Arc<dyn CompletionOracle>,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl QuerySynthesizer {
    pub fn new(
        oracle: Arc<dyn CompletionOracle>,
        temperature: f32,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            oracle,
            temperature,
            timeout,
            retry,
        }
    }

    pub async fn synthesize(&self, request: &str, schema: &SchemaDocument) -> Result<CandidateQuery> {
        self.synthesize_with_hint(request, schema, None).await
    }

    /// Synthesize, optionally telling the oracle why its previous statement failed
    pub async fn synthesize_with_hint(
        &self,
        request: &str,
        schema: &SchemaDocument,
        hint: Option<&RepairHint>,
    ) -> Result<CandidateQuery> {
        let prompt = build_synthesis_prompt(schema.as_json_str(), request, hint);
        let mut attempt: u8 = 0;

        loop {
            attempt += 1;
            match self.attempt(&prompt).await {
                Ok((sql, raw_response)) => {
                    info!("🧠 Synthesized SQL on attempt {}: {}", attempt, sql);
                    return Ok(CandidateQuery {
                        sql,
                        raw_response,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable_synthesis() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Synthesis attempt {} of {} failed: {}. Retrying in {}ms",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<(String, String)> {
        let call = OracleCall {
            stage: Stage::Synthesis,
            prompt,
            temperature: self.temperature,
        };
        let raw = with_timeout(Stage::Synthesis, self.timeout, self.oracle.complete(call)).await?;
        debug!("Raw model response: {}", raw);

        let sql = parse_candidate(&raw)?;
        Ok((sql, raw))
    }
}
