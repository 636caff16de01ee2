//! Ask Pipeline
//!
//! Synthesizer → Guard → Executor → Summarizer, run sequentially per request against a
//! schema document built once at bootstrap. Nothing else survives between requests.

use crate::config::AskConfig;
use crate::error::{AskError, ErrorKind, Result};
use crate::execution::result::ResultSet;
use crate::execution_loop::{ErrorClassifier, RetryPolicy};
use crate::llm::{CompletionOracle, LlmClient};
use crate::safety_guardrails::{GuardAction, GuardedQuery, QueryGuard};
use crate::schema::{self, SchemaDocument};
use crate::sql_engine::{RelationalStore, SqlEngine, SqliteStore};
use crate::summarizer::ResultSummarizer;
use crate::synthesizer::QuerySynthesizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shown in place of the prose when the rows came back but the summary did not
pub const SUMMARY_PLACEHOLDER: &str = "The results are below, but a written summary could not be produced this time.";

/// Successful run of the pipeline
#[derive(Debug, Clone)]
pub struct Answer {
    pub summary: String,
    pub result: ResultSet,
    pub guarded: GuardedQuery,
    /// Set when the summary stage failed and `summary` is the placeholder
    pub summary_error: Option<ErrorKind>,
    /// Re-synthesis rounds spent on store errors
    pub repairs: u8,
}

/// What a shell receives for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub request_id: Uuid,
    pub summary: String,
    pub result: ResultSet,
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guard_actions: Vec<GuardAction>,
    pub error: Option<ErrorKind>,
    pub answered_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    config: AskConfig,
    schema: Arc<SchemaDocument>,
    synthesizer: QuerySynthesizer,
    guard: QueryGuard,
    engine: SqlEngine,
    summarizer: ResultSummarizer,
    classifier: ErrorClassifier,
}

impl Pipeline {
    /// Open the configured SQLite file and the HTTP oracle, then bootstrap
    pub fn from_config(config: AskConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.database, config.read_only)?;
        let oracle = LlmClient::new(&config.llm)?;
        Self::bootstrap(config, Arc::new(store), Arc::new(oracle))
    }

    /// Introspect the store once and wire up every stage
    pub fn bootstrap(
        config: AskConfig,
        store: Arc<dyn RelationalStore>,
        oracle: Arc<dyn CompletionOracle>,
    ) -> Result<Self> {
        let schema = Arc::new(schema::introspect(store.as_ref(), config.sample_rows)?);

        let retry = RetryPolicy::new(config.synthesis_attempts, config.retry_base_delay);
        let synthesizer = QuerySynthesizer::new(
            Arc::clone(&oracle),
            config.llm.synthesis.temperature,
            config.llm.timeout,
            retry,
        );
        let summarizer = ResultSummarizer::new(
            oracle,
            config.llm.summary.temperature,
            config.llm.timeout,
            config.summary_max_words,
            config.row_limit,
        );

        Ok(Self {
            guard: QueryGuard::new(config.row_limit, config.read_only),
            engine: SqlEngine::new(store, config.store_timeout),
            classifier: ErrorClassifier::new(),
            synthesizer,
            summarizer,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &Arc<SchemaDocument> {
        &self.schema
    }

    pub fn config(&self) -> &AskConfig {
        &self.config
    }

    /// Run one request end to end
    pub async fn run(&self, request: &str) -> Result<Answer> {
        let request = request.trim();
        if request.is_empty() {
            return Err(AskError::EmptyRequest);
        }
        info!("❓ Question: {}", request);

        let (guarded, result, repairs) = self.generate_and_execute(request).await?;

        let (summary, summary_error) = match self
            .summarizer
            .summarize(&result, request, &self.schema, &guarded)
            .await
        {
            Ok(summary) => (summary, None),
            Err(e) => {
                warn!("⚠️ Summary failed, returning rows only: {}", e);
                (SUMMARY_PLACEHOLDER.to_string(), Some(e.kind()))
            }
        };

        Ok(Answer {
            summary,
            result,
            guarded,
            summary_error,
            repairs,
        })
    }

    async fn generate_and_execute(&self, request: &str) -> Result<(GuardedQuery, ResultSet, u8)> {
        let mut candidate = self.synthesizer.synthesize(request, &self.schema).await?;
        let mut repairs: u8 = 0;
        let mut previous_diagnostic: Option<String> = None;

        loop {
            let guarded = self.guard.guard(&candidate)?;
            let diagnostic = match self.engine.execute(&guarded).await {
                Ok(result) => return Ok((guarded, result, repairs)),
                Err(AskError::Execution(diagnostic)) => diagnostic,
                Err(e) => return Err(e),
            };

            if repairs >= self.config.repair_attempts
                || previous_diagnostic.as_deref() == Some(diagnostic.as_str())
            {
                return Err(AskError::Execution(diagnostic));
            }
            let Some(hint) = self
                .classifier
                .repair_hint(&guarded.sql, &diagnostic, &self.schema)
            else {
                return Err(AskError::Execution(diagnostic));
            };

            repairs += 1;
            warn!(
                "🔧 Repair {} of {} after {}: {}",
                repairs, self.config.repair_attempts, hint.class, diagnostic
            );
            candidate = self
                .synthesizer
                .synthesize_with_hint(request, &self.schema, Some(&hint))
                .await?;
            previous_diagnostic = Some(diagnostic);
        }
    }

    /// Run one request and fold any failure into the response: the error text becomes
    /// the summary and the result is empty.
    pub async fn ask(&self, request: &str) -> PipelineResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("ask", request_id = %request_id);
        let start_time = Instant::now();

        let outcome = self.run(request).instrument(span).await;
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        match outcome {
            Ok(answer) => PipelineResponse {
                request_id,
                summary: answer.summary,
                result: answer.result,
                sql: Some(answer.guarded.sql),
                guard_actions: answer.guarded.actions,
                error: answer.summary_error,
                answered_at: Utc::now(),
                elapsed_ms,
            },
            Err(e) => {
                warn!(%request_id, "Request failed: {}", e);
                PipelineResponse {
                    request_id,
                    summary: e.to_string(),
                    result: ResultSet::empty(),
                    sql: None,
                    guard_actions: Vec::new(),
                    error: Some(e.kind()),
                    answered_at: Utc::now(),
                    elapsed_ms,
                }
            }
        }
    }
}
