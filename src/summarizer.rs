//! Result Summarizer - second oracle call, turning rows into a short answer in plain language

use crate::agent_prompts::build_summary_prompt;
use crate::error::{AskError, Result, Stage};
use crate::execution::result::ResultSet;
use crate::execution_loop::with_timeout;
use crate::llm::{CompletionOracle, OracleCall};
use crate::safety_guardrails::GuardedQuery;
use crate::schema::SchemaDocument;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct ResultSummarizer {
    oracle: Arc<dyn CompletionOracle>,
    temperature: f32,
    timeout: Duration,
    max_words: usize,
    row_limit: u64,
}

impl ResultSummarizer {
    pub fn new(
        oracle: Arc<dyn CompletionOracle>,
        temperature: f32,
        timeout: Duration,
        max_words: usize,
        row_limit: u64,
    ) -> Self {
        Self {
            oracle,
            temperature,
            timeout,
            max_words,
            row_limit,
        }
    }

    /// One paragraph answering `request` from `result`. No retry.
    pub async fn summarize(
        &self,
        result: &ResultSet,
        request: &str,
        schema: &SchemaDocument,
        guarded: &GuardedQuery,
    ) -> Result<String> {
        let results_json = result.to_json().to_string();
        let prompt = build_summary_prompt(
            request,
            &guarded.sql,
            &results_json,
            schema.as_json_str(),
            self.row_limit,
        );

        let call = OracleCall {
            stage: Stage::Summary,
            prompt: &prompt,
            temperature: self.temperature,
        };
        let raw = with_timeout(Stage::Summary, self.timeout, self.oracle.complete(call))
            .await
            .map_err(|e| match e {
                AskError::Timeout { .. } => e,
                other => AskError::Summarization(other.to_string()),
            })?;
        debug!("Raw summary response: {}", raw);

        let summary = normalize_summary(&raw, self.max_words);
        if summary.is_empty() {
            return Err(AskError::Summarization("the model returned an empty answer".to_string()));
        }
        info!("📝 Summary ready ({} words)", summary.split_whitespace().count());
        Ok(summary)
    }
}

/// Collapse to a single paragraph and cap the word count
pub fn normalize_summary(raw: &str, max_words: usize) -> String {
    let words: Vec<&str> = raw.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }

    let mut capped = words[..max_words].join(" ");
    let trimmed_len = capped
        .trim_end_matches(|c: char| c == ',' || c == ';' || c == ':')
        .len();
    capped.truncate(trimmed_len);
    if !capped.ends_with(['.', '!', '?']) {
        capped.push('…');
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_joins_paragraphs() {
        let raw = "  The company has four departments.\n\nThey are Marketing,\nFinance and more.  ";
        assert_eq!(
            normalize_summary(raw, 200),
            "The company has four departments. They are Marketing, Finance and more."
        );
    }

    #[test]
    fn test_normalize_caps_word_count() {
        let raw = "one two three, four five";
        assert_eq!(normalize_summary(raw, 3), "one two three…");
        assert_eq!(normalize_summary("a b. c d", 2), "a b.");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_summary(" \n\t ", 200), "");
    }
}
