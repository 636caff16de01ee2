use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage an error or timeout is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Synthesis,
    Execution,
    Summary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Synthesis => write!(f, "query synthesis"),
            Stage::Execution => write!(f, "query execution"),
            Stage::Summary => write!(f, "result summary"),
        }
    }
}

/// Why an oracle reply could not be turned into a statement
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("Could not extract a valid query from the model's answer.")]
    NoJson,

    #[error("No SQL statement was produced in the model's answer.")]
    NoStatement,
}

#[derive(Error, Debug)]
pub enum AskError {
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("{0}")]
    SynthesisParse(#[from] ParseFailure),

    #[error("Query rejected: {0}")]
    GuardRejected(String),

    /// Store diagnostic, verbatim
    #[error("{0}")]
    Execution(String),

    #[error("Summary unavailable: {0}")]
    Summarization(String),

    #[error("{stage} timed out after {}s", .after.as_secs_f32())]
    Timeout { stage: Stage, after: Duration },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Please enter a question about the data.")]
    EmptyRequest,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error category reported to the shell alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaUnavailable,
    SynthesisParse,
    GuardRejected,
    Execution,
    Summarization,
    Timeout,
    Llm,
    EmptyRequest,
    Internal,
}

impl AskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AskError::SchemaUnavailable(_) => ErrorKind::SchemaUnavailable,
            AskError::SynthesisParse(_) => ErrorKind::SynthesisParse,
            AskError::GuardRejected(_) => ErrorKind::GuardRejected,
            AskError::Execution(_) => ErrorKind::Execution,
            AskError::Summarization(_) => ErrorKind::Summarization,
            AskError::Timeout { .. } => ErrorKind::Timeout,
            AskError::Llm(_) => ErrorKind::Llm,
            AskError::EmptyRequest => ErrorKind::EmptyRequest,
            AskError::Config(_) | AskError::Io(_) | AskError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Errors worth another synthesis attempt
    pub fn is_retryable_synthesis(&self) -> bool {
        matches!(self, AskError::SynthesisParse(_) | AskError::Llm(_))
    }
}

pub type Result<T> = std::result::Result<T, AskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_verbatim() {
        let err = AskError::Execution("no such column: salary_total".to_string());
        assert_eq!(err.to_string(), "no such column: salary_total");
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_timeout_names_stage() {
        let err = AskError::Timeout {
            stage: Stage::Synthesis,
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "query synthesis timed out after 2s");
    }

    #[test]
    fn test_parse_failures_are_retryable() {
        assert!(AskError::from(ParseFailure::NoJson).is_retryable_synthesis());
        assert!(AskError::Llm("502".to_string()).is_retryable_synthesis());
        assert!(!AskError::Execution("boom".to_string()).is_retryable_synthesis());
    }
}
