pub mod agent_prompts;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod json_extract;
pub mod llm;
pub mod pipeline;
pub mod safety_guardrails;
pub mod schema;
pub mod server;
pub mod sql_engine;
pub mod summarizer;
pub mod synthesizer;
pub mod telemetry;

pub use error::{AskError, ErrorKind, Result};
pub use pipeline::{Answer, Pipeline, PipelineResponse};
