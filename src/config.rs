//! Runtime configuration
//!
//! `AskConfig` is what the pipeline consumes. `ConfigArgs` is the clap surface shared by
//! the CLI and the HTTP server; every flag falls back to an environment variable so a
//! `.env` file is enough to run either binary.

use crate::error::{AskError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROW_LIMIT: u64 = 50;
pub const DEFAULT_SAMPLE_ROWS: usize = 3;
pub const DEFAULT_SUMMARY_WORDS: usize = 200;

/// Which completion API the oracle client speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Environment variable holding the credential for this provider
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn default_models(&self) -> (&'static str, &'static str) {
        match self {
            Provider::Gemini => ("gemini-1.5-pro", "gemini-1.5-flash"),
            Provider::OpenAi => ("gpt-4o", "gpt-4o-mini"),
        }
    }
}

/// Model and randomness used for one oracle call site.
///
/// Synthesis favours precision, summaries may be more creative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub synthesis: StageSettings,
    pub summary: StageSettings,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(provider: Provider, api_key: String) -> Self {
        let (synthesis_model, summary_model) = provider.default_models();
        Self {
            provider,
            api_key,
            base_url: provider.default_base_url().to_string(),
            synthesis: StageSettings {
                model: synthesis_model.to_string(),
                temperature: 0.6,
            },
            summary: StageSettings {
                model: summary_model.to_string(),
                temperature: 1.5,
            },
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskConfig {
    pub database: PathBuf,
    /// Reject anything but a single read query, and open the store read-only
    pub read_only: bool,
    pub row_limit: u64,
    pub sample_rows: usize,
    pub summary_max_words: usize,
    pub store_timeout: Duration,
    pub synthesis_attempts: u8,
    pub retry_base_delay: Duration,
    /// Extra synthesis rounds fed with the store diagnostic; 0 disables self-correction
    pub repair_attempts: u8,
    pub llm: LlmConfig,
}

impl AskConfig {
    pub fn new(database: impl Into<PathBuf>, llm: LlmConfig) -> Self {
        Self {
            database: database.into(),
            read_only: true,
            row_limit: DEFAULT_ROW_LIMIT,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            summary_max_words: DEFAULT_SUMMARY_WORDS,
            store_timeout: Duration::from_secs(30),
            synthesis_attempts: 2,
            retry_base_delay: Duration::from_millis(250),
            repair_attempts: 0,
            llm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (stage, settings) in [("synthesis", &self.llm.synthesis), ("summary", &self.llm.summary)] {
            if !(0.0..=2.0).contains(&settings.temperature) {
                return Err(AskError::Config(format!(
                    "{} temperature must be between 0 and 2, got {}",
                    stage, settings.temperature
                )));
            }
            if settings.model.trim().is_empty() {
                return Err(AskError::Config(format!("{} model name is empty", stage)));
            }
        }
        if self.row_limit == 0 {
            return Err(AskError::Config("row limit must be at least 1".to_string()));
        }
        if self.synthesis_attempts == 0 {
            return Err(AskError::Config(
                "at least one synthesis attempt is required".to_string(),
            ));
        }
        if self.summary_max_words == 0 {
            return Err(AskError::Config("summary word cap must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Command-line / environment surface shared by both binaries
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the SQLite database to query
    #[arg(short, long, env = "ASKDB_DATABASE", default_value = "employees.db")]
    pub database: PathBuf,

    /// Completion API to use
    #[arg(long, env = "ASKDB_PROVIDER", value_enum, default_value_t = Provider::Gemini)]
    pub provider: Provider,

    /// API key (defaults to GEMINI_KEY or OPENAI_API_KEY depending on the provider)
    #[arg(long, env = "ASKDB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[arg(long, env = "ASKDB_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "ASKDB_SYNTHESIS_MODEL")]
    pub synthesis_model: Option<String>,

    #[arg(long, env = "ASKDB_SUMMARY_MODEL")]
    pub summary_model: Option<String>,

    /// Randomness for query generation (lower is more deterministic)
    #[arg(long, env = "ASKDB_SYNTHESIS_TEMPERATURE")]
    pub synthesis_temperature: Option<f32>,

    /// Randomness for the prose summary
    #[arg(long, env = "ASKDB_SUMMARY_TEMPERATURE")]
    pub summary_temperature: Option<f32>,

    /// Upper bound on rows returned by any generated query
    #[arg(long, env = "ASKDB_ROW_LIMIT", default_value_t = DEFAULT_ROW_LIMIT)]
    pub row_limit: u64,

    /// Allow statements other than a single read query
    #[arg(long, env = "ASKDB_ALLOW_WRITES")]
    pub allow_writes: bool,

    #[arg(long, env = "ASKDB_SYNTHESIS_ATTEMPTS", default_value_t = 2)]
    pub synthesis_attempts: u8,

    /// Re-synthesis rounds after a store error (0 = report the error as is)
    #[arg(long, env = "ASKDB_REPAIR_ATTEMPTS", default_value_t = 0)]
    pub repair_attempts: u8,

    #[arg(long, env = "ASKDB_ORACLE_TIMEOUT_SECS", default_value_t = 60)]
    pub oracle_timeout_secs: u64,

    #[arg(long, env = "ASKDB_STORE_TIMEOUT_SECS", default_value_t = 30)]
    pub store_timeout_secs: u64,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<AskConfig> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var(self.provider.api_key_var()).ok())
            .ok_or_else(|| {
                AskError::Config(format!(
                    "no API key: pass --api-key or set {}",
                    self.provider.api_key_var()
                ))
            })?;

        let mut llm = LlmConfig::new(self.provider, api_key);
        if let Some(base_url) = self.base_url {
            llm.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = self.synthesis_model {
            llm.synthesis.model = model;
        }
        if let Some(model) = self.summary_model {
            llm.summary.model = model;
        }
        if let Some(temperature) = self.synthesis_temperature {
            llm.synthesis.temperature = temperature;
        }
        if let Some(temperature) = self.summary_temperature {
            llm.summary.temperature = temperature;
        }
        llm.timeout = Duration::from_secs(self.oracle_timeout_secs);

        let mut config = AskConfig::new(self.database, llm);
        config.read_only = !self.allow_writes;
        config.row_limit = self.row_limit;
        config.synthesis_attempts = self.synthesis_attempts;
        config.repair_attempts = self.repair_attempts;
        config.store_timeout = Duration::from_secs(self.store_timeout_secs);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AskConfig {
        AskConfig::new("employees.db", LlmConfig::new(Provider::Gemini, "key".to_string()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.row_limit, 50);
        assert_eq!(config.sample_rows, 3);
        assert!(config.read_only);
        assert!(config.llm.synthesis.temperature < config.llm.summary.temperature);
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        let mut config = config();
        config.llm.summary.temperature = 3.5;
        assert!(matches!(config.validate(), Err(AskError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_row_limit() {
        let mut config = config();
        config.row_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_prefer_explicit_api_key() {
        let args = ConfigArgs {
            database: PathBuf::from("hr.db"),
            provider: Provider::OpenAi,
            api_key: Some("sk-test".to_string()),
            base_url: Some("http://localhost:8000/v1/".to_string()),
            synthesis_model: None,
            summary_model: Some("small".to_string()),
            synthesis_temperature: Some(0.2),
            summary_temperature: None,
            row_limit: 20,
            allow_writes: false,
            synthesis_attempts: 3,
            repair_attempts: 1,
            oracle_timeout_secs: 5,
            store_timeout_secs: 5,
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.base_url, "http://localhost:8000/v1");
        assert_eq!(config.llm.summary.model, "small");
        assert_eq!(config.llm.synthesis.temperature, 0.2);
        assert_eq!(config.row_limit, 20);
        assert_eq!(config.repair_attempts, 1);
    }
}
