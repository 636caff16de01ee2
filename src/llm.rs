//! Completion oracle
//!
//! The pipeline talks to the language model only through [`CompletionOracle`]: a prompt
//! and a randomness setting in, free-form text out. [`LlmClient`] implements it over
//! HTTP for Gemini and for OpenAI-compatible chat endpoints.

use crate::config::{LlmConfig, Provider, StageSettings};
use crate::error::{AskError, Result, Stage};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// One call to the oracle
#[derive(Debug, Clone, Copy)]
pub struct OracleCall<'a> {
    pub stage: Stage,
    pub prompt: &'a str,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(&self, call: OracleCall<'_>) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    synthesis: StageSettings,
    summary: StageSettings,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AskError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            synthesis: config.synthesis.clone(),
            summary: config.summary.clone(),
        })
    }

    fn model_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Summary => &self.summary.model,
            _ => &self.synthesis.model,
        }
    }

    async fn call_gemini(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]}
            ],
            "generationConfig": {"temperature": temperature}
        });

        let response = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json = read_json(response).await?;
        extract_gemini_text(&response_json)
    }

    async fn call_openai(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json = read_json(response).await?;
        extract_openai_content(&response_json)
    }
}

#[async_trait]
impl CompletionOracle for LlmClient {
    async fn complete(&self, call: OracleCall<'_>) -> Result<String> {
        let model = self.model_for(call.stage);
        debug!(
            stage = %call.stage,
            model,
            temperature = call.temperature,
            prompt_chars = call.prompt.len(),
            "calling completion API"
        );

        match self.provider {
            Provider::Gemini => self.call_gemini(model, call.prompt, call.temperature).await,
            Provider::OpenAi => self.call_openai(model, call.prompt, call.temperature).await,
        }
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(AskError::Llm(format!("LLM API error ({}): {}", status, error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| AskError::Llm(format!("Failed to parse LLM response: {}", e)))
}

fn extract_gemini_text(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AskError::Llm(format!("LLM API error: {}", error)));
    }

    let parts = response_json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = response_json["promptFeedback"]["blockReason"]
                .as_str()
                .or_else(|| response_json["candidates"][0]["finishReason"].as_str())
                .unwrap_or("no candidates");
            AskError::Llm(format!("No content in LLM response ({})", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(AskError::Llm("Empty content in LLM response".to_string()));
    }
    Ok(text)
}

fn extract_openai_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AskError::Llm(format!("LLM API error: {}", error)));
    }

    let content = response_json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AskError::Llm("No content in LLM response".to_string()))?;

    if content.trim().is_empty() {
        return Err(AskError::Llm("Empty content in LLM response".to_string()));
    }
    Ok(content.to_string())
}
