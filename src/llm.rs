//! Local LLM access (Ollama `/api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{CrmError, Result};
use crate::error_recovery::CircuitBreaker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub max_tokens: usize,
    /// Ask the model for a JSON object.
    pub json: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1500,
            json: false,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: usize,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Ollama client. Every call goes through the circuit breaker.
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    breaker: CircuitBreaker,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig, breaker: CircuitBreaker) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            breaker,
        })
    }

    async fn request(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.json.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| CrmError::Llm(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(CrmError::Llm(format!("Ollama returned status {}", resp.status())));
        }

        let result: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| CrmError::Llm(format!("invalid response body: {}", e)))?;
        Ok(result.response.trim().to_string())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        let started = std::time::Instant::now();
        let result = self.breaker.call(|| self.request(prompt, options)).await;
        match &result {
            Ok(text) => tracing::debug!(
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = text.len(),
                "LLM generation complete"
            ),
            Err(e) => tracing::warn!(model = %self.model, error = %e, "LLM generation failed"),
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull the first `{...}` object out of a model reply that may carry prose or code fences.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Canned replies for tests; `None` simulates an unreachable model.
    pub struct ScriptedModel {
        pub reply: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str, _options: GenerateOptions) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| CrmError::Llm("model unavailable".into()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
