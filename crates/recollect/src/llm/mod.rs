//! Text-generation oracle.
//!
//! One capability: prompt in, text out. The engine supplies full context in
//! each prompt, so no multi-turn state is kept here.

pub mod prompts;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat-completions endpoint. Ollama and
/// most hosted providers serve this shape.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                cfg.endpoint.trim_end_matches('/')
            ),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": false
        });

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("LLM request to {} timed out", self.endpoint)
            } else if e.is_connect() {
                anyhow!("failed to connect to LLM at {}: {}", self.endpoint, e)
            } else {
                anyhow!("LLM request to {} failed: {}", self.endpoint, e)
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read LLM response from {}", self.endpoint))?;

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("LLM API error ({}): {}", status, preview));
        }

        // Gateways occasionally return HTML error pages with a 200.
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "LLM endpoint {} returned HTML instead of JSON: {}",
                self.endpoint,
                preview
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!("failed to parse LLM response: {}; body: {}", e, preview)
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no choices returned from LLM"))?;

        tracing::debug!(chars = choice.message.content.len(), "LLM response received");
        Ok(choice.message.content)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
