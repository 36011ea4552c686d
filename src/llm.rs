//! Text-generation collaborator used by the LLM-assisted transcript segmenter.
//!
//! The pipeline only depends on [`TextGenerator`]; the client below talks to
//! the OpenAI chat completions API with bounded retry on rate limits and
//! server errors. A missing credential means the pipeline runs without LLM
//! assistance — the segmenter falls back to its deterministic mode.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{GrantRagError, Result};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate free text from a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// OpenAI chat completions client.
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    model: String,
    max_retries: usize,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(GrantRagError::Http)?;
        Ok(Self {
            client,
            api_key,
            model,
            max_retries: 2,
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let request = json!({
            "model": self.model,
            "messages": [ChatMessage { role: "user", content: prompt.to_string() }],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GrantRagError::Llm(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(GrantRagError::Llm(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GrantRagError::Llm(format!("failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GrantRagError::Llm("empty completion response".to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_retries => {
                    let message = e.to_string();
                    let retryable = message.contains("429")
                        || message.contains("500")
                        || message.contains("502")
                        || message.contains("503")
                        || message.contains("504");
                    if !retryable {
                        return Err(e);
                    }
                    log::warn!("Retry {}/{} after LLM error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
