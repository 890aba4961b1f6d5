//! OpenAI-compatible chat completion client (Typhoon by default)

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{CompletionProvider, OracleConfig, PromptMessage};
use crate::error::{MorduError, MorduResult};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    repetition_penalty: f32,
    stream: bool,
}

pub struct TyphoonClient {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: String,
}

impl TyphoonClient {
    pub fn new(config: OracleConfig, api_key: impl Into<String>) -> MorduResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MorduError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CompletionProvider for TyphoonClient {
    async fn complete(&self, system_prompt: &str, messages: &[PromptMessage]) -> MorduResult<String> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(PromptMessage::system(system_prompt));
        prompt.extend_from_slice(messages);

        let request = CompletionRequest {
            model: &self.config.model,
            messages: prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            repetition_penalty: self.config.repetition_penalty,
            stream: false,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(MorduError::Internal(format!(
                "completion API error {}: {}",
                status, error
            )));
        }

        let result: serde_json::Value = response.json().await?;
        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(MorduError::Internal(
                "completion API returned no content".to_string(),
            ));
        }
        Ok(content)
    }
}
