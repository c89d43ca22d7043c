//! OpenAI-compatible chat-completions client used for reply generation.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use teller_agent::llm::LlmClient;
use teller_core::config::{LlmConfig, LlmProvider};

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::AsiOne => "https://api.asi1.ai/v1",
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Ollama => "http://localhost:11434/v1",
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
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

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(
            &json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.3,
                "max_tokens": 200,
                "stream": false,
            }),
        );
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("llm request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm returned {status}: {body}"));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.context("decoding llm response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("llm returned no choices"))
    }
}
