use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Sampling knobs forwarded to the text generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 256 }
    }
}

/// External text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: String, options: GenerationOptions) -> Result<String>;
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
    model: String,
    system: Option<String>,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama, model: impl Into<String>) -> Self {
        Self { client, model: model.into(), system: None }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    async fn generate(&self, prompt: String, options: GenerationOptions) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
        use ollama_rs::models::ModelOptions;

        let mut messages = Vec::new();
        if let Some(sys) = &self.system {
            messages.push(ChatMessage::system(sys.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        let model_options = ModelOptions::default()
            .temperature(options.temperature)
            .num_predict(options.max_tokens as i32);

        let res = self
            .client
            .send_chat_messages(ChatMessageRequest::new(self.model.clone(), messages).options(model_options))
            .await?;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAICompatibleProvider {
    async fn generate(&self, prompt: String, options: GenerationOptions) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from OpenAI response")?;

        Ok(content.to_string())
    }
}

/// Generator that is never reachable. Every call site falls back to its
/// canned content, which keeps the pipeline deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, _prompt: String, _options: GenerationOptions) -> Result<String> {
        Err(anyhow!("text generation is offline"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_generator_always_fails() {
        let generator = OfflineGenerator;
        let result = generator.generate("hello".into(), GenerationOptions::default()).await;
        assert!(result.is_err());
    }
}
