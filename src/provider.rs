use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::{AgentConfig, ProviderKind};
use crate::types::{ChatMessage, Role};

/// One model reply plus the usage counters the run-level metrics accumulate.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Language-model provider seam. The core only supplies role/content pairs;
/// conversation encoding is each provider's concern.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, turns: &[ChatMessage], temperature: f32) -> Result<Completion>;
}

pub fn build_provider(config: &AgentConfig) -> Box<dyn ModelProvider> {
    match config.provider {
        ProviderKind::Openai => Box::new(OpenAiProvider::new(
            config.api_key.clone(),
            config.model.clone(),
        )),
        ProviderKind::Gemini => Box::new(GeminiProvider::new(
            config.api_key.clone(),
            config.model.clone(),
        )),
    }
}

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, turns: &[ChatMessage], temperature: f32) -> Result<Completion> {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": temperature,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(anyhow!("provider error ({status}): {message}"));
        }

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in model response: {body}"))?
            .to_string();

        Ok(Completion {
            text,
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        })
    }
}

/// Gemini `generateContent` endpoint. System turns map onto the system
/// instruction; assistant turns use the "model" role.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn send(&self, turns: &[ChatMessage], temperature: f32) -> Result<Completion> {
        let system_text: Vec<&str> = turns
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<serde_json::Value> = turns
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut payload = json!({
            "contents": contents,
            "generationConfig": {"temperature": temperature},
        });
        if !system_text.is_empty() {
            payload["systemInstruction"] =
                json!({"parts": [{"text": system_text.join("\n\n")}]});
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(anyhow!("provider error ({status}): {message}"));
        }

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in model response: {body}"))?
            .to_string();

        Ok(Completion {
            text,
            prompt_tokens: body["usageMetadata"]["promptTokenCount"]
                .as_u64()
                .unwrap_or(0),
            completion_tokens: body["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .unwrap_or(0),
        })
    }
}
