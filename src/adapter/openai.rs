use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{ChorusError, ChorusResult};
use crate::types::{AdapterKind, ChatRole, TokenUsage};

use super::traits::{CallAdapter, CallRequest, CallResponse};

pub struct OpenAIAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAIAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openai.com".into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_body(&self, request: &CallRequest) -> serde_json::Value {
        let mut api_messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            api_messages.push(json!({"role": "system", "content": request.system}));
        }
        for m in &request.messages {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            api_messages.push(json!({"role": role, "content": m.text}));
        }

        json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": api_messages,
        })
    }

    fn parse_response(data: &serde_json::Value) -> ChorusResult<CallResponse> {
        let text = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| ChorusError::Adapter("OpenAI response missing choices".into()))?
            .to_string();

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = data.get("usage").and_then(|u| {
            let input = u.get("prompt_tokens")?.as_u64()? as usize;
            let output = u.get("completion_tokens")?.as_u64()? as usize;
            Some(TokenUsage::new(input, output))
        });

        Ok(CallResponse { text, model, usage })
    }
}

#[async_trait]
impl CallAdapter for OpenAIAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::OpenAI
    }

    async fn complete(&self, request: &CallRequest) -> ChorusResult<CallResponse> {
        let body = self.build_body(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ChorusError::RateLimited {
                    adapter: "openai".into(),
                    retry_after_ms: 5000,
                });
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ChorusError::Auth(format!("OpenAI auth failed: {body}")));
            }
            return Err(ChorusError::Adapter(format!(
                "OpenAI API error {status}: {body}"
            )));
        }

        let data: serde_json::Value = response.json().await?;
        Self::parse_response(&data)
    }
}
