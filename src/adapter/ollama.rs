use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{ChorusError, ChorusResult};
use crate::types::{AdapterKind, ChatRole, TokenUsage};

use super::traits::{CallAdapter, CallRequest, CallResponse};

/// Local Ollama backend. No auth; usage comes from eval counts when the
/// server reports them.
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
}

impl OllamaAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "http://localhost:11434".into(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
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
            "messages": api_messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        })
    }

    fn parse_response(data: &serde_json::Value) -> ChorusResult<CallResponse> {
        let text = data
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| ChorusError::Adapter("Ollama response missing message".into()))?
            .to_string();

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = match (
            data.get("prompt_eval_count").and_then(|v| v.as_u64()),
            data.get("eval_count").and_then(|v| v.as_u64()),
        ) {
            (Some(input), Some(output)) => Some(TokenUsage::new(input as usize, output as usize)),
            _ => None,
        };

        Ok(CallResponse { text, model, usage })
    }
}

impl Default for OllamaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallAdapter for OllamaAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Ollama
    }

    async fn complete(&self, request: &CallRequest) -> ChorusResult<CallResponse> {
        let body = self.build_body(request);
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChorusError::Adapter(format!(
                "Ollama error {status}: {body}"
            )));
        }

        let data: serde_json::Value = response.json().await?;
        Self::parse_response(&data)
    }
}
