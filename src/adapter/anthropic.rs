use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{ChorusError, ChorusResult};
use crate::types::{AdapterKind, ChatRole, TokenUsage};

use super::traits::{CallAdapter, CallRequest, CallResponse};

pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.anthropic.com".into(),
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
        let api_messages: Vec<serde_json::Value> = request
            .chat_messages()
            .map(|m| {
                let role = match m.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                };
                json!({"role": role, "content": m.text})
            })
            .collect();

        json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": api_messages,
        })
    }

    fn parse_response(data: &serde_json::Value) -> ChorusResult<CallResponse> {
        let text = data
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b.get("type").and_then(|t| t.as_str()) == Some("text") {
                            b.get("text").and_then(|t| t.as_str())
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ChorusError::Adapter("Anthropic response missing content".into()))?;

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = data.get("usage").and_then(|u| {
            let input = u.get("input_tokens")?.as_u64()? as usize;
            let output = u.get("output_tokens")?.as_u64()? as usize;
            Some(TokenUsage::new(input, output))
        });

        Ok(CallResponse { text, model, usage })
    }
}

#[async_trait]
impl CallAdapter for AnthropicAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Anthropic
    }

    async fn complete(&self, request: &CallRequest) -> ChorusResult<CallResponse> {
        let body = self.build_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ChorusError::RateLimited {
                    adapter: "anthropic".into(),
                    retry_after_ms: 5000,
                });
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ChorusError::Auth(format!("Anthropic auth failed: {body}")));
            }
            return Err(ChorusError::Adapter(format!(
                "Anthropic API error {status}: {body}"
            )));
        }

        let data: serde_json::Value = response.json().await?;
        Self::parse_response(&data)
    }
}
