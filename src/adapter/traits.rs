use crate::error::ChorusResult;
use crate::types::{AdapterKind, ChatRole, Message, TokenUsage};

/// A single completion request walking down a cascade tier
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f64,
}

impl CallRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    /// Total characters sent, for usage estimation when a backend reports none
    pub fn input_chars(&self) -> usize {
        self.system.len()
            + self
                .messages
                .iter()
                .map(|m| m.text.len())
                .sum::<usize>()
    }

    /// History without system messages; backends that take a separate system
    /// field must not see them twice
    pub fn chat_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != ChatRole::System)
    }
}

/// What came back from a backend
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub text: String,
    pub model: String,
    /// `None` when the backend reported no usage; the cascade then derives
    /// an estimate from character counts
    pub usage: Option<TokenUsage>,
}

/// Core adapter trait. Maps one request onto one backend API call.
#[async_trait::async_trait]
pub trait CallAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    async fn complete(&self, request: &CallRequest) -> ChorusResult<CallResponse>;
}
