mod traits;
mod anthropic;
mod openai;
mod ollama;
mod registry;

pub use traits::*;
pub use anthropic::AnthropicAdapter;
pub use openai::OpenAIAdapter;
pub use ollama::OllamaAdapter;
pub use registry::AdapterRegistry;
