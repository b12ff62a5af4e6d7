use std::collections::HashMap;
use std::sync::Arc;

use crate::types::AdapterKind;

use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;
use super::traits::CallAdapter;

/// Registry of available adapters
pub struct AdapterRegistry {
    adapters: HashMap<AdapterKind, Arc<dyn CallAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build from environment: `ANTHROPIC_API_KEY` and `OPENAI_API_KEY`
    /// gate their adapters, Ollama is always registered (`OLLAMA_HOST`
    /// overrides the local default).
    pub fn from_env() -> Self {
        let mut registry = Self::new();
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            registry.register(Arc::new(AnthropicAdapter::new(key)));
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            registry.register(Arc::new(OpenAIAdapter::new(key)));
        }
        match std::env::var("OLLAMA_HOST") {
            Ok(host) => registry.register(Arc::new(OllamaAdapter::with_base_url(host))),
            Err(_) => registry.register(Arc::new(OllamaAdapter::new())),
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn CallAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: &AdapterKind) -> Option<Arc<dyn CallAdapter>> {
        self.adapters.get(kind).cloned()
    }

    pub fn has(&self, kind: &AdapterKind) -> bool {
        self.adapters.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<AdapterKind> {
        self.adapters.keys().cloned().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_register_and_get() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(AnthropicAdapter::new("sk-test")));
        registry.register(Arc::new(OllamaAdapter::new()));

        assert!(registry.has(&AdapterKind::Anthropic));
        assert!(registry.has(&AdapterKind::Ollama));
        assert!(!registry.has(&AdapterKind::OpenAI));

        let adapter = registry.get(&AdapterKind::Anthropic).unwrap();
        assert_eq!(adapter.kind(), AdapterKind::Anthropic);
    }

    #[test]
    fn registry_lists_kinds() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(OllamaAdapter::new()));

        let kinds = registry.kinds();
        assert_eq!(kinds.len(), 1);
        assert!(kinds.contains(&AdapterKind::Ollama));
    }

    #[test]
    fn registry_empty() {
        let registry = AdapterRegistry::new();
        assert!(registry.get(&AdapterKind::Anthropic).is_none());
        assert!(registry.kinds().is_empty());
    }

    #[test]
    fn register_replaces_same_kind() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(OllamaAdapter::new()));
        registry.register(Arc::new(OllamaAdapter::with_base_url("http://gpu-box:11434")));
        assert_eq!(registry.kinds().len(), 1);
    }
}
