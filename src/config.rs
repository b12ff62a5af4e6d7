//! Runtime configuration.
//!
//! Everything is serde-loadable from a single JSON file and every field has
//! a default, so an empty `{}` is a valid config. Validation happens once at
//! load time; the rest of the crate assumes a validated config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChorusError, ChorusResult};
use crate::types::{AdapterKind, RoleName};

// ─── Cascade ─────────────────────────────────────────────────────────────────

/// One model tier in a role's fallback chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub model: String,
    pub adapter: AdapterKind,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl TierSpec {
    pub fn new(model: impl Into<String>, adapter: AdapterKind) -> Self {
        Self {
            model: model.into(),
            adapter,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_tokens() -> usize {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

/// Ordered tier chains per role band, with optional per-role overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_reasoning_tiers")]
    pub reasoning: Vec<TierSpec>,
    #[serde(default = "default_synthesis_tiers")]
    pub synthesis: Vec<TierSpec>,
    #[serde(default = "default_verification_tiers")]
    pub verification: Vec<TierSpec>,
    /// Keyed by role name (e.g. `"ethics"`); wins over the band chains
    #[serde(default)]
    pub overrides: HashMap<String, Vec<TierSpec>>,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl CascadeConfig {
    /// Resolve the tier chain a role should walk. Custom roles ride the
    /// reasoning band unless an override names them.
    pub fn tiers_for(&self, role: &RoleName) -> &[TierSpec] {
        if let Some(tiers) = self.overrides.get(&role.to_string()) {
            return tiers;
        }
        match role {
            RoleName::Synthesis => &self.synthesis,
            RoleName::Verification => &self.verification,
            _ => &self.reasoning,
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            reasoning: default_reasoning_tiers(),
            synthesis: default_synthesis_tiers(),
            verification: default_verification_tiers(),
            overrides: HashMap::new(),
            breaker: BreakerConfig::default(),
        }
    }
}

fn default_reasoning_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec::new("claude-3-5-haiku-latest", AdapterKind::Anthropic),
        TierSpec::new("gpt-4o-mini", AdapterKind::OpenAI),
        TierSpec::new("llama3.1:8b", AdapterKind::Ollama),
    ]
}

fn default_synthesis_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec::new("claude-sonnet-4-5", AdapterKind::Anthropic),
        TierSpec::new("gpt-4o", AdapterKind::OpenAI),
        TierSpec::new("llama3.1:70b", AdapterKind::Ollama),
    ]
}

fn default_verification_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec::new("claude-3-5-haiku-latest", AdapterKind::Anthropic),
        TierSpec::new("llama3.1:8b", AdapterKind::Ollama),
    ]
}

/// Failure circuit breaker, keyed per adapter/model binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_window_secs")]
    pub window_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_breaker_window_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_breaker_window_secs() -> u64 {
    120
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_repairs")]
    pub max_repairs: u32,
    #[serde(default = "default_reasoning_timeout_ms")]
    pub reasoning_timeout_ms: u64,
    #[serde(default = "default_verification_timeout_ms")]
    pub verification_timeout_ms: u64,
    /// Roles re-queried during a repair round
    #[serde(default = "default_repair_roles")]
    pub repair_roles: Vec<RoleName>,
    /// How many recent messages of history feed role prompts
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_repairs: default_max_repairs(),
            reasoning_timeout_ms: default_reasoning_timeout_ms(),
            verification_timeout_ms: default_verification_timeout_ms(),
            repair_roles: default_repair_roles(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_repairs() -> u32 {
    3
}

fn default_reasoning_timeout_ms() -> u64 {
    30_000
}

fn default_verification_timeout_ms() -> u64 {
    20_000
}

fn default_repair_roles() -> Vec<RoleName> {
    vec![RoleName::Analytical, RoleName::Relational]
}

fn default_history_window() -> usize {
    12
}

// ─── Verifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Post-check confidence below this triggers the soft veto
    #[serde(default = "default_post_check_threshold")]
    pub post_check_threshold: f64,
    /// How much trust drops when the soft veto fires
    #[serde(default = "default_trust_penalty")]
    pub trust_penalty: f64,
    /// Confidence assigned when the checker's reply cannot be parsed
    #[serde(default = "default_unparsable_confidence")]
    pub unparsable_confidence: f64,
    /// Cached facts injected into role context during the pre-sweep
    #[serde(default = "default_pre_sweep_limit")]
    pub pre_sweep_limit: usize,
    /// Most claims checked per answer
    #[serde(default = "default_max_claims")]
    pub max_claims: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            post_check_threshold: default_post_check_threshold(),
            trust_penalty: default_trust_penalty(),
            unparsable_confidence: default_unparsable_confidence(),
            pre_sweep_limit: default_pre_sweep_limit(),
            max_claims: default_max_claims(),
        }
    }
}

fn default_post_check_threshold() -> f64 {
    0.8
}

fn default_trust_penalty() -> f64 {
    0.15
}

fn default_unparsable_confidence() -> f64 {
    0.85
}

fn default_pre_sweep_limit() -> usize {
    5
}

fn default_max_claims() -> usize {
    5
}

// ─── Mycelium ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyceliumConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_relevance_limit")]
    pub relevance_limit: usize,
}

impl Default for MyceliumConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            max_entries: default_max_entries(),
            relevance_limit: default_relevance_limit(),
        }
    }
}

fn default_ttl_days() -> i64 {
    30
}

fn default_max_entries() -> usize {
    10_000
}

fn default_relevance_limit() -> usize {
    5
}

// ─── Top Level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChorusConfig {
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub mycelium: MyceliumConfig,
    /// Where session state is persisted; in-memory only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
}

impl ChorusConfig {
    pub async fn from_json_file(path: impl AsRef<Path>) -> ChorusResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: ChorusConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChorusResult<()> {
        for (band, tiers) in [
            ("reasoning", &self.cascade.reasoning),
            ("synthesis", &self.cascade.synthesis),
            ("verification", &self.cascade.verification),
        ] {
            if tiers.is_empty() {
                return Err(ChorusError::Config(format!(
                    "cascade.{band} must list at least one tier"
                )));
            }
        }
        for (role, tiers) in &self.cascade.overrides {
            if tiers.is_empty() {
                return Err(ChorusError::Config(format!(
                    "cascade.overrides.{role} must list at least one tier"
                )));
            }
        }
        if self.cascade.breaker.failure_threshold == 0 {
            return Err(ChorusError::Config(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.cascade.breaker.window_secs == 0 {
            return Err(ChorusError::Config(
                "breaker.window_secs must be positive".into(),
            ));
        }
        if self.pipeline.reasoning_timeout_ms == 0 || self.pipeline.verification_timeout_ms == 0 {
            return Err(ChorusError::Config("timeouts must be positive".into()));
        }
        for (name, v) in [
            ("verifier.post_check_threshold", self.verifier.post_check_threshold),
            ("verifier.trust_penalty", self.verifier.trust_penalty),
            ("verifier.unparsable_confidence", self.verifier.unparsable_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ChorusError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        if self.mycelium.ttl_days <= 0 {
            return Err(ChorusError::Config("mycelium.ttl_days must be positive".into()));
        }
        if self.mycelium.max_entries == 0 {
            return Err(ChorusError::Config("mycelium.max_entries must be positive".into()));
        }
        Ok(())
    }
}
