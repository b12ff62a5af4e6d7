//! Tiered model cascade.
//!
//! Each role resolves to an ordered chain of model tiers. A dispatch walks
//! the chain top down: tiers whose circuit is open are skipped without a
//! call, every attempt lands in telemetry, and the first success wins. Each
//! failure feeds the per-tier circuit breaker so a flapping backend stops
//! being called until its window clears.
//!
//! ```text
//! dispatch(role)
//!    │
//!    ├─ tier 0 ── circuit open? ──► skip
//!    ├─ tier 1 ── call ── error ──► breaker + next tier
//!    └─ tier 2 ── call ── ok ────► RoleResult
//! ```

mod breaker;

pub use breaker::{CircuitBreaker, CircuitState};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::{AdapterRegistry, CallRequest};
use crate::config::{CascadeConfig, TierSpec};
use crate::error::{ChorusError, ChorusResult};
use crate::telemetry::{AttemptOutcome, AttemptRecord, TelemetryHub};
use crate::types::{AdapterKind, Message, RoleName, RoleResult, TokenUsage};

/// Breaker key for a tier. The same model behind two adapters is two
/// separate circuits.
fn tier_key(tier: &TierSpec) -> String {
    format!("{}/{}", tier.adapter, tier.model)
}

/// Walks role tier chains and returns the first tier that answers
pub struct Cascade {
    config: CascadeConfig,
    registry: Arc<AdapterRegistry>,
    breaker: CircuitBreaker,
    telemetry: Arc<TelemetryHub>,
}

impl Cascade {
    pub fn new(
        config: CascadeConfig,
        registry: Arc<AdapterRegistry>,
        telemetry: Arc<TelemetryHub>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            config,
            registry,
            breaker,
            telemetry,
        }
    }

    /// Run one completion for `role`, falling through tiers until one
    /// answers. Errors only when every tier has been skipped or failed.
    pub async fn dispatch(
        &self,
        role: &RoleName,
        system: &str,
        messages: Vec<Message>,
        timeout: Duration,
        session_id: Option<&str>,
    ) -> ChorusResult<RoleResult> {
        let tiers = self.config.tiers_for(role);
        let mut attempts = 0usize;
        let mut last_error = String::from("no tiers configured");

        for (index, tier) in tiers.iter().enumerate() {
            let key = tier_key(tier);
            if self.breaker.is_open(&key) {
                self.record_attempt(
                    session_id,
                    role,
                    &tier.model,
                    &tier.adapter,
                    index,
                    AttemptOutcome::CircuitSkipped,
                    0,
                    None,
                );
                last_error = ChorusError::CircuitOpen {
                    binding: key.clone(),
                }
                .to_string();
                continue;
            }

            let Some(adapter) = self.registry.get(&tier.adapter) else {
                last_error = format!("no {} adapter registered", tier.adapter);
                self.record_attempt(
                    session_id,
                    role,
                    &tier.model,
                    &tier.adapter,
                    index,
                    AttemptOutcome::Failed {
                        error: last_error.clone(),
                    },
                    0,
                    None,
                );
                continue;
            };

            let request = CallRequest {
                model: tier.model.clone(),
                system: system.to_string(),
                messages: messages.clone(),
                max_tokens: tier.max_tokens,
                temperature: tier.temperature,
            };

            attempts += 1;
            let started = Instant::now();
            match tokio::time::timeout(timeout, adapter.complete(&request)).await {
                Err(_) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    self.breaker.record_failure(&key);
                    last_error = ChorusError::TierTimeout {
                        model: tier.model.clone(),
                        elapsed_ms: elapsed,
                    }
                    .to_string();
                    tracing::warn!("Tier {} timed out for {role}: {}", index, tier.model);
                    self.record_attempt(
                        session_id,
                        role,
                        &tier.model,
                        &tier.adapter,
                        index,
                        AttemptOutcome::TimedOut,
                        elapsed,
                        None,
                    );
                }
                Ok(Err(err)) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    self.breaker.record_failure(&key);
                    last_error = err.to_string();
                    self.record_attempt(
                        session_id,
                        role,
                        &tier.model,
                        &tier.adapter,
                        index,
                        AttemptOutcome::Failed {
                            error: last_error.clone(),
                        },
                        elapsed,
                        None,
                    );
                }
                Ok(Ok(response)) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    self.breaker.record_success(&key);
                    let usage = response.usage.unwrap_or_else(|| {
                        TokenUsage::estimated_from_chars(
                            request.input_chars(),
                            response.text.len(),
                        )
                    });
                    let cost = estimate_cost(&usage, &tier.model, &tier.adapter);
                    self.record_attempt(
                        session_id,
                        role,
                        &tier.model,
                        &tier.adapter,
                        index,
                        AttemptOutcome::Succeeded,
                        elapsed,
                        Some(usage),
                    );
                    let model = if response.model.is_empty() {
                        tier.model.clone()
                    } else {
                        response.model
                    };
                    return Ok(RoleResult {
                        role: role.clone(),
                        text: response.text,
                        model: Some(model),
                        tier: Some(index),
                        usage,
                        latency_ms: elapsed,
                        cost_usd: cost,
                        success: true,
                        error: None,
                    });
                }
            }
        }

        Err(ChorusError::CascadeExhausted {
            role: role.to_string(),
            attempts,
            last_error,
        })
    }

    /// Circuit states for health reporting
    pub fn circuit_snapshot(&self) -> Vec<CircuitState> {
        self.breaker.snapshot()
    }

    #[allow(clippy::too_many_arguments)]
    fn record_attempt(
        &self,
        session_id: Option<&str>,
        role: &RoleName,
        model: &str,
        adapter: &AdapterKind,
        tier: usize,
        outcome: AttemptOutcome,
        latency_ms: u64,
        usage: Option<TokenUsage>,
    ) {
        let cost = usage
            .as_ref()
            .map(|u| estimate_cost(u, model, adapter))
            .unwrap_or(0.0);
        self.telemetry.attempt(
            session_id,
            AttemptRecord {
                role: role.clone(),
                model: model.to_string(),
                adapter: adapter.clone(),
                tier,
                outcome,
                latency_ms,
                usage,
                estimated_cost_usd: cost,
            },
        );
    }
}

// ─── Pricing ─────────────────────────────────────────────────────────────────

/// Returns (cost_per_input_token, cost_per_output_token) in USD for a model.
pub fn cost_per_token(model_id: &str) -> (f64, f64) {
    match model_id {
        // Anthropic
        "claude-opus-4-6" | "claude-opus-4-20250514" => (0.000015, 0.000075),
        "claude-sonnet-4-5" | "claude-sonnet-4-5-20250929" => (0.000003, 0.000015),
        "claude-3-5-haiku-latest" | "claude-3-5-haiku-20241022" => (0.0000008, 0.000004),

        // OpenAI
        "gpt-4o" | "gpt-4o-2024-11-20" => (0.0000025, 0.00001),
        "gpt-4o-mini" | "gpt-4o-mini-2024-07-18" => (0.00000015, 0.0000006),
        "o3-mini" => (0.0000011, 0.0000044),

        // Fallback: conservative estimate
        _ => (0.000003, 0.000015),
    }
}

/// Cost of one attempt. Local backends are free; everything else uses the
/// pricing table.
pub fn estimate_cost(usage: &TokenUsage, model_id: &str, adapter: &AdapterKind) -> f64 {
    if matches!(adapter, AdapterKind::Ollama) {
        return 0.0;
    }
    let (input_rate, output_rate) = cost_per_token(model_id);
    usage.input_tokens as f64 * input_rate + usage.output_tokens as f64 * output_rate
}
