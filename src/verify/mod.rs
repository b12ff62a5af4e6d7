//! Verification layer.
//!
//! Two passes per turn. The pre-sweep runs before role fan-out: it pulls
//! checkable claims out of the user input, answers them from the fact web
//! when the hash matches, and dispatches only the misses to the
//! verification role. The post-check runs after synthesis and re-verifies
//! the whole candidate answer; low confidence is a soft veto the pipeline
//! turns into a caveat, never a block.
//!
//! Checker outages and unparsable replies degrade to medium confidence
//! instead of failing the turn.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cascade::Cascade;
use crate::config::VerifierConfig;
use crate::mycelium::{claim_key, Mycelium, VerifiedFact};
use crate::prompts;
use crate::types::{clamp01, extract_json_object, parse_confidence, Message, RoleName};

/// Result of re-verifying a synthesized answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCheck {
    pub confidence: f64,
    pub verified_facts: Vec<VerifiedFact>,
    /// True when confidence fell below the configured threshold
    pub discrepancy: bool,
    pub corrections: Vec<String>,
}

/// Structured reply expected from the verification role
#[derive(Debug, Deserialize)]
struct CheckReply {
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
}

fn parse_check_reply(text: &str) -> Option<CheckReply> {
    serde_json::from_value(extract_json_object(text)?).ok()
}

/// Declarative sentences worth checking: long enough to carry a claim, not
/// questions or exclamations.
pub fn extract_claims(text: &str, max: usize) -> Vec<String> {
    text.split(['.', '\n'])
        .map(str::trim)
        .filter(|s| s.len() > 20 && !s.contains('?') && !s.contains('!'))
        .take(max)
        .map(String::from)
        .collect()
}

pub struct Verifier {
    cascade: Arc<Cascade>,
    mycelium: Arc<Mycelium>,
    config: VerifierConfig,
    timeout: Duration,
}

impl Verifier {
    pub fn new(
        cascade: Arc<Cascade>,
        mycelium: Arc<Mycelium>,
        config: VerifierConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            cascade,
            mycelium,
            config,
            timeout,
        }
    }

    /// Corroborate the input's claims before the roles run. Returns the
    /// facts to inject into role context, capped at the configured limit.
    /// Never fails; a checker outage just yields fewer facts.
    pub async fn pre_sweep(
        &self,
        session_id: Option<&str>,
        query: &str,
        history: &[Message],
    ) -> Vec<VerifiedFact> {
        let mut facts: Vec<VerifiedFact> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for claim in extract_claims(query, self.config.max_claims) {
            let fact = match self.mycelium.lookup(&claim) {
                Some(hit) => {
                    // Cache corroboration counts as a refresh
                    self.mycelium
                        .record(&hit.claim, hit.confidence, &[], None);
                    self.mycelium.lookup(&claim)
                }
                None => self.check_claim(session_id, &claim, history).await,
            };
            if let Some(fact) = fact {
                if seen.insert(claim_key(&fact.claim)) {
                    facts.push(fact);
                }
            }
        }

        // Top up with facts related to the query as a whole
        for fact in self
            .mycelium
            .get_relevant(query, self.config.pre_sweep_limit)
        {
            if facts.len() >= self.config.pre_sweep_limit {
                break;
            }
            if seen.insert(claim_key(&fact.claim)) {
                facts.push(fact);
            }
        }

        facts.truncate(self.config.pre_sweep_limit);
        facts
    }

    /// Re-verify the synthesized answer. Confidence below the threshold
    /// raises the discrepancy flag; the pipeline decides what to do with it.
    pub async fn post_check(
        &self,
        session_id: Option<&str>,
        answer: &str,
        history: &[Message],
    ) -> PostCheck {
        let prompt = prompts::post_check_prompt(answer, history);
        let result = self
            .cascade
            .dispatch(
                &RoleName::Verification,
                prompts::verification_system_prompt(),
                vec![Message::user(prompt)],
                self.timeout,
                session_id,
            )
            .await;

        let role = match result {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!("Post-check unavailable: {err}");
                return PostCheck {
                    confidence: self.config.unparsable_confidence,
                    verified_facts: Vec::new(),
                    discrepancy: self.config.unparsable_confidence
                        < self.config.post_check_threshold,
                    corrections: Vec::new(),
                };
            }
        };

        let confidence = clamp01(
            parse_confidence(&role.text).unwrap_or(self.config.unparsable_confidence),
        );
        let corrections = parse_check_reply(&role.text)
            .map(|reply| reply.issues)
            .unwrap_or_default();
        let discrepancy = confidence < self.config.post_check_threshold;

        let verified_facts = if discrepancy {
            Vec::new()
        } else {
            extract_claims(answer, self.config.max_claims)
                .into_iter()
                .filter_map(|claim| {
                    self.mycelium
                        .record(&claim, confidence, &[], role.model.as_deref());
                    self.mycelium.lookup(&claim)
                })
                .collect()
        };

        PostCheck {
            confidence,
            verified_facts,
            discrepancy,
            corrections,
        }
    }

    async fn check_claim(
        &self,
        session_id: Option<&str>,
        claim: &str,
        _history: &[Message],
    ) -> Option<VerifiedFact> {
        let prompt = prompts::verify_claim_prompt(claim);
        let result = self
            .cascade
            .dispatch(
                &RoleName::Verification,
                prompts::verification_system_prompt(),
                vec![Message::user(prompt)],
                self.timeout,
                session_id,
            )
            .await;

        let role = match result {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!("Claim check unavailable: {err}");
                return None;
            }
        };

        match parse_check_reply(&role.text) {
            Some(reply) => {
                // A refuted claim never enters the web
                if reply.verdict.as_deref() == Some("unsupported") {
                    return None;
                }
                let confidence = reply
                    .confidence
                    .map(clamp01)
                    .unwrap_or(self.config.unparsable_confidence);
                self.mycelium
                    .record(claim, confidence, &reply.sources, role.model.as_deref());
            }
            None => {
                self.mycelium.record(
                    claim,
                    self.config.unparsable_confidence,
                    &[],
                    role.model.as_deref(),
                );
            }
        }
        self.mycelium.lookup(claim)
    }
}
