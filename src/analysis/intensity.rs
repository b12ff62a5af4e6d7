use serde::{Deserialize, Serialize};

use crate::types::{clamp01, RoleResult};

/// Words signalling conflict or friction
const CONFLICT_WORDS: &[&str] = &[
    "but", "however", "conflict", "disagree", "oppose", "against", "dispute",
];

/// Words signalling hedging or unknowns
const UNCERTAINTY_WORDS: &[&str] = &[
    "maybe",
    "perhaps",
    "possibly",
    "might",
    "could",
    "uncertain",
    "unclear",
    "ambiguous",
    "questionable",
    "doubt",
];

/// Words carrying strong affect
const EMOTIONAL_WORDS: &[&str] = &[
    "love",
    "hate",
    "fear",
    "anger",
    "joy",
    "sad",
    "happy",
    "terrible",
    "wonderful",
    "awful",
    "amazing",
    "horrific",
    "fantastic",
];

/// Turn-level coherence pressure, each component clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IntensitySignals {
    pub tension: f64,
    pub uncertainty: f64,
    pub emotional_intensity: f64,
}

/// Measure tension, uncertainty, and emotional intensity for one turn.
/// Lexical heuristics run over the latest input; role results contribute
/// through conflict language in their payloads, through degraded roles, and
/// through low self-reported confidence, all of which raise uncertainty.
pub fn measure_intensity(input: &str, roles: &[RoleResult]) -> IntensitySignals {
    IntensitySignals {
        tension: measure_tension(input, roles),
        uncertainty: measure_uncertainty(input, roles),
        emotional_intensity: measure_emotional(input),
    }
}

fn measure_tension(input: &str, roles: &[RoleResult]) -> f64 {
    let mut tension = 0.0;

    let conflict_hits = lexicon_hits(input, CONFLICT_WORDS);
    tension += (conflict_hits as f64 * 0.1).min(0.5);

    let role_conflict: usize = roles
        .iter()
        .filter(|r| r.success)
        .map(|r| lexicon_hits(&r.text, CONFLICT_WORDS))
        .sum();
    tension += (role_conflict as f64 * 0.15).min(0.4);

    let exclamations = input.matches('!').count();
    tension += (exclamations as f64 * 0.05).min(0.1);

    clamp01(tension)
}

fn measure_uncertainty(input: &str, roles: &[RoleResult]) -> f64 {
    let mut uncertainty = 0.0;

    let hedge_hits = lexicon_hits(input, UNCERTAINTY_WORDS);
    uncertainty += (hedge_hits as f64 * 0.1).min(0.5);

    let degraded = roles.iter().filter(|r| !r.success).count();
    uncertainty += degraded as f64 * 0.3;

    for role in roles.iter().filter(|r| r.success) {
        match role.reported_confidence() {
            Some(conf) if conf < 0.5 => uncertainty += 0.3,
            Some(conf) if conf < 0.75 => uncertainty += 0.15,
            _ => {}
        }
    }

    let questions = input.matches('?').count();
    uncertainty += (questions as f64 * 0.08).min(0.2);

    clamp01(uncertainty)
}

fn measure_emotional(input: &str) -> f64 {
    let mut intensity = 0.0;

    let emotional_hits = lexicon_hits(input, EMOTIONAL_WORDS);
    intensity += (emotional_hits as f64 * 0.15).min(0.6);

    let shouted = input
        .split_whitespace()
        .filter(|w| w.len() > 1 && is_shouted(w))
        .count();
    intensity += (shouted as f64 * 0.1).min(0.2);

    let stacked_punct = input.matches("!!!").count() + input.matches("???").count();
    intensity += (stacked_punct as f64 * 0.1).min(0.2);

    clamp01(intensity)
}

/// Number of lexicon words present in the text, each counted at most once
fn lexicon_hits(text: &str, lexicon: &[&str]) -> usize {
    let lower = text.to_lowercase();
    lexicon.iter().filter(|word| lower.contains(*word)).count()
}

fn is_shouted(word: &str) -> bool {
    let mut has_alpha = false;
    for c in word.chars() {
        if c.is_alphabetic() {
            has_alpha = true;
            if !c.is_uppercase() {
                return false;
            }
        }
    }
    has_alpha
}
