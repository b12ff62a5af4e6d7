use serde::{Deserialize, Serialize};

use crate::types::RegulationMode;

/// Outcome of one regulation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationDecision {
    pub mode: RegulationMode,
    pub mode_changed: bool,
    pub rationale: String,
    /// Present only when the mode changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
}

/// Recompute the regulation mode from the latest scores. The mode is never
/// carried over; every pass derives it fresh.
pub fn regulate(
    previous: RegulationMode,
    tension: f64,
    uncertainty: f64,
    contradiction: f64,
) -> RegulationDecision {
    let mode = derive_mode(tension, uncertainty, contradiction);
    let mode_changed = mode != previous;
    RegulationDecision {
        mode,
        mode_changed,
        rationale: mode_rationale(mode).to_string(),
        change_reason: mode_changed.then(|| change_reason(tension, uncertainty, contradiction)),
    }
}

pub fn derive_mode(tension: f64, uncertainty: f64, contradiction: f64) -> RegulationMode {
    if tension > 0.7 || contradiction > 0.7 {
        return RegulationMode::SlowDown;
    }
    if (tension > 0.5 && uncertainty > 0.5) || contradiction > 0.6 {
        return RegulationMode::Clarify;
    }
    RegulationMode::Normal
}

/// Whether another repair round should run
pub fn should_repair(mode: RegulationMode, repairs_attempted: u32, max_repairs: u32) -> bool {
    mode != RegulationMode::Normal && repairs_attempted < max_repairs
}

fn mode_rationale(mode: RegulationMode) -> &'static str {
    match mode {
        RegulationMode::SlowDown => {
            "Processing complexity requires careful consideration. Taking additional time to analyze."
        }
        RegulationMode::Clarify => {
            "Ambiguity or inconsistencies detected. Seeking clarification to improve understanding."
        }
        RegulationMode::Normal => "Conditions are stable. Proceeding with normal processing.",
    }
}

fn change_reason(tension: f64, uncertainty: f64, contradiction: f64) -> String {
    let mut reasons = Vec::new();
    if tension > 0.7 {
        reasons.push("high tension");
    }
    if contradiction > 0.6 {
        reasons.push("contradictions detected");
    }
    if tension > 0.5 && uncertainty > 0.5 {
        reasons.push("elevated tension and uncertainty");
    }
    if reasons.is_empty() {
        "metrics stabilized".to_string()
    } else {
        reasons.join(", ")
    }
}
