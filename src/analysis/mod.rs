//! Turn analysis.
//!
//! A pure, deterministic chain run after role collection and again after
//! every repair round. No model calls happen here; everything derives from
//! the turn's text, the recent history, and the previous turn's state.
//!
//! ## Chain
//!
//! ```text
//! input + roles + history
//!         │
//!         ▼
//!    measure_intensity ──► tension / uncertainty / emotional
//!         │
//!         ▼
//!    scan_contradictions ──► contradiction score + findings
//!         │
//!         ▼
//!    regulate ──► NORMAL / CLARIFY / SLOW_DOWN
//!         │
//!         ▼
//!    trust_score ──► coherence scalar + trend
//! ```

mod contradiction;
mod intensity;
mod regulate;
mod trust;

pub use contradiction::{
    scan_contradictions, Contradiction, ContradictionKind, ContradictionReport,
};
pub use intensity::{measure_intensity, IntensitySignals};
pub use regulate::{derive_mode, regulate, should_repair, RegulationDecision};
pub use trust::{trust_score, trust_trend};

use serde::{Deserialize, Serialize};

use crate::types::{InternalState, Message, RoleResult, TrustTrend};

/// Everything the analysis chain derived for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAnalysis {
    pub signals: IntensitySignals,
    pub contradiction: ContradictionReport,
    pub regulation: RegulationDecision,
    pub trust: f64,
    pub trend: TrustTrend,
}

impl TurnAnalysis {
    /// Fold this turn's measurements into the carried session state. The
    /// repair counter is left alone; the pipeline owns it.
    pub fn apply_to(&self, state: &mut InternalState) {
        state.set_tension(self.signals.tension);
        state.set_uncertainty(self.signals.uncertainty);
        state.set_emotional_intensity(self.signals.emotional_intensity);
        state.set_contradiction(self.contradiction.score);
        state.set_trust(self.trust);
        state.mode = self.regulation.mode;
    }

    pub fn needs_repair(&self, repairs_attempted: u32, max_repairs: u32) -> bool {
        should_repair(self.regulation.mode, repairs_attempted, max_repairs)
    }
}

/// Run the full chain over one turn's material.
pub fn analyze_turn(
    input: &str,
    history: &[Message],
    roles: &[RoleResult],
    previous: &InternalState,
) -> TurnAnalysis {
    let signals = measure_intensity(input, roles);
    let contradiction = scan_contradictions(input, history, roles);
    let regulation = regulate(
        previous.mode,
        signals.tension,
        signals.uncertainty,
        contradiction.score,
    );
    let trust = trust_score(signals.tension, signals.uncertainty, contradiction.score);
    let trend = trust_trend(previous.trust(), trust);
    TurnAnalysis {
        signals,
        contradiction,
        regulation,
        trust,
        trend,
    }
}
