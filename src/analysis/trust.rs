use crate::types::{clamp01, TrustTrend};

/// Coherence self-measure. High tension, uncertainty, and contradiction all
/// pull it down; a quiet turn scores 1.0.
pub fn trust_score(tension: f64, uncertainty: f64, contradiction: f64) -> f64 {
    clamp01(1.0 - (0.4 * tension + 0.3 * uncertainty + 0.3 * contradiction))
}

/// Movements within 0.1 of the previous value count as stable.
pub fn trust_trend(previous: f64, current: f64) -> TrustTrend {
    let diff = current - previous;
    if diff > 0.1 {
        TrustTrend::Increasing
    } else if diff < -0.1 {
        TrustTrend::Decreasing
    } else {
        TrustTrend::Stable
    }
}
