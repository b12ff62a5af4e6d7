//! Query-type classification. One pure pass over the user input picks the
//! role weight vector for the turn, before any dispatch happens.

use crate::types::{QueryKind, WeightVector};

const TECHNICAL_MARKERS: &[&str] = &[
    "how does",
    "how do",
    "explain",
    "calculate",
    "algorithm",
    "code",
    "debug",
    "implement",
    "architecture",
    "performance",
];

const EMOTIONAL_MARKERS: &[&str] = &[
    "feel",
    "feeling",
    "worried",
    "anxious",
    "upset",
    "stressed",
    "afraid",
    "lonely",
    "relationship",
    "overwhelmed",
];

const ETHICAL_MARKERS: &[&str] = &[
    "should i",
    "is it right",
    "is it wrong",
    "ethical",
    "moral",
    "fair",
    "harm",
    "ought",
    "responsible",
    "consent",
];

/// Classify the incoming query. Ties resolve ethical > emotional >
/// technical; no marker hits at all reads as general.
pub fn classify_query(text: &str) -> QueryKind {
    let technical = marker_hits(text, TECHNICAL_MARKERS);
    let emotional = marker_hits(text, EMOTIONAL_MARKERS);
    let ethical = marker_hits(text, ETHICAL_MARKERS);

    let top = technical.max(emotional).max(ethical);
    if top == 0 {
        QueryKind::General
    } else if ethical == top {
        QueryKind::Ethical
    } else if emotional == top {
        QueryKind::Emotional
    } else {
        QueryKind::Technical
    }
}

/// Role emphasis for a query kind, already normalized
pub fn weights_for(kind: QueryKind) -> WeightVector {
    match kind {
        QueryKind::Technical => WeightVector {
            analytical: 0.5,
            relational: 0.25,
            ethics: 0.25,
        },
        QueryKind::Emotional => WeightVector {
            analytical: 0.2,
            relational: 0.55,
            ethics: 0.25,
        },
        QueryKind::Ethical => WeightVector {
            analytical: 0.25,
            relational: 0.25,
            ethics: 0.5,
        },
        QueryKind::General => WeightVector::uniform(),
    }
}

/// Weight vector straight from the input text
pub fn classify_weights(text: &str) -> WeightVector {
    weights_for(classify_query(text))
}

fn marker_hits(text: &str, markers: &[&str]) -> usize {
    let lower = text.to_lowercase();
    markers.iter().filter(|marker| lower.contains(*marker)).count()
}
