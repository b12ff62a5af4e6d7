use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{ChatRole, Message, RoleResult};

/// Word pairs whose joint presence suggests the text argues against itself
const OPPOSITION_PAIRS: &[(&str, &str)] = &[
    ("not", "but"),
    ("never", "always"),
    ("none", "all"),
    ("impossible", "possible"),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "cannot", "none", "nothing", "neither", "nor",
];

/// Severity of one negated echo between two statements
const ECHO_SEVERITY: f64 = 0.7;

/// Cap on collected echo pairs so adversarial inputs stay cheap
const MAX_ECHOES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// Opposing terms inside the current turn's text
    Opposition,
    /// The text keeps reversing itself with "but"
    Reversal,
    /// A statement negating an earlier statement
    NegatedEcho,
}

/// One detected inconsistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    pub detail: String,
    pub severity: f64,
}

/// Outcome of one contradiction scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContradictionReport {
    pub score: f64,
    pub contradictions: Vec<Contradiction>,
}

/// Scan the latest input, recent history, and role payloads for
/// inconsistencies. The score is the mean severity scaled up slightly when
/// several findings stack, capped at 1.0; no findings scores 0.0.
pub fn scan_contradictions(
    input: &str,
    history: &[Message],
    roles: &[RoleResult],
) -> ContradictionReport {
    let mut findings = Vec::new();

    let mut current_text = String::from(input);
    for role in roles.iter().filter(|r| r.success) {
        current_text.push('\n');
        current_text.push_str(&role.text);
    }
    let lower = current_text.to_lowercase();

    for (first, second) in OPPOSITION_PAIRS {
        if lower.contains(first) && lower.contains(second) {
            findings.push(Contradiction {
                kind: ContradictionKind::Opposition,
                detail: format!("opposing terms \"{first}\" and \"{second}\""),
                severity: 0.5,
            });
        }
    }

    let reversals = lower.matches(" but ").count();
    if reversals > 2 {
        findings.push(Contradiction {
            kind: ContradictionKind::Reversal,
            detail: format!("{reversals} reversals with \"but\""),
            severity: (reversals as f64 * 0.15).min(0.8),
        });
    }

    findings.extend(negated_echoes(input, history, roles));

    ContradictionReport {
        score: score_findings(&findings),
        contradictions: findings,
    }
}

fn score_findings(findings: &[Contradiction]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let mean: f64 =
        findings.iter().map(|c| c.severity).sum::<f64>() / findings.len() as f64;
    let stacking = (1.0 + (findings.len() as f64 - 1.0) * 0.1).min(1.5);
    (mean * stacking).min(1.0)
}

/// Find statements in the current turn that negate an earlier statement,
/// either inside the same input or against recent history.
fn negated_echoes(
    input: &str,
    history: &[Message],
    roles: &[RoleResult],
) -> Vec<Contradiction> {
    let mut current: Vec<Signature> = statements(input).collect();
    for role in roles.iter().filter(|r| r.success) {
        current.extend(statements(&role.text));
    }

    let earlier: Vec<Signature> = history
        .iter()
        .filter(|m| matches!(m.role, ChatRole::User | ChatRole::Assistant))
        .flat_map(|m| statements(&m.text))
        .collect();

    let mut findings = Vec::new();

    for (i, a) in current.iter().enumerate() {
        for b in current.iter().skip(i + 1).chain(earlier.iter()) {
            if findings.len() >= MAX_ECHOES {
                return findings;
            }
            if a.negates(b) {
                findings.push(Contradiction {
                    kind: ContradictionKind::NegatedEcho,
                    detail: format!("\"{}\" negates \"{}\"", a.text, b.text),
                    severity: ECHO_SEVERITY,
                });
            }
        }
    }

    findings
}

/// One statement reduced to its content words and whether it is negated
struct Signature {
    text: String,
    content: HashSet<String>,
    negated: bool,
}

impl Signature {
    fn of(statement: &str) -> Self {
        let mut content = HashSet::new();
        let mut negated = false;
        for token in statement.split_whitespace() {
            let word: String = token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            if NEGATORS.contains(&word.as_str()) || word.ends_with("n't") {
                negated = true;
            } else {
                content.insert(word);
            }
        }
        Self {
            text: statement.trim().to_string(),
            content,
            negated,
        }
    }

    /// True when the two statements share their content words but only one
    /// of them is negated. Subset matching absorbs interjections like
    /// "no wait" around an otherwise identical claim.
    fn negates(&self, other: &Signature) -> bool {
        if self.negated == other.negated {
            return false;
        }
        let (small, large) = if self.content.len() <= other.content.len() {
            (&self.content, &other.content)
        } else {
            (&other.content, &self.content)
        };
        small.len() >= 2 && small.is_subset(large)
    }
}

fn statements(text: &str) -> impl Iterator<Item = Signature> + '_ {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Signature::of)
}
