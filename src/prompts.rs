//! Prompt assembly for every dispatched role. All pure string building;
//! the pipeline decides what history and facts to pass in.

use std::fmt::Write as _;

use crate::mycelium::VerifiedFact;
use crate::types::{ChatRole, InternalState, Message, RegulationMode, RoleName, RoleResult, WeightVector};

/// Sentence appended to the answer when the post-check fires its soft veto
pub const VERIFICATION_CAVEAT: &str =
    "Note: parts of this answer could not be fully verified; treat specific claims with care.";

pub fn role_system_prompt(role: &RoleName) -> String {
    match role {
        RoleName::Analytical => {
            "You are the analytical voice of a reasoning ensemble. Examine the logical \
             structure of the request, name assumptions and gaps, and reason step by step."
                .into()
        }
        RoleName::Relational => {
            "You are the relational voice of a reasoning ensemble. Attend to context, \
             relationships, and what the person likely needs from this exchange."
                .into()
        }
        RoleName::Ethics => {
            "You are the ethics voice of a reasoning ensemble. Surface risks, obligations, \
             and fairness concerns raised by the request."
                .into()
        }
        RoleName::Synthesis => synthesis_system_prompt().into(),
        RoleName::Verification => verification_system_prompt().into(),
        RoleName::Custom(name) => format!(
            "You are the {name} voice of a reasoning ensemble. Contribute your distinct \
             perspective on the request."
        ),
    }
}

pub fn synthesis_system_prompt() -> &'static str {
    "You are an expert synthesizer. Weave the provided perspectives into one coherent, \
     direct reply for the user."
}

pub fn verification_system_prompt() -> &'static str {
    "You are a careful fact checker. Assess the given text and reply with JSON only."
}

/// Shared context block for reasoning roles: recent history, verified facts,
/// then the live message.
pub fn turn_context(input: &str, history: &[Message], facts: &[VerifiedFact]) -> String {
    let mut out = String::new();
    if !history.is_empty() {
        out.push_str("Recent conversation:\n");
        for message in history {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            let _ = writeln!(out, "{speaker}: {}", message.text);
        }
        out.push('\n');
    }
    if !facts.is_empty() {
        out.push_str(&facts_section(facts));
        out.push('\n');
    }
    let _ = write!(out, "User message: {input}");
    out
}

/// Context for a repair round: the original turn context plus the regulation
/// rationale steering the re-examination.
pub fn repair_context(base: &str, rationale: &str) -> String {
    format!("{base}\n\nRevisit your earlier reading of this message. {rationale}")
}

/// Prompt for the final synthesis role. Degraded roles contribute no
/// section; weights are printed so the model sees the intended emphasis.
pub fn synthesis_prompt(
    input: &str,
    roles: &[RoleResult],
    weights: &WeightVector,
    state: &InternalState,
) -> String {
    let mut out = String::from(
        "Synthesize one reply to the user from the weighted perspectives below.\n\n",
    );
    let _ = writeln!(out, "User message: {input}\n");

    for role in roles.iter().filter(|r| r.success && !r.text.is_empty()) {
        let _ = writeln!(
            out,
            "## {} (weight {:.2})\n{}\n",
            role.role,
            weights.weight_for(&role.role),
            role.text.trim()
        );
    }

    let _ = writeln!(
        out,
        "Internal state: mode={}, trust={:.2}.",
        state.mode,
        state.trust()
    );

    let mut guidance = Vec::new();
    match state.mode {
        RegulationMode::Clarify => {
            guidance.push("Ask one focusing question where the request is ambiguous.")
        }
        RegulationMode::SlowDown => {
            guidance.push("Work through the complexity deliberately; do not rush to a conclusion.")
        }
        RegulationMode::Normal => {}
    }
    if state.trust() < 0.5 {
        guidance.push("Be transparent about reasoning and evidence.");
    }
    if !guidance.is_empty() {
        out.push_str("Guidance:\n");
        for line in guidance {
            let _ = writeln!(out, "- {line}");
        }
    }

    out.push_str("\nRespond with the final reply only.");
    out
}

/// Prompt for checking one extracted claim during the pre-sweep
pub fn verify_claim_prompt(claim: &str) -> String {
    format!(
        "Verify this claim. Reply with JSON: \
         {{\"verdict\": \"supported|unsupported|unsure\", \"confidence\": <0.0-1.0>}}.\n\n\
         Claim: {claim}"
    )
}

/// Prompt for re-verifying the synthesized answer as a whole
pub fn post_check_prompt(answer: &str, history: &[Message]) -> String {
    let mut out = String::new();
    if !history.is_empty() {
        out.push_str("Conversation context:\n");
        for message in history {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            let _ = writeln!(out, "{speaker}: {}", message.text);
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "Check the following answer for factual accuracy and internal consistency. \
         Reply with JSON: {{\"confidence\": <0.0-1.0>, \"issues\": [\"...\"]}}.\n\n\
         Answer: {answer}"
    );
    out
}

fn facts_section(facts: &[VerifiedFact]) -> String {
    let mut out = String::from("Established facts (previously verified):\n");
    for fact in facts {
        let _ = writeln!(out, "- {} (confidence {:.2})", fact.claim, fact.confidence);
    }
    out
}
