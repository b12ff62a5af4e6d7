use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Chat Types ──────────────────────────────────────────────────────────────

/// Role in a chat exchange sent to a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }

    /// Estimate token count (rough: 4 chars ≈ 1 token)
    pub fn estimate_tokens(&self) -> usize {
        (self.text.len() + 3) / 4 + 4 // role + framing overhead
    }
}

// ─── Token Usage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// True when the adapter reported no usage and counts were derived
    /// from character length
    #[serde(default)]
    pub estimated: bool,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            estimated: false,
        }
    }

    /// Derive usage from character counts when an adapter reports none
    /// (ceil(chars/4))
    pub fn estimated_from_chars(input_chars: usize, output_chars: usize) -> Self {
        Self {
            input_tokens: (input_chars + 3) / 4,
            output_tokens: (output_chars + 3) / 4,
            estimated: true,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.estimated = self.estimated || other.estimated;
    }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

/// Named position in the reasoning chorus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Analytical,
    Relational,
    Ethics,
    Synthesis,
    Verification,
    Custom(String),
}

impl RoleName {
    /// The roles fanned out concurrently at the start of a turn
    pub fn reasoning_roles() -> Vec<RoleName> {
        vec![RoleName::Analytical, RoleName::Relational, RoleName::Ethics]
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(
            self,
            RoleName::Analytical | RoleName::Relational | RoleName::Ethics
        )
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleName::Analytical => write!(f, "analytical"),
            RoleName::Relational => write!(f, "relational"),
            RoleName::Ethics => write!(f, "ethics"),
            RoleName::Synthesis => write!(f, "synthesis"),
            RoleName::Verification => write!(f, "verification"),
            RoleName::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// Backend families an adapter can speak to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Anthropic,
    OpenAI,
    Ollama,
    Custom(String),
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::Anthropic => write!(f, "anthropic"),
            AdapterKind::OpenAI => write!(f, "openai"),
            AdapterKind::Ollama => write!(f, "ollama"),
            AdapterKind::Custom(s) => write!(f, "{s}"),
        }
    }
}

// ─── Role Results ────────────────────────────────────────────────────────────

/// Output of one role's pass through the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleResult {
    pub role: RoleName,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Index of the tier that answered (0 = primary)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<usize>,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    #[serde(default)]
    pub cost_usd: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoleResult {
    /// Neutral stand-in for a role whose cascade was exhausted; carries no
    /// payload and is excluded from synthesis
    pub fn placeholder(role: RoleName) -> Self {
        Self {
            role,
            text: String::new(),
            model: None,
            tier: None,
            usage: TokenUsage::default(),
            latency_ms: 0,
            cost_usd: 0.0,
            success: false,
            error: None,
        }
    }

    /// Placeholder annotated with the terminal error that produced it
    pub fn failed(role: RoleName, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::placeholder(role)
        }
    }

    /// Confidence the role reported in its payload, if the payload is JSON
    /// (or contains an embedded JSON object) with a numeric `confidence` field.
    pub fn reported_confidence(&self) -> Option<f64> {
        parse_confidence(&self.text)
    }
}

/// Pull a JSON object out of model output: accept the bare text, or the
/// outermost `{...}` span inside surrounding prose.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let candidate = text.trim();
    serde_json::from_str(candidate).ok().or_else(|| {
        let start = candidate.find('{')?;
        let end = candidate.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&candidate[start..=end]).ok()
    })
}

/// Lenient confidence extraction from a model reply. Values outside [0, 1]
/// are clamped.
pub fn parse_confidence(text: &str) -> Option<f64> {
    let conf = extract_json_object(text)?.get("confidence")?.as_f64()?;
    if conf.is_nan() {
        return None;
    }
    Some(conf.clamp(0.0, 1.0))
}

// ─── Internal State ──────────────────────────────────────────────────────────

/// How strongly the pipeline is currently regulating itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    Normal,
    Clarify,
    SlowDown,
}

impl std::fmt::Display for RegulationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegulationMode::Normal => write!(f, "normal"),
            RegulationMode::Clarify => write!(f, "clarify"),
            RegulationMode::SlowDown => write!(f, "slow_down"),
        }
    }
}

/// Direction the trust scalar is moving between turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for TrustTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustTrend::Increasing => write!(f, "increasing"),
            TrustTrend::Decreasing => write!(f, "decreasing"),
            TrustTrend::Stable => write!(f, "stable"),
        }
    }
}

/// Self-measured coherence signals, all clamped to [0, 1]. Persisted per
/// session and carried across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalState {
    tension: f64,
    uncertainty: f64,
    emotional_intensity: f64,
    contradiction: f64,
    trust: f64,
    pub mode: RegulationMode,
    pub repairs_attempted: u32,
}

impl InternalState {
    pub fn tension(&self) -> f64 {
        self.tension
    }

    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }

    pub fn emotional_intensity(&self) -> f64 {
        self.emotional_intensity
    }

    pub fn contradiction(&self) -> f64 {
        self.contradiction
    }

    pub fn trust(&self) -> f64 {
        self.trust
    }

    pub fn set_tension(&mut self, v: f64) {
        self.tension = clamp01(v);
    }

    pub fn set_uncertainty(&mut self, v: f64) {
        self.uncertainty = clamp01(v);
    }

    pub fn set_emotional_intensity(&mut self, v: f64) {
        self.emotional_intensity = clamp01(v);
    }

    pub fn set_contradiction(&mut self, v: f64) {
        self.contradiction = clamp01(v);
    }

    pub fn set_trust(&mut self, v: f64) {
        self.trust = clamp01(v);
    }
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            tension: 0.0,
            uncertainty: 0.0,
            emotional_intensity: 0.0,
            contradiction: 0.0,
            trust: 1.0,
            mode: RegulationMode::Normal,
            repairs_attempted: 0,
        }
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ─── Query Weighting ─────────────────────────────────────────────────────────

/// Coarse category of an incoming query, used to weight role contributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Technical,
    Emotional,
    Ethical,
    General,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Technical => write!(f, "technical"),
            QueryKind::Emotional => write!(f, "emotional"),
            QueryKind::Ethical => write!(f, "ethical"),
            QueryKind::General => write!(f, "general"),
        }
    }
}

/// Per-turn emphasis over the reasoning roles, fed into synthesis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub analytical: f64,
    pub relational: f64,
    pub ethics: f64,
}

impl WeightVector {
    pub fn uniform() -> Self {
        Self {
            analytical: 1.0 / 3.0,
            relational: 1.0 / 3.0,
            ethics: 1.0 / 3.0,
        }
    }

    /// Scale weights so they sum to 1.0; falls back to uniform when the sum
    /// is zero or non-finite
    pub fn normalized(&self) -> Self {
        let sum = self.analytical + self.relational + self.ethics;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::uniform();
        }
        Self {
            analytical: self.analytical / sum,
            relational: self.relational / sum,
            ethics: self.ethics / sum,
        }
    }

    pub fn weight_for(&self, role: &RoleName) -> f64 {
        match role {
            RoleName::Analytical => self.analytical,
            RoleName::Relational => self.relational,
            RoleName::Ethics => self.ethics,
            _ => 0.0,
        }
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::uniform()
    }
}

// ─── Turn Reporting ──────────────────────────────────────────────────────────

/// Phases a turn moves through, in order of first entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    CollectRoles,
    Analyze,
    Repair,
    Synthesize,
    VerifyPost,
    Done,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::CollectRoles => write!(f, "collect_roles"),
            PipelinePhase::Analyze => write!(f, "analyze"),
            PipelinePhase::Repair => write!(f, "repair"),
            PipelinePhase::Synthesize => write!(f, "synthesize"),
            PipelinePhase::VerifyPost => write!(f, "verify_post"),
            PipelinePhase::Done => write!(f, "done"),
        }
    }
}

/// Everything observable about one completed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub turn_id: String,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub roles_used: Vec<RoleName>,
    #[serde(default)]
    pub degraded_roles: Vec<RoleName>,
    pub phases: Vec<PipelinePhase>,
    pub mode: RegulationMode,
    #[serde(default)]
    pub mode_changed: bool,
    pub rationale: String,
    pub trust: f64,
    /// Final trust against the prior turn's trust
    pub trend: TrustTrend,
    pub repair_count: u32,
    /// True when the post-check lowered trust and appended a caveat
    #[serde(default)]
    pub heightened: bool,
    /// True when repairs ran out before the state settled
    #[serde(default)]
    pub unstabilized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_check_confidence: Option<f64>,
    pub usage: TokenUsage,
    pub estimated_cost_usd: f64,
}

impl TurnReport {
    pub fn new() -> Self {
        Self {
            turn_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            processing_time_ms: 0,
            roles_used: Vec::new(),
            degraded_roles: Vec::new(),
            phases: Vec::new(),
            mode: RegulationMode::Normal,
            mode_changed: false,
            rationale: String::new(),
            trust: 1.0,
            trend: TrustTrend::Stable,
            repair_count: 0,
            heightened: false,
            unstabilized: false,
            post_check_confidence: None,
            usage: TokenUsage::default(),
            estimated_cost_usd: 0.0,
        }
    }

    /// Record entry into a phase; repeated entries (repair loops) are kept
    pub fn enter_phase(&mut self, phase: PipelinePhase) {
        self.phases.push(phase);
    }
}

impl Default for TurnReport {
    fn default() -> Self {
        Self::new()
    }
}

/// One synthesized answer plus the state it left behind and its full report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    pub answer: String,
    pub state: InternalState,
    pub report: TurnReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Message Tests ──────────────────────────────────────────────────

    #[test]
    fn message_user_creates_text() {
        let msg = Message::user("hello world");
        assert_eq!(msg.role, ChatRole::User);
        assert_eq!(msg.text, "hello world");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn message_serializes_roundtrip() {
        let msg = Message::assistant("one answer");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.role, msg.role);
        assert_eq!(deserialized.text, msg.text);
        assert_eq!(deserialized.id, msg.id);
    }

    #[test]
    fn message_token_estimation() {
        let msg = Message::user("hello world!"); // 12 chars → 3 + 4 overhead
        assert_eq!(msg.estimate_tokens(), 7);
    }

    // ─── TokenUsage Tests ───────────────────────────────────────────────

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
        assert!(!usage.estimated);
    }

    #[test]
    fn token_usage_estimated_from_chars() {
        let usage = TokenUsage::estimated_from_chars(5, 2); // ceil(5/4)=2, ceil(2/4)=1
        assert_eq!(usage.input_tokens, 2);
        assert_eq!(usage.output_tokens, 1);
        assert!(usage.estimated);
    }

    #[test]
    fn token_usage_add_propagates_estimated() {
        let mut total = TokenUsage::new(10, 5);
        total.add(&TokenUsage::estimated_from_chars(4, 4));
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 6);
        assert!(total.estimated);
    }

    // ─── Role Tests ─────────────────────────────────────────────────────

    #[test]
    fn reasoning_roles_are_three() {
        let roles = RoleName::reasoning_roles();
        assert_eq!(roles.len(), 3);
        assert!(roles.iter().all(|r| r.is_reasoning()));
        assert!(!RoleName::Synthesis.is_reasoning());
        assert!(!RoleName::Verification.is_reasoning());
    }

    #[test]
    fn role_name_display() {
        assert_eq!(RoleName::Analytical.to_string(), "analytical");
        assert_eq!(RoleName::Custom("devil".into()).to_string(), "devil");
    }

    #[test]
    fn adapter_kind_serializes() {
        let json = serde_json::to_string(&AdapterKind::Anthropic).unwrap();
        assert_eq!(json, r#""anthropic""#);

        let deserialized: AdapterKind = serde_json::from_str(r#""ollama""#).unwrap();
        assert_eq!(deserialized, AdapterKind::Ollama);
    }

    // ─── RoleResult Tests ───────────────────────────────────────────────

    #[test]
    fn placeholder_is_empty_and_failed() {
        let r = RoleResult::placeholder(RoleName::Ethics);
        assert!(!r.success);
        assert!(r.text.is_empty());
        assert!(r.model.is_none());
        assert!(r.error.is_none());
        assert_eq!(r.usage.total(), 0);
        assert_eq!(r.cost_usd, 0.0);
    }

    #[test]
    fn failed_carries_error_detail() {
        let r = RoleResult::failed(RoleName::Relational, "all tiers exhausted");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("all tiers exhausted"));
    }

    #[test]
    fn confidence_parses_bare_json() {
        assert_eq!(parse_confidence(r#"{"confidence": 0.72}"#), Some(0.72));
    }

    #[test]
    fn confidence_parses_embedded_json() {
        let text = "Here is my verdict:\n{\"verdict\": \"pass\", \"confidence\": 0.9}\nDone.";
        assert_eq!(parse_confidence(text), Some(0.9));
    }

    #[test]
    fn confidence_clamps_out_of_range() {
        assert_eq!(parse_confidence(r#"{"confidence": 1.7}"#), Some(1.0));
        assert_eq!(parse_confidence(r#"{"confidence": -0.2}"#), Some(0.0));
    }

    #[test]
    fn confidence_absent_on_plain_prose() {
        assert_eq!(parse_confidence("no structure here at all"), None);
        assert_eq!(parse_confidence(r#"{"verdict": "pass"}"#), None);
    }

    // ─── InternalState Tests ────────────────────────────────────────────

    #[test]
    fn internal_state_defaults() {
        let state = InternalState::default();
        assert_eq!(state.tension(), 0.0);
        assert_eq!(state.uncertainty(), 0.0);
        assert_eq!(state.emotional_intensity(), 0.0);
        assert_eq!(state.contradiction(), 0.0);
        assert_eq!(state.trust(), 1.0);
        assert_eq!(state.mode, RegulationMode::Normal);
        assert_eq!(state.repairs_attempted, 0);
    }

    #[test]
    fn internal_state_setters_clamp() {
        let mut state = InternalState::default();
        state.set_tension(1.5);
        assert_eq!(state.tension(), 1.0);
        state.set_uncertainty(-0.3);
        assert_eq!(state.uncertainty(), 0.0);
        state.set_emotional_intensity(7.0);
        assert_eq!(state.emotional_intensity(), 1.0);
        state.set_trust(f64::NAN);
        assert_eq!(state.trust(), 0.0);
    }

    #[test]
    fn internal_state_serializes_roundtrip() {
        let mut state = InternalState::default();
        state.set_tension(0.4);
        state.mode = RegulationMode::Clarify;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: InternalState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, state);
    }

    #[test]
    fn regulation_mode_serializes_snake_case() {
        let json = serde_json::to_string(&RegulationMode::SlowDown).unwrap();
        assert_eq!(json, r#""slow_down""#);
    }

    // ─── WeightVector Tests ─────────────────────────────────────────────

    #[test]
    fn weight_vector_normalizes() {
        let w = WeightVector {
            analytical: 2.0,
            relational: 1.0,
            ethics: 1.0,
        }
        .normalized();
        assert!((w.analytical - 0.5).abs() < 1e-9);
        assert!((w.relational - 0.25).abs() < 1e-9);
        assert!((w.analytical + w.relational + w.ethics - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weight_vector_zero_sum_falls_back_to_uniform() {
        let w = WeightVector {
            analytical: 0.0,
            relational: 0.0,
            ethics: 0.0,
        }
        .normalized();
        assert!((w.analytical - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn weight_for_non_reasoning_role_is_zero() {
        let w = WeightVector::uniform();
        assert_eq!(w.weight_for(&RoleName::Synthesis), 0.0);
    }

    // ─── TurnReport Tests ───────────────────────────────────────────────

    #[test]
    fn turn_report_tracks_phases_in_order() {
        let mut report = TurnReport::new();
        report.enter_phase(PipelinePhase::CollectRoles);
        report.enter_phase(PipelinePhase::Analyze);
        report.enter_phase(PipelinePhase::Repair);
        report.enter_phase(PipelinePhase::Analyze);
        assert_eq!(
            report.phases,
            vec![
                PipelinePhase::CollectRoles,
                PipelinePhase::Analyze,
                PipelinePhase::Repair,
                PipelinePhase::Analyze,
            ]
        );
    }

    #[test]
    fn turn_report_serializes_roundtrip() {
        let mut report = TurnReport::new();
        report.roles_used = RoleName::reasoning_roles();
        report.heightened = true;
        let json = serde_json::to_string(&report).unwrap();
        let deserialized: TurnReport = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, report);
    }

    // ─── clamp01 Tests ──────────────────────────────────────────────────

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(-1.0), 0.0);
        assert_eq!(clamp01(0.5), 0.5);
        assert_eq!(clamp01(2.0), 1.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
    }
}
