//! Turn orchestration.
//!
//! One `Chorus` serves many sessions; each call to [`Chorus::process_turn`]
//! drives a single turn through a fixed phase order:
//!
//! ```text
//! COLLECT_ROLES ──► ANALYZE ──► (REPAIR)* ──► SYNTHESIZE ──► VERIFY_POST ──► DONE
//!      │                │            │             │               │
//!   concurrent      pure chain   bounded by     weighted       soft veto:
//!   role fan-out    over text    max_repairs    re-query       caveat + τ drop
//! ```
//!
//! Nearly everything degrades instead of failing: a dead reasoning role
//! becomes a placeholder, an unreachable session store yields the default
//! state, an unreachable checker leaves the answer untouched. The one error
//! a caller sees is synthesis exhaustion, because then there is no answer
//! to return.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::AdapterRegistry;
use crate::analysis::{analyze_turn, trust_trend, TurnAnalysis};
use crate::cascade::{Cascade, CircuitState};
use crate::classify::classify_weights;
use crate::config::ChorusConfig;
use crate::error::{ChorusError, ChorusResult};
use crate::mycelium::{CacheHealth, Mycelium, MyceliumStats};
use crate::prompts;
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::telemetry::{SweepRecord, TelemetryHub};
use crate::types::{
    InternalState, Message, PipelinePhase, RegulationMode, RoleName, RoleResult, TokenUsage,
    TurnOutput, TurnReport,
};
use crate::verify::Verifier;

/// The reasoning engine.
pub struct Chorus {
    config: ChorusConfig,
    cascade: Arc<Cascade>,
    mycelium: Arc<Mycelium>,
    verifier: Verifier,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<TelemetryHub>,
}

impl Chorus {
    /// Build with a file-backed session store when `session_dir` is
    /// configured, in-memory otherwise.
    pub fn new(config: ChorusConfig, registry: Arc<AdapterRegistry>) -> Self {
        let store: Arc<dyn SessionStore> = match &config.session_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir.clone())),
            None => Arc::new(MemorySessionStore::new()),
        };
        Self::with_parts(config, registry, store, Arc::new(TelemetryHub::new()))
    }

    /// Build with explicit store and telemetry wiring.
    pub fn with_parts(
        config: ChorusConfig,
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn SessionStore>,
        telemetry: Arc<TelemetryHub>,
    ) -> Self {
        let cascade = Arc::new(Cascade::new(
            config.cascade.clone(),
            registry,
            telemetry.clone(),
        ));
        let mycelium = Arc::new(Mycelium::new(config.mycelium.clone()));
        let verifier = Verifier::new(
            cascade.clone(),
            mycelium.clone(),
            config.verifier.clone(),
            Duration::from_millis(config.pipeline.verification_timeout_ms),
        );
        Self {
            config,
            cascade,
            mycelium,
            verifier,
            store,
            telemetry,
        }
    }

    /// Run one full turn for a session. Not idempotent: each call extends
    /// the transcript and rewrites the carried state.
    pub async fn process_turn(&self, session_id: &str, input: &str) -> ChorusResult<TurnOutput> {
        let started = Instant::now();
        let mut report = TurnReport::new();

        // Prior state; an unreachable store degrades to the default
        let mut state = match self.store.load_state(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => InternalState::default(),
            Err(e) => {
                tracing::warn!("Session state unavailable for {session_id}: {e}");
                InternalState::default()
            }
        };
        let prior_trust = state.trust();
        let prior_mode = state.mode;
        state.repairs_attempted = 0;

        let full_history = match self.store.load_history(session_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("History unavailable for {session_id}: {e}");
                Vec::new()
            }
        };
        let window = full_history
            .len()
            .saturating_sub(self.config.pipeline.history_window);
        let history = &full_history[window..];

        let weights = classify_weights(input);

        // Cache-first verification sweep; hits feed the role context
        let facts = self
            .verifier
            .pre_sweep(Some(session_id), input, history)
            .await;

        report.enter_phase(PipelinePhase::CollectRoles);
        let context = prompts::turn_context(input, history, &facts);
        let mut roles = self
            .collect_roles(session_id, RoleName::reasoning_roles(), &context)
            .await;

        let mut usage = TokenUsage::default();
        let mut cost = 0.0f64;
        for role in &roles {
            usage.add(&role.usage);
            cost += role.cost_usd;
        }

        report.enter_phase(PipelinePhase::Analyze);
        let mut analysis = analyze_turn(input, history, &roles, &state);
        log_mode_change(session_id, &analysis);
        analysis.apply_to(&mut state);

        // One repair round = re-query the repair subset, then re-analyze.
        // Exhausting the budget is not an error; the turn proceeds with
        // whatever state the last pass left.
        while analysis.needs_repair(state.repairs_attempted, self.config.pipeline.max_repairs) {
            report.enter_phase(PipelinePhase::Repair);
            state.repairs_attempted += 1;

            let repair_context =
                prompts::repair_context(&context, &analysis.regulation.rationale);
            let redone = self
                .collect_roles(
                    session_id,
                    self.config.pipeline.repair_roles.clone(),
                    &repair_context,
                )
                .await;
            for fresh in redone {
                usage.add(&fresh.usage);
                cost += fresh.cost_usd;
                match roles.iter_mut().find(|r| r.role == fresh.role) {
                    Some(slot) => *slot = fresh,
                    None => roles.push(fresh),
                }
            }

            analysis = analyze_turn(input, history, &roles, &state);
            log_mode_change(session_id, &analysis);
            analysis.apply_to(&mut state);
        }
        let unstabilized = analysis.regulation.mode != RegulationMode::Normal;

        report.enter_phase(PipelinePhase::Synthesize);
        let prompt = prompts::synthesis_prompt(input, &roles, &weights, &state);
        let synthesis = self
            .cascade
            .dispatch(
                &RoleName::Synthesis,
                prompts::synthesis_system_prompt(),
                vec![Message::user(prompt)],
                self.reasoning_timeout(),
                Some(session_id),
            )
            .await
            .map_err(|e| ChorusError::NoResponse {
                role: RoleName::Synthesis.to_string(),
                detail: e.to_string(),
            })?;
        usage.add(&synthesis.usage);
        cost += synthesis.cost_usd;
        let mut answer = synthesis.text.clone();

        report.enter_phase(PipelinePhase::VerifyPost);
        let check = self
            .verifier
            .post_check(Some(session_id), &answer, history)
            .await;
        report.post_check_confidence = Some(check.confidence);
        if check.discrepancy {
            answer.push_str("\n\n");
            answer.push_str(prompts::VERIFICATION_CAVEAT);
            state.set_trust(state.trust() - self.config.verifier.trust_penalty);
            report.heightened = true;
        }

        report.enter_phase(PipelinePhase::Done);
        report.processing_time_ms = started.elapsed().as_millis() as u64;
        report.roles_used = roles
            .iter()
            .map(|r| r.role.clone())
            .chain(std::iter::once(RoleName::Synthesis))
            .collect();
        report.degraded_roles = roles
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.role.clone())
            .collect();
        report.mode = state.mode;
        report.mode_changed = state.mode != prior_mode;
        report.rationale = analysis.regulation.rationale.clone();
        report.trust = state.trust();
        report.trend = trust_trend(prior_trust, state.trust());
        report.repair_count = state.repairs_attempted;
        report.unstabilized = unstabilized;
        report.usage = usage;
        report.estimated_cost_usd = cost;

        // Persist after the fact; a dead store costs continuity, not the turn
        if let Err(e) = self
            .store
            .append_message(session_id, &Message::user(input))
            .await
        {
            tracing::warn!("Could not append user message for {session_id}: {e}");
        }
        if let Err(e) = self
            .store
            .append_message(session_id, &Message::assistant(answer.as_str()))
            .await
        {
            tracing::warn!("Could not append assistant message for {session_id}: {e}");
        }
        if let Err(e) = self.store.save_state(session_id, &state).await {
            tracing::warn!("Could not save state for {session_id}: {e}");
        }

        self.telemetry.turn(session_id, report.clone());

        Ok(TurnOutput {
            answer,
            state,
            report,
        })
    }

    /// Fan the given roles out concurrently. A role whose cascade exhausts
    /// (or whose task dies) degrades to a placeholder carrying the error.
    async fn collect_roles(
        &self,
        session_id: &str,
        roles: Vec<RoleName>,
        context: &str,
    ) -> Vec<RoleResult> {
        let timeout = self.reasoning_timeout();
        let mut handles = Vec::with_capacity(roles.len());
        for role in roles {
            let cascade = self.cascade.clone();
            let system = prompts::role_system_prompt(&role);
            let message = Message::user(context);
            let session = session_id.to_string();
            let task_role = role.clone();
            let handle = tokio::spawn(async move {
                cascade
                    .dispatch(&task_role, &system, vec![message], timeout, Some(&session))
                    .await
            });
            handles.push((role, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (role, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!("Role {role} degraded to placeholder: {e}");
                    RoleResult::failed(role, e.to_string())
                }
                Err(e) => {
                    tracing::warn!("Role {role} task failed: {e}");
                    RoleResult::failed(role, e.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    /// Carried state for a session; the default when none is stored or the
    /// store is unreachable.
    pub async fn session_state(&self, session_id: &str) -> InternalState {
        match self.store.load_state(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => InternalState::default(),
            Err(e) => {
                tracing::warn!("Session state unavailable for {session_id}: {e}");
                InternalState::default()
            }
        }
    }

    /// Reset a session's carried state to the defaults. The transcript is
    /// left alone.
    pub async fn reset_session(&self, session_id: &str) -> ChorusResult<()> {
        self.store
            .save_state(session_id, &InternalState::default())
            .await
    }

    pub fn cache_stats(&self) -> MyceliumStats {
        self.mycelium.stats()
    }

    pub fn cache_health(&self) -> CacheHealth {
        self.mycelium.health()
    }

    /// Purge expired facts and report the sweep to telemetry.
    pub fn sweep_cache(&self) -> SweepRecord {
        let record = self.mycelium.sweep();
        self.telemetry.sweep(record);
        record
    }

    pub fn circuit_snapshot(&self) -> Vec<CircuitState> {
        self.cascade.circuit_snapshot()
    }

    fn reasoning_timeout(&self) -> Duration {
        Duration::from_millis(self.config.pipeline.reasoning_timeout_ms)
    }
}

fn log_mode_change(session_id: &str, analysis: &TurnAnalysis) {
    if analysis.regulation.mode_changed {
        let reason = analysis.regulation.change_reason.as_deref().unwrap_or("");
        tracing::info!(
            "Regulation mode now {} for {session_id}: {reason}",
            analysis.regulation.mode
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::adapter::{CallAdapter, CallRequest, CallResponse};
    use crate::config::{CascadeConfig, TierSpec};
    use crate::telemetry::{EventBody, MemorySink};
    use crate::types::{AdapterKind, TrustTrend};

    /// Routes each request by a substring of its system prompt, so the
    /// concurrent fan-out stays deterministic. The last scripted reply for a
    /// route is sticky.
    struct RouterAdapter {
        routes: Mutex<HashMap<&'static str, VecDeque<Result<String, String>>>>,
    }

    impl RouterAdapter {
        fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
            }
        }

        fn script(&self, key: &'static str, reply: Result<&str, &str>) {
            self.routes
                .lock()
                .unwrap()
                .entry(key)
                .or_default()
                .push_back(match reply {
                    Ok(text) => Ok(text.to_string()),
                    Err(error) => Err(error.to_string()),
                });
        }

        /// Replace a route's whole script with one reply.
        fn set(&self, key: &'static str, reply: Result<&str, &str>) {
            self.routes.lock().unwrap().remove(key);
            self.script(key, reply);
        }
    }

    #[async_trait]
    impl CallAdapter for RouterAdapter {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Anthropic
        }

        async fn complete(&self, request: &CallRequest) -> ChorusResult<CallResponse> {
            let mut routes = self.routes.lock().unwrap();
            for (key, queue) in routes.iter_mut() {
                if !request.system.contains(key) {
                    continue;
                }
                let reply = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                return match reply {
                    Some(Ok(text)) => Ok(CallResponse {
                        text,
                        model: request.model.clone(),
                        usage: Some(TokenUsage::new(20, 10)),
                    }),
                    Some(Err(error)) => Err(ChorusError::Adapter(error)),
                    None => Err(ChorusError::Adapter(format!("no reply scripted for {key}"))),
                };
            }
            Err(ChorusError::Adapter("unrouted request".into()))
        }
    }

    const ANALYTICAL: &str = "analytical voice";
    const RELATIONAL: &str = "relational voice";
    const ETHICS: &str = "ethics voice";
    const SYNTHESIS: &str = "expert synthesizer";
    const CHECKER: &str = "careful fact checker";

    fn calm_adapter() -> Arc<RouterAdapter> {
        let adapter = Arc::new(RouterAdapter::new());
        adapter.script(ANALYTICAL, Ok("The request is straightforward and well posed."));
        adapter.script(RELATIONAL, Ok("The person wants a clear, direct explanation."));
        adapter.script(ETHICS, Ok("No concerns raised by this request."));
        adapter.script(
            SYNTHESIS,
            Ok("Blue light scatters more strongly in the atmosphere."),
        );
        adapter.script(CHECKER, Ok(r#"{"confidence": 0.95, "issues": []}"#));
        adapter
    }

    fn build(adapter: Arc<RouterAdapter>) -> (Chorus, Arc<MemorySink>) {
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);

        let config = ChorusConfig {
            cascade: CascadeConfig {
                reasoning: vec![TierSpec::new("reason-model", AdapterKind::Anthropic)],
                synthesis: vec![TierSpec::new("synth-model", AdapterKind::Anthropic)],
                verification: vec![TierSpec::new("check-model", AdapterKind::Anthropic)],
                ..CascadeConfig::default()
            },
            ..ChorusConfig::default()
        };

        let sink = Arc::new(MemorySink::new());
        let mut hub = TelemetryHub::new();
        hub.add_sink(sink.clone());

        let chorus = Chorus::with_parts(
            config,
            Arc::new(registry),
            Arc::new(MemorySessionStore::new()),
            Arc::new(hub),
        );
        (chorus, sink)
    }

    #[tokio::test]
    async fn quiet_turn_yields_answer_and_high_trust() {
        let (chorus, _) = build(calm_adapter());

        let output = chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        assert_eq!(
            output.answer,
            "Blue light scatters more strongly in the atmosphere."
        );
        assert_eq!(output.state.mode, RegulationMode::Normal);
        // One question mark is the only signal: u = 0.08, τ = 1 - 0.3 * 0.08
        assert!((output.state.trust() - 0.976).abs() < 1e-9);
        assert_eq!(output.report.repair_count, 0);
        assert!(!output.report.heightened);
        assert!(!output.report.unstabilized);
        assert!(output.report.degraded_roles.is_empty());
        assert_eq!(output.report.post_check_confidence, Some(0.95));
        assert_eq!(output.report.trend, TrustTrend::Stable);
    }

    #[tokio::test]
    async fn quiet_turn_walks_phases_in_order() {
        let (chorus, _) = build(calm_adapter());

        let output = chorus.process_turn("s1", "Why is the sky blue?").await.unwrap();

        assert_eq!(
            output.report.phases,
            vec![
                PipelinePhase::CollectRoles,
                PipelinePhase::Analyze,
                PipelinePhase::Synthesize,
                PipelinePhase::VerifyPost,
                PipelinePhase::Done,
            ]
        );
        assert_eq!(
            output.report.roles_used,
            vec![
                RoleName::Analytical,
                RoleName::Relational,
                RoleName::Ethics,
                RoleName::Synthesis,
            ]
        );
        assert!(output.report.usage.total() > 0);
    }

    #[tokio::test]
    async fn failing_role_degrades_but_turn_completes() {
        let adapter = calm_adapter();
        adapter.set(ANALYTICAL, Err("backend down"));
        let (chorus, _) = build(adapter);

        let output = chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        assert_eq!(output.report.degraded_roles, vec![RoleName::Analytical]);
        assert_eq!(
            output.answer,
            "Blue light scatters more strongly in the atmosphere."
        );
        // One degraded role (0.3) plus the question mark (0.08)
        assert!((output.state.uncertainty() - 0.38).abs() < 1e-9);
        assert!((output.state.trust() - 0.886).abs() < 1e-9);
        assert_eq!(output.state.mode, RegulationMode::Normal);
    }

    #[tokio::test]
    async fn user_reversal_repairs_to_exhaustion_then_proceeds() {
        let adapter = calm_adapter();
        let (chorus, _) = build(adapter);

        chorus.process_turn("s1", "The sky is blue.").await.unwrap();
        let output = chorus
            .process_turn("s1", "No wait, the sky is not blue.")
            .await
            .unwrap();

        // The echo against history cannot be repaired away by re-querying
        assert_eq!(output.report.repair_count, 3);
        assert!(output.report.unstabilized);
        assert_eq!(output.state.mode, RegulationMode::Clarify);
        assert_eq!(
            output
                .report
                .phases
                .iter()
                .filter(|p| **p == PipelinePhase::Repair)
                .count(),
            3
        );
        assert!(!output.answer.is_empty());
        assert!((output.state.contradiction() - 0.7).abs() < 1e-9);
        // τ = 1 - 0.3 * 0.7, down from the first turn's 1.0
        assert!((output.state.trust() - 0.79).abs() < 1e-9);
        assert_eq!(output.report.trend, TrustTrend::Decreasing);
    }

    #[tokio::test]
    async fn low_post_check_confidence_caveats_and_penalizes() {
        let adapter = calm_adapter();
        adapter.set(
            CHECKER,
            Ok(r#"{"confidence": 0.5, "issues": ["unsupported claim"]}"#),
        );
        let (chorus, _) = build(adapter);

        let output = chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        assert!(output.answer.ends_with(prompts::VERIFICATION_CAVEAT));
        assert!(output.report.heightened);
        assert_eq!(output.report.post_check_confidence, Some(0.5));
        // Baseline 0.976 minus the fixed 0.15 discrepancy penalty
        assert!((output.state.trust() - 0.826).abs() < 1e-9);
        assert_eq!(output.report.trend, TrustTrend::Decreasing);
    }

    #[tokio::test]
    async fn synthesis_exhaustion_is_the_only_fatal_error() {
        let adapter = calm_adapter();
        adapter.set(SYNTHESIS, Err("no capacity"));
        let (chorus, _) = build(adapter);

        let result = chorus.process_turn("s1", "Why is the sky blue?").await;

        match result {
            Err(ChorusError::NoResponse { role, .. }) => assert_eq!(role, "synthesis"),
            other => panic!("expected NoResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_persists_between_turns_and_resets() {
        let (chorus, _) = build(calm_adapter());

        let output = chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();
        assert_eq!(chorus.session_state("s1").await, output.state);

        chorus.reset_session("s1").await.unwrap();
        assert_eq!(chorus.session_state("s1").await, InternalState::default());
    }

    #[tokio::test]
    async fn turn_appends_both_messages_to_the_transcript() {
        let (chorus, _) = build(calm_adapter());

        chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        let history = chorus.store.load_history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "Why is the sky blue?");
        assert_eq!(
            history[1].text,
            "Blue light scatters more strongly in the atmosphere."
        );
    }

    #[tokio::test]
    async fn unreachable_store_still_completes_the_turn() {
        struct OfflineStore;

        #[async_trait]
        impl SessionStore for OfflineStore {
            async fn load_state(&self, _: &str) -> ChorusResult<Option<InternalState>> {
                Err(ChorusError::Session("store offline".into()))
            }
            async fn save_state(&self, _: &str, _: &InternalState) -> ChorusResult<()> {
                Err(ChorusError::Session("store offline".into()))
            }
            async fn append_message(&self, _: &str, _: &Message) -> ChorusResult<()> {
                Err(ChorusError::Session("store offline".into()))
            }
            async fn load_history(&self, _: &str) -> ChorusResult<Vec<Message>> {
                Err(ChorusError::Session("store offline".into()))
            }
        }

        let adapter = calm_adapter();
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        let config = ChorusConfig {
            cascade: CascadeConfig {
                reasoning: vec![TierSpec::new("reason-model", AdapterKind::Anthropic)],
                synthesis: vec![TierSpec::new("synth-model", AdapterKind::Anthropic)],
                verification: vec![TierSpec::new("check-model", AdapterKind::Anthropic)],
                ..CascadeConfig::default()
            },
            ..ChorusConfig::default()
        };
        let chorus = Chorus::with_parts(
            config,
            Arc::new(registry),
            Arc::new(OfflineStore),
            Arc::new(TelemetryHub::new()),
        );

        let output = chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();
        assert!(!output.answer.is_empty());
        assert!((output.state.trust() - 0.976).abs() < 1e-9);
    }

    #[tokio::test]
    async fn completed_turn_reaches_telemetry() {
        let (chorus, sink) = build(calm_adapter());

        chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        let turn_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e.body, EventBody::Turn(_)))
            .collect();
        assert_eq!(turn_events.len(), 1);
        assert_eq!(turn_events[0].session_id.as_deref(), Some("s1"));
        // Attempt records from the fan-out arrived too
        assert!(!sink.attempts().is_empty());
    }

    #[tokio::test]
    async fn sweep_reports_to_telemetry() {
        let (chorus, sink) = build(calm_adapter());

        chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();
        let record = chorus.sweep_cache();

        assert_eq!(record.expired, 0);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e.body, EventBody::Sweep(_))));
    }

    #[tokio::test]
    async fn post_check_records_answer_claims() {
        let (chorus, _) = build(calm_adapter());

        chorus
            .process_turn("s1", "Why is the sky blue?")
            .await
            .unwrap();

        // "Blue light scatters more strongly in the atmosphere." passes the
        // claim filter, so a confident post-check caches it
        let stats = chorus.cache_stats();
        assert!(stats.total >= 1);
        assert_eq!(chorus.cache_health(), CacheHealth::Healthy);
    }
}
