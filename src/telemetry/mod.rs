//! Telemetry: dispatch and turn analytics.
//!
//! Every cascade attempt, completed turn, and cache sweep flows through a
//! single hub with multiple output sinks. Recording is fire-and-forget: the
//! trait is infallible and sinks are expected to be non-blocking, so a slow
//! or broken sink can never stall a dispatch.
//!
//! ## Architecture
//!
//! ```text
//! Cascade / Pipeline / Mycelium
//!           │
//!           ▼
//!    TelemetryHub::emit(event)
//!           │
//!      ┌────┼────┐
//!      ▼    ▼    ▼
//!   Sink1 Sink2 Sink3
//!  (stdout)(memory)(callback)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AdapterKind, RoleName, TokenUsage, TurnReport};

/// How a single cascade attempt ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String },
    TimedOut,
    /// Tier skipped without a call because its circuit was open
    CircuitSkipped,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Succeeded)
    }
}

/// One tier attempt inside a cascade walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub role: RoleName,
    pub model: String,
    pub adapter: AdapterKind,
    pub tier: usize,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub estimated_cost_usd: f64,
}

/// A maintenance sweep over the fact cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRecord {
    pub scanned: usize,
    pub expired: usize,
}

/// Payload of a telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Attempt(AttemptRecord),
    Turn(Box<TurnReport>),
    Sweep(SweepRecord),
    Note { message: String },
}

/// A timestamped telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub body: EventBody,
}

impl TelemetryEvent {
    pub fn new(body: EventBody) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            body,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Format as a single-line log string.
    pub fn format_line(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let session = self
            .session_id
            .as_deref()
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        let body = match &self.body {
            EventBody::Attempt(a) => {
                let outcome = match &a.outcome {
                    AttemptOutcome::Succeeded => "ok".to_string(),
                    AttemptOutcome::Failed { error } => format!("failed: {error}"),
                    AttemptOutcome::TimedOut => "timeout".to_string(),
                    AttemptOutcome::CircuitSkipped => "circuit_skipped".to_string(),
                };
                format!(
                    "attempt role={} model={} tier={} {} {}ms",
                    a.role, a.model, a.tier, outcome, a.latency_ms
                )
            }
            EventBody::Turn(t) => format!(
                "turn id={} mode={} trust={:.2} repairs={} {}ms",
                t.turn_id, t.mode, t.trust, t.repair_count, t.processing_time_ms
            ),
            EventBody::Sweep(s) => {
                format!("sweep scanned={} expired={}", s.scanned, s.expired)
            }
            EventBody::Note { message } => format!("note {message}"),
        };
        format!("{ts}{session} {body}")
    }
}

/// Trait for telemetry output sinks.
///
/// Sinks receive events and write them to their target (stdout, memory, a
/// queue, etc.). Must be `Send + Sync` for concurrent use, and should never
/// block the caller.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent);

    /// Flush any buffered output.
    fn flush(&self) {}
}

/// The central hub that dispatches events to all attached sinks.
pub struct TelemetryHub {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }

    /// Convenience: record a cascade attempt.
    pub fn attempt(&self, session_id: Option<&str>, record: AttemptRecord) {
        let mut event = TelemetryEvent::new(EventBody::Attempt(record));
        if let Some(id) = session_id {
            event = event.with_session(id);
        }
        self.emit(&event);
    }

    /// Convenience: record a completed turn.
    pub fn turn(&self, session_id: &str, report: TurnReport) {
        self.emit(&TelemetryEvent::new(EventBody::Turn(Box::new(report))).with_session(session_id));
    }

    /// Convenience: record a cache sweep.
    pub fn sweep(&self, record: SweepRecord) {
        self.emit(&TelemetryEvent::new(EventBody::Sweep(record)));
    }

    /// Convenience: record a free-form note.
    pub fn note(&self, message: impl Into<String>) {
        self.emit(&TelemetryEvent::new(EventBody::Note {
            message: message.into(),
        }));
    }

    /// Flush all sinks.
    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }

    /// Number of attached sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Built-in Sinks ────────────────────────────────────────────────────────

/// Sink that writes formatted lines to stdout.
pub struct StdoutSink;

impl TelemetrySink for StdoutSink {
    fn record(&self, event: &TelemetryEvent) {
        println!("{}", event.format_line());
    }
}

/// Sink that collects events in memory (for testing / inspection).
pub struct MemorySink {
    events: std::sync::Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Just the attempt records, in emission order.
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match &e.body {
                EventBody::Attempt(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: &TelemetryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Sink that forwards events to a callback. Useful for bridging into an
/// external queue without blocking the hub.
pub struct CallbackSink {
    callback: Box<dyn Fn(&TelemetryEvent) + Send + Sync>,
}

impl CallbackSink {
    pub fn new(callback: impl Fn(&TelemetryEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl TelemetrySink for CallbackSink {
    fn record(&self, event: &TelemetryEvent) {
        (self.callback)(event);
    }
}
