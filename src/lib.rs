//! # chorus-core
//!
//! Multi-voice reasoning engine for Rust: several role perspectives answer
//! every user turn concurrently, a coherence chain measures how well they
//! hold together, and one synthesized reply comes back with a trust score
//! attached.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chorus_core::adapter::AdapterRegistry;
//! use chorus_core::{Chorus, ChorusConfig, ChorusError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ChorusError> {
//!     // Adapters come from the environment: ANTHROPIC_API_KEY,
//!     // OPENAI_API_KEY, OLLAMA_HOST
//!     let registry = Arc::new(AdapterRegistry::from_env());
//!     let chorus = Chorus::new(ChorusConfig::default(), registry);
//!
//!     let output = chorus.process_turn("demo", "Why is the sky blue?").await?;
//!     println!("{}", output.answer);
//!     println!(
//!         "mode {}  trust {:.2}  repairs {}",
//!         output.state.mode,
//!         output.state.trust(),
//!         output.report.repair_count,
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into these core modules:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Core types: `Message`, `RoleName`, `RoleResult`, `InternalState`, `TurnReport` |
//! | [`adapter`] | Provider adapters (Anthropic, OpenAI, Ollama) behind one completion trait |
//! | [`cascade`] | Tiered model dispatch with failover and per-binding circuit breakers |
//! | [`pipeline`] | The turn state machine: role fan-out, repair rounds, synthesis, verification |
//! | [`analysis`] | The coherence chain: intensity, contradiction scan, regulation, trust |
//! | [`classify`] | Query classification into fixed synthesis weight vectors |
//! | [`verify`] | Claim verification: cache-first pre-sweep and post-synthesis check |
//! | [`mycelium`] | Hash-keyed verified-fact cache with confidence decay and relevance retrieval |
//! | [`session`] | JSONL transcripts plus carried per-session state |
//! | [`telemetry`] | Attempt, turn, and sweep events fanned out to pluggable sinks |
//! | [`prompts`] | Prompt builders for role, synthesis, and verification calls |
//! | [`config`] | Nested configuration with serde JSON loading |
//! | [`error`] | Error types with thiserror: `Adapter`, `RateLimited`, `CascadeExhausted`, `NoResponse`, etc. |
//!
//! ## Coherence Self-Measurement: The Core Loop
//!
//! The [`analysis`] chain is what separates this from a plain fan-out-and-merge
//! pipeline. Every turn, in fixed order:
//!
//! - **Intensity** scores tension, uncertainty, and emotional intensity from
//!   the input text and the role payloads, including degraded roles and low
//!   self-reported confidence
//! - **Contradiction** scans for opposing terms, repeated reversals, and
//!   statements that negate something said earlier in the conversation
//! - **Regulation** maps those scores onto a pacing mode: `NORMAL`, `CLARIFY`
//!   when the turn needs a clarifying posture, `SLOW_DOWN` when pressure is
//!   high. A non-normal mode triggers bounded repair rounds that re-query a
//!   configured subset of roles before synthesis
//! - **Trust** folds the scores into a single τ in [0, 1], carried across
//!   turns and reduced further when the post-synthesis check finds the answer
//!   under-supported
//!
//! Degradation beats failure throughout: dead roles become placeholders, an
//! unreachable session store falls back to default state, a checker outage
//! leaves the answer uncaveated. Only synthesis exhaustion surfaces as an
//! error, because then there is nothing to reply with.

pub mod adapter;
pub mod analysis;
pub mod cascade;
pub mod classify;
pub mod config;
pub mod error;
pub mod mycelium;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod verify;

pub use config::ChorusConfig;
pub use error::{ChorusError, ChorusResult};
pub use pipeline::Chorus;
pub use types::*;
