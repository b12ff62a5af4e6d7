//! Session persistence.
//!
//! One transcript file per session (JSONL, append-only) plus one state file
//! (JSON, rewritten each turn). The pipeline treats every store error as
//! survivable: a turn that cannot load state runs from the default state,
//! and a turn that cannot save still returns its answer.

use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ChorusResult;
use crate::types::{InternalState, Message};

/// Where carried state and transcripts live between turns
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_state(&self, session_id: &str) -> ChorusResult<Option<InternalState>>;
    async fn save_state(&self, session_id: &str, state: &InternalState) -> ChorusResult<()>;
    async fn append_message(&self, session_id: &str, message: &Message) -> ChorusResult<()>;
    async fn load_history(&self, session_id: &str) -> ChorusResult<Vec<Message>>;
}

// ─── File Store ──────────────────────────────────────────────────────────────

/// JSONL-backed store rooted at one directory
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    fn state_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.state.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_state(&self, session_id: &str) -> ChorusResult<Option<InternalState>> {
        let path = self.state_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        let state: InternalState = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    async fn save_state(&self, session_id: &str, state: &InternalState) -> ChorusResult<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(self.state_path(session_id), json).await?;
        Ok(())
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> ChorusResult<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let line = serde_json::to_string(message)? + "\n";

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(session_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn load_history(&self, session_id: &str) -> ChorusResult<Vec<Message>> {
        let path = self.transcript_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        // Unreadable lines are dropped rather than failing the whole load
        let messages: Vec<Message> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(messages)
    }
}

// ─── Memory Store ────────────────────────────────────────────────────────────

/// In-process store; the default when no session directory is configured
#[derive(Default)]
pub struct MemorySessionStore {
    states: DashMap<String, InternalState>,
    transcripts: DashMap<String, Vec<Message>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_state(&self, session_id: &str) -> ChorusResult<Option<InternalState>> {
        Ok(self.states.get(session_id).map(|s| s.clone()))
    }

    async fn save_state(&self, session_id: &str, state: &InternalState) -> ChorusResult<()> {
        self.states.insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> ChorusResult<()> {
        self.transcripts
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_history(&self, session_id: &str) -> ChorusResult<Vec<Message>> {
        Ok(self
            .transcripts
            .get(session_id)
            .map(|t| t.clone())
            .unwrap_or_default())
    }
}
