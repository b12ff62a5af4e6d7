//! Mycelium, the verified-fact web.
//!
//! Claims that survived verification are stored under a hash of their
//! normalized text, so re-verifying the same claim refreshes the existing
//! entry instead of growing the web. Entries live for a TTL counted from
//! their last verification; expired entries are invisible to reads and are
//! physically removed by `sweep`.
//!
//! Retrieval is deliberately cheap: keyword overlap with the query, scaled
//! by the fact's confidence and how recently it was verified. No embeddings,
//! no network.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::MyceliumConfig;
use crate::telemetry::SweepRecord;
use crate::types::clamp01;

/// A claim that passed verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedFact {
    pub claim: String,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_count: u32,
}

/// Aggregate view of the web
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyceliumStats {
    pub total: usize,
    pub active: usize,
    pub expired_pending: usize,
    /// Entries first created on the current UTC day; refreshes do not count
    pub growth_today: usize,
    pub avg_confidence: f64,
    /// Most-cited source identifiers among active facts, most frequent first
    pub top_sources: Vec<String>,
}

/// Coarse capacity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheHealth {
    Healthy,
    Strained,
    Saturated,
}

impl std::fmt::Display for CacheHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheHealth::Healthy => write!(f, "healthy"),
            CacheHealth::Strained => write!(f, "strained"),
            CacheHealth::Saturated => write!(f, "saturated"),
        }
    }
}

/// TTL'd fact store keyed by normalized-claim hash
pub struct Mycelium {
    config: MyceliumConfig,
    facts: DashMap<String, VerifiedFact>,
}

/// Hash key for a claim: whitespace-collapsed lowercase text through SHA-256
pub fn claim_key(claim: &str) -> String {
    let normalized = normalize(claim);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn normalize(claim: &str) -> String {
    claim
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

impl Mycelium {
    pub fn new(config: MyceliumConfig) -> Self {
        Self {
            config,
            facts: DashMap::new(),
        }
    }

    /// Store a verified claim. Returns true when the claim is new; an
    /// already-known claim (after normalization) is refreshed in place,
    /// keeping its original `created_at` and accumulating sources.
    pub fn record(
        &self,
        claim: &str,
        confidence: f64,
        sources: &[String],
        verified_by: Option<&str>,
    ) -> bool {
        self.record_at(claim, confidence, sources, verified_by, Utc::now())
    }

    pub fn record_at(
        &self,
        claim: &str,
        confidence: f64,
        sources: &[String],
        verified_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let key = claim_key(claim);
        let confidence = clamp01(confidence);

        if let Some(mut entry) = self.facts.get_mut(&key) {
            entry.confidence = confidence;
            entry.last_verified_at = now;
            entry.refresh_count += 1;
            for source in sources {
                if !entry.sources.contains(source) {
                    entry.sources.push(source.clone());
                }
            }
            if let Some(model) = verified_by {
                entry.verified_by = Some(model.to_string());
            }
            return false;
        }

        if self.facts.len() >= self.config.max_entries {
            self.evict_one(now);
        }

        self.facts.insert(
            key,
            VerifiedFact {
                claim: claim.trim().to_string(),
                confidence,
                sources: sources.to_vec(),
                verified_by: verified_by.map(|s| s.to_string()),
                created_at: now,
                last_verified_at: now,
                refresh_count: 0,
            },
        );
        true
    }

    /// Exact lookup by claim text; expired entries read as absent
    pub fn lookup(&self, claim: &str) -> Option<VerifiedFact> {
        self.lookup_at(claim, Utc::now())
    }

    pub fn lookup_at(&self, claim: &str, now: DateTime<Utc>) -> Option<VerifiedFact> {
        let entry = self.facts.get(&claim_key(claim))?;
        if self.is_expired(&entry, now) {
            return None;
        }
        Some(entry.clone())
    }

    /// Top facts for a query, ranked by
    /// keyword overlap × confidence × recency, ties newest-first
    pub fn get_relevant(&self, query: &str, limit: usize) -> Vec<VerifiedFact> {
        self.get_relevant_at(query, limit, Utc::now())
    }

    pub fn get_relevant_at(
        &self,
        query: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<VerifiedFact> {
        let query_words = words(query);
        if query_words.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(VerifiedFact, f64)> = self
            .facts
            .iter()
            .filter(|entry| !self.is_expired(entry, now))
            .filter_map(|entry| {
                let score = self.score(&query_words, &entry, now);
                if score > 0.0 {
                    Some((entry.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.last_verified_at.cmp(&a.0.last_verified_at))
        });
        scored.truncate(limit);
        scored.into_iter().map(|(fact, _)| fact).collect()
    }

    /// Physically remove expired entries
    pub fn sweep(&self) -> SweepRecord {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepRecord {
        let scanned = self.facts.len();
        self.facts.retain(|_, fact| {
            now - fact.last_verified_at < Duration::days(self.config.ttl_days)
        });
        SweepRecord {
            scanned,
            expired: scanned - self.facts.len(),
        }
    }

    pub fn stats(&self) -> MyceliumStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> MyceliumStats {
        let total = self.facts.len();
        let mut active = 0usize;
        let mut growth_today = 0usize;
        let mut confidence_sum = 0.0f64;
        let mut source_counts: HashMap<String, usize> = HashMap::new();
        let today = now.date_naive();

        for entry in self.facts.iter() {
            if !self.is_expired(&entry, now) {
                active += 1;
                confidence_sum += entry.confidence;
                for source in &entry.sources {
                    *source_counts.entry(source.clone()).or_default() += 1;
                }
            }
            if entry.created_at.date_naive() == today {
                growth_today += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = source_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_sources = ranked.into_iter().take(3).map(|(s, _)| s).collect();

        MyceliumStats {
            total,
            active,
            expired_pending: total - active,
            growth_today,
            avg_confidence: if active > 0 {
                confidence_sum / active as f64
            } else {
                0.0
            },
            top_sources,
        }
    }

    pub fn health(&self) -> CacheHealth {
        let ratio = self.facts.len() as f64 / self.config.max_entries as f64;
        if ratio >= 1.0 {
            CacheHealth::Saturated
        } else if ratio >= 0.8 {
            CacheHealth::Strained
        } else {
            CacheHealth::Healthy
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    fn is_expired(&self, fact: &VerifiedFact, now: DateTime<Utc>) -> bool {
        now - fact.last_verified_at >= Duration::days(self.config.ttl_days)
    }

    fn score(&self, query_words: &HashSet<String>, fact: &VerifiedFact, now: DateTime<Utc>) -> f64 {
        let claim_words = words(&fact.claim);
        let hits = query_words.intersection(&claim_words).count();
        if hits == 0 {
            return 0.0;
        }
        let overlap = hits as f64 / query_words.len() as f64;

        let ttl_secs = Duration::days(self.config.ttl_days).num_seconds() as f64;
        let age_secs = (now - fact.last_verified_at).num_seconds().max(0) as f64;
        let recency = (1.0 - age_secs / ttl_secs).clamp(0.0, 1.0);

        overlap * fact.confidence * recency
    }

    /// Make room for one insert: drop an expired entry if any, otherwise
    /// the entry verified longest ago
    fn evict_one(&self, now: DateTime<Utc>) {
        let expired_key = self
            .facts
            .iter()
            .find(|entry| self.is_expired(entry, now))
            .map(|entry| entry.key().clone());
        if let Some(key) = expired_key {
            self.facts.remove(&key);
            return;
        }

        let stalest = self
            .facts
            .iter()
            .min_by_key(|entry| entry.last_verified_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = stalest {
            self.facts.remove(&key);
        }
    }
}
