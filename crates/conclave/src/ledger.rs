//! Authoritative per-turn record of reasoning chains.
//!
//! The ledger is the single source of truth for chain state: streamed
//! content, completion, and failure all land here before any event goes out.
//! Settlement is first-write-wins so a chain can never complete twice or
//! flip from completed to failed.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::SpecialistId;

/// One specialist's reasoning stream for the current turn.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningChain {
    pub specialist: SpecialistId,
    /// Accumulated streamed content, partial until the chain settles.
    pub content: String,
    pub is_streaming: bool,
    pub is_complete: bool,
    pub error: Option<String>,
    /// Routing weight, carried for synthesis ordering.
    pub weight: f32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReasoningChain {
    fn new(specialist: SpecialistId, weight: f32) -> Self {
        Self {
            specialist,
            content: String::new(),
            is_streaming: true,
            is_complete: false,
            error: None,
            weight,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// A chain is settled once it has completed or failed.
    pub fn is_settled(&self) -> bool {
        self.is_complete || self.error.is_some()
    }
}

/// Thread-safe chain store for one turn.
#[derive(Debug, Default)]
pub struct ChainLedger {
    inner: Mutex<HashMap<SpecialistId, ReasoningChain>>,
}

impl ChainLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SpecialistId, ReasoningChain>> {
        // A poisoned lock still holds consistent chain data; recover it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a chain before its worker starts streaming.
    pub fn create(&self, specialist: SpecialistId, weight: f32) {
        self.lock()
            .insert(specialist, ReasoningChain::new(specialist, weight));
    }

    /// Append streamed content. Ignored once the chain has settled.
    pub fn append(&self, specialist: SpecialistId, delta: &str) {
        let mut chains = self.lock();
        if let Some(chain) = chains.get_mut(&specialist) {
            if !chain.is_settled() {
                chain.content.push_str(delta);
            }
        }
    }

    /// Mark a chain complete. Returns false if it was already settled.
    pub fn settle_ok(&self, specialist: SpecialistId) -> bool {
        let mut chains = self.lock();
        match chains.get_mut(&specialist) {
            Some(chain) if !chain.is_settled() => {
                chain.is_streaming = false;
                chain.is_complete = true;
                chain.finished_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Mark a chain failed, keeping any partial content. Returns false if it
    /// was already settled.
    pub fn settle_err(&self, specialist: SpecialistId, error: &str) -> bool {
        let mut chains = self.lock();
        match chains.get_mut(&specialist) {
            Some(chain) if !chain.is_settled() => {
                chain.is_streaming = false;
                chain.error = Some(error.to_string());
                chain.finished_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, specialist: SpecialistId) -> Option<ReasoningChain> {
        self.lock().get(&specialist).cloned()
    }

    /// All chains, in registry order.
    pub fn snapshot(&self) -> Vec<ReasoningChain> {
        let chains = self.lock();
        SpecialistId::ALL
            .iter()
            .filter_map(|id| chains.get(id).cloned())
            .collect()
    }

    pub fn settled_count(&self) -> usize {
        self.lock().values().filter(|c| c.is_settled()).count()
    }

    pub fn total(&self) -> usize {
        self.lock().len()
    }

    pub fn all_settled(&self) -> bool {
        let chains = self.lock();
        !chains.is_empty() && chains.values().all(|c| c.is_settled())
    }
}
