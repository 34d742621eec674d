//! Activation selection: turns per-specialist scores into a routing decision.
//!
//! The router owns the generic-path detection (trivial inputs skip the
//! specialist machinery entirely) and the dynamic activation threshold. The
//! decision it produces is an immutable value the orchestrator executes
//! against; scores are never recomputed downstream.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::analysis::{normalize, Complexity, FeatureExtractor, FeatureVector};
use crate::error::EngineError;
use crate::registry::{Registry, SpecialistId};
use crate::scoring::{score_all, SpecialistScore};

/// Tunables for the activation selector. Defaults match production.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum score to activate a specialist.
    pub activation_threshold: f32,
    /// Multiplier applied to the threshold when the input strongly spans
    /// multiple competences.
    pub threshold_reduction: f32,
    /// Multi-competence level above which any threshold reduction applies.
    pub multi_competence_floor: f32,
    /// Multi-competence level above which the full reduction applies.
    pub multi_competence_strong: f32,
    /// Hard cap on concurrently activated specialists.
    pub max_specialists: usize,
    /// Token ceiling below which a weak input may take the generic path.
    pub generic_token_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 0.15,
            threshold_reduction: 0.7,
            multi_competence_floor: 0.1,
            multi_competence_strong: 0.3,
            max_specialists: 3,
            generic_token_limit: 8,
        }
    }
}

/// A specialist chosen for this turn, with its normalized contribution.
#[derive(Debug, Clone)]
pub struct SelectedSpecialist {
    pub id: SpecialistId,
    /// Normalized weight; selected weights always sum to 1.
    pub weight: f32,
    pub raw_score: f32,
    pub reasoning: Vec<String>,
}

/// Immutable outcome of routing one input.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub input: String,
    /// Skip specialists entirely and answer on the generic path.
    pub use_generic: bool,
    pub selected: Vec<SelectedSpecialist>,
    pub all_scores: Vec<SpecialistScore>,
    pub features: FeatureVector,
    /// Effective activation threshold after any reduction.
    pub threshold: f32,
    pub reasoning: String,
    /// Canned reply for fixed conversational phrases; skips the model call.
    pub direct_reply: Option<String>,
}

/// Fixed replies for greeting-class inputs, keyed by normalized phrase.
const DIRECT_REPLIES: &[(&str, &str)] = &[
    (
        r"^(ciao|salve|hello|hi|hey)( come stai| come va| tutto bene)?$",
        "Ciao! Sto bene, grazie. Come posso aiutarti oggi?",
    ),
    (
        r"^(buongiorno|buonasera)( come stai| come va| tutto bene)?$",
        "Buongiorno! Come posso esserti utile?",
    ),
    (
        r"^(come stai|come va|tutto bene)$",
        "Tutto bene, grazie! Dimmi pure di cosa hai bisogno.",
    ),
    (
        r"^grazie( mille)?$",
        "Prego! Se hai altre domande sono qui.",
    ),
];

fn direct_replies() -> &'static [(Regex, &'static str)] {
    static CELL: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    CELL.get_or_init(|| {
        DIRECT_REPLIES
            .iter()
            .map(|(p, reply)| (Regex::new(p).expect("static reply pattern is valid"), *reply))
            .collect()
    })
}

fn direct_reply_for(input: &str) -> Option<String> {
    let normalized = normalize(input);
    direct_replies()
        .iter()
        .find(|(r, _)| r.is_match(&normalized))
        .map(|(_, reply)| (*reply).to_string())
}

/// Stateless activation selector over a shared persona catalog.
pub struct Router {
    registry: std::sync::Arc<Registry>,
    extractor: FeatureExtractor,
    config: RouterConfig,
}

impl Router {
    pub fn new(registry: std::sync::Arc<Registry>, config: RouterConfig) -> Self {
        Self {
            registry,
            extractor: FeatureExtractor::new(),
            config,
        }
    }

    /// Route one input. Fails only on degenerate (empty) input; every other
    /// input produces a decision, generic or specialist.
    pub fn route(&self, input: &str) -> Result<RoutingDecision, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EngineError::DegenerateInput);
        }

        let features = self.extractor.extract(trimmed);
        let all_scores = score_all(&features, trimmed, &self.registry);

        if self.is_trivial(&features) {
            debug!(tokens = features.tokens, "generic path: trivial input");
            return Ok(RoutingDecision {
                id: Uuid::new_v4(),
                input: trimmed.to_string(),
                use_generic: true,
                selected: Vec::new(),
                all_scores,
                features,
                threshold: self.config.activation_threshold,
                reasoning: "input conversazionale semplice, risposta diretta".to_string(),
                direct_reply: direct_reply_for(trimmed),
            });
        }

        let threshold = self.effective_threshold(&features);

        // Stable sort: equal scores keep registry order as the tie-break.
        let mut ranked = all_scores.clone();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let activated: Vec<&SpecialistScore> = ranked
            .iter()
            .filter(|s| s.score >= threshold)
            .take(self.config.max_specialists)
            .collect();

        if activated.is_empty() {
            debug!(%threshold, "generic path: no specialist above threshold");
            return Ok(RoutingDecision {
                id: Uuid::new_v4(),
                input: trimmed.to_string(),
                use_generic: true,
                selected: Vec::new(),
                all_scores,
                features,
                threshold,
                reasoning: "nessuno specialista sopra la soglia di attivazione".to_string(),
                direct_reply: None,
            });
        }

        let total: f32 = activated.iter().map(|s| s.score).sum();
        let selected: Vec<SelectedSpecialist> = activated
            .iter()
            .map(|s| SelectedSpecialist {
                id: s.id,
                weight: s.score / total,
                raw_score: s.score,
                reasoning: s.reasoning.clone(),
            })
            .collect();

        let names: Vec<&str> = selected
            .iter()
            .map(|s| self.registry.get(s.id).name)
            .collect();
        let reasoning = format!(
            "attivati: {} (guida {}, soglia {:.3}, competenze multiple {:.2})",
            names.join(", "),
            names[0],
            threshold,
            features.multi_competence
        );
        debug!(
            selected = selected.len(),
            %threshold,
            multi_competence = features.multi_competence,
            "routing decision"
        );

        Ok(RoutingDecision {
            id: Uuid::new_v4(),
            input: trimmed.to_string(),
            use_generic: false,
            selected,
            all_scores,
            features,
            threshold,
            reasoning,
            direct_reply: None,
        })
    }

    /// Trivial inputs: short, low-complexity, no meaningful signal on any
    /// dimension. These never justify specialist chains.
    fn is_trivial(&self, features: &FeatureVector) -> bool {
        features.complexity == Complexity::Low
            && features.tokens <= self.config.generic_token_limit
            && features.max_dimension() < 0.2
            && features.multi_competence < self.config.multi_competence_floor
    }

    /// Lower the activation bar when the input spans competences, so that
    /// secondary specialists join the turn instead of being squeezed out by
    /// a dominant one.
    fn effective_threshold(&self, features: &FeatureVector) -> f32 {
        if features.multi_competence > self.config.multi_competence_strong {
            self.config.activation_threshold * self.config.threshold_reduction
        } else {
            self.config.activation_threshold
        }
    }
}
