//! Final-answer synthesis over settled reasoning chains.
//!
//! Three tiers, tried in order, so the turn always produces an answer:
//! a model-driven synthesis call, a weighted concatenation of the chains,
//! and a fixed diagnostic reply when nothing usable survived.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ledger::ReasoningChain;
use crate::prompts::{clip, synthesis_prompt};
use crate::registry::{SharedRegistry, SpecialistId};
use crate::upstream::{ChatMessage, ChatRequest, CompletionBackend};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Excerpt budget for the top-weighted chain in the concat fallback.
    pub lead_excerpt_chars: usize,
    /// Excerpt budget for each supplementary chain.
    pub supplement_excerpt_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 2500,
            lead_excerpt_chars: 300,
            supplement_excerpt_chars: 150,
        }
    }
}

/// Which fallback tier produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisTier {
    Model,
    WeightedConcat,
    Diagnostic,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResult {
    pub final_answer: String,
    pub reasoning: String,
    pub specialists_used: Vec<SpecialistId>,
    /// Original routing weights of every chain in the turn, including
    /// failed ones.
    pub weight_distribution: HashMap<SpecialistId, f32>,
    pub tier: SynthesisTier,
}

#[derive(Deserialize)]
struct ModelSynthesis {
    #[serde(rename = "finalAnswer")]
    final_answer: String,
    #[serde(rename = "synthesisReasoning")]
    synthesis_reasoning: Option<String>,
}

/// Combines chain outputs into the final answer. Never fails: every tier
/// miss degrades to the next one.
pub struct Synthesizer {
    backend: Arc<dyn CompletionBackend>,
    registry: SharedRegistry,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: SharedRegistry,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    pub async fn synthesize(&self, user_query: &str, chains: &[ReasoningChain]) -> SynthesisResult {
        let weight_distribution: HashMap<SpecialistId, f32> =
            chains.iter().map(|c| (c.specialist, c.weight)).collect();

        // Partial content from a failed chain still contributes.
        let mut valid: Vec<&ReasoningChain> = chains
            .iter()
            .filter(|c| !c.content.trim().is_empty())
            .collect();
        valid.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if valid.is_empty() {
            return self.diagnostic(weight_distribution);
        }

        let specialists_used: Vec<SpecialistId> = valid.iter().map(|c| c.specialist).collect();

        match self.model_synthesis(user_query, &valid).await {
            Some((final_answer, reasoning)) => SynthesisResult {
                final_answer,
                reasoning,
                specialists_used,
                weight_distribution,
                tier: SynthesisTier::Model,
            },
            None => self.weighted_concat(&valid, specialists_used, weight_distribution),
        }
    }

    async fn model_synthesis(
        &self,
        user_query: &str,
        valid: &[&ReasoningChain],
    ) -> Option<(String, String)> {
        let chain_block = self.format_chain_block(valid);
        let request = ChatRequest {
            messages: vec![ChatMessage::user(synthesis_prompt(user_query, &chain_block))],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            label: Some("synthesis".to_string()),
        };

        let raw = match self.backend.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "synthesis call failed, degrading to concatenation");
                return None;
            }
        };

        match extract_json_object(&raw).and_then(|json| {
            serde_json::from_str::<ModelSynthesis>(json).ok()
        }) {
            Some(parsed) if !parsed.final_answer.trim().is_empty() => {
                debug!("model synthesis succeeded");
                Some((
                    parsed.final_answer,
                    parsed
                        .synthesis_reasoning
                        .unwrap_or_else(|| "sintesi guidata dal modello".to_string()),
                ))
            }
            _ => {
                warn!("synthesis response not parseable, degrading to concatenation");
                None
            }
        }
    }

    fn format_chain_block(&self, valid: &[&ReasoningChain]) -> String {
        valid
            .iter()
            .map(|chain| {
                let name = self.registry.get(chain.specialist).name;
                format!(
                    "**{} (peso: {:.0}%)**:\n{}\n",
                    name,
                    chain.weight * 100.0,
                    chain.content.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tier 2: highest-weight chain leads, up to two others supplement.
    fn weighted_concat(
        &self,
        valid: &[&ReasoningChain],
        specialists_used: Vec<SpecialistId>,
        weight_distribution: HashMap<SpecialistId, f32>,
    ) -> SynthesisResult {
        let lead = valid[0];
        let mut answer = format!(
            "Basandomi sull'analisi degli specialisti:\n\n{}",
            clip(lead.content.trim(), self.config.lead_excerpt_chars)
        );

        let supplements: Vec<String> = valid
            .iter()
            .skip(1)
            .take(2)
            .map(|chain| {
                format!(
                    "- **{}**: {}",
                    self.registry.get(chain.specialist).name,
                    clip(chain.content.trim(), self.config.supplement_excerpt_chars)
                )
            })
            .collect();
        if !supplements.is_empty() {
            answer.push_str("\n\n**Considerazioni aggiuntive:**\n");
            answer.push_str(&supplements.join("\n"));
        }

        SynthesisResult {
            final_answer: answer,
            reasoning: format!(
                "concatenazione pesata di {} catene, guidata da {}",
                valid.len(),
                self.registry.get(lead.specialist).name
            ),
            specialists_used,
            weight_distribution,
            tier: SynthesisTier::WeightedConcat,
        }
    }

    /// Tier 3: nothing usable survived.
    fn diagnostic(&self, weight_distribution: HashMap<SpecialistId, f32>) -> SynthesisResult {
        let names: Vec<&str> = weight_distribution
            .keys()
            .map(|id| self.registry.get(*id).name)
            .collect();
        SynthesisResult {
            final_answer: format!(
                "Mi dispiace, non sono riuscito a elaborare una risposta: le catene di \
                 ragionamento degli specialisti coinvolti ({}) non hanno prodotto contenuto \
                 utilizzabile. Riprova riformulando la domanda.",
                names.join(", ")
            ),
            reasoning: "nessuna catena con contenuto utilizzabile".to_string(),
            specialists_used: Vec::new(),
            weight_distribution,
            tier: SynthesisTier::Diagnostic,
        }
    }
}

/// Extract the outermost JSON object from model output that may wrap it in
/// prose or code fences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::testing::ScriptedBackend;
    use chrono::Utc;

    fn chain(specialist: SpecialistId, content: &str, weight: f32, error: Option<&str>) -> ReasoningChain {
        ReasoningChain {
            specialist,
            content: content.to_string(),
            is_streaming: false,
            is_complete: error.is_none(),
            error: error.map(String::from),
            weight,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
        }
    }

    fn synthesizer(backend: ScriptedBackend) -> Synthesizer {
        Synthesizer::new(Arc::new(backend), Registry::shared(), SynthesisConfig::default())
    }

    #[tokio::test]
    async fn test_model_tier_parses_wrapped_json() {
        let backend = ScriptedBackend::new().with_completion(
            "synthesis",
            "Ecco la sintesi:\n```json\n{\"finalAnswer\":\"Risposta integrata.\",\"synthesisReasoning\":\"ho combinato le catene\"}\n```",
        );
        let s = synthesizer(backend);
        let chains = vec![chain(SpecialistId::AnalyticTechnical, "ragionamento tecnico", 1.0, None)];

        let result = s.synthesize("domanda", &chains).await;
        assert_eq!(result.tier, SynthesisTier::Model);
        assert_eq!(result.final_answer, "Risposta integrata.");
        assert_eq!(result.specialists_used, vec![SpecialistId::AnalyticTechnical]);
    }

    #[tokio::test]
    async fn test_unparseable_model_output_degrades_to_concat() {
        let backend =
            ScriptedBackend::new().with_completion("synthesis", "risposta libera senza JSON");
        let s = synthesizer(backend);
        let chains = vec![
            chain(SpecialistId::CreativeIdeator, "idea uno, idea due", 0.6, None),
            chain(SpecialistId::AnalyticTechnical, "dettaglio tecnico", 0.4, None),
        ];

        let result = s.synthesize("domanda", &chains).await;
        assert_eq!(result.tier, SynthesisTier::WeightedConcat);
        assert!(result.final_answer.starts_with("Basandomi sull'analisi degli specialisti:"));
        // Lead chain is the highest-weight one.
        assert!(result.final_answer.contains("idea uno"));
        assert!(result.final_answer.contains("**Considerazioni aggiuntive:**"));
        assert!(result.final_answer.contains("dettaglio tecnico"));
    }

    #[tokio::test]
    async fn test_failed_synthesis_call_degrades_to_concat() {
        let backend = ScriptedBackend::new().failing_completions();
        let s = synthesizer(backend);
        let chains = vec![chain(SpecialistId::CriticalVerifier, "verifica completata", 1.0, None)];

        let result = s.synthesize("domanda", &chains).await;
        assert_eq!(result.tier, SynthesisTier::WeightedConcat);
        assert!(result.final_answer.contains("verifica completata"));
    }

    #[tokio::test]
    async fn test_partial_content_from_failed_chain_still_counts() {
        let backend = ScriptedBackend::new().failing_completions();
        let s = synthesizer(backend);
        let chains = vec![
            chain(SpecialistId::AnalyticTechnical, "", 0.5, Some("timeout")),
            chain(SpecialistId::CreativeIdeator, "bozza parziale", 0.5, Some("connessione persa")),
        ];

        let result = s.synthesize("domanda", &chains).await;
        assert_eq!(result.tier, SynthesisTier::WeightedConcat);
        assert!(result.final_answer.contains("bozza parziale"));
        assert_eq!(result.specialists_used, vec![SpecialistId::CreativeIdeator]);
        // Weight distribution keeps every chain, failed ones included.
        assert_eq!(result.weight_distribution.len(), 2);
    }

    #[tokio::test]
    async fn test_no_usable_content_yields_diagnostic() {
        let backend = ScriptedBackend::new();
        let s = synthesizer(backend);
        let chains = vec![
            chain(SpecialistId::AnalyticTechnical, "   ", 0.7, Some("timeout")),
            chain(SpecialistId::EmpatheticFacilitator, "", 0.3, Some("errore")),
        ];

        let result = s.synthesize("domanda", &chains).await;
        assert_eq!(result.tier, SynthesisTier::Diagnostic);
        assert!(result.specialists_used.is_empty());
        assert!(result.final_answer.contains("Mi dispiace"));
        assert_eq!(result.weight_distribution.len(), 2);
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("testo {\"a\":1} coda"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("niente json"), None);
        assert_eq!(extract_json_object("} rovesciato {"), None);
    }
}
