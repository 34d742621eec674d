//! Parallel reasoning turn execution.
//!
//! For each selected specialist the orchestrator streams one reasoning chain
//! into the ledger, staggering the starts to avoid a thundering herd against
//! the upstream. The set of chain tasks is joined as a unit: synthesis runs
//! exactly once, strictly after every chain has settled, regardless of the
//! order in which chains finish or fail. A failed chain never aborts its
//! siblings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{EngineError, UpstreamError};
use crate::events::{SharedEventBus, TurnEvent};
use crate::ledger::{ChainLedger, ReasoningChain};
use crate::prompts::reasoning_prompt;
use crate::registry::{SharedRegistry, SpecialistId};
use crate::router::RoutingDecision;
use crate::synthesis::{SynthesisResult, Synthesizer};
use crate::upstream::{ChatMessage, ChatRequest, CompletionBackend};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Delay between consecutive chain starts.
    pub stagger_ms: u64,
    /// Pause between the last settlement and the synthesis call.
    pub synthesis_debounce_ms: u64,
    pub chain_temperature: f32,
    pub chain_max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stagger_ms: 150,
            synthesis_debounce_ms: 250,
            chain_temperature: 0.7,
            chain_max_tokens: 1500,
        }
    }
}

/// Everything one specialist turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub decision_id: uuid::Uuid,
    pub chains: Vec<ReasoningChain>,
    pub synthesis: Option<SynthesisResult>,
}

enum ChainOutcome {
    Settled(SpecialistId, Option<String>),
    Cancelled,
}

/// Runs routing decisions: spawns chains, joins them, synthesizes.
pub struct Orchestrator {
    backend: Arc<dyn CompletionBackend>,
    registry: SharedRegistry,
    bus: SharedEventBus,
    synthesizer: Synthesizer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: SharedRegistry,
        bus: SharedEventBus,
        synthesizer: Synthesizer,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            bus,
            synthesizer,
            config,
        }
    }

    /// Execute one decision end to end. Generic decisions return an empty
    /// outcome; the caller answers those on the generic path.
    pub async fn run_turn(
        &self,
        decision: &RoutingDecision,
        history: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, EngineError> {
        if decision.use_generic {
            return Ok(TurnOutcome {
                decision_id: decision.id,
                chains: Vec::new(),
                synthesis: None,
            });
        }

        let ledger = Arc::new(ChainLedger::new());
        for selected in &decision.selected {
            ledger.create(selected.id, selected.weight);
            self.bus.publish(TurnEvent::ChainCreated {
                decision_id: decision.id,
                specialist: selected.id,
                weight: selected.weight,
                timestamp: Utc::now(),
            });
        }
        info!(
            decision_id = %decision.id,
            chains = decision.selected.len(),
            "starting reasoning turn"
        );

        let mut join_set: JoinSet<ChainOutcome> = JoinSet::new();
        for (idx, selected) in decision.selected.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let ledger = Arc::clone(&ledger);
            let bus = Arc::clone(&self.bus);
            let cancel = cancel.clone();
            let specialist = selected.id;
            let decision_id = decision.id;
            let stagger = Duration::from_millis(self.config.stagger_ms * idx as u64);
            let request = self.chain_request(specialist, decision, history);

            join_set.spawn(async move {
                run_chain(
                    backend, ledger, bus, cancel, decision_id, specialist, stagger, request,
                )
                .await
            });
        }

        let mut cancelled = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(ChainOutcome::Settled(specialist, chain_error)) => {
                    self.bus.publish(TurnEvent::ChainSettled {
                        decision_id: decision.id,
                        specialist,
                        error: chain_error,
                        timestamp: Utc::now(),
                    });
                }
                Ok(ChainOutcome::Cancelled) => cancelled = true,
                Err(e) => {
                    error!(decision_id = %decision.id, error = %e, "chain task aborted");
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            self.bus.publish(TurnEvent::TurnFailed {
                decision_id: decision.id,
                reason: "turno annullato".to_string(),
                timestamp: Utc::now(),
            });
            return Err(EngineError::Cancelled);
        }

        // All chains settled; let trailing observers drain before synthesis.
        if self.config.synthesis_debounce_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.config.synthesis_debounce_ms)) => {}
            }
        }

        self.bus.publish(TurnEvent::SynthesisStarted {
            decision_id: decision.id,
            timestamp: Utc::now(),
        });
        let synthesis = self
            .synthesizer
            .synthesize(&decision.input, &ledger.snapshot())
            .await;
        self.bus.publish(TurnEvent::SynthesisReady {
            decision_id: decision.id,
            timestamp: Utc::now(),
        });
        info!(decision_id = %decision.id, tier = ?synthesis.tier, "turn complete");

        Ok(TurnOutcome {
            decision_id: decision.id,
            chains: ledger.snapshot(),
            synthesis: Some(synthesis),
        })
    }

    fn chain_request(
        &self,
        specialist: SpecialistId,
        decision: &RoutingDecision,
        history: &[ChatMessage],
    ) -> ChatRequest {
        let profile = self.registry.get(specialist);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(reasoning_prompt(profile)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(decision.input.clone()));
        ChatRequest {
            messages,
            temperature: self.config.chain_temperature,
            max_tokens: self.config.chain_max_tokens,
            label: Some(specialist.as_str().to_string()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_chain(
    backend: Arc<dyn CompletionBackend>,
    ledger: Arc<ChainLedger>,
    bus: SharedEventBus,
    cancel: CancellationToken,
    decision_id: uuid::Uuid,
    specialist: SpecialistId,
    stagger: Duration,
    request: ChatRequest,
) -> ChainOutcome {
    if !stagger.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => return ChainOutcome::Cancelled,
            _ = tokio::time::sleep(stagger) => {}
        }
    }

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let mut stream_fut = Box::pin(backend.stream_chat(request, tx));
    let mut stream_result: Option<Result<(), UpstreamError>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ChainOutcome::Cancelled,
            result = &mut stream_fut, if stream_result.is_none() => {
                // The sender side is gone now; the recv arm drains what is
                // left and then breaks.
                stream_result = Some(result);
            }
            delta = rx.recv() => match delta {
                Some(delta) => {
                    ledger.append(specialist, &delta);
                    bus.publish(TurnEvent::ChainDelta {
                        decision_id,
                        specialist,
                        delta,
                        timestamp: Utc::now(),
                    });
                }
                None => break,
            },
        }
    }

    match stream_result.unwrap_or(Ok(())) {
        Ok(()) => {
            ledger.settle_ok(specialist);
            ChainOutcome::Settled(specialist, None)
        }
        Err(e) => {
            warn!(%specialist, error = %e, "reasoning chain failed");
            let message = e.to_string();
            ledger.settle_err(specialist, &message);
            ChainOutcome::Settled(specialist, Some(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Complexity, FeatureVector};
    use crate::events::EventBus;
    use crate::registry::Registry;
    use crate::router::SelectedSpecialist;
    use crate::synthesis::{SynthesisConfig, SynthesisTier};
    use crate::testing::{ScriptedBackend, StreamScript};

    fn decision(selected: Vec<(SpecialistId, f32)>) -> RoutingDecision {
        RoutingDecision {
            id: uuid::Uuid::new_v4(),
            input: "domanda di prova".to_string(),
            use_generic: selected.is_empty(),
            selected: selected
                .into_iter()
                .map(|(id, weight)| SelectedSpecialist {
                    id,
                    weight,
                    raw_score: weight,
                    reasoning: Vec::new(),
                })
                .collect(),
            all_scores: Vec::new(),
            features: FeatureVector {
                words: 3,
                tokens: 4,
                complexity: Complexity::Medium,
                has_questions: false,
                technical: 0.5,
                creative: 0.0,
                analytical: 0.3,
                emotional: 0.0,
                urgency: 0.0,
                multi_competence: 0.0,
                domains: Vec::new(),
            },
            threshold: 0.15,
            reasoning: String::new(),
            direct_reply: None,
        }
    }

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            stagger_ms: 0,
            synthesis_debounce_ms: 0,
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> (Orchestrator, SharedEventBus) {
        let registry = Registry::shared();
        let bus = EventBus::shared();
        let synthesizer = Synthesizer::new(
            backend.clone() as Arc<dyn CompletionBackend>,
            Arc::clone(&registry),
            SynthesisConfig::default(),
        );
        let orchestrator = Orchestrator::new(
            backend,
            registry,
            Arc::clone(&bus),
            synthesizer,
            test_config(),
        );
        (orchestrator, bus)
    }

    const SYNTHESIS_JSON: &str =
        r#"{"finalAnswer":"Risposta sintetizzata.","synthesisReasoning":"combinate"}"#;

    #[tokio::test]
    async fn test_synthesis_fires_once_after_every_chain_settles() {
        // Completion order scrambled on purpose: the highest-weight chain
        // finishes last.
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_stream(
                    "analytic-technical",
                    StreamScript::deltas_with_delay(["analisi ", "tecnica"], 30),
                )
                .with_stream("creative-ideator", StreamScript::deltas(["idee"]))
                .with_stream(
                    "critical-verifier",
                    StreamScript::deltas_with_delay(["verifica"], 10),
                )
                .with_completion("synthesis", SYNTHESIS_JSON),
        );
        let (orchestrator, _bus) = orchestrator(backend.clone());
        let decision = decision(vec![
            (SpecialistId::AnalyticTechnical, 0.5),
            (SpecialistId::CreativeIdeator, 0.3),
            (SpecialistId::CriticalVerifier, 0.2),
        ]);

        let outcome = orchestrator
            .run_turn(&decision, &[], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.completion_calls(), 1);
        let synthesis = outcome.synthesis.unwrap();
        assert_eq!(synthesis.tier, SynthesisTier::Model);
        assert_eq!(outcome.chains.len(), 3);
        assert!(outcome.chains.iter().all(|c| c.is_settled()));
        let analytic = outcome
            .chains
            .iter()
            .find(|c| c.specialist == SpecialistId::AnalyticTechnical)
            .unwrap();
        assert_eq!(analytic.content, "analisi tecnica");
    }

    #[tokio::test]
    async fn test_failed_chain_does_not_block_synthesis() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_stream("analytic-technical", StreamScript::deltas(["ragionamento"]))
                .with_stream(
                    "creative-ideator",
                    StreamScript::fail_after(["bozza "], "connessione persa"),
                )
                .with_stream("empathetic-facilitator", StreamScript::deltas(["supporto"]))
                .with_completion("synthesis", SYNTHESIS_JSON),
        );
        let (orchestrator, bus) = orchestrator(backend.clone());
        let mut rx = bus.subscribe();
        let decision = decision(vec![
            (SpecialistId::AnalyticTechnical, 0.4),
            (SpecialistId::CreativeIdeator, 0.4),
            (SpecialistId::EmpatheticFacilitator, 0.2),
        ]);

        let outcome = orchestrator
            .run_turn(&decision, &[], CancellationToken::new())
            .await
            .unwrap();

        let synthesis = outcome.synthesis.unwrap();
        // Failed chain keeps its weight in the distribution.
        assert_eq!(synthesis.weight_distribution.len(), 3);
        let failed = outcome
            .chains
            .iter()
            .find(|c| c.specialist == SpecialistId::CreativeIdeator)
            .unwrap();
        assert_eq!(failed.content, "bozza ");
        assert!(failed.error.as_deref().unwrap().contains("connessione persa"));

        // The settled event for the failed chain carries its error.
        let mut settled_errors = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TurnEvent::ChainSettled { specialist, error, .. } = event {
                settled_errors.push((specialist, error));
            }
        }
        assert_eq!(settled_errors.len(), 3);
        assert!(settled_errors
            .iter()
            .any(|(id, e)| *id == SpecialistId::CreativeIdeator && e.is_some()));
    }

    #[tokio::test]
    async fn test_cancellation_stops_turn_without_synthesis() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_stream("analytic-technical", StreamScript::Hang)
                .with_stream("creative-ideator", StreamScript::Hang),
        );
        let (orchestrator, bus) = orchestrator(backend.clone());
        let mut rx = bus.subscribe();
        let decision = decision(vec![
            (SpecialistId::AnalyticTechnical, 0.5),
            (SpecialistId::CreativeIdeator, 0.5),
        ]);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = orchestrator.run_turn(&decision, &[], cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(backend.completion_calls(), 0);

        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                TurnEvent::SynthesisStarted { .. } | TurnEvent::SynthesisReady { .. } => {
                    panic!("synthesis must not run on a cancelled turn")
                }
                TurnEvent::TurnFailed { .. } => saw_failed = true,
                _ => {}
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_generic_decision_short_circuits() {
        let backend = Arc::new(ScriptedBackend::new());
        let (orchestrator, _bus) = orchestrator(backend.clone());
        let decision = decision(Vec::new());

        let outcome = orchestrator
            .run_turn(&decision, &[], CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.chains.is_empty());
        assert!(outcome.synthesis.is_none());
        assert_eq!(backend.completion_calls(), 0);
    }

    #[tokio::test]
    async fn test_history_is_threaded_into_chain_requests() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_stream("analytic-technical", StreamScript::deltas(["ok"]))
                .with_completion("synthesis", SYNTHESIS_JSON),
        );
        let (orchestrator, _bus) = orchestrator(backend.clone());
        let decision = decision(vec![(SpecialistId::AnalyticTechnical, 1.0)]);
        let history = vec![
            ChatMessage::user("domanda precedente"),
            ChatMessage::assistant("risposta precedente"),
        ];

        let request = orchestrator.chain_request(SpecialistId::AnalyticTechnical, &decision, &history);
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "domanda precedente");
        assert_eq!(request.messages[2].role, "assistant");
        assert_eq!(request.messages[3].content, "domanda di prova");
        assert_eq!(request.label.as_deref(), Some("analytic-technical"));
    }
}
