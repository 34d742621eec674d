//! End-to-end turn: routing, parallel chains, settlement, synthesis.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use conclave::testing::{ScriptedBackend, StreamScript};
use conclave::{
    CompletionBackend, EventBus, Orchestrator, OrchestratorConfig, Registry, Router, RouterConfig,
    SpecialistId, SynthesisConfig, SynthesisTier, Synthesizer, TurnEvent,
};

fn scripted_backend() -> ScriptedBackend {
    // Scripts for every persona so the test is robust to which subset the
    // router activates.
    ScriptedBackend::new()
        .with_stream(
            "analytic-technical",
            StreamScript::deltas(["Analisi dell'architettura: ", "componenti e stato."]),
        )
        .with_stream(
            "creative-ideator",
            StreamScript::deltas_with_delay(["Idee per contenuti: ", "tre direzioni possibili."], 5),
        )
        .with_stream(
            "critical-verifier",
            StreamScript::deltas(["Verifica dei rischi principali."]),
        )
        .with_stream(
            "empathetic-facilitator",
            StreamScript::deltas(["Considerazioni sul pubblico."]),
        )
        .with_completion(
            "synthesis",
            r#"{"finalAnswer":"Piano completo: architettura solida e contenuti mirati.","synthesisReasoning":"catene integrate per peso"}"#,
        )
}

fn engine(backend: Arc<ScriptedBackend>) -> (Router, Orchestrator, conclave::SharedEventBus) {
    let registry = Registry::shared();
    let bus = EventBus::shared();
    let router = Router::new(Arc::clone(&registry), RouterConfig::default());
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
        OrchestratorConfig {
            stagger_ms: 1,
            synthesis_debounce_ms: 1,
            ..OrchestratorConfig::default()
        },
    );
    (router, orchestrator, bus)
}

#[tokio::test]
async fn full_turn_routes_streams_and_synthesizes() {
    let backend = Arc::new(scripted_backend());
    let (router, orchestrator, bus) = engine(backend.clone());
    let mut events = bus.subscribe();

    let decision = router
        .route("Analizza l'architettura React del mio progetto e dammi idee creative per i contenuti")
        .unwrap();
    assert!(!decision.use_generic);
    assert!(decision.selected.len() >= 2);
    let selected: Vec<SpecialistId> = decision.selected.iter().map(|s| s.id).collect();
    assert!(selected.contains(&SpecialistId::AnalyticTechnical));
    assert!(selected.contains(&SpecialistId::CreativeIdeator));

    let outcome = orchestrator
        .run_turn(&decision, &[], CancellationToken::new())
        .await
        .unwrap();

    // Every selected chain settled with its streamed content.
    assert_eq!(outcome.chains.len(), decision.selected.len());
    for chain in &outcome.chains {
        assert!(chain.is_settled());
        assert!(chain.is_complete);
        assert!(!chain.content.is_empty());
        assert!(!chain.is_streaming);
    }

    let synthesis = outcome.synthesis.expect("turn produces a synthesis");
    assert_eq!(synthesis.tier, SynthesisTier::Model);
    assert!(synthesis.final_answer.contains("Piano completo"));
    assert_eq!(synthesis.weight_distribution.len(), decision.selected.len());
    assert_eq!(backend.completion_calls(), 1);

    // Event order: every creation precedes its settlement, synthesis events
    // come last and exactly once.
    let mut created = 0;
    let mut settled = 0;
    let mut synthesis_started = 0;
    let mut synthesis_ready = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.decision_id(), decision.id);
        match event {
            TurnEvent::ChainCreated { .. } => {
                assert_eq!(synthesis_started, 0);
                created += 1;
            }
            TurnEvent::ChainDelta { .. } => assert_eq!(synthesis_started, 0),
            TurnEvent::ChainSettled { error, .. } => {
                assert!(error.is_none());
                assert_eq!(synthesis_started, 0);
                settled += 1;
            }
            TurnEvent::SynthesisStarted { .. } => {
                assert_eq!(settled, created);
                synthesis_started += 1;
            }
            TurnEvent::SynthesisReady { .. } => synthesis_ready += 1,
            TurnEvent::TurnFailed { .. } => panic!("turn must not fail"),
        }
    }
    assert_eq!(created, decision.selected.len());
    assert_eq!(settled, created);
    assert_eq!(synthesis_started, 1);
    assert_eq!(synthesis_ready, 1);
}

#[tokio::test]
async fn greeting_turn_never_touches_the_backend() {
    let backend = Arc::new(ScriptedBackend::new());
    let (router, orchestrator, _bus) = engine(backend.clone());

    let decision = router.route("Ciao, come stai?").unwrap();
    assert!(decision.use_generic);
    assert!(decision.direct_reply.is_some());

    let outcome = orchestrator
        .run_turn(&decision, &[], CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.chains.is_empty());
    assert!(outcome.synthesis.is_none());
    assert_eq!(backend.completion_calls(), 0);
}

#[tokio::test]
async fn turn_with_partial_failure_still_answers() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_stream(
                "analytic-technical",
                StreamScript::deltas(["Analisi completata."]),
            )
            .with_stream(
                "creative-ideator",
                StreamScript::fail_after(["Prime idee: "], "stream interrotto"),
            )
            .with_stream(
                "critical-verifier",
                StreamScript::deltas(["Verifica ok."]),
            )
            .with_stream(
                "empathetic-facilitator",
                StreamScript::deltas(["Tono adeguato."]),
            )
            // No synthesis script: the model tier fails and the weighted
            // concatenation takes over.
            .failing_completions(),
    );
    let (router, orchestrator, _bus) = engine(backend.clone());

    let decision = router
        .route("Analizza il codice del sito e proponi idee creative per i contenuti")
        .unwrap();
    assert!(!decision.use_generic);

    let outcome = orchestrator
        .run_turn(&decision, &[], CancellationToken::new())
        .await
        .unwrap();

    let synthesis = outcome.synthesis.expect("fallback still yields an answer");
    assert_eq!(synthesis.tier, SynthesisTier::WeightedConcat);
    assert!(synthesis
        .final_answer
        .starts_with("Basandomi sull'analisi degli specialisti:"));
    // Failed chains keep their weight in the distribution.
    assert_eq!(synthesis.weight_distribution.len(), decision.selected.len());
}
