use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conclave::upstream::ChatRequest;
use conclave::{
    ChatMessage, CompletionBackend, ConclaveConfig, DeepSeekBackend, EngineError, EventBus,
    Orchestrator, Registry, Router, SynthesisTier, Synthesizer, TurnEvent,
};

/// Generic-path sampling is flatter than specialist chains.
const GENERIC_TEMPERATURE: f32 = 0.5;
const GENERIC_MAX_TOKENS: u32 = 1500;

#[derive(Parser, Debug)]
#[command(name = "conclave", about = "Specialist routing and parallel reasoning")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, short, env = "CONCLAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Print the full score table for the routing decision.
    #[arg(long)]
    show_scores: bool,

    /// The question to route.
    #[arg(required = true)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConclaveConfig::load(cli.config.as_deref())?;
    let question = cli.question.join(" ");

    let registry = Registry::shared();
    let backend = Arc::new(DeepSeekBackend::new(config.endpoint.clone()));
    let bus = EventBus::shared();
    let router = Router::new(Arc::clone(&registry), config.router.clone());
    let synthesizer = Synthesizer::new(
        backend.clone() as Arc<dyn CompletionBackend>,
        Arc::clone(&registry),
        config.synthesis.clone(),
    );
    let orchestrator = Orchestrator::new(
        backend.clone(),
        Arc::clone(&registry),
        Arc::clone(&bus),
        synthesizer,
        config.orchestrator.clone(),
    );

    let decision = router.route(&question)?;
    if cli.show_scores {
        println!("Punteggi ({}):", decision.reasoning);
        for score in &decision.all_scores {
            println!("  {:<24} {:.3}", score.id.to_string(), score.score);
        }
    }

    if decision.use_generic {
        if let Some(reply) = &decision.direct_reply {
            println!("{reply}");
            return Ok(());
        }
        info!("generic path: single completion, no specialists");
        let answer = backend
            .complete(ChatRequest {
                messages: vec![ChatMessage::user(question)],
                temperature: GENERIC_TEMPERATURE,
                max_tokens: GENERIC_MAX_TOKENS,
                label: Some("generic".to_string()),
            })
            .await
            .map_err(EngineError::from)?;
        println!("{answer}");
        return Ok(());
    }

    println!(
        "Specialisti attivi: {}",
        decision
            .selected
            .iter()
            .map(|s| format!("{} ({:.0}%)", registry.get(s.id).name, s.weight * 100.0))
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Mirror chain progress to the terminal while the turn runs.
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TurnEvent::ChainSettled {
                    specialist, error, ..
                } => match error {
                    None => println!("  [{specialist}] catena completata"),
                    Some(e) => println!("  [{specialist}] catena fallita: {e}"),
                },
                TurnEvent::SynthesisStarted { .. } => println!("  sintesi in corso..."),
                TurnEvent::SynthesisReady { .. } => break,
                TurnEvent::TurnFailed { .. } => break,
                _ => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = orchestrator.run_turn(&decision, &[], cancel).await?;
    let _ = printer.await;

    if let Some(synthesis) = outcome.synthesis {
        println!("\n{}", synthesis.final_answer);
        if synthesis.tier != SynthesisTier::Model {
            info!(tier = ?synthesis.tier, "answer produced by fallback tier");
        }
    }
    Ok(())
}
