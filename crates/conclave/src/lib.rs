//! Conclave: specialist routing and parallel reasoning.
//!
//! One user input is scored against a catalog of four fixed personas; the
//! activated specialists each stream an independent chain of thought, and a
//! synthesis step combines the settled chains into a single answer. Trivial
//! inputs bypass the whole pipeline on a generic path.

pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod synthesis;
pub mod testing;
pub mod upstream;

pub use config::ConclaveConfig;
pub use error::{EngineError, UpstreamError};
pub use events::{EventBus, SharedEventBus, TurnEvent};
pub use ledger::{ChainLedger, ReasoningChain};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnOutcome};
pub use registry::{Registry, SharedRegistry, SpecialistId, SpecialistProfile};
pub use router::{Router, RouterConfig, RoutingDecision, SelectedSpecialist};
pub use synthesis::{SynthesisConfig, SynthesisResult, SynthesisTier, Synthesizer};
pub use upstream::{ChatMessage, ChatRequest, CompletionBackend, DeepSeekBackend, EndpointConfig};
