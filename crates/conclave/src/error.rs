//! Error taxonomy for the routing and reasoning engine.
//!
//! Per-chain upstream failures stay local to their chain (the orchestrator
//! records them in the ledger and keeps the other chains running). Only
//! decision-level failures surface as `EngineError`.

use thiserror::Error;

/// Failures talking to the completion service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upstream call timed out after {0}s")]
    Timeout(u64),

    #[error("upstream returned an empty response")]
    EmptyResponse,
}

impl UpstreamError {
    /// Whether a retry could plausibly succeed. Timeouts and transport
    /// failures are transient; 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::EmptyResponse => false,
        }
    }
}

/// Decision-level errors, fatal to the current turn.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input is empty or whitespace-only")]
    DegenerateInput,

    #[error("turn cancelled")]
    Cancelled,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
