//! Scripted backend for tests.
//!
//! Scripts are keyed by the request label, so one backend instance can drive
//! several concurrent chains plus the synthesis call with different
//! behaviors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::UpstreamError;
use crate::upstream::{ChatRequest, CompletionBackend};

/// How a scripted stream behaves for one label.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Send every delta, then finish cleanly.
    Deltas { deltas: Vec<String>, delay_ms: u64 },
    /// Send the deltas, then fail with a transport error.
    FailAfter {
        deltas: Vec<String>,
        error: String,
        delay_ms: u64,
    },
    /// Never produce anything; only cancellation ends the chain.
    Hang,
}

impl StreamScript {
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Deltas {
            deltas: deltas.into_iter().map(Into::into).collect(),
            delay_ms: 0,
        }
    }

    pub fn deltas_with_delay<I, S>(deltas: I, delay_ms: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Deltas {
            deltas: deltas.into_iter().map(Into::into).collect(),
            delay_ms,
        }
    }

    pub fn fail_after<I, S>(deltas: I, error: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FailAfter {
            deltas: deltas.into_iter().map(Into::into).collect(),
            error: error.into(),
            delay_ms: 0,
        }
    }
}

/// Deterministic `CompletionBackend` driven by per-label scripts.
#[derive(Default)]
pub struct ScriptedBackend {
    streams: Mutex<HashMap<String, StreamScript>>,
    completions: Mutex<HashMap<String, String>>,
    fail_completions: bool,
    completion_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, label: impl Into<String>, script: StreamScript) -> Self {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(label.into(), script);
        self
    }

    pub fn with_completion(self, label: impl Into<String>, response: impl Into<String>) -> Self {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(label.into(), response.into());
        self
    }

    /// Every `complete` call fails with a transport error.
    pub fn failing_completions(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    /// How many times `complete` was invoked.
    pub fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    fn stream_script(&self, label: &str) -> Option<StreamScript> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(label)
            .cloned()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), UpstreamError> {
        let label = request.label.unwrap_or_default();
        let script = self
            .stream_script(&label)
            .ok_or_else(|| UpstreamError::Transport(format!("no stream script for '{label}'")))?;

        match script {
            StreamScript::Deltas { deltas, delay_ms } => {
                for delta in deltas {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    if tx.send(delta).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(())
            }
            StreamScript::FailAfter {
                deltas,
                error,
                delay_ms,
            } => {
                for delta in deltas {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    if tx.send(delta).await.is_err() {
                        return Ok(());
                    }
                }
                Err(UpstreamError::Transport(error))
            }
            StreamScript::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, UpstreamError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_completions {
            return Err(UpstreamError::Transport("scripted failure".to_string()));
        }
        let label = request.label.unwrap_or_default();
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&label)
            .cloned()
            .ok_or_else(|| UpstreamError::Transport(format!("no completion script for '{label}'")))
    }
}
