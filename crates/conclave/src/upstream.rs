//! Completion backend: chat API client with SSE streaming.
//!
//! The orchestrator and synthesizer talk to the model through the
//! `CompletionBackend` trait so tests can substitute a scripted
//! implementation. The production backend targets an OpenAI-compatible
//! chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::UpstreamError;

/// One chat message on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// A completion request, streamed or not.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Caller-supplied tag for tracing, typically the specialist id.
    pub label: Option<String>,
}

/// Abstraction over the completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Stream a completion, sending each content delta over `tx`. Returns
    /// once the stream is done or the receiver goes away.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), UpstreamError>;

    /// Run a non-streaming completion and return the full content.
    async fn complete(&self, request: ChatRequest) -> Result<String, UpstreamError>;
}

/// Connection settings for the chat endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "https://api.deepseek.com/chat/completions".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

/// One decoded SSE event.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental decoder for `data:`-framed SSE bodies.
///
/// Network chunks split frames arbitrarily, so the decoder buffers across
/// `push` calls and only dispatches complete lines. Malformed frames are
/// skipped with a warning; `Done` is terminal and nothing after it is
/// decoded.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the events it completed, in order.
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim().to_string();
            self.buffer.drain(..=newline);

            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            if payload == "[DONE]" {
                events.push(SseEvent::Done);
                return events;
            }

            match serde_json::from_str::<StreamFrame>(payload) {
                Ok(frame) => {
                    let delta = frame
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content);
                    if let Some(delta) = delta {
                        if !delta.is_empty() {
                            events.push(SseEvent::Delta(delta));
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed stream frame");
                }
            }
        }
        events
    }
}

/// DeepSeek chat completions client.
pub struct DeepSeekBackend {
    http: Client,
    config: EndpointConfig,
}

impl DeepSeekBackend {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let body = WireRequest {
            model: &self.config.model,
            messages: &request.messages,
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn stream_inner(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<String>,
    ) -> Result<(), UpstreamError> {
        let response = self.send(request, true).await?;
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| UpstreamError::Transport(e.to_string()))?;
            for event in decoder.push(&chunk) {
                match event {
                    SseEvent::Done => return Ok(()),
                    SseEvent::Delta(delta) => {
                        if tx.send(delta).await.is_err() {
                            // Receiver gone: the chain was cancelled.
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Send plus full body parse, so the caller's deadline bounds the body
    /// read too, not just the response headers.
    async fn complete_inner(&self, request: &ChatRequest) -> Result<String, UpstreamError> {
        let response = self.send(request, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CompletionBackend for DeepSeekBackend {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), UpstreamError> {
        match tokio::time::timeout(self.timeout(), self.stream_inner(&request, &tx)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.config.request_timeout_secs)),
        }
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, UpstreamError> {
        let content = tokio::time::timeout(self.timeout(), self.complete_inner(&request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.config.request_timeout_secs))??;

        if content.trim().is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }
        Ok(content)
    }
}
