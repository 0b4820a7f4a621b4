//! The LLM provider contract and the circuit breaker guarding calls to it.
//!
//! [`LlmProvider`] is the adapter interface; this crate ships only
//! [`MockProvider`], a deterministic stand-in for tests and local
//! development. A real HTTP-backed provider (Anthropic, OpenAI, ...) is
//! intentionally out of scope: [`LlmProvider`] is the seam where one would
//! be added.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single exchanged message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// A tool call the model asked to make, extracted either from a
/// structured provider response or from the text-fallback parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The result of one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl CompletionResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// Parameters common to a completion or streaming request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: i32,
    pub stop_sequences: Vec<String>,
    pub tool_schemas: Vec<serde_json::Value>,
}

/// Errors an [`LlmProvider`] can return. The [`CircuitBreaker`] inspects
/// `is_retriable` to decide whether a failure should count toward the
/// trip threshold or simply propagate.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("request rejected by provider: {0}")]
    Fatal(String),
    #[error("circuit breaker open for provider {0}, retry after cooldown")]
    BreakerOpen(String),
}

impl LlmError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout | Self::Transient(_))
    }
}

/// Adapter interface to a concrete LLM backend.
///
/// Object-safe: stored as `Arc<dyn LlmProvider>` behind a [`CircuitBreaker`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Stream a completion as incremental text chunks. The default
    /// implementation falls back to a single non-streamed call.
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<String>, LlmError> {
        let response = self.complete(request).await?;
        Ok(vec![response.content])
    }
}

const _: () = {
    fn _assert_object_safe(_: &dyn LlmProvider) {}
};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Wraps an [`LlmProvider`] with a closed/open/half-open circuit breaker:
/// after `failure_threshold` consecutive retriable failures, calls are
/// rejected locally (without hitting the provider) until `cooldown`
/// elapses, at which point a single probe call is allowed through.
pub struct CircuitBreaker {
    provider: Box<dyn LlmProvider>,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open for provider {0}, retry after cooldown")]
    Open(String),
    #[error(transparent)]
    Provider(#[from] LlmError),
}

impl From<CircuitBreakerError> for LlmError {
    fn from(error: CircuitBreakerError) -> Self {
        match error {
            CircuitBreakerError::Open(name) => LlmError::BreakerOpen(name),
            CircuitBreakerError::Provider(err) => err,
        }
    }
}

impl CircuitBreaker {
    pub fn new(provider: Box<dyn LlmProvider>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            provider,
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().expect("breaker mutex poisoned").state, BreakerState::Open)
    }

    fn check_admission(&self) -> Result<(), CircuitBreakerError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                if opened_at.elapsed() >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(CircuitBreakerError::Open(self.provider.name().to_string()))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.consecutive_failures = 0;
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.consecutive_failures += 1;
        if inner.state == BreakerState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// A [`CircuitBreaker`] is itself an [`LlmProvider`]: callers wrap the real
/// provider once at construction time and use the breaker everywhere the
/// provider would otherwise be used, so a tripped breaker is transparent to
/// [`super::agent::runtime::AgentRuntime`].
#[async_trait]
impl LlmProvider for CircuitBreaker {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.check_admission()?;

        match self.provider.complete(request).await {
            Ok(response) => {
                self.record_success();
                Ok(response)
            }
            Err(err) => {
                if err.is_retriable() {
                    self.record_failure();
                }
                Err(err)
            }
        }
    }
}

/// A deterministic provider for tests and local development: returns a
/// fixed or scripted response without making network calls.
pub struct MockProvider {
    name: String,
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
}

impl MockProvider {
    /// Build a provider that always returns `response` (cloned per call).
    pub fn always(name: impl Into<String>, response: CompletionResponse) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(vec![Ok(response)]),
        }
    }

    /// Build a provider that replays `responses` in order, repeating the
    /// last entry once exhausted.
    pub fn scripted(name: impl Into<String>, responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self { name: name.into(), responses: Mutex::new(responses) }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut responses = self.responses.lock().expect("mock provider mutex poisoned");
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| Err(LlmError::Fatal("mock provider exhausted".to_string())))
        }
    }
}
