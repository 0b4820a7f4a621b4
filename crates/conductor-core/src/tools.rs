//! Tool contract, registry, and the timeout/retry executor that runs them
//! on an agent's behalf.
//!
//! Only the two reserved reasoning tools (`final_answer`, `think`) ship
//! with this crate; calculator/HTTP/file/scraping/code tool
//! implementations are out of scope (callers register their own via
//! [`ToolRegistry::register`]).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A tool invocation request, either parsed from a structured provider
/// response or from the text-fallback parser.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: Uuid,
    pub name: String,
    pub arguments: Value,
    pub timestamp: DateTime<Utc>,
}

/// The outcome of executing a [`ToolCall`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: Uuid,
    pub name: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: i64,
}

/// Per-tool overrides for the executor's default timeout/retry behavior.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    pub timeout_seconds: Option<u64>,
    pub retry_count: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

/// Adapter interface for a callable tool.
///
/// Object-safe: stored as `Box<dyn Tool>` in [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn config(&self) -> ToolConfig {
        ToolConfig::default()
    }

    async fn execute(&self, arguments: Value) -> Result<Value, String>;

    /// OpenAI/Anthropic-compatible function-calling schema for this tool.
    fn to_llm_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters_schema(),
            }
        })
    }
}

const _: () = {
    fn _assert_object_safe(_: &dyn Tool) {}
};

/// A collection of registered [`Tool`] implementations, keyed by name.
/// Always contains the two reserved reasoning tools (`final_answer`,
/// `think`) unless explicitly unregistered.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        let mut registry = Self { tools: HashMap::new() };
        registry.register(FinalAnswerTool);
        registry.register(ThinkTool);
        registry
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry with no reserved tools, for tests that want full
    /// control over the tool surface.
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Option<Box<dyn Tool>> {
        let name = tool.name().to_string();
        self.tools.insert(name, Box::new(tool))
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|b| b.as_ref())
    }

    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// LLM function-calling schemas for every registered tool, optionally
    /// filtered to an allow-list (used to enforce `AgentDefinition::allowed_tools`).
    pub fn get_llm_schemas(&self, allowed: Option<&[String]>) -> Vec<Value> {
        self.tools
            .values()
            .filter(|tool| match allowed {
                Some(list) => list.iter().any(|n| n == tool.name()),
                None => true,
            })
            .map(|tool| tool.to_llm_schema())
            .collect()
    }
}

/// Runs [`ToolCall`]s against a [`ToolRegistry`] with a timeout and a
/// bounded retry loop. Only timeouts and transient (string-tagged
/// `"transient:"`) errors are retried; anything else fails immediately.
pub struct ToolExecutor {
    default_timeout: Duration,
    default_max_retries: u32,
    default_retry_delay: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            default_max_retries: 2,
            default_retry_delay: Duration::from_millis(500),
        }
    }
}

impl ToolExecutor {
    pub fn new(default_timeout: Duration, default_max_retries: u32, default_retry_delay: Duration) -> Self {
        Self { default_timeout, default_max_retries, default_retry_delay }
    }

    pub async fn execute(&self, registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
        let start = std::time::Instant::now();

        let Some(tool) = registry.get(&call.name) else {
            return ToolResult {
                tool_call_id: call.id,
                name: call.name.clone(),
                success: false,
                result: None,
                error: Some(format!("unknown tool: {}", call.name)),
                execution_time_ms: start.elapsed().as_millis() as i64,
            };
        };

        let config = tool.config();
        let timeout_duration = config
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let max_retries = config.retry_count.unwrap_or(self.default_max_retries);
        let retry_delay = config
            .retry_delay_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_retry_delay);

        let mut attempt = 0;
        let mut last_error = String::new();

        loop {
            match tokio::time::timeout(timeout_duration, tool.execute(call.arguments.clone())).await {
                Ok(Ok(value)) => {
                    return ToolResult {
                        tool_call_id: call.id,
                        name: call.name.clone(),
                        success: true,
                        result: Some(value),
                        error: None,
                        execution_time_ms: start.elapsed().as_millis() as i64,
                    };
                }
                Ok(Err(error)) => {
                    last_error = error.clone();
                    if !error.starts_with("transient:") || attempt >= max_retries {
                        return ToolResult {
                            tool_call_id: call.id,
                            name: call.name.clone(),
                            success: false,
                            result: None,
                            error: Some(error),
                            execution_time_ms: start.elapsed().as_millis() as i64,
                        };
                    }
                }
                Err(_elapsed) => {
                    last_error = "tool call timed out".to_string();
                    if attempt >= max_retries {
                        return ToolResult {
                            tool_call_id: call.id,
                            name: call.name.clone(),
                            success: false,
                            result: None,
                            error: Some(last_error),
                            execution_time_ms: start.elapsed().as_millis() as i64,
                        };
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(retry_delay).await;
        }
    }

    /// Execute a batch of tool calls concurrently.
    pub async fn execute_batch(&self, registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        let futures = calls.iter().map(|call| self.execute(registry, call));
        futures::future::join_all(futures).await
    }
}

/// Reserved tool: signals the agent runtime that the current iteration's
/// output is the task's final answer.
struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        "final_answer"
    }

    fn description(&self) -> &str {
        "Provide the final answer to the task and stop iterating."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "answer": { "type": "string" } },
            "required": ["answer"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, String> {
        Ok(arguments)
    }
}

/// Reserved tool: a scratchpad the model can call to reason out loud
/// without taking any external action.
struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Record a reasoning note without taking any external action."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "thought": { "type": "string" } },
            "required": ["thought"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, String> {
        Ok(arguments)
    }
}
