//! The agent runtime: drives one task through an iterate-call-tools loop
//! against an [`LlmProvider`], bounded by the owning [`AgentDefinition`]'s
//! resource caps.

use std::sync::Arc;
use std::time::Instant;

use conductor_db::models::AgentDefinition;
use serde_json::Value;
use uuid::Uuid;

use crate::agent::memory::MemoryStore;
use crate::agent::text_tool_call::parse_text_tool_call;
use crate::llm::{CompletionRequest, LlmError, LlmProvider, Message, ToolCallRequest};
use crate::tools::{ToolCall, ToolExecutor, ToolRegistry};

/// Outcome of running a task to completion (or failure) through the loop.
#[derive(Debug, Clone)]
pub struct AgentExecutionResult {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub iterations: u32,
    pub total_tokens: i64,
    pub execution_time_ms: i64,
}

/// A side-channel notification the runtime emits as it works, independent
/// of the final [`AgentExecutionResult`]. Callers typically forward these
/// onto the messaging fabric as `agent.*` domain events.
#[derive(Debug, Clone)]
pub enum RuntimeNotice {
    LlmCall { model: String, tokens: i64 },
    ToolCall { name: String },
    TextToolCallFallbackUsed { name: String },
}

pub struct AgentRuntime {
    definition: AgentDefinition,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    executor: ToolExecutor,
    memory: Arc<dyn MemoryStore>,
}

impl AgentRuntime {
    pub fn new(
        definition: AgentDefinition,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        executor: ToolExecutor,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self { definition, provider, tools, executor, memory }
    }

    /// Run a single task to completion (or failure), driving the
    /// iterate-call-tools loop until a `final_answer` call, a raw
    /// final-answer fallback, the iteration cap, or the per-task token
    /// budget is reached.
    pub async fn execute_task(
        &self,
        instance_id: Uuid,
        task_description: &str,
        input_data: &Value,
    ) -> (AgentExecutionResult, Vec<RuntimeNotice>) {
        let start = Instant::now();
        let mut notices = Vec::new();
        let mut total_tokens: i64 = 0;

        self.memory
            .append(instance_id, Message::system(self.system_prompt()))
            .await;
        self.memory
            .append(
                instance_id,
                Message::user(format!("{task_description}\n\ninput: {input_data}")),
            )
            .await;

        let allowed_tools: Vec<String> = if self.definition.allowed_tools.is_empty() {
            self.tools.list_tools().into_iter().map(String::from).collect()
        } else {
            self.definition.allowed_tools.clone()
        };
        let allowed_tools: Vec<String> = allowed_tools
            .into_iter()
            .filter(|name| !self.definition.denied_tools.iter().any(|d| d == name))
            .collect();

        let max_execution_time =
            std::time::Duration::from_secs(self.definition.max_execution_time_seconds.max(0) as u64);

        for iteration in 0..self.definition.max_iterations {
            if start.elapsed() >= max_execution_time {
                return (
                    self.failure(
                        format!(
                            "timeout: exceeded max_execution_time_seconds ({})",
                            self.definition.max_execution_time_seconds
                        ),
                        iteration as u32,
                        total_tokens,
                        start,
                    ),
                    notices,
                );
            }

            let messages = self
                .memory
                .window(instance_id, self.definition.memory_short_term_max_messages as usize)
                .await;

            let request = CompletionRequest {
                model: self.definition.model_id.clone(),
                messages,
                temperature: self.definition.temperature,
                max_tokens: self.definition.max_tokens,
                stop_sequences: self.definition.stop_sequences.clone(),
                tool_schemas: self.tools.get_llm_schemas(Some(&allowed_tools)),
            };

            let response = match self.provider.complete(&request).await {
                Ok(response) => response,
                Err(error) => {
                    return (
                        self.failure(
                            format!("llm call failed: {error}"),
                            iteration as u32,
                            total_tokens,
                            start,
                        ),
                        notices,
                    );
                }
            };

            total_tokens += response.total_tokens();
            notices.push(RuntimeNotice::LlmCall {
                model: self.definition.model_id.clone(),
                tokens: response.total_tokens(),
            });

            if total_tokens >= self.definition.max_tokens_per_task {
                return (
                    self.failure(
                        "task exceeded its per-task token budget".to_string(),
                        iteration as u32 + 1,
                        total_tokens,
                        start,
                    ),
                    notices,
                );
            }

            self.memory
                .append(instance_id, Message::assistant(response.content.clone()))
                .await;

            if response.has_tool_calls() {
                if let Some(answer) = self
                    .handle_tool_calls(instance_id, &response.tool_calls, &mut notices)
                    .await
                {
                    return (
                        self.success(answer, iteration as u32 + 1, total_tokens, start),
                        notices,
                    );
                }
                continue;
            }

            if self.definition.allow_text_tool_call_fallback {
                if let Some(call) = parse_text_tool_call(&response.content, &allowed_tools) {
                    notices.push(RuntimeNotice::TextToolCallFallbackUsed { name: call.name.clone() });
                    if call.name == "final_answer" {
                        return (
                            self.success(call.arguments, iteration as u32 + 1, total_tokens, start),
                            notices,
                        );
                    }
                    if let Some(answer) = self
                        .handle_tool_calls(instance_id, std::slice::from_ref(&call), &mut notices)
                        .await
                    {
                        return (
                            self.success(answer, iteration as u32 + 1, total_tokens, start),
                            notices,
                        );
                    }
                    continue;
                }
            }

            // No tool calls and no text fallback: treat the content itself
            // as the final answer.
            return (
                self.success(
                    serde_json::json!({ "answer": response.content }),
                    iteration as u32 + 1,
                    total_tokens,
                    start,
                ),
                notices,
            );
        }

        (
            self.failure(
                format!("exceeded max_iterations ({})", self.definition.max_iterations),
                self.definition.max_iterations as u32,
                total_tokens,
                start,
            ),
            notices,
        )
    }

    /// Execute every requested tool call. Returns `Some(answer)` if one of
    /// the calls was `final_answer`, ending the loop early.
    async fn handle_tool_calls(
        &self,
        instance_id: Uuid,
        calls: &[ToolCallRequest],
        notices: &mut Vec<RuntimeNotice>,
    ) -> Option<Value> {
        for requested in calls {
            notices.push(RuntimeNotice::ToolCall { name: requested.name.clone() });

            if requested.name == "final_answer" {
                return Some(requested.arguments.clone());
            }

            let call = ToolCall {
                id: Uuid::new_v4(),
                name: requested.name.clone(),
                arguments: requested.arguments.clone(),
                timestamp: chrono::Utc::now(),
            };
            let result = self.executor.execute(&self.tools, &call).await;

            let recorded = serde_json::json!({
                "tool": result.name,
                "success": result.success,
                "result": result.result,
                "error": result.error,
            });
            self.memory
                .append(instance_id, Message::user(format!("tool result: {recorded}")))
                .await;
        }
        None
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are {}. Role: {}. Goal: {}.{}",
            self.definition.name,
            self.definition.role,
            self.definition.goal,
            self.definition
                .backstory
                .as_ref()
                .map(|b| format!(" Backstory: {b}."))
                .unwrap_or_default(),
        )
    }

    fn success(&self, result: Value, iterations: u32, total_tokens: i64, start: Instant) -> AgentExecutionResult {
        AgentExecutionResult {
            success: true,
            result: Some(result),
            error: None,
            iterations,
            total_tokens,
            execution_time_ms: start.elapsed().as_millis() as i64,
        }
    }

    fn failure(&self, error: String, iterations: u32, total_tokens: i64, start: Instant) -> AgentExecutionResult {
        AgentExecutionResult {
            success: false,
            result: None,
            error: Some(error),
            iterations,
            total_tokens,
            execution_time_ms: start.elapsed().as_millis() as i64,
        }
    }
}

impl From<LlmError> for String {
    fn from(error: LlmError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::memory::InMemoryStore;
    use crate::llm::{CompletionResponse, MockProvider};

    fn test_definition(max_iterations: i32, max_tokens_per_task: i64, fallback: bool) -> AgentDefinition {
        AgentDefinition {
            agent_id: Uuid::new_v4(),
            name: "researcher".to_string(),
            role: "Research Assistant".to_string(),
            goal: "answer questions accurately".to_string(),
            backstory: None,
            llm_provider: "mock".to_string(),
            model_id: "mock-model".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            stop_sequences: vec![],
            memory_short_term_max_messages: 20,
            memory_long_term_backend: None,
            max_iterations,
            max_execution_time_seconds: 60,
            max_tokens_per_task,
            max_tool_calls_per_iteration: None,
            allowed_tools: vec!["final_answer".to_string()],
            denied_tools: vec![],
            capabilities: vec![],
            allow_text_tool_call_fallback: fallback,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn plain_content_response_becomes_final_answer() {
        let response = CompletionResponse {
            content: "The answer is 42.".to_string(),
            tool_calls: vec![],
            input_tokens: 5,
            output_tokens: 5,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let runtime = AgentRuntime::new(
            test_definition(5, 100_000, false),
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "what is the answer?", &serde_json::json!({})).await;
        assert!(result.success);
        assert_eq!(result.result.unwrap()["answer"], "The answer is 42.");
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn structured_final_answer_tool_call_ends_loop() {
        let response = CompletionResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                name: "final_answer".to_string(),
                arguments: serde_json::json!({"answer": "done"}),
            }],
            input_tokens: 5,
            output_tokens: 5,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let runtime = AgentRuntime::new(
            test_definition(5, 100_000, false),
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(result.success);
        assert_eq!(result.result.unwrap()["answer"], "done");
    }

    #[tokio::test]
    async fn exceeding_max_iterations_fails() {
        let response = CompletionResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                name: "noop".to_string(),
                arguments: serde_json::json!({}),
            }],
            input_tokens: 1,
            output_tokens: 1,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let mut definition = test_definition(2, 100_000, false);
        definition.allowed_tools = vec!["noop".to_string()];

        struct NoopTool;
        #[async_trait::async_trait]
        impl crate::tools::Tool for NoopTool {
            fn name(&self) -> &str { "noop" }
            fn description(&self) -> &str { "does nothing" }
            fn parameters_schema(&self) -> Value { serde_json::json!({}) }
            async fn execute(&self, _arguments: Value) -> Result<Value, String> { Ok(serde_json::json!({})) }
        }
        let mut registry = ToolRegistry::new();
        registry.register(NoopTool);

        let runtime = AgentRuntime::new(
            definition,
            provider,
            Arc::new(registry),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("max_iterations"));
    }

    #[tokio::test]
    async fn zero_wall_clock_budget_times_out_immediately() {
        let response = CompletionResponse {
            content: "irrelevant".to_string(),
            tool_calls: vec![],
            input_tokens: 1,
            output_tokens: 1,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let mut definition = test_definition(5, 100_000, false);
        definition.max_execution_time_seconds = 0;
        let runtime = AgentRuntime::new(
            definition,
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn exceeding_token_budget_fails_fast() {
        let response = CompletionResponse {
            content: "still working".to_string(),
            tool_calls: vec![],
            input_tokens: 60_000,
            output_tokens: 60_000,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let runtime = AgentRuntime::new(
            test_definition(10, 100_000, false),
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("token budget"));
    }

    #[tokio::test]
    async fn text_tool_call_fallback_gated_by_flag() {
        let response = CompletionResponse {
            content: r#"{"name": "final_answer", "arguments": {"answer": "fallback worked"}}"#.to_string(),
            tool_calls: vec![],
            input_tokens: 5,
            output_tokens: 5,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let runtime = AgentRuntime::new(
            test_definition(5, 100_000, true),
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, notices) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(result.success);
        assert_eq!(result.result.unwrap()["answer"], "fallback worked");
        assert!(notices.iter().any(|n| matches!(n, RuntimeNotice::TextToolCallFallbackUsed { .. })));
    }

    #[tokio::test]
    async fn text_tool_call_fallback_disabled_by_default_falls_through_to_plain_answer() {
        let response = CompletionResponse {
            content: r#"{"name": "final_answer", "arguments": {"answer": "should not parse"}}"#.to_string(),
            tool_calls: vec![],
            input_tokens: 5,
            output_tokens: 5,
        };
        let provider = Arc::new(MockProvider::always("mock", response));
        let runtime = AgentRuntime::new(
            test_definition(5, 100_000, false),
            provider,
            Arc::new(ToolRegistry::new()),
            ToolExecutor::default(),
            Arc::new(InMemoryStore::new()),
        );

        let (result, _) = runtime.execute_task(Uuid::new_v4(), "task", &serde_json::json!({})).await;
        assert!(result.success);
        // Fallback disabled: the raw JSON text becomes the literal answer.
        assert!(result.result.unwrap()["answer"].as_str().unwrap().contains("should not parse"));
    }
}
