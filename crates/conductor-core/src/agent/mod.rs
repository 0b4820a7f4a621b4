//! Agent subsystem: conversation memory, the plain-text tool-call
//! fallback parser, and the execution loop that ties an
//! [`AgentDefinition`](conductor_db::models::AgentDefinition) to an
//! [`LlmProvider`](crate::llm::LlmProvider) and a [`ToolRegistry`](crate::tools::ToolRegistry).

pub mod memory;
pub mod runtime;
pub mod text_tool_call;

pub use memory::{InMemoryStore, MemoryStore};
pub use runtime::{AgentExecutionResult, AgentRuntime, RuntimeNotice};
