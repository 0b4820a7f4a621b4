//! Database query functions for the `agent_definitions` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::AgentDefinition;

/// Parameters for registering a new agent definition.
#[derive(Debug, Clone)]
pub struct NewAgentDefinition {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: Option<String>,
    pub llm_provider: String,
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: i32,
    pub stop_sequences: Vec<String>,
    pub memory_short_term_max_messages: i32,
    pub memory_long_term_backend: Option<String>,
    pub max_iterations: i32,
    pub max_execution_time_seconds: i64,
    pub max_tokens_per_task: i64,
    pub max_tool_calls_per_iteration: Option<i32>,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub capabilities: Vec<String>,
    pub allow_text_tool_call_fallback: bool,
}

/// Insert a new agent definition. Rejected by the UNIQUE constraint on
/// `name` if one already exists.
pub async fn insert_agent_definition(
    pool: &PgPool,
    new: &NewAgentDefinition,
) -> Result<AgentDefinition> {
    let def = sqlx::query_as::<_, AgentDefinition>(
        "INSERT INTO agent_definitions ( \
            name, role, goal, backstory, llm_provider, model_id, temperature, max_tokens, \
            stop_sequences, memory_short_term_max_messages, memory_long_term_backend, \
            max_iterations, max_execution_time_seconds, max_tokens_per_task, \
            max_tool_calls_per_iteration, allowed_tools, denied_tools, capabilities, \
            allow_text_tool_call_fallback \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
         RETURNING *",
    )
    .bind(&new.name)
    .bind(&new.role)
    .bind(&new.goal)
    .bind(&new.backstory)
    .bind(&new.llm_provider)
    .bind(&new.model_id)
    .bind(new.temperature)
    .bind(new.max_tokens)
    .bind(&new.stop_sequences)
    .bind(new.memory_short_term_max_messages)
    .bind(&new.memory_long_term_backend)
    .bind(new.max_iterations)
    .bind(new.max_execution_time_seconds)
    .bind(new.max_tokens_per_task)
    .bind(new.max_tool_calls_per_iteration)
    .bind(&new.allowed_tools)
    .bind(&new.denied_tools)
    .bind(&new.capabilities)
    .bind(new.allow_text_tool_call_fallback)
    .fetch_one(pool)
    .await
    .context("failed to insert agent definition")?;

    Ok(def)
}

/// Fetch a single agent definition by ID.
pub async fn get_agent_definition(pool: &PgPool, id: Uuid) -> Result<Option<AgentDefinition>> {
    let def = sqlx::query_as::<_, AgentDefinition>(
        "SELECT * FROM agent_definitions WHERE agent_id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch agent definition")?;

    Ok(def)
}

/// Fetch a single agent definition by its unique name.
pub async fn get_agent_definition_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<AgentDefinition>> {
    let def = sqlx::query_as::<_, AgentDefinition>(
        "SELECT * FROM agent_definitions WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("failed to fetch agent definition by name")?;

    Ok(def)
}

/// List all agent definitions that declare a given capability.
pub async fn list_by_capability(pool: &PgPool, capability: &str) -> Result<Vec<AgentDefinition>> {
    let defs = sqlx::query_as::<_, AgentDefinition>(
        "SELECT * FROM agent_definitions WHERE $1 = ANY(capabilities) ORDER BY name",
    )
    .bind(capability)
    .fetch_all(pool)
    .await
    .context("failed to list agent definitions by capability")?;

    Ok(defs)
}

/// List all agent definitions.
pub async fn list_agent_definitions(pool: &PgPool) -> Result<Vec<AgentDefinition>> {
    let defs =
        sqlx::query_as::<_, AgentDefinition>("SELECT * FROM agent_definitions ORDER BY name")
            .fetch_all(pool)
            .await
            .context("failed to list agent definitions")?;

    Ok(defs)
}
