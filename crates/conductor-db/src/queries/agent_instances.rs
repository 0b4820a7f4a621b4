//! Database query functions for the `agent_instances` table.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AgentInstance, AgentInstanceStatus};

/// Register a new running instance of an agent definition on a worker.
pub async fn insert_agent_instance(
    pool: &PgPool,
    definition_id: Uuid,
    worker_id: &str,
) -> Result<AgentInstance> {
    let instance = sqlx::query_as::<_, AgentInstance>(
        "INSERT INTO agent_instances (definition_id, worker_id, status, started_at, last_heartbeat) \
         VALUES ($1, $2, 'idle', now(), now()) \
         RETURNING *",
    )
    .bind(definition_id)
    .bind(worker_id)
    .fetch_one(pool)
    .await
    .context("failed to insert agent instance")?;

    Ok(instance)
}

/// Fetch a single agent instance by ID.
pub async fn get_agent_instance(pool: &PgPool, id: Uuid) -> Result<Option<AgentInstance>> {
    let instance =
        sqlx::query_as::<_, AgentInstance>("SELECT * FROM agent_instances WHERE instance_id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch agent instance")?;

    Ok(instance)
}

/// List all idle instances of a given definition, used by the router when
/// looking for a candidate to dispatch a task to.
pub async fn list_idle_instances(
    pool: &PgPool,
    definition_id: Uuid,
) -> Result<Vec<AgentInstance>> {
    let instances = sqlx::query_as::<_, AgentInstance>(
        "SELECT * FROM agent_instances WHERE definition_id = $1 AND status = 'idle'",
    )
    .bind(definition_id)
    .fetch_all(pool)
    .await
    .context("failed to list idle agent instances")?;

    Ok(instances)
}

/// Update the heartbeat timestamp for an instance. Used by the supervisor's
/// health sweep to detect instances that have stopped reporting in.
pub async fn touch_heartbeat(pool: &PgPool, instance_id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE agent_instances SET last_heartbeat = now() WHERE instance_id = $1")
        .bind(instance_id)
        .execute(pool)
        .await
        .context("failed to update agent instance heartbeat")?;

    Ok(result.rows_affected())
}

/// Transition an instance's status, optionally attaching/detaching the
/// task it is currently working.
pub async fn set_instance_status(
    pool: &PgPool,
    instance_id: Uuid,
    status: AgentInstanceStatus,
    current_task_id: Option<Uuid>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE agent_instances SET status = $1, current_task_id = $2 WHERE instance_id = $3",
    )
    .bind(status)
    .bind(current_task_id)
    .bind(instance_id)
    .execute(pool)
    .await
    .context("failed to set agent instance status")?;

    Ok(result.rows_affected())
}

/// Record the outcome of a completed task against an instance's running
/// totals: completion/failure counters, tokens consumed, and wall time.
pub async fn record_task_outcome(
    pool: &PgPool,
    instance_id: Uuid,
    succeeded: bool,
    tokens_used: i64,
    execution_time_ms: i64,
) -> Result<u64> {
    let result = if succeeded {
        sqlx::query(
            "UPDATE agent_instances \
             SET tasks_completed = tasks_completed + 1, \
                 tokens_used = tokens_used + $1, \
                 execution_time_ms = execution_time_ms + $2 \
             WHERE instance_id = $3",
        )
    } else {
        sqlx::query(
            "UPDATE agent_instances \
             SET tasks_failed = tasks_failed + 1, \
                 tokens_used = tokens_used + $1, \
                 execution_time_ms = execution_time_ms + $2 \
             WHERE instance_id = $3",
        )
    }
    .bind(tokens_used)
    .bind(execution_time_ms)
    .bind(instance_id)
    .execute(pool)
    .await
    .context("failed to record task outcome")?;

    Ok(result.rows_affected())
}

/// List instances whose heartbeat is older than `stale_before`, i.e. have
/// missed the supervisor's expected heartbeat interval.
pub async fn list_stale_instances(
    pool: &PgPool,
    stale_before: chrono::DateTime<Utc>,
) -> Result<Vec<AgentInstance>> {
    let instances = sqlx::query_as::<_, AgentInstance>(
        "SELECT * FROM agent_instances \
         WHERE status != 'terminated' \
           AND (last_heartbeat IS NULL OR last_heartbeat < $1)",
    )
    .bind(stale_before)
    .fetch_all(pool)
    .await
    .context("failed to list stale agent instances")?;

    Ok(instances)
}

/// Total/idle/running instance counts, the raw inputs to the scaling
/// recommendation heuristic.
#[derive(Debug, Clone, Default)]
pub struct InstanceCounts {
    pub total: i64,
    pub idle: i64,
    pub running: i64,
}

/// Count instances by status for a given definition.
pub async fn count_instances(pool: &PgPool, definition_id: Uuid) -> Result<InstanceCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) FROM agent_instances \
         WHERE definition_id = $1 AND status != 'terminated' \
         GROUP BY status",
    )
    .bind(definition_id)
    .fetch_all(pool)
    .await
    .context("failed to count agent instances")?;

    let mut counts = InstanceCounts::default();
    for (status, count) in &rows {
        match status.as_str() {
            "idle" => counts.idle = *count,
            "running" => counts.running = *count,
            _ => {}
        }
        counts.total += count;
    }
    Ok(counts)
}
