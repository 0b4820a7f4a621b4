//! Database query functions for the `workflow_executions` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{WorkflowExecution, WorkflowExecutionStatus};

/// Start a new execution of a workflow definition.
pub async fn insert_workflow_execution(
    pool: &PgPool,
    workflow_definition_id: Uuid,
    tenant_id: &str,
    input_data: &serde_json::Value,
) -> Result<WorkflowExecution> {
    let exec = sqlx::query_as::<_, WorkflowExecution>(
        "INSERT INTO workflow_executions (workflow_definition_id, tenant_id, input_data) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(workflow_definition_id)
    .bind(tenant_id)
    .bind(input_data)
    .fetch_one(pool)
    .await
    .context("failed to insert workflow execution")?;

    Ok(exec)
}

/// Fetch a single workflow execution by ID.
pub async fn get_workflow_execution(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowExecution>> {
    let exec = sqlx::query_as::<_, WorkflowExecution>(
        "SELECT * FROM workflow_executions WHERE execution_id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch workflow execution")?;

    Ok(exec)
}

/// Atomically transition an execution's status. Optimistically locked on
/// the current status.
pub async fn transition_execution_status(
    pool: &PgPool,
    execution_id: Uuid,
    from: WorkflowExecutionStatus,
    to: WorkflowExecutionStatus,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_executions \
         SET status = $1, \
             started_at = CASE WHEN $1 = 'running' AND started_at IS NULL THEN now() ELSE started_at END, \
             completed_at = CASE WHEN $1 IN ('completed', 'failed', 'compensated', 'cancelled') THEN now() ELSE completed_at END \
         WHERE execution_id = $2 AND status = $3",
    )
    .bind(to)
    .bind(execution_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition workflow execution status")?;

    Ok(result.rows_affected())
}

/// Advance the execution to a new current step, appending the previous
/// step (if any) to the ordered `completed_steps` list and recording its
/// result under `step_results`.
pub async fn advance_step(
    pool: &PgPool,
    execution_id: Uuid,
    completed_steps: &serde_json::Value,
    step_results: &serde_json::Value,
    current_step_id: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_executions \
         SET completed_steps = $1, step_results = $2, current_step_id = $3 \
         WHERE execution_id = $4",
    )
    .bind(completed_steps)
    .bind(step_results)
    .bind(current_step_id)
    .bind(execution_id)
    .execute(pool)
    .await
    .context("failed to advance workflow execution step")?;

    Ok(result.rows_affected())
}

/// Record the step a workflow execution failed at, moving it to `failed`
/// (or `compensating`, if the caller is about to run saga compensation).
pub async fn mark_step_failed(
    pool: &PgPool,
    execution_id: Uuid,
    failed_step_id: &str,
    error: &str,
    next_status: WorkflowExecutionStatus,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_executions \
         SET status = $1, failed_step_id = $2, error = $3 \
         WHERE execution_id = $4",
    )
    .bind(next_status)
    .bind(failed_step_id)
    .bind(error)
    .bind(execution_id)
    .execute(pool)
    .await
    .context("failed to mark workflow execution step failed")?;

    Ok(result.rows_affected())
}

/// Persist opaque checkpoint data (used to suspend/resume across a
/// HUMAN_APPROVAL wait or a process restart).
pub async fn save_checkpoint(
    pool: &PgPool,
    execution_id: Uuid,
    checkpoint_data: &serde_json::Value,
) -> Result<u64> {
    let result = sqlx::query("UPDATE workflow_executions SET checkpoint_data = $1 WHERE execution_id = $2")
        .bind(checkpoint_data)
        .bind(execution_id)
        .execute(pool)
        .await
        .context("failed to save workflow execution checkpoint")?;

    Ok(result.rows_affected())
}

/// Record final completion, setting output data and status in one update.
pub async fn complete_execution(
    pool: &PgPool,
    execution_id: Uuid,
    status: WorkflowExecutionStatus,
    output_data: Option<&serde_json::Value>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_executions \
         SET status = $1, output_data = $2, completed_at = now() \
         WHERE execution_id = $3",
    )
    .bind(status)
    .bind(output_data)
    .bind(execution_id)
    .execute(pool)
    .await
    .context("failed to complete workflow execution")?;

    Ok(result.rows_affected())
}

/// List executions paused awaiting a HUMAN_APPROVAL step.
pub async fn list_paused_executions(pool: &PgPool) -> Result<Vec<WorkflowExecution>> {
    let execs = sqlx::query_as::<_, WorkflowExecution>(
        "SELECT * FROM workflow_executions WHERE status = 'paused' ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list paused workflow executions")?;

    Ok(execs)
}
