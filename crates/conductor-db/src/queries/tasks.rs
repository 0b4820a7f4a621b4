//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskPriority, TaskStatus};

/// Parameters for submitting a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub input_data: serde_json::Value,
    pub required_capabilities: Vec<String>,
    pub priority: TaskPriority,
    pub timeout_seconds: i64,
    pub max_retries: i32,
    pub idempotency_key: Option<String>,
}

/// Insert a new task, or return the existing row if `idempotency_key` is
/// set and a task with the same `(tenant_id, idempotency_key)` already
/// exists. Runs inside a single transaction so the check-then-insert is
/// race-free under concurrent submission.
pub async fn submit_task(pool: &PgPool, new: &NewTask) -> Result<Task> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    if let Some(key) = &new.idempotency_key {
        let existing = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(&new.tenant_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to check idempotency key")?;

        if let Some(task) = existing {
            tx.commit().await.context("failed to commit transaction")?;
            return Ok(task);
        }
    }

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (tenant_id, name, description, input_data, \
         required_capabilities, priority, timeout_seconds, max_retries, idempotency_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(&new.tenant_id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.input_data)
    .bind(&new.required_capabilities)
    .bind(new.priority)
    .bind(new.timeout_seconds)
    .bind(new.max_retries)
    .bind(&new.idempotency_key)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert task")?;

    tx.commit().await.context("failed to commit transaction")?;
    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// List the highest-priority runnable tasks for the router: `pending` or
/// `queued`, ordered highest priority first, oldest first within a
/// priority band.
pub async fn list_dispatchable_tasks(pool: &PgPool, limit: i64) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks \
         WHERE status IN ('pending', 'queued') \
         ORDER BY \
           CASE priority \
             WHEN 'critical' THEN 0 \
             WHEN 'high' THEN 1 \
             WHEN 'normal' THEN 2 \
             WHEN 'low' THEN 3 \
           END, \
           created_at ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list dispatchable tasks")?;

    Ok(tasks)
}

/// Atomically transition a task from one status to another. Uses
/// optimistic locking: the UPDATE's WHERE clause includes `status = $from`,
/// so the row only updates if the current status matches. Returns the
/// number of rows affected (0 means the status did not match, i.e. another
/// dispatcher already claimed it).
pub async fn transition_task_status(
    pool: &PgPool,
    task_id: Uuid,
    from: TaskStatus,
    to: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = $1, \
             started_at = COALESCE($2, started_at), \
             completed_at = COALESCE($3, completed_at) \
         WHERE id = $4 AND status = $5",
    )
    .bind(to)
    .bind(started_at)
    .bind(completed_at)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition task status")?;

    Ok(result.rows_affected())
}

/// Claim a `pending`/`queued` task for a specific agent instance, moving it
/// to `assigned`. Optimistically locked on status so two dispatchers
/// racing for the same task leave exactly one winner.
pub async fn assign_task(
    pool: &PgPool,
    task_id: Uuid,
    agent_instance_id: Uuid,
    from: TaskStatus,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = 'assigned', assigned_agent_id = $1 \
         WHERE id = $2 AND status = $3",
    )
    .bind(agent_instance_id)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to assign task")?;

    Ok(result.rows_affected())
}

/// Requeue a task (e.g. its agent went unhealthy), clearing the
/// assignment and returning it to `queued`. Optimistically locked on
/// status.
pub async fn requeue_task(pool: &PgPool, task_id: Uuid, from: TaskStatus) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = 'queued', assigned_agent_id = NULL \
         WHERE id = $1 AND status = $2",
    )
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to requeue task")?;

    Ok(result.rows_affected())
}

/// Record task completion: sets status, result/error, and `completed_at`.
/// Optimistically locked on status.
pub async fn complete_task(
    pool: &PgPool,
    task_id: Uuid,
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
) -> Result<u64> {
    let rows = sqlx::query(
        "UPDATE tasks \
         SET status = $1, result = $2, error = $3, completed_at = now() \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(status)
    .bind(result)
    .bind(error)
    .bind(task_id)
    .execute(pool)
    .await
    .context("failed to complete task")?;

    Ok(rows.rows_affected())
}

/// Increment a task's retry counter and return it to `queued`, clearing
/// its assignment. Optimistically locked on status and retry count.
pub async fn retry_task(pool: &PgPool, task_id: Uuid, current_retry_count: i32) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = 'queued', assigned_agent_id = NULL, retry_count = retry_count + 1 \
         WHERE id = $1 AND status IN ('assigned', 'running') AND retry_count = $2",
    )
    .bind(task_id)
    .bind(current_retry_count)
    .execute(pool)
    .await
    .context("failed to retry task")?;

    Ok(result.rows_affected())
}

/// Tasks owned by a specific agent instance that are still in-flight
/// (`assigned` or `running`). Used by the supervisor to requeue work when
/// an instance is declared unhealthy.
pub async fn list_inflight_tasks_for_instance(
    pool: &PgPool,
    agent_instance_id: Uuid,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks \
         WHERE assigned_agent_id = $1 AND status IN ('assigned', 'running')",
    )
    .bind(agent_instance_id)
    .fetch_all(pool)
    .await
    .context("failed to list in-flight tasks for instance")?;

    Ok(tasks)
}

/// Aggregate counts of tasks by status, for dashboard/CLI summaries.
#[derive(Debug, Clone, Default)]
pub struct TaskStatusCounts {
    pub pending: i64,
    pub queued: i64,
    pub assigned: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub timeout: i64,
}

/// Get a summary of task counts by status, optionally scoped to a tenant.
pub async fn get_status_counts(pool: &PgPool, tenant_id: Option<&str>) -> Result<TaskStatusCounts> {
    let rows: Vec<(String, i64)> = match tenant_id {
        Some(tenant) => {
            sqlx::query_as(
                "SELECT status::text, COUNT(*) FROM tasks WHERE tenant_id = $1 GROUP BY status",
            )
            .bind(tenant)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as("SELECT status::text, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(pool)
                .await
        }
    }
    .context("failed to get task status counts")?;

    let mut counts = TaskStatusCounts::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => counts.pending = *count,
            "queued" => counts.queued = *count,
            "assigned" => counts.assigned = *count,
            "running" => counts.running = *count,
            "completed" => counts.completed = *count,
            "failed" => counts.failed = *count,
            "cancelled" => counts.cancelled = *count,
            "timeout" => counts.timeout = *count,
            _ => {}
        }
    }
    Ok(counts)
}
