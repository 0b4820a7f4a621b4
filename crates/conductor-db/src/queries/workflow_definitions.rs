//! Database query functions for the `workflow_definitions` table.
//!
//! The `steps` column stores an opaque JSON document owned by
//! `conductor-core::workflow` (a serialized step tree). This crate never
//! interprets it.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::WorkflowDefinition;

/// Insert a new workflow definition at a given version. Rejected by the
/// UNIQUE constraint on `(name, version)` if that version already exists.
pub async fn insert_workflow_definition(
    pool: &PgPool,
    name: &str,
    version: i32,
    steps: &serde_json::Value,
) -> Result<WorkflowDefinition> {
    let def = sqlx::query_as::<_, WorkflowDefinition>(
        "INSERT INTO workflow_definitions (name, version, steps) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(name)
    .bind(version)
    .bind(steps)
    .fetch_one(pool)
    .await
    .context("failed to insert workflow definition")?;

    Ok(def)
}

/// Fetch a single workflow definition by ID.
pub async fn get_workflow_definition(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<WorkflowDefinition>> {
    let def = sqlx::query_as::<_, WorkflowDefinition>(
        "SELECT * FROM workflow_definitions WHERE workflow_id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch workflow definition")?;

    Ok(def)
}

/// Fetch the latest version of a workflow definition by name.
pub async fn get_latest_workflow_definition(
    pool: &PgPool,
    name: &str,
) -> Result<Option<WorkflowDefinition>> {
    let def = sqlx::query_as::<_, WorkflowDefinition>(
        "SELECT * FROM workflow_definitions \
         WHERE name = $1 \
         ORDER BY version DESC \
         LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest workflow definition")?;

    Ok(def)
}

/// List all workflow definitions, newest version first within each name.
pub async fn list_workflow_definitions(pool: &PgPool) -> Result<Vec<WorkflowDefinition>> {
    let defs = sqlx::query_as::<_, WorkflowDefinition>(
        "SELECT * FROM workflow_definitions ORDER BY name, version DESC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list workflow definitions")?;

    Ok(defs)
}
