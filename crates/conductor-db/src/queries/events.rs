//! Database query functions for the `events` table: the append-only domain
//! event log.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DomainEvent, EventType};

/// Parameters for appending a new domain event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: String,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Append a new event. Returns the inserted row with server-generated
/// defaults (event_id, recorded_at).
pub async fn insert_event(pool: &PgPool, new: &NewEvent) -> Result<DomainEvent> {
    let event = sqlx::query_as::<_, DomainEvent>(
        "INSERT INTO events ( \
            event_type, aggregate_id, aggregate_type, tenant_id, \
            correlation_id, causation_id, payload, metadata \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.event_type)
    .bind(new.aggregate_id)
    .bind(&new.aggregate_type)
    .bind(&new.tenant_id)
    .bind(new.correlation_id)
    .bind(new.causation_id)
    .bind(&new.payload)
    .bind(&new.metadata)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert event {} for aggregate {}",
            new.event_type, new.aggregate_id
        )
    })?;

    Ok(event)
}

/// List all events for a given aggregate, ordered oldest first.
pub async fn list_events_for_aggregate(
    pool: &PgPool,
    aggregate_id: Uuid,
) -> Result<Vec<DomainEvent>> {
    let events = sqlx::query_as::<_, DomainEvent>(
        "SELECT * FROM events WHERE aggregate_id = $1 ORDER BY recorded_at ASC",
    )
    .bind(aggregate_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list events for aggregate {aggregate_id}"))?;

    Ok(events)
}

/// List all events sharing a correlation id, ordered oldest first. Used to
/// reconstruct the full causal chain of a request across task/agent/
/// workflow boundaries.
pub async fn list_events_by_correlation(
    pool: &PgPool,
    correlation_id: Uuid,
) -> Result<Vec<DomainEvent>> {
    let events = sqlx::query_as::<_, DomainEvent>(
        "SELECT * FROM events WHERE correlation_id = $1 ORDER BY recorded_at ASC",
    )
    .bind(correlation_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list events for correlation {correlation_id}"))?;

    Ok(events)
}

/// List the most recent events of a given type, newest first, for
/// polling-based subscribers (the durable replay side of the in-process
/// messaging fabric).
pub async fn list_recent_by_type(
    pool: &PgPool,
    event_type: EventType,
    since: chrono::DateTime<chrono::Utc>,
    limit: i64,
) -> Result<Vec<DomainEvent>> {
    let events = sqlx::query_as::<_, DomainEvent>(
        "SELECT * FROM events \
         WHERE event_type = $1 AND recorded_at > $2 \
         ORDER BY recorded_at ASC \
         LIMIT $3",
    )
    .bind(event_type)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list recent events by type")?;

    Ok(events)
}
