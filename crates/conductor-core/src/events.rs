//! Domain event envelope shared by every subsystem (router, supervisor,
//! workflow engine, agent runtime) to announce state changes.
//!
//! Events are the one channel all subsystems agree on: the [`MessagingFabric`](crate::messaging::MessagingFabric)
//! publishes them, `conductor-db` persists them append-only, and the CLI's
//! `status`/`tail` commands read them back.

use chrono::Utc;
use conductor_db::models::EventType;
use serde_json::{Value, json};
use uuid::Uuid;

/// An event in flight, not yet assigned a database row. Mirrors
/// `conductor_db::models::DomainEvent` but without the server-generated
/// fields (`event_id`, `recorded_at`), so callers can build one without a
/// pool handle.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: String,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub payload: Value,
    pub metadata: Value,
}

impl DomainEvent {
    /// Build a root event with no causal parent. `correlation_id` defaults
    /// to the event's own id once persisted; until then it is left unset
    /// and resolved by the caller that assigns the final `event_id`.
    pub fn new(
        event_type: EventType,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        tenant_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            tenant_id: tenant_id.into(),
            correlation_id: None,
            causation_id: None,
            payload,
            metadata: json!({}),
        }
    }

    /// Derive a child event, propagating the parent's correlation id (or
    /// the parent's own id, if it is itself a root event) and recording
    /// the parent as this event's direct cause.
    pub fn with_causation(mut self, parent_event_id: Uuid, parent_correlation_id: Option<Uuid>) -> Self {
        self.causation_id = Some(parent_event_id);
        self.correlation_id = Some(parent_correlation_id.unwrap_or(parent_event_id));
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Convenience constructors grouped by aggregate, mirroring the factory
/// methods on the original system's per-aggregate event subclasses.
pub mod task {
    use super::*;

    pub fn created(task_id: Uuid, tenant_id: &str, name: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::TaskCreated,
            task_id,
            "task",
            tenant_id,
            json!({ "name": name }),
        )
    }

    pub fn assigned(task_id: Uuid, tenant_id: &str, agent_instance_id: Uuid) -> DomainEvent {
        DomainEvent::new(
            EventType::TaskAssigned,
            task_id,
            "task",
            tenant_id,
            json!({ "agent_instance_id": agent_instance_id }),
        )
    }

    pub fn completed(task_id: Uuid, tenant_id: &str, result: &Value) -> DomainEvent {
        DomainEvent::new(
            EventType::TaskCompleted,
            task_id,
            "task",
            tenant_id,
            json!({ "result": result }),
        )
    }

    pub fn failed(task_id: Uuid, tenant_id: &str, error: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::TaskFailed,
            task_id,
            "task",
            tenant_id,
            json!({ "error": error }),
        )
    }
}

pub mod agent {
    use super::*;

    pub fn llm_call(instance_id: Uuid, tenant_id: &str, model: &str, tokens: i64) -> DomainEvent {
        DomainEvent::new(
            EventType::AgentLlmCall,
            instance_id,
            "agent_instance",
            tenant_id,
            json!({ "model": model, "tokens": tokens }),
        )
    }

    pub fn tool_call(instance_id: Uuid, tenant_id: &str, tool_name: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::AgentToolCall,
            instance_id,
            "agent_instance",
            tenant_id,
            json!({ "tool_name": tool_name }),
        )
    }

    pub fn thinking(instance_id: Uuid, tenant_id: &str, note: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::AgentThinking,
            instance_id,
            "agent_instance",
            tenant_id,
            json!({ "note": note }),
        )
    }
}

pub mod workflow {
    use super::*;

    pub fn started(execution_id: Uuid, tenant_id: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::WorkflowStarted,
            execution_id,
            "workflow_execution",
            tenant_id,
            json!({}),
        )
    }

    pub fn step_completed(execution_id: Uuid, tenant_id: &str, step_id: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::WorkflowStepCompleted,
            execution_id,
            "workflow_execution",
            tenant_id,
            json!({ "step_id": step_id }),
        )
    }

    pub fn completed(execution_id: Uuid, tenant_id: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::WorkflowCompleted,
            execution_id,
            "workflow_execution",
            tenant_id,
            json!({}),
        )
    }

    pub fn failed(execution_id: Uuid, tenant_id: &str, step_id: &str, error: &str) -> DomainEvent {
        DomainEvent::new(
            EventType::WorkflowFailed,
            execution_id,
            "workflow_execution",
            tenant_id,
            json!({ "step_id": step_id, "error": error }),
        )
    }
}

/// Stamp the wall-clock-free fields a database insert needs. Kept separate
/// from `DomainEvent` construction so call sites building events stay
/// deterministic and testable without a clock.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_causation_inherits_root_correlation() {
        let parent_id = Uuid::new_v4();
        let child = task::assigned(Uuid::new_v4(), "default", Uuid::new_v4())
            .with_causation(parent_id, None);

        assert_eq!(child.causation_id, Some(parent_id));
        assert_eq!(child.correlation_id, Some(parent_id));
    }

    #[test]
    fn with_causation_propagates_existing_correlation() {
        let parent_id = Uuid::new_v4();
        let root_correlation = Uuid::new_v4();
        let child = task::completed(Uuid::new_v4(), "default", &json!({}))
            .with_causation(parent_id, Some(root_correlation));

        assert_eq!(child.causation_id, Some(parent_id));
        assert_eq!(child.correlation_id, Some(root_correlation));
    }
}
