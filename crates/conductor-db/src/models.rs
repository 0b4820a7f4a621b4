use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Dispatch priority of a task. Ordinal order matters: the router scans
/// from `Critical` down to `Low` when looking for the next runnable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// All variants, ordered from highest to lowest priority.
    pub const ALL_DESCENDING: [TaskPriority; 4] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
    ];
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskPriority {
    type Err = TaskPriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(TaskPriorityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskPriority`] string.
#[derive(Debug, Clone)]
pub struct TaskPriorityParseError(pub String);

impl fmt::Display for TaskPriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task priority: {:?}", self.0)
    }
}

impl std::error::Error for TaskPriorityParseError {}

// ---------------------------------------------------------------------------

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// A task that has reached one of these statuses never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "assigned" => Ok(Self::Assigned),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Runtime status of an agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentInstanceStatus {
    Idle,
    Running,
    Paused,
    Error,
    Terminated,
}

impl fmt::Display for AgentInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl FromStr for AgentInstanceStatus {
    type Err = AgentInstanceStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            "terminated" => Ok(Self::Terminated),
            other => Err(AgentInstanceStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AgentInstanceStatus`] string.
#[derive(Debug, Clone)]
pub struct AgentInstanceStatusParseError(pub String);

impl fmt::Display for AgentInstanceStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid agent instance status: {:?}", self.0)
    }
}

impl std::error::Error for AgentInstanceStatusParseError {}

// ---------------------------------------------------------------------------

/// The kind of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepType {
    AgentTask,
    Parallel,
    Conditional,
    Loop,
    Wait,
    HumanApproval,
    Subprocess,
}

impl fmt::Display for WorkflowStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AgentTask => "agent_task",
            Self::Parallel => "parallel",
            Self::Conditional => "conditional",
            Self::Loop => "loop",
            Self::Wait => "wait",
            Self::HumanApproval => "human_approval",
            Self::Subprocess => "subprocess",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkflowStepType {
    type Err = WorkflowStepTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent_task" => Ok(Self::AgentTask),
            "parallel" => Ok(Self::Parallel),
            "conditional" => Ok(Self::Conditional),
            "loop" => Ok(Self::Loop),
            "wait" => Ok(Self::Wait),
            "human_approval" => Ok(Self::HumanApproval),
            "subprocess" => Ok(Self::Subprocess),
            other => Err(WorkflowStepTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkflowStepType`] string.
#[derive(Debug, Clone)]
pub struct WorkflowStepTypeParseError(pub String);

impl fmt::Display for WorkflowStepTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workflow step type: {:?}", self.0)
    }
}

impl std::error::Error for WorkflowStepTypeParseError {}

// ---------------------------------------------------------------------------

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Compensating,
    Compensated,
    Cancelled,
}

impl fmt::Display for WorkflowExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkflowExecutionStatus {
    type Err = WorkflowExecutionStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "compensating" => Ok(Self::Compensating),
            "compensated" => Ok(Self::Compensated),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(WorkflowExecutionStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkflowExecutionStatus`] string.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionStatusParseError(pub String);

impl fmt::Display for WorkflowExecutionStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workflow execution status: {:?}", self.0)
    }
}

impl std::error::Error for WorkflowExecutionStatusParseError {}

// ---------------------------------------------------------------------------

/// The closed set of domain event types emitted across the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Task lifecycle
    TaskCreated,
    TaskAssigned,
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    TaskTimeout,
    // Agent lifecycle
    AgentRegistered,
    AgentStarted,
    AgentStopped,
    AgentHeartbeat,
    AgentLlmCall,
    AgentToolCall,
    AgentThinking,
    AgentOutput,
    AgentError,
    // Workflow lifecycle
    WorkflowCreated,
    WorkflowStarted,
    WorkflowStepStarted,
    WorkflowStepCompleted,
    WorkflowStepFailed,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelled,
    WorkflowCompensating,
    WorkflowCompensated,
    // System
    SystemScaleUp,
    SystemScaleDown,
    SystemCircuitOpen,
    SystemCircuitClose,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TaskCreated => "task.created",
            Self::TaskAssigned => "task.assigned",
            Self::TaskStarted => "task.started",
            Self::TaskProgress => "task.progress",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskCancelled => "task.cancelled",
            Self::TaskTimeout => "task.timeout",
            Self::AgentRegistered => "agent.registered",
            Self::AgentStarted => "agent.started",
            Self::AgentStopped => "agent.stopped",
            Self::AgentHeartbeat => "agent.heartbeat",
            Self::AgentLlmCall => "agent.llm_call",
            Self::AgentToolCall => "agent.tool_call",
            Self::AgentThinking => "agent.thinking",
            Self::AgentOutput => "agent.output",
            Self::AgentError => "agent.error",
            Self::WorkflowCreated => "workflow.created",
            Self::WorkflowStarted => "workflow.started",
            Self::WorkflowStepStarted => "workflow.step.started",
            Self::WorkflowStepCompleted => "workflow.step.completed",
            Self::WorkflowStepFailed => "workflow.step.failed",
            Self::WorkflowCompleted => "workflow.completed",
            Self::WorkflowFailed => "workflow.failed",
            Self::WorkflowPaused => "workflow.paused",
            Self::WorkflowResumed => "workflow.resumed",
            Self::WorkflowCancelled => "workflow.cancelled",
            Self::WorkflowCompensating => "workflow.compensating",
            Self::WorkflowCompensated => "workflow.compensated",
            Self::SystemScaleUp => "system.scale_up",
            Self::SystemScaleDown => "system.scale_down",
            Self::SystemCircuitOpen => "system.circuit_open",
            Self::SystemCircuitClose => "system.circuit_close",
        };
        f.write_str(s)
    }
}

impl FromStr for EventType {
    type Err = EventTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "task.created" => Self::TaskCreated,
            "task.assigned" => Self::TaskAssigned,
            "task.started" => Self::TaskStarted,
            "task.progress" => Self::TaskProgress,
            "task.completed" => Self::TaskCompleted,
            "task.failed" => Self::TaskFailed,
            "task.cancelled" => Self::TaskCancelled,
            "task.timeout" => Self::TaskTimeout,
            "agent.registered" => Self::AgentRegistered,
            "agent.started" => Self::AgentStarted,
            "agent.stopped" => Self::AgentStopped,
            "agent.heartbeat" => Self::AgentHeartbeat,
            "agent.llm_call" => Self::AgentLlmCall,
            "agent.tool_call" => Self::AgentToolCall,
            "agent.thinking" => Self::AgentThinking,
            "agent.output" => Self::AgentOutput,
            "agent.error" => Self::AgentError,
            "workflow.created" => Self::WorkflowCreated,
            "workflow.started" => Self::WorkflowStarted,
            "workflow.step.started" => Self::WorkflowStepStarted,
            "workflow.step.completed" => Self::WorkflowStepCompleted,
            "workflow.step.failed" => Self::WorkflowStepFailed,
            "workflow.completed" => Self::WorkflowCompleted,
            "workflow.failed" => Self::WorkflowFailed,
            "workflow.paused" => Self::WorkflowPaused,
            "workflow.resumed" => Self::WorkflowResumed,
            "workflow.cancelled" => Self::WorkflowCancelled,
            "workflow.compensating" => Self::WorkflowCompensating,
            "workflow.compensated" => Self::WorkflowCompensated,
            "system.scale_up" => Self::SystemScaleUp,
            "system.scale_down" => Self::SystemScaleDown,
            "system.circuit_open" => Self::SystemCircuitOpen,
            "system.circuit_close" => Self::SystemCircuitClose,
            other => return Err(EventTypeParseError(other.to_owned())),
        })
    }
}

/// Error returned when parsing an invalid [`EventType`] string.
#[derive(Debug, Clone)]
pub struct EventTypeParseError(pub String);

impl fmt::Display for EventTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event type: {:?}", self.0)
    }
}

impl std::error::Error for EventTypeParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A unit of LLM-driven work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub input_data: serde_json::Value,
    pub required_capabilities: Vec<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub parent_workflow_id: Option<Uuid>,
    pub parent_step_id: Option<String>,
    pub timeout_seconds: i64,
    pub retry_count: i32,
    pub max_retries: i32,
    pub idempotency_key: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Immutable agent configuration: role, goal, model config, constraints.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentDefinition {
    pub agent_id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

/// Runtime state of one agent instance tied to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentInstance {
    pub instance_id: Uuid,
    pub definition_id: Uuid,
    pub worker_id: String,
    pub status: AgentInstanceStatus,
    pub current_task_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub tokens_used: i64,
    pub execution_time_ms: i64,
}

/// A named, versioned workflow DAG. `steps` is a JSON-serialized
/// `Vec<crate::workflow::WorkflowStep>`-shaped document owned by
/// `conductor-core`; `conductor-db` stores and returns it opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowDefinition {
    pub workflow_id: Uuid,
    pub name: String,
    pub version: i32,
    pub steps: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A running instance of a [`WorkflowDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub workflow_definition_id: Uuid,
    pub tenant_id: String,
    pub status: WorkflowExecutionStatus,
    pub current_step_id: Option<String>,
    pub completed_steps: serde_json::Value,
    pub step_results: serde_json::Value,
    pub failed_step_id: Option<String>,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub checkpoint_data: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// An immutable, append-only domain event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: String,
    pub version: i64,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_priority_display_roundtrip() {
        let variants = [
            TaskPriority::Low,
            TaskPriority::Normal,
            TaskPriority::High,
            TaskPriority::Critical,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskPriority = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_priority_ordering_is_ascending() {
        assert!(TaskPriority::Low < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn task_priority_invalid() {
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Queued,
            TaskStatus::Assigned,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::Timeout,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_terminal_classification() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn task_status_invalid() {
        assert!("nope".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn agent_instance_status_display_roundtrip() {
        let variants = [
            AgentInstanceStatus::Idle,
            AgentInstanceStatus::Running,
            AgentInstanceStatus::Paused,
            AgentInstanceStatus::Error,
            AgentInstanceStatus::Terminated,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: AgentInstanceStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn agent_instance_status_invalid() {
        assert!("sleeping".parse::<AgentInstanceStatus>().is_err());
    }

    #[test]
    fn workflow_step_type_display_roundtrip() {
        let variants = [
            WorkflowStepType::AgentTask,
            WorkflowStepType::Parallel,
            WorkflowStepType::Conditional,
            WorkflowStepType::Loop,
            WorkflowStepType::Wait,
            WorkflowStepType::HumanApproval,
            WorkflowStepType::Subprocess,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: WorkflowStepType = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn workflow_step_type_invalid() {
        assert!("map_reduce".parse::<WorkflowStepType>().is_err());
    }

    #[test]
    fn workflow_execution_status_display_roundtrip() {
        let variants = [
            WorkflowExecutionStatus::Pending,
            WorkflowExecutionStatus::Running,
            WorkflowExecutionStatus::Paused,
            WorkflowExecutionStatus::Completed,
            WorkflowExecutionStatus::Failed,
            WorkflowExecutionStatus::Compensating,
            WorkflowExecutionStatus::Compensated,
            WorkflowExecutionStatus::Cancelled,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: WorkflowExecutionStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn workflow_execution_status_invalid() {
        assert!("stalled".parse::<WorkflowExecutionStatus>().is_err());
    }

    #[test]
    fn event_type_display_roundtrip() {
        let variants = [
            EventType::TaskCreated,
            EventType::TaskAssigned,
            EventType::TaskStarted,
            EventType::TaskProgress,
            EventType::TaskCompleted,
            EventType::TaskFailed,
            EventType::TaskCancelled,
            EventType::TaskTimeout,
            EventType::AgentRegistered,
            EventType::AgentStarted,
            EventType::AgentStopped,
            EventType::AgentHeartbeat,
            EventType::AgentLlmCall,
            EventType::AgentToolCall,
            EventType::AgentThinking,
            EventType::AgentOutput,
            EventType::AgentError,
            EventType::WorkflowCreated,
            EventType::WorkflowStarted,
            EventType::WorkflowStepStarted,
            EventType::WorkflowStepCompleted,
            EventType::WorkflowStepFailed,
            EventType::WorkflowCompleted,
            EventType::WorkflowFailed,
            EventType::WorkflowPaused,
            EventType::WorkflowResumed,
            EventType::WorkflowCancelled,
            EventType::WorkflowCompensating,
            EventType::WorkflowCompensated,
            EventType::SystemScaleUp,
            EventType::SystemScaleDown,
            EventType::SystemCircuitOpen,
            EventType::SystemCircuitClose,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: EventType = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn event_type_invalid() {
        assert!("task.exploded".parse::<EventType>().is_err());
    }
}
