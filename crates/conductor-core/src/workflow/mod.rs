//! Workflow Engine: runs a [`WorkflowDefinition`](conductor_db::models::WorkflowDefinition)'s
//! step tree to completion, handling parallel/conditional composition,
//! checkpointing, and saga compensation.
//!
//! Grounded on `original_source/core/workflows/engine.py` and `saga.py`,
//! adapted per spec.md §4.4's two mandated divergences: a sandboxed
//! condition evaluator ([`condition`]) instead of raw `eval()`, and real
//! HUMAN_APPROVAL suspend/resume instead of an auto-approve stub.

pub mod condition;
pub mod template;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_db::models::WorkflowStepType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::messaging::MessagingFabric;

/// One step of a workflow definition. Serialized opaquely into
/// `conductor_db::models::WorkflowDefinition::steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub step_type: WorkflowStepType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// PARALLEL: every listed step id runs concurrently. CONDITIONAL:
    /// index 0 is the true branch, index 1 the false branch.
    #[serde(default)]
    pub children: Vec<String>,
    pub task_template: Option<TaskTemplate>,
    pub condition: Option<String>,
    pub wait_seconds: Option<i64>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    pub compensation: Option<TaskTemplate>,
    pub subprocess_workflow_name: Option<String>,
}

/// The rendered-on-demand shape of an AGENT_TASK (or compensation) step,
/// submitted to the Router via [`TaskSubmitter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub description: String,
    #[serde(default = "default_input")]
    pub input_data: Value,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

fn default_input() -> Value {
    json!({})
}

/// Errors raised while validating a workflow definition at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionError {
    UnknownDependency { step_id: String, depends_on: String },
    TooManyConditionalChildren { step_id: String },
    InvalidCondition { step_id: String, reason: String },
    MissingField { step_id: String, field: &'static str },
}

impl std::fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDependency { step_id, depends_on } => {
                write!(f, "step '{step_id}' depends on unknown step '{depends_on}'")
            }
            Self::TooManyConditionalChildren { step_id } => {
                write!(f, "conditional step '{step_id}' must have at most 2 children")
            }
            Self::InvalidCondition { step_id, reason } => {
                write!(f, "step '{step_id}' has an invalid condition: {reason}")
            }
            Self::MissingField { step_id, field } => {
                write!(f, "step '{step_id}' of this type requires '{field}'")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Validate a step list: every `depends_on` references a known step id,
/// CONDITIONAL steps have at most two children, and every `condition`
/// parses under the sandboxed grammar.
pub fn validate_definition(steps: &[WorkflowStep]) -> Result<(), DefinitionError> {
    let ids: HashSet<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();

    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(DefinitionError::UnknownDependency {
                    step_id: step.step_id.clone(),
                    depends_on: dep.clone(),
                });
            }
        }

        match step.step_type {
            WorkflowStepType::Conditional => {
                if step.children.len() > 2 {
                    return Err(DefinitionError::TooManyConditionalChildren { step_id: step.step_id.clone() });
                }
                let Some(expr) = &step.condition else {
                    return Err(DefinitionError::MissingField { step_id: step.step_id.clone(), field: "condition" });
                };
                condition::validate(expr).map_err(|e| DefinitionError::InvalidCondition {
                    step_id: step.step_id.clone(),
                    reason: e.to_string(),
                })?;
            }
            WorkflowStepType::AgentTask => {
                if step.task_template.is_none() {
                    return Err(DefinitionError::MissingField { step_id: step.step_id.clone(), field: "task_template" });
                }
            }
            WorkflowStepType::Wait => {
                if step.wait_seconds.is_none() {
                    return Err(DefinitionError::MissingField { step_id: step.step_id.clone(), field: "wait_seconds" });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_runnable(step: &WorkflowStep, completed: &HashSet<String>) -> bool {
    step.depends_on.iter().all(|d| completed.contains(d))
}

/// Outcome of executing a single step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
}

impl StepOutcome {
    fn ok(result: Value) -> Self {
        Self { success: true, result, error: None }
    }
    fn err(error: impl Into<String>) -> Self {
        Self { success: false, result: Value::Null, error: Some(error.into()) }
    }
}

/// In-memory execution state the engine operates on. Mirrors the
/// persisted fields of `conductor_db::models::WorkflowExecution` that the
/// engine actually reads/mutates during a run; DB persistence is handled
/// by the caller driving [`WorkflowEngine::run_to_completion`].
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub execution_id: Uuid,
    pub tenant_id: String,
    pub input_data: Value,
    pub completed_steps: Vec<String>,
    pub step_results: Map<String, Value>,
}

impl ExecutionState {
    pub fn new(execution_id: Uuid, tenant_id: impl Into<String>, input_data: Value) -> Self {
        Self {
            execution_id,
            tenant_id: tenant_id.into(),
            input_data,
            completed_steps: Vec::new(),
            step_results: Map::new(),
        }
    }

    fn completed_set(&self) -> HashSet<String> {
        self.completed_steps.iter().cloned().collect()
    }

    fn steps_value(&self) -> Value {
        Value::Object(self.step_results.clone())
    }
}

/// Submits a rendered [`TaskTemplate`] to the Router and awaits its
/// outcome. The engine depends on this seam rather than the Router
/// directly so tests can supply a deterministic double.
///
/// Object-safe: stored as `Arc<dyn TaskSubmitter>`.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    async fn submit_and_await(&self, template: &TaskTemplate, timeout: Duration) -> Result<Value, String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn TaskSubmitter) {}
};

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Drives a [`WorkflowStep`] tree to completion against a [`TaskSubmitter`]
/// and a [`MessagingFabric`].
pub struct WorkflowEngine {
    submitter: Arc<dyn TaskSubmitter>,
    fabric: Arc<dyn MessagingFabric>,
}

impl WorkflowEngine {
    pub fn new(submitter: Arc<dyn TaskSubmitter>, fabric: Arc<dyn MessagingFabric>) -> Self {
        Self { submitter, fabric }
    }

    /// Run one forward pass over `steps` in listed order, executing every
    /// step that becomes runnable, skipping the rest (they are expected to
    /// become runnable later in the same pass since authors must order
    /// steps consistently with their dependencies -- checked at load time
    /// by [`validate_definition`]).
    ///
    /// Returns `Ok(())` if every step completed successfully, or the first
    /// failure's outcome (the caller is responsible for triggering saga
    /// compensation against `state.completed_steps`).
    pub async fn run_to_completion(
        &self,
        steps: &[WorkflowStep],
        state: &mut ExecutionState,
    ) -> Result<(), (String, String)> {
        let mut remaining: Vec<&WorkflowStep> = steps.iter().collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut still_remaining = Vec::new();

            for step in remaining {
                let completed = state.completed_set();
                if state.completed_steps.contains(&step.step_id) {
                    continue;
                }
                if !is_runnable(step, &completed) {
                    still_remaining.push(step);
                    continue;
                }

                let outcome = self.execute_step(steps, step, state).await;
                progressed = true;

                if outcome.success {
                    state.step_results.insert(step.step_id.clone(), outcome.result);
                    state.completed_steps.push(step.step_id.clone());
                } else {
                    return Err((step.step_id.clone(), outcome.error.unwrap_or_default()));
                }
            }

            remaining = still_remaining;
            if !progressed && !remaining.is_empty() {
                // Nothing became runnable this pass: the definition's step
                // order doesn't satisfy its own dependencies. Caught by
                // validate_definition in the common case; defend here too.
                let stuck: Vec<&str> = remaining.iter().map(|s| s.step_id.as_str()).collect();
                return Err(("<dependency-order>".to_string(), format!("steps never became runnable: {stuck:?}")));
            }
        }

        Ok(())
    }

    /// Execute one step by type. Boxed to allow the PARALLEL/CONDITIONAL/
    /// SUBPROCESS cases to recurse into sibling steps.
    fn execute_step<'a>(
        &'a self,
        steps: &'a [WorkflowStep],
        step: &'a WorkflowStep,
        state: &'a mut ExecutionState,
    ) -> Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>> {
        Box::pin(async move {
            match step.step_type {
                WorkflowStepType::AgentTask => self.execute_agent_task(step, state).await,
                WorkflowStepType::Parallel => self.execute_parallel(steps, step, state).await,
                WorkflowStepType::Conditional => self.execute_conditional(steps, step, state).await,
                WorkflowStepType::Wait => self.execute_wait(step).await,
                WorkflowStepType::HumanApproval => self.execute_human_approval(step, state).await,
                WorkflowStepType::Subprocess => self.execute_subprocess(step).await,
                WorkflowStepType::Loop => StepOutcome::err("LOOP step type has no execution semantics in this engine"),
            }
        })
    }

    async fn execute_agent_task(&self, step: &WorkflowStep, state: &ExecutionState) -> StepOutcome {
        let Some(template) = &step.task_template else {
            return StepOutcome::err("AGENT_TASK step missing task_template");
        };
        let rendered = render_template(template, state);
        let timeout = step
            .timeout_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(DEFAULT_STEP_TIMEOUT);

        match self.submitter.submit_and_await(&rendered, timeout).await {
            Ok(result) => StepOutcome::ok(result),
            Err(error) => StepOutcome::err(error),
        }
    }

    async fn execute_parallel(
        &self,
        steps: &[WorkflowStep],
        step: &WorkflowStep,
        state: &mut ExecutionState,
    ) -> StepOutcome {
        let mut results = Map::new();
        let mut errors = Vec::new();

        // Children run against independent clones of the shared state view
        // (they only read input/steps so far completed, never each
        // other's in-flight results), then are merged back in order.
        let futures = step.children.iter().filter_map(|child_id| {
            steps.iter().find(|s| &s.step_id == child_id).map(|child| {
                let mut child_state = state.clone();
                async move {
                    let outcome = self.execute_step(steps, child, &mut child_state).await;
                    (child.step_id.clone(), outcome)
                }
            })
        });

        let outcomes = futures::future::join_all(futures).await;
        for (child_id, outcome) in outcomes {
            if outcome.success {
                results.insert(child_id, outcome.result);
            } else {
                errors.push(format!("{child_id}: {}", outcome.error.unwrap_or_default()));
            }
        }

        for (id, result) in &results {
            state.step_results.insert(id.clone(), result.clone());
        }

        if errors.is_empty() {
            StepOutcome::ok(Value::Object(results))
        } else {
            StepOutcome::err(errors.join("; "))
        }
    }

    async fn execute_conditional(
        &self,
        steps: &[WorkflowStep],
        step: &WorkflowStep,
        state: &mut ExecutionState,
    ) -> StepOutcome {
        let Some(expr) = &step.condition else {
            return StepOutcome::err("CONDITIONAL step missing condition");
        };
        let truthy = match condition::evaluate(expr, &state.input_data, &state.steps_value()) {
            Ok(value) => value,
            Err(e) => return StepOutcome::err(format!("condition evaluation failed: {e}")),
        };

        let branch_id = if truthy { step.children.first() } else { step.children.get(1) };
        let Some(branch_id) = branch_id else {
            return StepOutcome::ok(Value::Null);
        };
        let Some(branch) = steps.iter().find(|s| &s.step_id == branch_id) else {
            return StepOutcome::err(format!("conditional branch '{branch_id}' not found"));
        };

        self.execute_step(steps, branch, state).await
    }

    async fn execute_wait(&self, step: &WorkflowStep) -> StepOutcome {
        let Some(seconds) = step.wait_seconds else {
            return StepOutcome::err("WAIT step missing wait_seconds");
        };
        tokio::time::sleep(Duration::from_secs(seconds.max(0) as u64)).await;
        StepOutcome::ok(Value::Null)
    }

    async fn execute_human_approval(&self, step: &WorkflowStep, state: &ExecutionState) -> StepOutcome {
        let subject = format!("workflow.approval.{}.{}", state.execution_id, step.step_id);
        let timeout = step
            .timeout_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(DEFAULT_APPROVAL_TIMEOUT);

        let request_payload = json!({
            "execution_id": state.execution_id,
            "step_id": step.step_id,
        });

        match self.fabric.request(&subject, request_payload, timeout).await {
            Ok(reply) => {
                let approved = reply.get("approved").and_then(Value::as_bool).unwrap_or(false);
                if approved {
                    StepOutcome::ok(reply)
                } else {
                    StepOutcome::err("human approval was rejected")
                }
            }
            Err(e) => StepOutcome::err(format!("human approval timed out or failed: {e}")),
        }
    }

    async fn execute_subprocess(&self, step: &WorkflowStep) -> StepOutcome {
        let Some(name) = &step.subprocess_workflow_name else {
            return StepOutcome::err("SUBPROCESS step missing subprocess_workflow_name");
        };
        // Resolving and spawning the child definition is left to the
        // caller driving persistence (it needs a pool handle this engine
        // doesn't hold); the in-memory engine reports the intent so the
        // DB-backed driver can look up and run the named workflow.
        StepOutcome::ok(json!({ "subprocess": name, "note": "driver must resolve and run the named workflow" }))
    }

    /// Saga compensation: iterate `state.completed_steps` in reverse
    /// insertion order, running each step's `compensation` template (if
    /// any) as a fresh AGENT_TASK. Best-effort: a compensation failure is
    /// logged and iteration continues.
    pub async fn compensate(&self, steps: &[WorkflowStep], state: &ExecutionState) -> Vec<(String, Result<Value, String>)> {
        let mut outcomes = Vec::new();
        for step_id in state.completed_steps.iter().rev() {
            let Some(step) = steps.iter().find(|s| &s.step_id == step_id) else { continue };
            let Some(compensation) = &step.compensation else { continue };

            let rendered = render_template(compensation, state);
            let result = self
                .submitter
                .submit_and_await(&rendered, DEFAULT_STEP_TIMEOUT)
                .await;
            if let Err(e) = &result {
                tracing::warn!(step_id = %step_id, error = %e, "compensation step failed, continuing");
            }
            outcomes.push((step_id.clone(), result));
        }
        outcomes
    }
}

fn render_template(template: &TaskTemplate, state: &ExecutionState) -> TaskTemplate {
    let steps_value = state.steps_value();
    TaskTemplate {
        name: template::render(&template.name, &state.input_data, &steps_value),
        description: template::render(&template.description, &state.input_data, &steps_value),
        input_data: template::render_value(&template.input_data, &state.input_data, &steps_value),
        required_capabilities: template.required_capabilities.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSubmitter {
        calls: Mutex<Vec<TaskTemplate>>,
        respond: Box<dyn Fn(&TaskTemplate) -> Result<Value, String> + Send + Sync>,
    }

    #[async_trait]
    impl TaskSubmitter for RecordingSubmitter {
        async fn submit_and_await(&self, template: &TaskTemplate, _timeout: Duration) -> Result<Value, String> {
            self.calls.lock().unwrap().push(template.clone());
            (self.respond)(template)
        }
    }

    fn always_ok() -> Arc<RecordingSubmitter> {
        Arc::new(RecordingSubmitter {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(|_| Ok(json!({"ok": true}))),
        })
    }

    fn agent_task(id: &str, depends_on: &[&str]) -> WorkflowStep {
        WorkflowStep {
            step_id: id.to_string(),
            step_type: WorkflowStepType::AgentTask,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            children: vec![],
            task_template: Some(TaskTemplate {
                name: format!("task-{id}"),
                description: "desc".to_string(),
                input_data: json!({}),
                required_capabilities: vec![],
            }),
            condition: None,
            wait_seconds: None,
            timeout_seconds: None,
            compensation: None,
            subprocess_workflow_name: None,
        }
    }

    fn new_state() -> ExecutionState {
        ExecutionState::new(Uuid::new_v4(), "default", json!({}))
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let steps = vec![agent_task("a", &["ghost"])];
        assert!(matches!(validate_definition(&steps), Err(DefinitionError::UnknownDependency { .. })));
    }

    #[test]
    fn validate_accepts_well_formed_chain() {
        let steps = vec![agent_task("a", &[]), agent_task("b", &["a"])];
        assert!(validate_definition(&steps).is_ok());
    }

    #[tokio::test]
    async fn runs_linear_chain_in_order() {
        let submitter = always_ok();
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter.clone(), fabric);
        let steps = vec![agent_task("a", &[]), agent_task("b", &["a"])];
        let mut state = new_state();

        let result = engine.run_to_completion(&steps, &mut state).await;
        assert!(result.is_ok());
        assert_eq!(state.completed_steps, vec!["a".to_string(), "b".to_string()]);

        let calls = submitter.calls.lock().unwrap();
        assert_eq!(calls[0].name, "task-a");
        assert_eq!(calls[1].name, "task-b");
    }

    #[tokio::test]
    async fn dependent_step_waits_for_its_dependency() {
        let submitter = always_ok();
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);
        // Listed out of dependency order: "b" depends on "a" but appears first.
        let steps = vec![agent_task("b", &["a"]), agent_task("a", &[])];
        let mut state = new_state();

        let result = engine.run_to_completion(&steps, &mut state).await;
        assert!(result.is_ok());
        assert_eq!(state.completed_steps, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failing_step_stops_the_pass_and_reports_step_id() {
        let submitter = Arc::new(RecordingSubmitter {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(|t| if t.name == "task-b" { Err("boom".to_string()) } else { Ok(json!({})) }),
        });
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);
        let steps = vec![agent_task("a", &[]), agent_task("b", &["a"])];
        let mut state = new_state();

        let result = engine.run_to_completion(&steps, &mut state).await;
        assert_eq!(result, Err(("b".to_string(), "boom".to_string())));
        assert_eq!(state.completed_steps, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn parallel_step_runs_children_concurrently_and_aggregates() {
        let submitter = always_ok();
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);

        let parallel = WorkflowStep {
            step_id: "fan_out".to_string(),
            step_type: WorkflowStepType::Parallel,
            depends_on: vec![],
            children: vec!["left".to_string(), "right".to_string()],
            task_template: None,
            condition: None,
            wait_seconds: None,
            timeout_seconds: None,
            compensation: None,
            subprocess_workflow_name: None,
        };
        let steps = vec![parallel, agent_task("left", &[]), agent_task("right", &[])];
        let mut state = new_state();

        let result = engine.run_to_completion(&steps, &mut state).await;
        assert!(result.is_ok());
        assert!(state.step_results.contains_key("left"));
        assert!(state.step_results.contains_key("right"));
        assert!(state.step_results.contains_key("fan_out"));
    }

    #[tokio::test]
    async fn conditional_picks_true_branch() {
        let submitter = always_ok();
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);

        let conditional = WorkflowStep {
            step_id: "check".to_string(),
            step_type: WorkflowStepType::Conditional,
            depends_on: vec![],
            children: vec!["if_true".to_string(), "if_false".to_string()],
            task_template: None,
            condition: Some("input.go == true".to_string()),
            wait_seconds: None,
            timeout_seconds: None,
            compensation: None,
            subprocess_workflow_name: None,
        };
        let steps = vec![conditional, agent_task("if_true", &[]), agent_task("if_false", &[])];
        let mut state = ExecutionState::new(Uuid::new_v4(), "default", json!({"go": true}));

        let result = engine.run_to_completion(&steps, &mut state).await;
        assert!(result.is_ok());
        assert!(state.completed_steps.contains(&"if_true".to_string()));
        assert!(!state.completed_steps.contains(&"if_false".to_string()));
    }

    #[tokio::test]
    async fn compensation_runs_completed_steps_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        let submitter = Arc::new(RecordingSubmitter {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(move |t| {
                order_clone.lock().unwrap().push(t.name.clone());
                Ok(json!({}))
            }),
        });
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);

        let mut a = agent_task("a", &[]);
        a.compensation = Some(TaskTemplate {
            name: "undo-a".to_string(),
            description: "undo a".to_string(),
            input_data: json!({}),
            required_capabilities: vec![],
        });
        let mut b = agent_task("b", &["a"]);
        b.compensation = Some(TaskTemplate {
            name: "undo-b".to_string(),
            description: "undo b".to_string(),
            input_data: json!({}),
            required_capabilities: vec![],
        });

        let mut state = new_state();
        state.completed_steps = vec!["a".to_string(), "b".to_string()];

        engine.compensate(&[a, b], &state).await;
        assert_eq!(*order.lock().unwrap(), vec!["undo-b".to_string(), "undo-a".to_string()]);
    }

    #[tokio::test]
    async fn human_approval_times_out_without_a_responder() {
        let submitter = always_ok();
        let fabric = Arc::new(crate::messaging::InProcessFabric::new());
        let engine = WorkflowEngine::new(submitter, fabric);

        let mut step = agent_task("approve", &[]);
        step.step_type = WorkflowStepType::HumanApproval;
        step.task_template = None;
        step.timeout_seconds = Some(0);

        let state = new_state();
        let outcome = engine.execute_human_approval(&step, &state).await;
        assert!(!outcome.success);
    }
}
