//! Task Router: a priority-queue bank that matches queued tasks to idle,
//! capability-matched agent instances.
//!
//! Grounded on `original_source/core/orchestration/orchestrator.py`'s
//! `TaskQueue.get()`/`Orchestrator._find_agent()` for the scan-from-CRITICAL
//! and zero-completions-sorts-last tie-break rules, and on the teacher's
//! `orchestrator::run_orchestrator` for the single-threaded cooperative loop
//! shape (pop ready work, dispatch, sleep briefly when nothing is ready).

use std::collections::VecDeque;
use std::time::Duration;

use conductor_db::models::{AgentInstanceStatus, Task, TaskPriority, TaskStatus};
use conductor_db::queries::{agent_definitions, agent_instances, tasks as task_db};
use sqlx::PgPool;
use uuid::Uuid;

/// A bank of FIFO queues, one per priority level. `pop_next` always scans
/// from CRITICAL down to LOW and returns the first non-empty queue's head.
#[derive(Debug, Default)]
pub struct PriorityQueueBank {
    queues: std::collections::HashMap<TaskPriority, VecDeque<Uuid>>,
}

impl PriorityQueueBank {
    pub fn new() -> Self {
        Self { queues: std::collections::HashMap::new() }
    }

    pub fn push(&mut self, priority: TaskPriority, task_id: Uuid) {
        self.queues.entry(priority).or_default().push_back(task_id);
    }

    /// Pop the head of the highest non-empty priority queue.
    pub fn pop_next(&mut self) -> Option<(TaskPriority, Uuid)> {
        for priority in TaskPriority::ALL_DESCENDING {
            if let Some(queue) = self.queues.get_mut(&priority) {
                if let Some(task_id) = queue.pop_front() {
                    return Some((priority, task_id));
                }
            }
        }
        None
    }

    /// Return a task to the tail of its own priority queue (never promoted).
    pub fn requeue(&mut self, priority: TaskPriority, task_id: Uuid) {
        self.queues.entry(priority).or_default().push_back(task_id);
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }
}

/// Outcome of one dispatch-loop iteration, surfaced for logging/testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The task was assigned to an agent instance.
    Assigned { task_id: Uuid, instance_id: Uuid },
    /// No idle, capability-matched instance exists; task was requeued.
    NoCandidate { task_id: Uuid },
    /// Another dispatcher already claimed the task (optimistic lock lost).
    LostRace { task_id: Uuid },
}

/// Configuration for [`RouterLoop`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// How long to sleep when no task in the bank has a candidate agent.
    pub empty_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { empty_backoff: Duration::from_millis(200) }
    }
}

/// Compute the set of agent instances eligible to serve `task`: idle
/// instances whose definition declares every capability the task requires.
pub async fn candidate_instances(
    pool: &PgPool,
    task: &Task,
) -> anyhow::Result<Vec<conductor_db::models::AgentInstance>> {
    let mut candidates = Vec::new();

    let definitions = if task.required_capabilities.is_empty() {
        agent_definitions::list_agent_definitions(pool).await?
    } else {
        // Intersect definitions declaring each required capability.
        let mut by_id: std::collections::HashMap<Uuid, conductor_db::models::AgentDefinition> =
            std::collections::HashMap::new();
        for (i, capability) in task.required_capabilities.iter().enumerate() {
            let defs = agent_definitions::list_by_capability(pool, capability).await?;
            if i == 0 {
                by_id = defs.into_iter().map(|d| (d.agent_id, d)).collect();
            } else {
                let ids: std::collections::HashSet<Uuid> = defs.iter().map(|d| d.agent_id).collect();
                by_id.retain(|id, _| ids.contains(id));
            }
        }
        by_id.into_values().collect()
    };

    for definition in definitions {
        let has_all_capabilities = task
            .required_capabilities
            .iter()
            .all(|c| definition.capabilities.iter().any(|dc| dc == c));
        if !has_all_capabilities {
            continue;
        }
        let idle = agent_instances::list_idle_instances(pool, definition.agent_id).await?;
        candidates.extend(idle);
    }

    Ok(candidates)
}

/// Pick the candidate minimizing historical average execution time
/// (`execution_time_ms / max(tasks_completed, 1)`); agents with zero
/// completions sort last via `+inf`. Ties are broken by instance id
/// lexicographic order.
pub fn pick_candidate(
    candidates: &[conductor_db::models::AgentInstance],
) -> Option<&conductor_db::models::AgentInstance> {
    candidates.iter().min_by(|a, b| {
        let score = |inst: &conductor_db::models::AgentInstance| -> f64 {
            if inst.tasks_completed == 0 {
                f64::INFINITY
            } else {
                inst.execution_time_ms as f64 / inst.tasks_completed.max(1) as f64
            }
        };
        score(a)
            .partial_cmp(&score(b))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.instance_id.to_string().cmp(&b.instance_id.to_string()))
    })
}

/// Drives the priority-queue bank against durable task/instance state.
pub struct RouterLoop {
    pool: PgPool,
    bank: PriorityQueueBank,
    config: RouterConfig,
}

impl RouterLoop {
    pub fn new(pool: PgPool, config: RouterConfig) -> Self {
        Self { pool, bank: PriorityQueueBank::new(), config }
    }

    /// Pull any pending/queued tasks from storage into the in-memory bank.
    /// Call this before draining, typically once per outer loop tick.
    pub async fn refill(&mut self, limit: i64) -> anyhow::Result<()> {
        let tasks = task_db::list_dispatchable_tasks(&self.pool, limit).await?;
        for task in tasks {
            self.bank.push(task.priority, task.id);
        }
        Ok(())
    }

    /// Run one dispatch iteration: pop the next task, find a candidate, and
    /// attempt to assign it. Returns `None` if the bank is empty.
    pub async fn dispatch_once(&mut self) -> anyhow::Result<Option<DispatchOutcome>> {
        let Some((priority, task_id)) = self.bank.pop_next() else {
            return Ok(None);
        };

        let Some(task) = task_db::get_task(&self.pool, task_id).await? else {
            // Task vanished (e.g. cancelled+purged); drop it silently.
            return Ok(Some(DispatchOutcome::LostRace { task_id }));
        };

        if task.status != TaskStatus::Pending && task.status != TaskStatus::Queued {
            // Already claimed by a previous dispatch or externally moved.
            return Ok(Some(DispatchOutcome::LostRace { task_id }));
        }

        let candidates = candidate_instances(&self.pool, &task).await?;
        let Some(chosen) = pick_candidate(&candidates) else {
            self.bank.requeue(priority, task_id);
            tokio::time::sleep(self.config.empty_backoff).await;
            return Ok(Some(DispatchOutcome::NoCandidate { task_id }));
        };

        let rows = task_db::assign_task(&self.pool, task_id, chosen.instance_id, task.status).await?;
        if rows == 0 {
            // Lost the optimistic-lock race; let the next refill pick it up.
            return Ok(Some(DispatchOutcome::LostRace { task_id }));
        }

        agent_instances::set_instance_status(
            &self.pool,
            chosen.instance_id,
            AgentInstanceStatus::Running,
            Some(task_id),
        )
        .await?;

        let event = crate::events::task::assigned(task_id, &task.tenant_id, chosen.instance_id);
        if let Err(error) = crate::messaging::append_to_log(&self.pool, &event).await {
            tracing::warn!(task_id = %task_id, %error, "failed to append task.assigned event");
        }

        tracing::info!(
            task_id = %task_id,
            instance_id = %chosen.instance_id,
            priority = %task.priority,
            "task assigned"
        );

        Ok(Some(DispatchOutcome::Assigned { task_id, instance_id: chosen.instance_id }))
    }

    pub fn is_empty(&self) -> bool {
        self.bank.is_empty()
    }
}
