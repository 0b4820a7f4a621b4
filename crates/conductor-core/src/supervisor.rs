//! Supervisor: periodic health sweep over agent instances plus the
//! advisory scaling recommendation.
//!
//! Grounded on spec.md §4.1's explicit split: `_handle_unhealthy_agent` in
//! the original source only flips the agent to ERROR and logs ("the
//! orchestrator should handle task reassignment"); this crate keeps that
//! split but runs the reconciliation pass from the same sweep, since there
//! is no separate orchestrator process here, matching the teacher's
//! restart-recovery shape in `orchestrator::run_orchestrator`
//! (`reset_orphaned_tasks` then retry-or-escalate).

use chrono::Utc;
use conductor_db::models::{AgentInstance, AgentInstanceStatus, TaskStatus};
use conductor_db::queries::{agent_instances, tasks as task_db};
use sqlx::PgPool;
use std::time::Duration;

/// Tunables for the supervisor's health sweep.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub sweep_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { sweep_interval: Duration::from_secs(5), heartbeat_timeout: Duration::from_secs(30) }
    }
}

/// Advisory scaling recommendation, computed from instance counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingRecommendation {
    ScaleUp,
    ScaleDown,
    Stable,
}

impl std::fmt::Display for ScalingRecommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ScaleUp => "scale_up",
            Self::ScaleDown => "scale_down",
            Self::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// An instance the sweep found unhealthy, and what happened to its
/// in-flight task (if any).
#[derive(Debug, Clone)]
pub struct UnhealthyInstance {
    pub instance_id: uuid::Uuid,
    pub requeued_task_id: Option<uuid::Uuid>,
    pub task_retry_exhausted: bool,
}

/// Mark an instance ERROR and, if it had an in-flight task, either requeue
/// it (incrementing `retry_count`) or leave it failed if retries are
/// exhausted.
///
/// The instance's own status flip is unconditional; the task-side decision
/// is made independently per spec.md's split of responsibilities.
async fn handle_unhealthy_agent(pool: &PgPool, instance: &AgentInstance) -> anyhow::Result<UnhealthyInstance> {
    agent_instances::set_instance_status(pool, instance.instance_id, AgentInstanceStatus::Error, None).await?;
    tracing::warn!(instance_id = %instance.instance_id, "agent instance marked error after heartbeat timeout");

    let mut requeued_task_id = None;
    let mut task_retry_exhausted = false;

    let inflight = task_db::list_inflight_tasks_for_instance(pool, instance.instance_id).await?;
    for task in inflight {
        if task.retry_count < task.max_retries {
            let rows = task_db::retry_task(pool, task.id, task.retry_count).await?;
            if rows > 0 {
                requeued_task_id = Some(task.id);
                tracing::info!(task_id = %task.id, instance_id = %instance.instance_id, "requeued task from unhealthy instance");
            }
        } else {
            task_retry_exhausted = true;
            task_db::complete_task(
                pool,
                task.id,
                TaskStatus::Failed,
                None,
                Some("agent instance lost (heartbeat timeout) and retries exhausted".to_string()),
            )
            .await?;
            tracing::warn!(task_id = %task.id, instance_id = %instance.instance_id, "task failed permanently, retries exhausted");
        }
    }

    Ok(UnhealthyInstance { instance_id: instance.instance_id, requeued_task_id, task_retry_exhausted })
}

/// Run one sweep: find instances whose heartbeat is older than the
/// configured timeout and handle each.
pub async fn sweep(pool: &PgPool, config: &SupervisorConfig) -> anyhow::Result<Vec<UnhealthyInstance>> {
    let stale_before = Utc::now() - chrono::Duration::from_std(config.heartbeat_timeout)?;
    let stale = agent_instances::list_stale_instances(pool, stale_before).await?;

    let mut results = Vec::with_capacity(stale.len());
    for instance in &stale {
        results.push(handle_unhealthy_agent(pool, instance).await?);
    }
    Ok(results)
}

/// Update an instance's heartbeat timestamp. Called in response to a
/// heartbeat event arriving on the dedicated subject.
pub async fn record_heartbeat(pool: &PgPool, instance_id: uuid::Uuid) -> anyhow::Result<()> {
    agent_instances::touch_heartbeat(pool, instance_id).await?;
    Ok(())
}

/// Compute the advisory scaling recommendation for a definition's
/// instances: `utilization = running / total`; `scale_up` when
/// utilization > 0.8 and idle == 0; `scale_down` when utilization < 0.2 and
/// total > 1; otherwise `stable`.
pub fn scaling_recommendation(counts: &agent_instances::InstanceCounts) -> ScalingRecommendation {
    if counts.total == 0 {
        return ScalingRecommendation::Stable;
    }
    let utilization = counts.running as f64 / counts.total as f64;
    if utilization > 0.8 && counts.idle == 0 {
        ScalingRecommendation::ScaleUp
    } else if utilization < 0.2 && counts.total > 1 {
        ScalingRecommendation::ScaleDown
    } else {
        ScalingRecommendation::Stable
    }
}

/// Fetch instance counts for a definition and compute its recommendation.
pub async fn get_scaling_recommendation(
    pool: &PgPool,
    definition_id: uuid::Uuid,
) -> anyhow::Result<(agent_instances::InstanceCounts, ScalingRecommendation)> {
    let counts = agent_instances::count_instances(pool, definition_id).await?;
    let recommendation = scaling_recommendation(&counts);
    Ok((counts, recommendation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_db::queries::agent_instances::InstanceCounts;

    #[test]
    fn scale_up_when_saturated_and_no_idle() {
        let counts = InstanceCounts { total: 10, idle: 0, running: 9 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::ScaleUp);
    }

    #[test]
    fn scale_down_when_mostly_idle_with_more_than_one_instance() {
        let counts = InstanceCounts { total: 5, idle: 4, running: 0 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::ScaleDown);
    }

    #[test]
    fn stable_when_single_instance_even_if_idle() {
        let counts = InstanceCounts { total: 1, idle: 1, running: 0 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::Stable);
    }

    #[test]
    fn stable_in_the_middle_band() {
        let counts = InstanceCounts { total: 10, idle: 3, running: 5 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::Stable);
    }

    #[test]
    fn saturated_but_some_idle_is_not_scale_up() {
        let counts = InstanceCounts { total: 10, idle: 1, running: 9 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::Stable);
    }

    #[test]
    fn zero_total_is_stable() {
        let counts = InstanceCounts { total: 0, idle: 0, running: 0 };
        assert_eq!(scaling_recommendation(&counts), ScalingRecommendation::Stable);
    }
}
