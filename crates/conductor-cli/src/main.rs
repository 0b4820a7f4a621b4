mod config;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use conductor_core::agent::{AgentRuntime, InMemoryStore};
use conductor_core::config::RuntimeConfig;
use conductor_core::llm::{CircuitBreaker, CompletionResponse, LlmProvider, MockProvider};
use conductor_core::router::{RouterConfig, RouterLoop};
use conductor_core::supervisor::{self, SupervisorConfig};
use conductor_core::tools::{ToolExecutor, ToolRegistry};
use conductor_db::models::{AgentInstanceStatus, TaskPriority, TaskStatus};
use conductor_db::queries::{agent_definitions, agent_instances, tasks as task_db, workflow_definitions, workflow_executions};
use conductor_db::pool;

use config::ConductorConfig;

#[derive(Parser)]
#[command(name = "conductor", about = "Distributed orchestrator for LLM-driven tasks and workflows")]
struct Cli {
    /// Database URL (overrides CONDUCTOR_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a conductor config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/conductor")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the conductor database (requires config file or env vars)
    DbInit,
    /// Run a worker process that hosts one agent instance
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Run the task router dispatch loop
    Router {
        #[command(subcommand)]
        command: RouterCommands,
    },
    /// Run the supervisor health-sweep loop
    Supervisor {
        #[command(subcommand)]
        command: SupervisorCommands,
    },
    /// Submit and inspect tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Register and run workflow definitions
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Register an agent instance and drive its execute-task loop until signalled
    Run {
        /// Name of the agent_definitions row this worker hosts
        #[arg(long)]
        agent: String,
        /// Identifier for this worker process (hostname, container id, ...)
        #[arg(long)]
        worker_id: String,
    },
}

#[derive(Subcommand)]
enum RouterCommands {
    /// Run the dispatch loop until signalled
    Run {
        /// Max tasks pulled into the in-memory priority bank per refill
        #[arg(long, default_value_t = 100)]
        batch_size: i64,
    },
}

#[derive(Subcommand)]
enum SupervisorCommands {
    /// Run the periodic heartbeat sweep until signalled
    Run,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Submit a new task
    Submit {
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// JSON input payload
        #[arg(long, default_value = "{}")]
        input: String,
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long, default_value_t = 300)]
        timeout_seconds: i64,
        #[arg(long, default_value_t = 3)]
        max_retries: i32,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Print task status counts for a tenant (or all tenants)
    Status {
        #[arg(long)]
        tenant_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Load a workflow definition's step tree from a JSON file
    Register {
        #[arg(long)]
        name: String,
        /// Path to a JSON file holding a `Vec<WorkflowStep>`
        #[arg(long)]
        steps_file: String,
        #[arg(long, default_value_t = 1)]
        version: i32,
    },
    /// Run the latest version of a registered workflow to completion
    Run {
        #[arg(long)]
        name: String,
        #[arg(long)]
        tenant_id: String,
        /// JSON input payload
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

/// Execute the `conductor init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection { url: db_url.to_string() },
        auth: config::AuthSection { token_secret: token_secret.clone() },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!();
    println!("Next: run `conductor db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `conductor db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = ConductorConfig::resolve(cli_db_url)?;

    println!("Initializing conductor database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let migrations_path = pool::default_migrations_path();
    pool::run_migrations(&db_pool, migrations_path).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    println!("conductor db-init complete.");
    Ok(())
}

/// First Ctrl+C cancels the loop gracefully; a second forces immediate exit.
fn install_shutdown_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });
    cancel
}

async fn cmd_worker_run(pool: PgPool, agent_name: String, worker_id: String) -> anyhow::Result<()> {
    let cancel = install_shutdown_handler();
    let runtime_config = RuntimeConfig::from_env();

    let definition = agent_definitions::get_agent_definition_by_name(&pool, &agent_name)
        .await?
        .with_context(|| format!("no agent definition named {agent_name:?}"))?;

    let instance = agent_instances::insert_agent_instance(&pool, definition.agent_id, &worker_id).await?;
    tracing::info!(instance_id = %instance.instance_id, agent = %agent_name, worker_id = %worker_id, "worker registered");

    // No concrete LLM provider ships in this crate; operators wire in a real
    // one before running this against live traffic. MockProvider keeps the
    // loop runnable for local smoke-testing. Every provider runs behind a
    // circuit breaker so a flaky backend doesn't take down the worker loop.
    let mock_provider = MockProvider::always(
        "placeholder",
        CompletionResponse {
            content: "no LLM provider configured for this worker".to_string(),
            tool_calls: vec![],
            input_tokens: 0,
            output_tokens: 0,
        },
    );
    let provider: Arc<dyn LlmProvider> = Arc::new(CircuitBreaker::new(
        Box::new(mock_provider),
        runtime_config.circuit_breaker_failure_threshold,
        runtime_config.circuit_breaker_cooldown,
    ));

    let executor = ToolExecutor::new(runtime_config.default_tool_timeout, 2, Duration::from_millis(500));
    let runtime = AgentRuntime::new(
        definition,
        provider,
        Arc::new(ToolRegistry::new()),
        executor,
        Arc::new(InMemoryStore::new()),
    );

    // Heartbeat at a third of the supervisor's timeout so a single missed
    // tick never flips this instance to ERROR.
    let heartbeat_interval = runtime_config.heartbeat_timeout / 3;
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    let mut poll = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = heartbeat.tick() => {
                if let Err(error) = supervisor::record_heartbeat(&pool, instance.instance_id).await {
                    tracing::warn!(%error, "failed to record heartbeat");
                }
            }
            _ = poll.tick() => {
                if let Err(error) = drive_one_task(&pool, &runtime, instance.instance_id).await {
                    tracing::error!(%error, "error while driving assigned task");
                }
            }
        }
    }

    tracing::info!(instance_id = %instance.instance_id, "worker stopping");
    agent_instances::set_instance_status(&pool, instance.instance_id, AgentInstanceStatus::Terminated, None)
        .await
        .ok();
    pool.close().await;
    Ok(())
}

/// If this instance currently has a task assigned, run it to completion and
/// report the outcome. A no-op when the instance is idle.
async fn drive_one_task(pool: &PgPool, runtime: &AgentRuntime, instance_id: Uuid) -> anyhow::Result<()> {
    let Some(instance) = agent_instances::get_agent_instance(pool, instance_id).await? else {
        return Ok(());
    };
    let Some(task_id) = instance.current_task_id else {
        return Ok(());
    };
    let Some(task) = task_db::get_task(pool, task_id).await? else {
        return Ok(());
    };

    let rows = task_db::transition_task_status(
        pool,
        task_id,
        TaskStatus::Assigned,
        TaskStatus::Running,
        Some(conductor_core::events::now()),
        None,
    )
    .await?;
    if rows == 0 {
        anyhow::bail!("task {task_id} was not in assigned state, another worker may have claimed it");
    }

    let (outcome, notices) = runtime.execute_task(instance_id, &task.description, &task.input_data).await;
    for notice in &notices {
        let event = match notice {
            conductor_core::agent::RuntimeNotice::LlmCall { model, tokens } => {
                conductor_core::events::agent::llm_call(instance_id, &task.tenant_id, model, *tokens)
            }
            conductor_core::agent::RuntimeNotice::ToolCall { name } => {
                conductor_core::events::agent::tool_call(instance_id, &task.tenant_id, name)
            }
            conductor_core::agent::RuntimeNotice::TextToolCallFallbackUsed { name } => {
                conductor_core::events::agent::thinking(
                    instance_id,
                    &task.tenant_id,
                    &format!("fell back to text tool-call parsing for {name}"),
                )
            }
        };
        if let Err(error) = conductor_core::messaging::append_to_log(pool, &event).await {
            tracing::warn!(task_id = %task_id, %error, "failed to append agent notice event");
        }
        tracing::debug!(?notice, task_id = %task_id, "runtime notice");
    }

    let status = if outcome.success { TaskStatus::Completed } else { TaskStatus::Failed };
    let rows =
        task_db::complete_task(pool, task_id, status, outcome.result.clone(), outcome.error.clone()).await?;
    if rows == 0 {
        anyhow::bail!("task {task_id} was not in running state when completing, cannot record outcome");
    }

    let event = if outcome.success {
        conductor_core::events::task::completed(
            task_id,
            &task.tenant_id,
            outcome.result.as_ref().unwrap_or(&serde_json::Value::Null),
        )
    } else {
        conductor_core::events::task::failed(
            task_id,
            &task.tenant_id,
            outcome.error.as_deref().unwrap_or("unknown error"),
        )
    };
    if let Err(error) = conductor_core::messaging::append_to_log(pool, &event).await {
        tracing::warn!(task_id = %task_id, %error, "failed to append task outcome event");
    }

    agent_instances::record_task_outcome(
        pool,
        instance_id,
        outcome.success,
        outcome.total_tokens,
        outcome.execution_time_ms,
    )
    .await?;
    agent_instances::set_instance_status(pool, instance_id, AgentInstanceStatus::Idle, None).await?;

    tracing::info!(task_id = %task_id, success = outcome.success, "task finished");
    Ok(())
}

async fn cmd_router_run(pool: PgPool, batch_size: i64) -> anyhow::Result<()> {
    let cancel = install_shutdown_handler();
    let mut router = RouterLoop::new(pool, RouterConfig::default());

    loop {
        if cancel.is_cancelled() {
            break;
        }
        router.refill(batch_size).await?;

        if router.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
            continue;
        }

        while !router.is_empty() {
            if cancel.is_cancelled() {
                break;
            }
            match router.dispatch_once().await? {
                Some(outcome) => tracing::debug!(?outcome, "dispatch"),
                None => break,
            }
        }
    }

    tracing::info!("router stopping");
    Ok(())
}

async fn cmd_supervisor_run(pool: PgPool) -> anyhow::Result<()> {
    let cancel = install_shutdown_handler();
    let runtime_config = RuntimeConfig::from_env();
    let config = SupervisorConfig {
        sweep_interval: runtime_config.supervisor_sweep_interval,
        heartbeat_timeout: runtime_config.heartbeat_timeout,
    };
    let mut interval = tokio::time::interval(config.sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match supervisor::sweep(&pool, &config).await {
                    Ok(unhealthy) if !unhealthy.is_empty() => {
                        tracing::info!(count = unhealthy.len(), "supervisor sweep found unhealthy instances");
                    }
                    Ok(_) => {}
                    Err(error) => tracing::error!(%error, "supervisor sweep failed"),
                }
            }
        }
    }

    tracing::info!("supervisor stopping");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_task_submit(
    pool: PgPool,
    tenant_id: String,
    name: String,
    description: String,
    input: String,
    capabilities: Vec<String>,
    priority: String,
    timeout_seconds: i64,
    max_retries: i32,
    idempotency_key: Option<String>,
) -> anyhow::Result<()> {
    let input_data: serde_json::Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
    let priority: TaskPriority = priority.parse().map_err(|e| anyhow::anyhow!("{e}"))?;

    let new_task = task_db::NewTask {
        tenant_id,
        name,
        description,
        input_data,
        required_capabilities: capabilities,
        priority,
        timeout_seconds,
        max_retries,
        idempotency_key,
    };

    let task = task_db::submit_task(&pool, &new_task).await?;

    let event = conductor_core::events::task::created(task.id, &task.tenant_id, &task.name);
    if let Err(error) = conductor_core::messaging::append_to_log(&pool, &event).await {
        tracing::warn!(task_id = %task.id, %error, "failed to append task creation event");
    }

    println!("submitted task {} ({})", task.id, task.name);
    Ok(())
}

async fn cmd_task_status(pool: PgPool, tenant_id: Option<String>) -> anyhow::Result<()> {
    let counts = task_db::get_status_counts(&pool, tenant_id.as_deref()).await?;
    println!("pending:   {}", counts.pending);
    println!("queued:    {}", counts.queued);
    println!("assigned:  {}", counts.assigned);
    println!("running:   {}", counts.running);
    println!("completed: {}", counts.completed);
    println!("failed:    {}", counts.failed);
    println!("cancelled: {}", counts.cancelled);
    println!("timeout:   {}", counts.timeout);
    Ok(())
}

/// Submits a rendered [`TaskTemplate`] as a real task row and polls for its
/// outcome, so the Workflow Engine can drive AGENT_TASK steps against the
/// same router/worker pipeline that handles a directly-submitted task.
struct DbTaskSubmitter {
    pool: PgPool,
    tenant_id: String,
    poll_interval: Duration,
}

impl DbTaskSubmitter {
    fn new(pool: PgPool, tenant_id: String) -> Self {
        Self { pool, tenant_id, poll_interval: Duration::from_millis(500) }
    }
}

#[async_trait::async_trait]
impl conductor_core::workflow::TaskSubmitter for DbTaskSubmitter {
    async fn submit_and_await(
        &self,
        template: &conductor_core::workflow::TaskTemplate,
        timeout: Duration,
    ) -> Result<serde_json::Value, String> {
        let new_task = task_db::NewTask {
            tenant_id: self.tenant_id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            input_data: template.input_data.clone(),
            required_capabilities: template.required_capabilities.clone(),
            priority: TaskPriority::Normal,
            timeout_seconds: timeout.as_secs().max(1) as i64,
            max_retries: 3,
            idempotency_key: None,
        };
        let task = task_db::submit_task(&self.pool, &new_task).await.map_err(|e| e.to_string())?;

        let event = conductor_core::events::task::created(task.id, &self.tenant_id, &task.name);
        if let Err(error) = conductor_core::messaging::append_to_log(&self.pool, &event).await {
            tracing::warn!(task_id = %task.id, %error, "failed to append workflow-submitted task creation event");
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = task_db::get_task(&self.pool, task.id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("task {} disappeared while awaiting its outcome", task.id))?;

            match current.status {
                TaskStatus::Completed => return Ok(current.result.unwrap_or(serde_json::Value::Null)),
                TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout => {
                    return Err(current
                        .error
                        .unwrap_or_else(|| format!("task {} ended in status {:?}", task.id, current.status)));
                }
                TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Assigned | TaskStatus::Running => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(format!("task {} did not complete within {timeout:?}", task.id));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Load a step tree from a JSON file and register it as a new workflow
/// definition version.
async fn cmd_workflow_register(pool: PgPool, name: String, steps_file: String, version: i32) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&steps_file)
        .with_context(|| format!("failed to read steps file {steps_file:?}"))?;
    let steps: Vec<conductor_core::workflow::WorkflowStep> =
        serde_json::from_str(&raw).context("steps file is not a valid workflow step list")?;
    conductor_core::workflow::validate_definition(&steps).map_err(|e| anyhow::anyhow!("{e}"))?;

    let steps_json = serde_json::to_value(&steps)?;
    let def = workflow_definitions::insert_workflow_definition(&pool, &name, version, &steps_json).await?;
    println!("registered workflow {} v{} ({})", def.name, def.version, def.workflow_id);
    Ok(())
}

/// Run the latest version of a registered workflow to completion, driving
/// each AGENT_TASK step through a [`DbTaskSubmitter`] and running saga
/// compensation if a step fails.
async fn cmd_workflow_run(pool: PgPool, name: String, tenant_id: String, input: String) -> anyhow::Result<()> {
    let input_data: serde_json::Value = serde_json::from_str(&input).context("--input is not valid JSON")?;

    let def = workflow_definitions::get_latest_workflow_definition(&pool, &name)
        .await?
        .with_context(|| format!("no workflow definition named {name:?}"))?;
    let steps: Vec<conductor_core::workflow::WorkflowStep> =
        serde_json::from_value(def.steps.clone()).context("stored workflow steps failed to deserialize")?;
    conductor_core::workflow::validate_definition(&steps).map_err(|e| anyhow::anyhow!("{e}"))?;

    let execution =
        workflow_executions::insert_workflow_execution(&pool, def.workflow_id, &tenant_id, &input_data).await?;

    let started = conductor_core::events::workflow::started(execution.execution_id, &tenant_id);
    if let Err(error) = conductor_core::messaging::append_to_log(&pool, &started).await {
        tracing::warn!(execution_id = %execution.execution_id, %error, "failed to append workflow started event");
    }
    workflow_executions::transition_execution_status(
        &pool,
        execution.execution_id,
        conductor_db::models::WorkflowExecutionStatus::Pending,
        conductor_db::models::WorkflowExecutionStatus::Running,
    )
    .await?;

    let submitter = Arc::new(DbTaskSubmitter::new(pool.clone(), tenant_id.clone()));
    let fabric = Arc::new(conductor_core::messaging::InProcessFabric::new());
    let engine = conductor_core::workflow::WorkflowEngine::new(submitter, fabric);
    let mut state =
        conductor_core::workflow::ExecutionState::new(execution.execution_id, tenant_id.clone(), input_data);

    match engine.run_to_completion(&steps, &mut state).await {
        Ok(()) => {
            let step_results = serde_json::Value::Object(state.step_results.clone());
            workflow_executions::advance_step(
                &pool,
                execution.execution_id,
                &serde_json::to_value(&state.completed_steps)?,
                &step_results,
                None,
            )
            .await?;
            workflow_executions::complete_execution(
                &pool,
                execution.execution_id,
                conductor_db::models::WorkflowExecutionStatus::Completed,
                Some(&step_results),
            )
            .await?;

            let event = conductor_core::events::workflow::completed(execution.execution_id, &tenant_id);
            if let Err(error) = conductor_core::messaging::append_to_log(&pool, &event).await {
                tracing::warn!(execution_id = %execution.execution_id, %error, "failed to append workflow completed event");
            }
            println!("workflow execution {} completed", execution.execution_id);
            Ok(())
        }
        Err((step_id, error)) => {
            workflow_executions::mark_step_failed(
                &pool,
                execution.execution_id,
                &step_id,
                &error,
                conductor_db::models::WorkflowExecutionStatus::Compensating,
            )
            .await?;

            for (compensated_step, result) in engine.compensate(&steps, &state).await {
                if let Err(compensation_error) = result {
                    tracing::warn!(step_id = %compensated_step, error = %compensation_error, "compensation step failed");
                }
            }

            workflow_executions::complete_execution(
                &pool,
                execution.execution_id,
                conductor_db::models::WorkflowExecutionStatus::Failed,
                None,
            )
            .await?;

            let event =
                conductor_core::events::workflow::failed(execution.execution_id, &tenant_id, &step_id, &error);
            if let Err(append_error) = conductor_core::messaging::append_to_log(&pool, &event).await {
                tracing::warn!(execution_id = %execution.execution_id, error = %append_error, "failed to append workflow failed event");
            }

            anyhow::bail!("workflow execution {} failed at step '{step_id}': {error}", execution.execution_id)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Process-administration commands are operator-only: if CONDUCTOR_AGENT_TOKEN
    // is set, the caller is an agent-scoped automation and must not be able to
    // bootstrap the database, launch worker/router/supervisor processes, or
    // register new workflow definitions.
    let operator_only = matches!(
        cli.command,
        Commands::Init { .. }
            | Commands::DbInit
            | Commands::Worker { .. }
            | Commands::Router { .. }
            | Commands::Supervisor { .. }
            | Commands::Workflow { command: WorkflowCommands::Register { .. } }
    );
    if operator_only {
        conductor_core::token::guard::require_operator_mode()
            .context("refusing to run an operator-only command")?;
    }

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Worker { command } => {
            let resolved = ConductorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            match command {
                WorkerCommands::Run { agent, worker_id } => {
                    cmd_worker_run(db_pool, agent, worker_id).await?;
                }
            }
        }
        Commands::Router { command } => {
            let resolved = ConductorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            match command {
                RouterCommands::Run { batch_size } => {
                    cmd_router_run(db_pool, batch_size).await?;
                }
            }
        }
        Commands::Supervisor { command } => {
            let resolved = ConductorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            match command {
                SupervisorCommands::Run => {
                    cmd_supervisor_run(db_pool).await?;
                }
            }
        }
        Commands::Workflow { command } => {
            let resolved = ConductorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            match command {
                WorkflowCommands::Register { name, steps_file, version } => {
                    let result = cmd_workflow_register(db_pool.clone(), name, steps_file, version).await;
                    db_pool.close().await;
                    result?;
                }
                WorkflowCommands::Run { name, tenant_id, input } => {
                    let result = cmd_workflow_run(db_pool.clone(), name, tenant_id, input).await;
                    db_pool.close().await;
                    result?;
                }
            }
        }
        Commands::Task { command } => {
            let resolved = ConductorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            match command {
                TaskCommands::Submit {
                    tenant_id,
                    name,
                    description,
                    input,
                    capabilities,
                    priority,
                    timeout_seconds,
                    max_retries,
                    idempotency_key,
                } => {
                    let result = cmd_task_submit(
                        db_pool.clone(),
                        tenant_id,
                        name,
                        description,
                        input,
                        capabilities,
                        priority,
                        timeout_seconds,
                        max_retries,
                        idempotency_key,
                    )
                    .await;
                    db_pool.close().await;
                    result?;
                }
                TaskCommands::Status { tenant_id } => {
                    let result = cmd_task_status(db_pool.clone(), tenant_id).await;
                    db_pool.close().await;
                    result?;
                }
            }
        }
    }

    Ok(())
}
