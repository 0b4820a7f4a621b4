//! Persistence layer for the conductor orchestrator: connection pooling,
//! migrations, and typed query functions over PostgreSQL.

pub mod config;
pub mod models;
pub mod pool;

pub mod queries {
    pub mod agent_definitions;
    pub mod agent_instances;
    pub mod events;
    pub mod tasks;
    pub mod workflow_definitions;
    pub mod workflow_executions;
}
