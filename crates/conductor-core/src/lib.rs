//! Core runtime for the conductor orchestrator: the task router, the
//! supervisor health sweep, the agent execution loop, the tool registry,
//! the LLM provider contract, the messaging fabric, the domain event
//! model, and the workflow engine.

pub mod agent;
pub mod config;
pub mod events;
pub mod llm;
pub mod messaging;
pub mod router;
pub mod supervisor;
pub mod token;
pub mod tools;
pub mod workflow;
