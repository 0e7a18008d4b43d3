// Dengue RAG workflow interpreter
//
// This crate runs JSON-declared workflows of agents: it sequences agent calls,
// follows routing hints, runs bounded retry loops with fallback agents, threads a
// shared metadata bag between steps and returns a structured trace of each run.
//
// Key design decisions:
// - Uses traits (WorkflowStore, AgentResolver, SessionStore) for pluggable backends
// - Steps are a tagged enum; flattening removes sub-workflows and detects cycles
// - Agents are built by factories registered per kind, never by reflection
// - Callbacks are always async; sync closures are wrapped when registered
// - Step failures end the run with a generic message; definition errors return an error payload

pub mod agent;
pub mod agents;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod manager;
pub mod message;
pub mod metadata;
pub mod registry;
pub mod session;
pub mod step;
pub mod trace;
pub mod traits;
pub mod workflow_store;

// In-memory implementations for embedding and testing
pub mod memory;

// Re-exports for convenience
pub use agent::{Agent, AgentResponse, NextStep, NEXT_HINT};
pub use agents::{register_builtin_factories, EchoAgent, KeywordSafetyAgent, StaticResponseAgent};
pub use callbacks::{AgentLogRecord, Callbacks, StreamEvent, StreamHandle, WORKFLOW_MANAGER_ID};
pub use config::{WorkflowManagerConfig, DEFAULT_WORKFLOW_ID};
pub use error::{Result, WorkflowError, NO_RESPONSE_MESSAGE, STEP_FAILURE_MESSAGE};
pub use manager::{AgentStatus, Outcome, ProcessRequest, ProcessResult, WorkflowManager};
pub use message::{Message, MessageRole};
pub use metadata::Metadata;
pub use registry::{AgentDefinition, AgentFactory, AgentRegistry, AgentRegistryBuilder};
pub use session::{ChatSession, ANONYMOUS_USER};
pub use step::{FlatStep, LoopSpec, WorkflowDefinition, WorkflowStep};
pub use trace::{RunStatus, TraceEvent, TraceLog, TraceRecord};
pub use traits::{AgentResolver, SessionStore, WorkflowStore};
pub use workflow_store::{validate_workflow, JsonDirWorkflowStore};
