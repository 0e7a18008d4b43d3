// Core traits for pluggable backends
//
// These traits keep the interpreter independent of where workflows, sessions and
// agents come from:
// - In-memory implementations for embedding and testing
// - File-backed implementations for the worker binary

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::{Result, WorkflowError};
use crate::message::Message;
use crate::session::ChatSession;
use crate::step::{FlatStep, WorkflowStep};

// ============================================================================
// WorkflowStore - Workflow definitions by ID
// ============================================================================

/// Source of workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Raw steps of a workflow. Fails with `WorkflowNotFound` for unknown IDs.
    async fn get_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>>;

    /// Re-read one workflow from the backing store, replacing the cached copy
    async fn reload(&self, workflow_id: &str) -> Result<()>;

    /// IDs of all known workflows, sorted
    async fn workflow_ids(&self) -> Vec<String>;

    async fn contains(&self, workflow_id: &str) -> bool {
        self.get_steps(workflow_id).await.is_ok()
    }

    /// Steps with every sub-workflow reference inlined. Loops pass through untouched.
    ///
    /// Fails with `CyclicWorkflow` when a workflow references one of its own
    /// ancestors. Reusing the same sub-workflow twice side by side is allowed.
    async fn flatten_steps(&self, workflow_id: &str) -> Result<Vec<FlatStep>> {
        let mut flat = Vec::new();
        let mut stack = vec![(
            workflow_id.to_string(),
            self.get_steps(workflow_id).await?.into_iter(),
        )];

        while let Some((_, steps)) = stack.last_mut() {
            match steps.next() {
                None => {
                    stack.pop();
                }
                Some(WorkflowStep::Agent(agent_id)) => flat.push(FlatStep::Agent(agent_id)),
                Some(WorkflowStep::Loop { spec }) => flat.push(FlatStep::Loop(spec)),
                Some(WorkflowStep::SubWorkflow { sub_workflow }) => {
                    if stack.iter().any(|(id, _)| *id == sub_workflow) {
                        let mut chain: Vec<String> =
                            stack.iter().map(|(id, _)| id.clone()).collect();
                        chain.push(sub_workflow);
                        return Err(WorkflowError::CyclicWorkflow {
                            workflow_id: workflow_id.to_string(),
                            chain,
                        });
                    }
                    let steps = self.get_steps(&sub_workflow).await?;
                    stack.push((sub_workflow, steps.into_iter()));
                }
            }
        }

        Ok(flat)
    }
}

// ============================================================================
// SessionStore - Chat sessions
// ============================================================================

/// Storage for chat sessions
///
/// Must tolerate concurrent calls for the same session ID. History is append-only.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, creating it when missing. A missing ID gets a generated one.
    async fn get_or_create(&self, session_id: Option<&str>, user_id: &str) -> Result<ChatSession>;

    /// Append a message to a session's history and touch `updated_at`
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>>;

    async fn session_ids(&self) -> Vec<String>;
}

// ============================================================================
// AgentResolver - Agent instances by ID
// ============================================================================

/// Maps agent IDs to live, cached agent instances
#[async_trait]
pub trait AgentResolver: Send + Sync {
    /// Instantiate on first use, reuse thereafter. Fails with `Resolution` or `AgentNotFound`.
    async fn get_or_create(&self, agent_id: &str) -> Result<Arc<dyn Agent>>;

    /// Agents instantiated so far
    async fn instantiated(&self) -> Vec<Arc<dyn Agent>>;

    /// Whether the ID can be resolved without instantiating it
    async fn is_known(&self, agent_id: &str) -> bool;
}
