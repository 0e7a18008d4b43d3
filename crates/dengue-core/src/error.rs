// Error types for the workflow interpreter

use std::time::Duration;
use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Content returned to the user when a step fails. Never carries internal detail.
pub const STEP_FAILURE_MESSAGE: &str =
    "An error occurred while processing your request. Please try again later.";

/// Content returned when a run finishes without any agent producing text.
pub const NO_RESPONSE_MESSAGE: &str = "I apologize, but I couldn't generate a response.";

/// Errors that can occur while loading or executing workflows
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow ID is not known to the definition store
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A sub-workflow reference chain loops back on itself
    #[error("Cyclic workflow reference in '{workflow_id}': {}", chain.join(" -> "))]
    CyclicWorkflow {
        workflow_id: String,
        chain: Vec<String>,
    },

    /// Workflow document could not be interpreted
    #[error("Invalid workflow definition '{workflow_id}': {reason}")]
    InvalidDefinition { workflow_id: String, reason: String },

    /// Agent ID is not registered
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Agent is registered but could not be constructed
    #[error("Failed to instantiate agent {agent_id}: {reason}")]
    Resolution { agent_id: String, reason: String },

    /// Agent raised while processing a message
    #[error("Agent {agent_id} failed: {reason}")]
    AgentExecution { agent_id: String, reason: String },

    /// Agent did not answer within the configured step deadline
    #[error("Agent {agent_id} timed out after {timeout:?}")]
    StepTimeout { agent_id: String, timeout: Duration },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Create a workflow not found error
    pub fn not_found(workflow_id: impl Into<String>) -> Self {
        WorkflowError::WorkflowNotFound(workflow_id.into())
    }

    /// Create an invalid definition error
    pub fn invalid(workflow_id: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkflowError::InvalidDefinition {
            workflow_id: workflow_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(agent_id: impl Into<String>, reason: impl ToString) -> Self {
        WorkflowError::Resolution {
            agent_id: agent_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an agent execution error
    pub fn agent(agent_id: impl Into<String>, reason: impl ToString) -> Self {
        WorkflowError::AgentExecution {
            agent_id: agent_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        WorkflowError::Configuration(msg.into())
    }

    /// True for errors caused by workflow documents rather than by agents
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::WorkflowNotFound(_)
                | WorkflowError::CyclicWorkflow { .. }
                | WorkflowError::InvalidDefinition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_error_shows_chain() {
        let err = WorkflowError::CyclicWorkflow {
            workflow_id: "A".into(),
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic workflow reference in 'A': A -> B -> A"
        );
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_resolution_error_wraps_cause() {
        let err = WorkflowError::resolution("writer", "missing model");
        assert_eq!(
            err.to_string(),
            "Failed to instantiate agent writer: missing model"
        );
        assert!(!err.is_definition_error());
    }
}
