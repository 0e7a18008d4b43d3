// File-backed workflow definitions
//
// Every `<WORKFLOW_ID>.json` file in a directory is one workflow. Files are read
// once at startup and cached; `reload` re-reads a single file for live editing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};
use crate::step::{FlatStep, WorkflowDefinition, WorkflowStep};
use crate::traits::{AgentResolver, WorkflowStore};

/// Workflow store backed by a directory of JSON documents
#[derive(Debug)]
pub struct JsonDirWorkflowStore {
    dir: PathBuf,
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl JsonDirWorkflowStore {
    /// Load every `*.json` file in `dir`
    ///
    /// A malformed file fails the whole load so broken definitions are caught at startup.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut workflows = HashMap::new();

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(workflow_id) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping workflow file with non UTF-8 name");
                continue;
            };
            let definition = read_definition(&path, workflow_id).await?;
            debug!(workflow_id, steps = definition.steps.len(), "Loaded workflow");
            workflows.insert(workflow_id.to_string(), definition);
        }

        info!(dir = %dir.display(), count = workflows.len(), "Workflow definitions loaded");
        Ok(Self {
            dir,
            workflows: RwLock::new(workflows),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{workflow_id}.json"))
    }
}

async fn read_definition(path: &Path, workflow_id: &str) -> Result<WorkflowDefinition> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| WorkflowError::invalid(workflow_id, e.to_string()))
}

#[async_trait]
impl WorkflowStore for JsonDirWorkflowStore {
    async fn get_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .map(|d| d.steps.clone())
            .ok_or_else(|| WorkflowError::not_found(workflow_id))
    }

    async fn reload(&self, workflow_id: &str) -> Result<()> {
        let path = self.path_for(workflow_id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(WorkflowError::not_found(workflow_id));
        }
        let definition = read_definition(&path, workflow_id).await?;
        self.workflows
            .write()
            .await
            .insert(workflow_id.to_string(), definition);
        info!(workflow_id, "Workflow reloaded");
        Ok(())
    }

    async fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Check a workflow against the agents that can be resolved
///
/// Returns human-readable problems; an empty list means the workflow is runnable.
pub async fn validate_workflow(
    workflows: &dyn WorkflowStore,
    agents: &dyn AgentResolver,
    workflow_id: &str,
) -> Vec<String> {
    let steps = match workflows.flatten_steps(workflow_id).await {
        Ok(steps) => steps,
        Err(e) => return vec![e.to_string()],
    };

    let mut problems = Vec::new();
    if steps.is_empty() {
        problems.push("Workflow has no steps".to_string());
    }

    for (index, step) in steps.iter().enumerate() {
        match step {
            FlatStep::Agent(agent_id) => {
                if !agents.is_known(agent_id).await {
                    problems.push(format!("Step {index}: unknown agent '{agent_id}'"));
                }
            }
            FlatStep::Loop(spec) => {
                if spec.steps.is_empty() {
                    problems.push(format!("Step {index}: loop has no steps"));
                }
                if spec.max_iterations == 0 {
                    problems.push(format!("Step {index}: loop max_iterations must be at least 1"));
                }
                for agent_id in &spec.steps {
                    if !agents.is_known(agent_id).await {
                        problems.push(format!("Step {index}: unknown loop agent '{agent_id}'"));
                    }
                }
                if let Some(fallback) = &spec.fallback_agent {
                    if !agents.is_known(fallback).await {
                        problems.push(format!("Step {index}: unknown fallback agent '{fallback}'"));
                    }
                }
            }
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn write(dir: &Path, id: &str, doc: serde_json::Value) {
        tokio::fs::write(dir.join(format!("{id}.json")), doc.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_and_flatten_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MAIN", json!({"steps": ["a", {"sub_workflow": "SUB"}, "d"]})).await;
        write(dir.path(), "SUB", json!({"steps": ["b", "c"]})).await;
        tokio::fs::write(dir.path().join("notes.txt"), "ignored")
            .await
            .unwrap();

        let store = JsonDirWorkflowStore::load(dir.path()).await.unwrap();
        assert_eq!(store.workflow_ids().await, vec!["MAIN", "SUB"]);

        let flat = store.flatten_steps("MAIN").await.unwrap();
        let ids: Vec<_> = flat.iter().filter_map(FlatStep::agent_id).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_malformed_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "BAD", json!({"steps": [42]})).await;

        let err = JsonDirWorkflowStore::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition { .. }));
    }

    #[tokio::test]
    async fn test_step_with_sub_workflow_and_loop_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "AMBIGUOUS",
            json!({"steps": [{
                "sub_workflow": "SUB",
                "loop": {"condition_key": "retry", "condition_value": true, "steps": ["a"]}
            }]}),
        )
        .await;

        match JsonDirWorkflowStore::load(dir.path()).await.unwrap_err() {
            WorkflowError::InvalidDefinition {
                workflow_id,
                reason,
            } => {
                assert_eq!(workflow_id, "AMBIGUOUS");
                assert!(reason.contains("both 'sub_workflow' and 'loop'"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reload_replaces_cached_definition() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "WF", json!({"steps": ["a"]})).await;
        let store = JsonDirWorkflowStore::load(dir.path()).await.unwrap();

        write(dir.path(), "WF", json!({"steps": ["a", "b"]})).await;
        assert_eq!(store.get_steps("WF").await.unwrap().len(), 1);

        store.reload("WF").await.unwrap();
        assert_eq!(store.get_steps("WF").await.unwrap().len(), 2);

        let err = store.reload("MISSING").await.unwrap_err();
        assert!(matches!(err, WorkflowError::WorkflowNotFound(_)));
    }
}
