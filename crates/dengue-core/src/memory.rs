// In-memory implementations for embedding and testing
//
// These implementations keep all data in memory, making them useful for:
// - Running workflows without a workflow directory
// - Unit and integration tests
// - Scripted agents that record every call they receive

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::agent::{Agent, AgentResponse, NextStep};
use crate::callbacks::{AgentLogRecord, Callbacks, StreamEvent, StreamHandle};
use crate::error::{Result, WorkflowError};
use crate::message::Message;
use crate::metadata::Metadata;
use crate::session::ChatSession;
use crate::step::{WorkflowDefinition, WorkflowStep};
use crate::traits::{SessionStore, WorkflowStore};

// ============================================================================
// InMemorySessionStore - Stores sessions in memory
// ============================================================================

/// In-memory session store keyed by session ID
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ChatSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all sessions
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, session_id: Option<&str>, user_id: &str) -> Result<ChatSession> {
        let session_id = session_id
            .map(String::from)
            .unwrap_or_else(ChatSession::generate_id);

        if let Some(session) = self.sessions.read().await.get(&session_id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.clone())
            .or_insert_with(|| ChatSession::new(session_id, user_id));
        Ok(session.clone())
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| {
            WorkflowError::Internal(anyhow::anyhow!("session {session_id} does not exist"))
        })?;
        session.add_message(message);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// InMemoryWorkflowStore - Workflow definitions in memory
// ============================================================================

/// In-memory workflow store
///
/// Keeps a "backing" copy and a served copy so `reload` can be exercised the same
/// way as with files: `stage` edits the backing copy, `reload` publishes it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWorkflowStore {
    backing: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
    served: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workflow, visible immediately
    pub async fn insert(&self, workflow_id: impl Into<String>, definition: WorkflowDefinition) {
        let workflow_id = workflow_id.into();
        self.backing
            .write()
            .await
            .insert(workflow_id.clone(), definition.clone());
        self.served.write().await.insert(workflow_id, definition);
    }

    /// Convenience for a workflow made only of agent steps
    pub async fn insert_sequence<I, S>(&self, workflow_id: impl Into<String>, agents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(workflow_id, WorkflowDefinition::sequence(agents))
            .await;
    }

    /// Edit the backing copy only; served after `reload`
    pub async fn stage(&self, workflow_id: impl Into<String>, definition: WorkflowDefinition) {
        self.backing
            .write()
            .await
            .insert(workflow_id.into(), definition);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>> {
        self.served
            .read()
            .await
            .get(workflow_id)
            .map(|d| d.steps.clone())
            .ok_or_else(|| WorkflowError::not_found(workflow_id))
    }

    async fn reload(&self, workflow_id: &str) -> Result<()> {
        let definition = self
            .backing
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(workflow_id))?;
        self.served
            .write()
            .await
            .insert(workflow_id.to_string(), definition);
        Ok(())
    }

    async fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.served.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// ScriptedAgent - Agent driven by a closure, recording every call
// ============================================================================

/// Shared, ordered record of which agents were invoked
pub type CallJournal = Arc<Mutex<Vec<String>>>;

pub fn call_journal() -> CallJournal {
    Arc::new(Mutex::new(Vec::new()))
}

type Responder = Arc<dyn Fn(&Message, usize) -> Result<AgentResponse> + Send + Sync>;

/// Test agent whose replies come from a closure
///
/// The closure receives the input message and the zero-based call number.
/// Inputs are recorded and can be inspected with `calls()`.
#[derive(Clone)]
pub struct ScriptedAgent {
    id: String,
    agent_type: String,
    responder: Responder,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<Message>>>,
    journal: Option<CallJournal>,
}

impl std::fmt::Debug for ScriptedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAgent")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .finish_non_exhaustive()
    }
}

impl ScriptedAgent {
    pub fn new<F>(id: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&Message, usize) -> Result<AgentResponse> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            agent_type: "generic".to_string(),
            responder: Arc::new(responder),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            journal: None,
        }
    }

    /// Always reply with the same content, metadata and routing decision
    pub fn replying(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
        next: NextStep,
    ) -> Self {
        let content = content.into();
        Self::new(id, move |_, _| {
            Ok(AgentResponse::new(
                Some(Message::assistant(content.clone()).with_metadata(metadata.clone())),
                next.clone(),
            ))
        })
    }

    /// Reply with content and advance
    pub fn advancing(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::replying(id, content, Metadata::new(), NextStep::Next)
    }

    /// Always fail with an execution error
    pub fn failing(id: impl Into<String>, reason: impl Into<String>) -> Self {
        let id = id.into();
        let reason = reason.into();
        let agent_id = id.clone();
        Self::new(id, move |_, _| Err(WorkflowError::agent(&agent_id, &reason)))
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Sleep before replying
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Inputs received so far
    pub fn calls(&self) -> Vec<Message> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn process(
        &self,
        message: Message,
        _session_id: Option<&str>,
        _stream: &StreamHandle,
    ) -> Result<AgentResponse> {
        let call_number = match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(message.clone());
                calls.len() - 1
            }
            Err(_) => 0,
        };
        if let Some(journal) = &self.journal {
            if let Ok(mut journal) = journal.lock() {
                journal.push(self.id.clone());
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&message, call_number)
    }
}

// ============================================================================
// RecordingCallbacks - Collects every callback invocation
// ============================================================================

/// Callback sink that records what the interpreter reported
#[derive(Debug, Default, Clone)]
pub struct RecordingCallbacks {
    visualized: Arc<Mutex<Vec<String>>>,
    logs: Arc<Mutex<Vec<AgentLogRecord>>>,
    stream: Arc<Mutex<Vec<StreamEvent>>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks wired to this recorder
    pub fn callbacks(&self) -> Callbacks {
        let visualized = self.visualized.clone();
        let logs = self.logs.clone();
        let stream = self.stream.clone();
        Callbacks::new()
            .on_visualization_sync(move |agent_id| {
                if let Ok(mut v) = visualized.lock() {
                    v.push(agent_id);
                }
            })
            .on_log_sync(move |record| {
                if let Ok(mut l) = logs.lock() {
                    l.push(record);
                }
            })
            .on_stream(move |event| {
                let stream = stream.clone();
                async move {
                    if let Ok(mut s) = stream.lock() {
                        s.push(event);
                    }
                }
            })
    }

    pub fn visualized(&self) -> Vec<String> {
        self.visualized.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<AgentLogRecord> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn stream_events(&self) -> Vec<StreamEvent> {
        self.stream.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_store_creates_once() {
        let store = InMemorySessionStore::new();
        let first = store.get_or_create(Some("s1"), "alice").await.unwrap();
        let again = store.get_or_create(Some("s1"), "bob").await.unwrap();
        assert_eq!(first.created_at, again.created_at);
        assert_eq!(again.user_id, "alice");

        let generated = store.get_or_create(None, "anonymous").await.unwrap();
        assert!(!generated.session_id.is_empty());
        assert_eq!(store.session_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let store = InMemorySessionStore::new();
        assert!(store
            .append_message("missing", Message::user("hi"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_staged_definition_is_served_after_reload() {
        let store = InMemoryWorkflowStore::new();
        store.insert_sequence("WF", ["a"]).await;
        store.stage("WF", WorkflowDefinition::sequence(["a", "b"])).await;

        assert_eq!(store.get_steps("WF").await.unwrap().len(), 1);
        store.reload("WF").await.unwrap();
        assert_eq!(store.get_steps("WF").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_agent_records_calls() {
        let journal = call_journal();
        let agent = ScriptedAgent::new("counter", |_, n| {
            Ok(AgentResponse::next(Message::assistant(format!("call {n}"))))
        })
        .with_journal(journal.clone());

        let stream = StreamHandle::detached();
        agent.process(Message::user("a"), None, &stream).await.unwrap();
        let second = agent.process(Message::user("b"), None, &stream).await.unwrap();

        assert_eq!(second.message.unwrap().content, "call 1");
        assert_eq!(agent.call_count(), 2);
        assert_eq!(agent.calls()[1].content, "b");
        assert_eq!(*journal.lock().unwrap(), vec!["counter", "counter"]);
    }
}
