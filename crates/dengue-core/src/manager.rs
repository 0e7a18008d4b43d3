// Workflow interpreter
//
// WorkflowManager runs one user message through a workflow:
// - Flattens the workflow (sub-workflows inlined, loops kept)
// - Executes agent steps strictly in sequence, merging each response's metadata
// - Follows routing hints, stops early on safety blocks, runs bounded loops
// - Records a trace of every step and returns it with the final response
//
// Per-run state (accumulated metadata, trace, step index) lives in a `Run` value
// created for each call, so concurrent calls never share mutable state. The only
// shared state is the agent cache and the session store, both behind their own locks.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::agent::{Agent, NextStep};
use crate::callbacks::{AgentLogRecord, Callbacks, StreamHandle};
use crate::config::WorkflowManagerConfig;
use crate::error::{Result, WorkflowError, NO_RESPONSE_MESSAGE, STEP_FAILURE_MESSAGE};
use crate::memory::InMemorySessionStore;
use crate::message::Message;
use crate::metadata::{keys, Metadata};
use crate::session::{ChatSession, ANONYMOUS_USER};
use crate::step::{find_agent_step, FlatStep, LoopSpec};
use crate::trace::{RunStatus, TraceEvent, TraceLog, TraceRecord};
use crate::traits::{AgentResolver, SessionStore, WorkflowStore};

// ============================================================================
// Request / result types
// ============================================================================

/// Input of one `process_message` call
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub message_content: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub metadata: Metadata,
    pub callbacks: Callbacks,
    pub workflow_id: Option<String>,
}

impl ProcessRequest {
    pub fn new(message_content: impl Into<String>) -> Self {
        Self {
            message_content: message_content.into(),
            user_id: ANONYMOUS_USER.to_string(),
            session_id: None,
            metadata: Metadata::new(),
            callbacks: Callbacks::default(),
            workflow_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }
}

/// Either a response for the user or an explicit error payload.
/// Serialized as a `response` or an `error` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Response(String),
    Error(String),
}

/// Result of `process_message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub session_id: String,
    pub metadata: Metadata,
    pub trace_logs: Vec<TraceRecord>,
}

impl ProcessResult {
    pub fn response(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Response(content) => Some(content),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(message) => Some(message),
            Outcome::Response(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Trace records with the given event name, in order
    pub fn events(&self, name: &str) -> Vec<&TraceRecord> {
        self.trace_logs
            .iter()
            .filter(|r| r.event.name() == name)
            .collect()
    }
}

/// Status of an instantiated agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub agent_type: String,
}

// ============================================================================
// WorkflowManager
// ============================================================================

/// Entry point for running workflows
pub struct WorkflowManager {
    config: WorkflowManagerConfig,
    workflows: Arc<dyn WorkflowStore>,
    agents: Arc<dyn AgentResolver>,
    sessions: Arc<dyn SessionStore>,
}

impl WorkflowManager {
    /// Manager with an in-memory session table
    pub fn new(
        config: WorkflowManagerConfig,
        workflows: Arc<dyn WorkflowStore>,
        agents: Arc<dyn AgentResolver>,
    ) -> Self {
        Self {
            config,
            workflows,
            agents,
            sessions: Arc::new(InMemorySessionStore::new()),
        }
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn config(&self) -> &WorkflowManagerConfig {
        &self.config
    }

    /// Run a message through a workflow
    ///
    /// Never fails: step failures yield a generic response, everything else yields
    /// the error shape.
    #[instrument(skip(self, request), fields(session_id = request.session_id.as_deref().unwrap_or("")))]
    pub async fn process_message(&self, request: ProcessRequest) -> ProcessResult {
        let ProcessRequest {
            message_content,
            user_id,
            session_id,
            mut metadata,
            callbacks,
            workflow_id,
        } = request;

        // The key is routing input, not agent payload
        let from_metadata = metadata
            .remove(keys::WORKFLOW_ID)
            .and_then(|v| v.as_str().map(String::from));
        let workflow_id = workflow_id
            .or(from_metadata)
            .unwrap_or_else(|| self.config.default_workflow_id.clone());

        let session = match self
            .sessions
            .get_or_create(session_id.as_deref(), &user_id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to open session");
                let session_id = session_id.unwrap_or_else(ChatSession::generate_id);
                let mut trace = TraceLog::new(&session_id, &workflow_id);
                trace.push(TraceEvent::WorkflowEnd {
                    status: RunStatus::Error,
                    error: Some(e.to_string()),
                    final_metadata: metadata.clone(),
                    final_content_summary: None,
                });
                return ProcessResult {
                    outcome: Outcome::Error(format!("Workflow execution failed: {e}")),
                    session_id,
                    metadata,
                    trace_logs: trace.into_records(),
                };
            }
        };
        let session_id = session.session_id;

        let user_message = Message::user(message_content.clone()).with_metadata(metadata.clone());
        if let Err(e) = self.sessions.append_message(&session_id, user_message).await {
            warn!(session_id = %session_id, error = %e, "Failed to record user message");
        }

        let run = Run {
            manager: self,
            session_id: session_id.clone(),
            workflow_id: workflow_id.clone(),
            user_id,
            original_content: message_content,
            accumulated: metadata.clone(),
            final_content: None,
            trace: TraceLog::new(&session_id, &workflow_id)
                .with_summary_chars(self.config.summary_chars),
            callbacks: &callbacks,
            stream: callbacks.stream_handle(),
        };

        match AssertUnwindSafe(run.execute()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(workflow_id = %workflow_id, reason = %reason, "Workflow run panicked");
                let mut trace = TraceLog::new(&session_id, &workflow_id);
                trace.push(TraceEvent::WorkflowEnd {
                    status: RunStatus::Error,
                    error: Some(reason),
                    final_metadata: metadata.clone(),
                    final_content_summary: None,
                });
                ProcessResult {
                    outcome: Outcome::Error("Workflow execution failed: internal error".into()),
                    session_id,
                    metadata,
                    trace_logs: trace.into_records(),
                }
            }
        }
    }

    /// Send a message to one agent outside any workflow and return its text
    ///
    /// Failures are reported as text rather than errors.
    pub async fn process_direct_agent_message(
        &self,
        agent_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> String {
        let session_id = match self.sessions.get_or_create(session_id, ANONYMOUS_USER).await {
            Ok(session) => session.session_id,
            Err(e) => return format!("Error processing message with agent '{agent_id}': {e}"),
        };

        let agent = match self.agents.get_or_create(agent_id).await {
            Ok(agent) => agent,
            Err(WorkflowError::AgentNotFound(_)) => {
                return format!("Error: Agent '{agent_id}' not found")
            }
            Err(e) => {
                error!(agent_id, error = %e, "Direct agent message failed");
                return format!("Error processing message with agent '{agent_id}': {e}");
            }
        };

        let input = Message::user(message);
        match self
            .invoke(agent.as_ref(), input, &session_id, &StreamHandle::detached())
            .await
        {
            Ok(response) => match response.message {
                Some(reply) => reply.content,
                None => format!("Error: Agent '{agent_id}' did not produce a response"),
            },
            Err(e) => {
                error!(agent_id, error = %e, "Direct agent message failed");
                format!("Error processing message with agent '{agent_id}': {e}")
            }
        }
    }

    /// Status of every agent instantiated so far, keyed by ID
    pub async fn agent_status(&self) -> BTreeMap<String, AgentStatus> {
        self.agents
            .instantiated()
            .await
            .into_iter()
            .map(|agent| {
                let status = AgentStatus {
                    id: agent.id().to_string(),
                    name: agent.name().to_string(),
                    description: agent.description().to_string(),
                    agent_type: agent.agent_type().to_string(),
                };
                (status.id.clone(), status)
            })
            .collect()
    }

    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        self.workflows.reload(workflow_id).await
    }

    pub async fn flatten_steps(&self, workflow_id: &str) -> Result<Vec<FlatStep>> {
        self.workflows.flatten_steps(workflow_id).await
    }

    pub async fn workflow_ids(&self) -> Vec<String> {
        self.workflows.workflow_ids().await
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        self.sessions.get(session_id).await
    }

    fn is_safety_agent(&self, agent: &dyn Agent) -> bool {
        self.config.is_safety_agent(agent.id()) || agent.agent_type() == "safety"
    }

    /// Call an agent with the step deadline applied and panics contained
    async fn invoke(
        &self,
        agent: &dyn Agent,
        input: Message,
        session_id: &str,
        stream: &StreamHandle,
    ) -> Result<crate::agent::AgentResponse> {
        let call = AssertUnwindSafe(agent.process(input, Some(session_id), stream)).catch_unwind();
        let outcome = match self.config.step_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| WorkflowError::StepTimeout {
                    agent_id: agent.id().to_string(),
                    timeout,
                })?,
            None => call.await,
        };
        match outcome {
            Ok(result) => result,
            Err(panic) => Err(WorkflowError::agent(
                agent.id(),
                format!("panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Run - state of one process_message call
// ============================================================================

/// Where an agent call sits in the workflow
#[derive(Debug, Clone, Copy)]
struct StepContext {
    step_index: usize,
    loop_iteration: Option<usize>,
    /// Whether non-empty content from this call becomes the candidate final response
    sets_response: bool,
}

struct StepOutput {
    response: Option<Message>,
    next: NextStep,
    is_safety: bool,
}

struct Run<'a> {
    manager: &'a WorkflowManager,
    session_id: String,
    workflow_id: String,
    user_id: String,
    original_content: String,
    accumulated: Metadata,
    final_content: Option<String>,
    trace: TraceLog,
    callbacks: &'a Callbacks,
    stream: StreamHandle,
}

impl Run<'_> {
    async fn execute(mut self) -> ProcessResult {
        let started = Instant::now();

        let steps = match self
            .manager
            .workflows
            .flatten_steps(&self.workflow_id)
            .await
        {
            Ok(steps) => steps,
            Err(e) => return self.fail(e, started).await,
        };
        info!(workflow_id = %self.workflow_id, steps = steps.len(), "Executing workflow");

        self.trace.push(TraceEvent::WorkflowStart {
            user_id: self.user_id.clone(),
            input_content_summary: self.trace.summarize(&self.original_content),
            initial_metadata: self.accumulated.clone(),
            step_count: steps.len(),
        });
        self.stream
            .emit_meta(
                "workflow_update",
                "starting",
                json!({
                    "status": "starting",
                    "message": format!("Starting workflow {}", self.workflow_id),
                    "workflow_id": self.workflow_id,
                    "step_count": steps.len(),
                }),
            )
            .await;

        let failure = self.run_steps(&steps).await;
        self.finish(failure, started).await
    }

    /// Main loop. Returns the failed agent and its error if a step failed.
    async fn run_steps(&mut self, steps: &[FlatStep]) -> Option<(String, WorkflowError)> {
        let mut index = 0;

        while index < steps.len() {
            let agent_id = match &steps[index] {
                FlatStep::Loop(spec) => {
                    self.run_loop(index, spec).await;
                    index += 1;
                    continue;
                }
                FlatStep::Agent(agent_id) => agent_id,
            };

            // Every main-loop step sees the original user text; earlier results
            // arrive only through metadata.
            let input = Message::user(self.original_content.clone())
                .with_metadata(self.accumulated.clone());
            let ctx = StepContext {
                step_index: index,
                loop_iteration: None,
                sets_response: true,
            };

            let output = match self.execute_agent(ctx, agent_id, input).await {
                Ok(output) => output,
                Err(e) => {
                    error!(
                        workflow_id = %self.workflow_id,
                        agent_id = %agent_id,
                        step_index = index,
                        error = %e,
                        "Workflow step failed"
                    );
                    self.final_content = Some(STEP_FAILURE_MESSAGE.to_string());
                    return Some((agent_id.clone(), e));
                }
            };

            if output.is_safety
                && (output.next == NextStep::Stop || self.accumulated.is_truthy(keys::BLOCKED))
            {
                info!(agent_id = %agent_id, "Safety check stopped the workflow");
                break;
            }

            let next_index = match &output.next {
                NextStep::Goto(target) => match find_agent_step(steps, target) {
                    Some(target_index) => {
                        info!(agent_id = %agent_id, target = %target, target_index, "Agent routed");
                        target_index
                    }
                    None => {
                        warn!(agent_id = %agent_id, target = %target, "Routing target not found in workflow");
                        self.trace.push(TraceEvent::RouteUnresolved {
                            step_index: index,
                            agent_id: agent_id.clone(),
                            target: target.clone(),
                        });
                        index + 1
                    }
                },
                NextStep::Next | NextStep::Stop => index + 1,
            };

            if let Some(next_agent) = steps.get(next_index).and_then(FlatStep::agent_id) {
                if let Some(delay) = self.manager.config.transition_delay(agent_id, next_agent) {
                    tokio::time::sleep(delay).await;
                }
            }
            index = next_index;
        }

        None
    }

    /// Bounded loop. Failures inside end the current iteration, never the workflow.
    ///
    /// Unlike the main loop, content chains between sub-steps here: the first
    /// sub-step gets the original text (or the fallback's reply on later
    /// iterations) and each following sub-step gets the previous reply.
    async fn run_loop(&mut self, step_index: usize, spec: &LoopSpec) {
        info!(condition_key = %spec.condition_key, max_iterations = spec.max_iterations, "Entering loop");
        self.loop_update(step_index, spec, "starting", 0).await;

        let mut carried: Option<Message> = None;
        let mut iteration = 0;

        while iteration < spec.max_iterations {
            iteration += 1;
            let mut previous = carried.take();

            for agent_id in &spec.steps {
                let content = previous
                    .as_ref()
                    .map(|m| m.content.clone())
                    .unwrap_or_else(|| self.original_content.clone());
                let input = Message::user(content).with_metadata(self.accumulated.clone());
                let ctx = StepContext {
                    step_index,
                    loop_iteration: Some(iteration),
                    sets_response: true,
                };
                match self.execute_agent(ctx, agent_id, input).await {
                    Ok(output) => {
                        if output.response.is_some() {
                            previous = output.response;
                        }
                    }
                    Err(e) => {
                        error!(agent_id = %agent_id, iteration, error = %e, "Loop step failed");
                        break;
                    }
                }
            }

            let matched = self.accumulated.get(&spec.condition_key) == Some(&spec.condition_value);
            if !matched {
                self.loop_update(step_index, spec, "completed", iteration).await;
                return;
            }
            if iteration >= spec.max_iterations {
                info!(iterations = iteration, "Loop condition still matched, moving on");
                self.loop_update(step_index, spec, "exhausted", iteration).await;
                return;
            }

            self.loop_update(step_index, spec, "iterating", iteration).await;

            if let Some(fallback) = &spec.fallback_agent {
                match self.run_fallback(step_index, spec, fallback, iteration).await {
                    Ok(reply) => carried = reply,
                    Err(e) => {
                        error!(fallback_agent = %fallback, error = %e, "Fallback agent failed");
                        return;
                    }
                }
            }
        }
    }

    async fn run_fallback(
        &mut self,
        step_index: usize,
        spec: &LoopSpec,
        fallback: &str,
        iteration: usize,
    ) -> Result<Option<Message>> {
        self.trace.push(TraceEvent::FallbackUpdate {
            step_index,
            status: "starting".into(),
            fallback_agent: fallback.to_string(),
            iteration,
            fallback_message: spec.fallback_message.clone(),
        });
        self.stream
            .emit_meta(
                "fallback_update",
                "starting",
                json!({
                    "status": "starting",
                    "message": format!("Using fallback agent {fallback} to rewrite query"),
                    "fallback_agent": fallback,
                    "iteration": iteration,
                    "fallback_message": spec.fallback_message,
                }),
            )
            .await;

        let metadata = self
            .accumulated
            .clone()
            .with(keys::ORIGINAL_QUERY, self.original_content.clone())
            .with(keys::QUERY_REWRITE_ATTEMPTED, true)
            .with(keys::REWRITE_COUNT, iteration);
        let input = Message::user(spec.fallback_message.clone()).with_metadata(metadata);
        let ctx = StepContext {
            step_index,
            loop_iteration: Some(iteration),
            sets_response: false,
        };
        Ok(self.execute_agent(ctx, fallback, input).await?.response)
    }

    /// Resolve and run one agent, recording trace, callbacks and metadata
    async fn execute_agent(
        &mut self,
        ctx: StepContext,
        agent_id: &str,
        input: Message,
    ) -> Result<StepOutput> {
        let agent = self.manager.agents.get_or_create(agent_id).await?;
        self.callbacks.visualize(agent_id).await;

        self.trace.push(TraceEvent::StepStart {
            step_index: ctx.step_index,
            agent_id: agent_id.to_string(),
            input_content_summary: self.trace.summarize(&input.content),
            input_metadata: input.metadata.clone(),
            loop_iteration: ctx.loop_iteration,
        });
        self.stream
            .emit_meta(
                "step_update",
                "starting",
                json!({
                    "status": "starting",
                    "message": format!("Starting agent: {agent_id}"),
                    "step_index": ctx.step_index,
                    "step_id": agent_id,
                }),
            )
            .await;

        let input_text = input.content.clone();
        let started = Instant::now();
        let response = self
            .manager
            .invoke(agent.as_ref(), input, &self.session_id, &self.stream)
            .await?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let output_text = response
            .message
            .as_ref()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.callbacks
            .log(AgentLogRecord {
                agent_id: agent_id.to_string(),
                input_text,
                output_text: output_text.clone(),
                processing_time_ms,
            })
            .await;

        let output_metadata = response
            .message
            .as_ref()
            .map(|m| m.metadata.clone())
            .unwrap_or_default();
        self.accumulated.merge(&output_metadata);
        if ctx.sets_response && !output_text.is_empty() {
            self.final_content = Some(output_text.clone());
        }

        self.trace.push(TraceEvent::StepEnd {
            step_index: ctx.step_index,
            agent_id: agent_id.to_string(),
            processing_time_ms,
            output_content_summary: self.trace.summarize(&output_text),
            output_metadata,
            accumulated_metadata_after: self.accumulated.clone(),
            next_step_override: response.next.as_hint().map(String::from),
            loop_iteration: ctx.loop_iteration,
        });
        self.stream
            .emit_meta(
                "step_update",
                "completed",
                json!({
                    "status": "completed",
                    "message": format!("Completed agent: {agent_id}"),
                    "step_index": ctx.step_index,
                    "step_id": agent_id,
                    "processing_time_ms": processing_time_ms,
                    "result_summary": result_summary(agent_id, &self.accumulated),
                }),
            )
            .await;

        Ok(StepOutput {
            response: response.message,
            next: response.next,
            is_safety: self.manager.is_safety_agent(agent.as_ref()),
        })
    }

    async fn loop_update(&mut self, step_index: usize, spec: &LoopSpec, status: &str, iteration: usize) {
        self.trace.push(TraceEvent::LoopUpdate {
            step_index,
            status: status.to_string(),
            condition_key: spec.condition_key.clone(),
            condition_value: spec.condition_value.clone(),
            current_iteration: iteration,
            max_iterations: spec.max_iterations,
        });

        let message = match status {
            "starting" => format!(
                "Starting loop with condition {} = {}",
                spec.condition_key, spec.condition_value
            ),
            "iterating" => format!("Loop condition matched, starting iteration {}", iteration + 1),
            _ => format!("Loop finished after {iteration} iteration(s)"),
        };
        self.stream
            .emit_meta(
                "loop_update",
                status,
                json!({
                    "status": status,
                    "message": message,
                    "condition_key": spec.condition_key,
                    "current_iteration": iteration,
                    "max_iterations": spec.max_iterations,
                }),
            )
            .await;
    }

    /// Normal end of a run, including runs stopped by a failed step
    async fn finish(
        mut self,
        failure: Option<(String, WorkflowError)>,
        started: Instant,
    ) -> ProcessResult {
        let content = self
            .final_content
            .take()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NO_RESPONSE_MESSAGE.to_string());
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let (status, error_text) = match &failure {
            Some((_, e)) => (RunStatus::Error, Some(e.to_string())),
            None => (RunStatus::Success, None),
        };
        self.trace.push(TraceEvent::WorkflowEnd {
            status,
            error: error_text,
            final_metadata: self.accumulated.clone(),
            final_content_summary: Some(self.trace.summarize(&content)),
        });

        let stream_data = match &failure {
            Some((agent_id, _)) => json!({
                "status": "error",
                "message": format!("Workflow {} stopped at agent {agent_id}", self.workflow_id),
                "workflow_id": self.workflow_id,
                "failed_agent": agent_id,
                "processing_time_ms": processing_time_ms,
            }),
            None => json!({
                "status": "completed",
                "message": format!("Workflow {} completed successfully", self.workflow_id),
                "workflow_id": self.workflow_id,
                "processing_time_ms": processing_time_ms,
            }),
        };
        let stream_content = if failure.is_some() { "error" } else { "completed" };
        self.stream
            .emit_meta("workflow_update", stream_content, stream_data)
            .await;

        let final_message =
            Message::assistant(content.clone()).with_metadata(self.accumulated.clone());
        if let Err(e) = self
            .manager
            .sessions
            .append_message(&self.session_id, final_message)
            .await
        {
            warn!(session_id = %self.session_id, error = %e, "Failed to record final response");
        }

        info!(
            workflow_id = %self.workflow_id,
            status = ?status,
            processing_time_ms,
            "Workflow finished"
        );

        ProcessResult {
            outcome: Outcome::Response(content),
            session_id: self.session_id,
            metadata: self.accumulated,
            trace_logs: self.trace.into_records(),
        }
    }

    /// Run that could not start: the caller gets the error shape
    async fn fail(mut self, error: WorkflowError, started: Instant) -> ProcessResult {
        error!(
            workflow_id = %self.workflow_id,
            session_id = %self.session_id,
            error = %error,
            "Workflow terminated with error"
        );
        let message = error.to_string();

        self.trace.push(TraceEvent::WorkflowEnd {
            status: RunStatus::Error,
            error: Some(message.clone()),
            final_metadata: self.accumulated.clone(),
            final_content_summary: None,
        });
        self.stream
            .emit_meta(
                "workflow_update",
                "error",
                json!({
                    "status": "error",
                    "message": format!("Workflow {} encountered an error: {message}", self.workflow_id),
                    "workflow_id": self.workflow_id,
                    "error": message,
                    "processing_time_ms": started.elapsed().as_millis() as u64,
                }),
            )
            .await;

        ProcessResult {
            outcome: Outcome::Error(format!("Workflow execution failed: {message}")),
            session_id: self.session_id,
            metadata: self.accumulated,
            trace_logs: self.trace.into_records(),
        }
    }
}

/// Short human-readable summary of what a well-known agent produced
fn result_summary(agent_id: &str, metadata: &Metadata) -> String {
    let passed = || {
        metadata
            .get(keys::SAFETY_CHECK_PASSED)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    };
    let verdict = |ok: bool| if ok { "passed" } else { "failed" };

    match agent_id {
        "injection_check_agent" => format!("Safety check {}", verdict(passed())),
        "policy_check_agent" => format!("Policy check {}", verdict(passed())),
        "simple_query_writer_agent" => {
            let pattern = metadata.get_str(keys::PATTERN_NAME).unwrap_or("unknown");
            let mut summary = format!("Generated query using pattern: {pattern}");
            let countries: Vec<&str> = metadata
                .get(keys::EXTRACTED_COUNTRIES)
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if !countries.is_empty() {
                summary.push_str(&format!("\nCountries mentioned: {}", countries.join(", ")));
            }
            summary
        }
        "graph_query_executor_agent" => {
            let count = metadata
                .get(keys::RESULT_COUNT)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            format!("Query executed, found {count} results")
        }
        "graph_result_assessor_agent" => {
            let assessment = metadata.get_str(keys::ASSESSMENT).unwrap_or("unknown");
            format!("Results assessment: {assessment}")
        }
        _ => String::new(),
    }
}
