// Side-effect callbacks supplied by the transport layer
//
// Every callback is async. Synchronous closures are wrapped in a ready future when
// registered, so the interpreter always awaits and never inspects return types.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Agent ID used for interpreter-level stream events
pub const WORKFLOW_MANAGER_ID: &str = "workflow_manager";

/// Incremental update emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub agent_id: String,
    pub message_type: String,
    pub content: String,
    #[serde(default)]
    pub data: Value,
}

impl StreamEvent {
    pub fn new(
        agent_id: impl Into<String>,
        message_type: impl Into<String>,
        content: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            message_type: message_type.into(),
            content: content.into(),
            data,
        }
    }
}

/// Per-step record passed to the `log` callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLogRecord {
    pub agent_id: String,
    pub input_text: String,
    pub output_text: String,
    pub processing_time_ms: u64,
}

pub type VisualizationFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;
pub type LogFn = Arc<dyn Fn(AgentLogRecord) -> BoxFuture<'static, ()> + Send + Sync>;
pub type StreamFn = Arc<dyn Fn(StreamEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Optional callbacks for one `process_message` call
#[derive(Clone, Default)]
pub struct Callbacks {
    pub visualization: Option<VisualizationFn>,
    pub log: Option<LogFn>,
    pub stream: Option<StreamFn>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("visualization", &self.visualization.is_some())
            .field("log", &self.log.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_visualization<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.visualization = Some(Arc::new(move |agent_id: String| f(agent_id).boxed()));
        self
    }

    pub fn on_visualization_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.visualization = Some(Arc::new(move |agent_id: String| {
            f(agent_id);
            futures::future::ready(()).boxed()
        }));
        self
    }

    pub fn on_log<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AgentLogRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.log = Some(Arc::new(move |record: AgentLogRecord| f(record).boxed()));
        self
    }

    pub fn on_log_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(AgentLogRecord) + Send + Sync + 'static,
    {
        self.log = Some(Arc::new(move |record: AgentLogRecord| {
            f(record);
            futures::future::ready(()).boxed()
        }));
        self
    }

    pub fn on_stream<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stream = Some(Arc::new(move |event: StreamEvent| f(event).boxed()));
        self
    }

    pub fn on_stream_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.stream = Some(Arc::new(move |event: StreamEvent| {
            f(event);
            futures::future::ready(()).boxed()
        }));
        self
    }

    pub(crate) async fn visualize(&self, agent_id: &str) {
        if let Some(cb) = &self.visualization {
            cb(agent_id.to_string()).await;
        }
    }

    pub(crate) async fn log(&self, record: AgentLogRecord) {
        if let Some(cb) = &self.log {
            cb(record).await;
        }
    }

    /// Handle handed to agents for their own stream updates
    pub fn stream_handle(&self) -> StreamHandle {
        StreamHandle {
            inner: self.stream.clone(),
        }
    }
}

/// Cloneable access to the optional stream callback. Emitting without a callback is a no-op.
#[derive(Clone, Default)]
pub struct StreamHandle {
    inner: Option<StreamFn>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("attached", &self.inner.is_some())
            .finish()
    }
}

impl StreamHandle {
    /// Handle that drops every event
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn emit(
        &self,
        agent_id: &str,
        message_type: &str,
        content: impl Into<String>,
        data: Value,
    ) {
        if let Some(cb) = &self.inner {
            cb(StreamEvent::new(agent_id, message_type, content, data)).await;
        }
    }

    /// Emit an interpreter meta-event tagged with the workflow manager ID
    pub(crate) async fn emit_meta(&self, message_type: &str, content: &str, data: Value) {
        self.emit(WORKFLOW_MANAGER_ID, message_type, content, data)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_sync_and_async_callbacks_are_awaited_uniformly() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sync_seen = seen.clone();
        let async_seen = seen.clone();
        let callbacks = Callbacks::new()
            .on_visualization_sync(move |id| sync_seen.lock().unwrap().push(format!("viz:{id}")))
            .on_stream(move |event| {
                let seen = async_seen.clone();
                async move {
                    tokio::task::yield_now().await;
                    seen.lock()
                        .unwrap()
                        .push(format!("{}:{}", event.agent_id, event.message_type));
                }
            });

        callbacks.visualize("writer").await;
        callbacks
            .stream_handle()
            .emit("writer", "agent_update", "working", json!({}))
            .await;
        callbacks.log(AgentLogRecord {
            agent_id: "writer".into(),
            input_text: "in".into(),
            output_text: "out".into(),
            processing_time_ms: 1,
        })
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["viz:writer".to_string(), "writer:agent_update".to_string()]
        );
    }

    #[tokio::test]
    async fn test_detached_handle_is_noop() {
        let handle = StreamHandle::detached();
        assert!(!handle.is_attached());
        handle.emit("a", "b", "c", Value::Null).await;
    }
}
