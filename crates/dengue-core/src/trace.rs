// Execution trace records
//
// One TraceLog is built per run and returned to the caller. Records are appended in
// execution order and never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::Metadata;

/// Default length of content summaries in trace records and stream events
pub const DEFAULT_SUMMARY_CHARS: usize = 200;

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Event-specific part of a trace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    WorkflowStart {
        user_id: String,
        input_content_summary: String,
        initial_metadata: Metadata,
        step_count: usize,
    },
    StepStart {
        step_index: usize,
        agent_id: String,
        input_content_summary: String,
        input_metadata: Metadata,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loop_iteration: Option<usize>,
    },
    StepEnd {
        step_index: usize,
        agent_id: String,
        processing_time_ms: u64,
        output_content_summary: String,
        output_metadata: Metadata,
        accumulated_metadata_after: Metadata,
        next_step_override: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loop_iteration: Option<usize>,
    },
    /// An agent asked to jump to a step that is not a plain agent step of this workflow
    RouteUnresolved {
        step_index: usize,
        agent_id: String,
        target: String,
    },
    LoopUpdate {
        step_index: usize,
        status: String,
        condition_key: String,
        condition_value: Value,
        current_iteration: usize,
        max_iterations: usize,
    },
    FallbackUpdate {
        step_index: usize,
        status: String,
        fallback_agent: String,
        iteration: usize,
        fallback_message: String,
    },
    WorkflowEnd {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        final_metadata: Metadata,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_content_summary: Option<String>,
    },
}

impl TraceEvent {
    /// Event name as serialized in the `event` field
    pub fn name(&self) -> &'static str {
        match self {
            TraceEvent::WorkflowStart { .. } => "workflow_start",
            TraceEvent::StepStart { .. } => "step_start",
            TraceEvent::StepEnd { .. } => "step_end",
            TraceEvent::RouteUnresolved { .. } => "route_unresolved",
            TraceEvent::LoopUpdate { .. } => "loop_update",
            TraceEvent::FallbackUpdate { .. } => "fallback_update",
            TraceEvent::WorkflowEnd { .. } => "workflow_end",
        }
    }

    /// Agent the event refers to, if any
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            TraceEvent::StepStart { agent_id, .. }
            | TraceEvent::StepEnd { agent_id, .. }
            | TraceEvent::RouteUnresolved { agent_id, .. } => Some(agent_id),
            TraceEvent::FallbackUpdate { fallback_agent, .. } => Some(fallback_agent),
            _ => None,
        }
    }
}

/// A single structured trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub session_id: String,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Append-only trace for one run
#[derive(Debug, Clone)]
pub struct TraceLog {
    session_id: String,
    workflow_id: String,
    summary_chars: usize,
    records: Vec<TraceRecord>,
}

impl TraceLog {
    pub fn new(session_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_id: workflow_id.into(),
            summary_chars: DEFAULT_SUMMARY_CHARS,
            records: Vec::new(),
        }
    }

    pub fn with_summary_chars(mut self, summary_chars: usize) -> Self {
        self.summary_chars = summary_chars;
        self
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.records.push(TraceRecord {
            session_id: self.session_id.clone(),
            workflow_id: self.workflow_id.clone(),
            timestamp: Utc::now(),
            event,
        });
    }

    /// Truncate content to the configured summary length
    pub fn summarize(&self, content: &str) -> String {
        truncate(content, self.summary_chars)
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }
}

/// First `max_chars` characters of `content`, followed by "..." when cut
pub fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly", 7), "exactly");
        assert_eq!(truncate("abcdefgh", 3), "abc...");
        assert_eq!(truncate("déngue", 2), "dé...");
    }

    #[test]
    fn test_record_serializes_flat_with_event_tag() {
        let mut log = TraceLog::new("s1", "WF");
        log.push(TraceEvent::WorkflowEnd {
            status: RunStatus::Error,
            error: Some("Workflow not found: WF".into()),
            final_metadata: Metadata::new(),
            final_content_summary: None,
        });

        let value = serde_json::to_value(&log.records()[0]).unwrap();
        assert_eq!(value["event"], json!("workflow_end"));
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["session_id"], json!("s1"));
        assert_eq!(value["workflow_id"], json!("WF"));
        assert!(value.get("final_content_summary").is_none());
    }

    #[test]
    fn test_step_end_keeps_null_hint() {
        let mut log = TraceLog::new("s", "W").with_summary_chars(4);
        let summary = log.summarize("blocked request");
        log.push(TraceEvent::StepEnd {
            step_index: 0,
            agent_id: "safety".into(),
            processing_time_ms: 3,
            output_content_summary: summary,
            output_metadata: Metadata::new(),
            accumulated_metadata_after: Metadata::new(),
            next_step_override: None,
            loop_iteration: None,
        });

        let record = &log.records()[0];
        assert_eq!(record.event.name(), "step_end");
        assert_eq!(record.event.agent_id(), Some("safety"));

        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["next_step_override"], Value::Null);
        assert_eq!(value["output_content_summary"], json!("bloc..."));
    }
}
