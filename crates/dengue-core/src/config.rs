// Workflow manager configuration
//
// WorkflowManagerConfig can be:
// - Created directly with defaults and adjusted with `with_*` methods
// - Read from DENGUE_* environment variables via `from_env`

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, WorkflowError};
use crate::trace::DEFAULT_SUMMARY_CHARS;

pub const DEFAULT_WORKFLOW_ID: &str = "COMPLIANCE_SANDWICH_WORKFLOW";
pub const DEFAULT_SAFETY_AGENTS: [&str; 2] = ["injection_check_agent", "policy_check_agent"];
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for the workflow interpreter
#[derive(Debug, Clone)]
pub struct WorkflowManagerConfig {
    /// Workflow used when a request names none
    pub default_workflow_id: String,

    /// Agents whose stop hint or `blocked` flag ends the run early.
    /// Agents reporting `agent_type() == "safety"` are treated the same way.
    pub safety_agent_ids: Vec<String>,

    /// Deadline for a single agent call. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,

    /// Length of content summaries in traces and stream events
    pub summary_chars: usize,

    /// Pause inserted between two consecutive agents, keyed by `"from:to"`
    pub transition_delays: HashMap<String, Duration>,
}

impl Default for WorkflowManagerConfig {
    fn default() -> Self {
        Self {
            default_workflow_id: DEFAULT_WORKFLOW_ID.to_string(),
            safety_agent_ids: DEFAULT_SAFETY_AGENTS.iter().map(|s| s.to_string()).collect(),
            step_timeout: Some(DEFAULT_STEP_TIMEOUT),
            summary_chars: DEFAULT_SUMMARY_CHARS,
            transition_delays: HashMap::new(),
        }
    }
}

impl WorkflowManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the process environment
    ///
    /// - `DENGUE_DEFAULT_WORKFLOW`
    /// - `DENGUE_SAFETY_AGENTS` (comma separated)
    /// - `DENGUE_STEP_TIMEOUT_SECS` (0 disables the deadline)
    /// - `DENGUE_TRACE_SUMMARY_CHARS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(workflow_id) = lookup("DENGUE_DEFAULT_WORKFLOW") {
            config.default_workflow_id = workflow_id;
        }
        if let Some(agents) = lookup("DENGUE_SAFETY_AGENTS") {
            config.safety_agent_ids = agents
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(secs) = lookup("DENGUE_STEP_TIMEOUT_SECS") {
            let secs: u64 = parse_var("DENGUE_STEP_TIMEOUT_SECS", &secs)?;
            config.step_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(chars) = lookup("DENGUE_TRACE_SUMMARY_CHARS") {
            config.summary_chars = parse_var("DENGUE_TRACE_SUMMARY_CHARS", &chars)?;
        }

        Ok(config)
    }

    pub fn with_default_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.default_workflow_id = workflow_id.into();
        self
    }

    pub fn with_safety_agents<I, S>(mut self, agent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safety_agent_ids = agent_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_summary_chars(mut self, summary_chars: usize) -> Self {
        self.summary_chars = summary_chars;
        self
    }

    pub fn with_transition_delay(
        mut self,
        from_agent: &str,
        to_agent: &str,
        delay: Duration,
    ) -> Self {
        self.transition_delays
            .insert(format!("{from_agent}:{to_agent}"), delay);
        self
    }

    pub fn is_safety_agent(&self, agent_id: &str) -> bool {
        self.safety_agent_ids.iter().any(|id| id == agent_id)
    }

    pub fn transition_delay(&self, from_agent: &str, to_agent: &str) -> Option<Duration> {
        self.transition_delays
            .get(&format!("{from_agent}:{to_agent}"))
            .copied()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| WorkflowError::config(format!("{name} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkflowManagerConfig::default();
        assert_eq!(config.default_workflow_id, DEFAULT_WORKFLOW_ID);
        assert!(config.is_safety_agent("injection_check_agent"));
        assert!(config.is_safety_agent("policy_check_agent"));
        assert_eq!(config.step_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.summary_chars, 200);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = WorkflowManagerConfig::from_lookup(lookup(&[
            ("DENGUE_DEFAULT_WORKFLOW", "SIMPLE"),
            ("DENGUE_SAFETY_AGENTS", "guard, ,filter"),
            ("DENGUE_STEP_TIMEOUT_SECS", "0"),
            ("DENGUE_TRACE_SUMMARY_CHARS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.default_workflow_id, "SIMPLE");
        assert_eq!(config.safety_agent_ids, vec!["guard", "filter"]);
        assert_eq!(config.step_timeout, None);
        assert_eq!(config.summary_chars, 50);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = WorkflowManagerConfig::from_lookup(lookup(&[("DENGUE_STEP_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
    }

    #[test]
    fn test_transition_delay_lookup() {
        let config = WorkflowManagerConfig::new().with_transition_delay(
            "writer",
            "executor",
            Duration::from_millis(10),
        );
        assert_eq!(
            config.transition_delay("writer", "executor"),
            Some(Duration::from_millis(10))
        );
        assert_eq!(config.transition_delay("executor", "writer"), None);
    }
}
