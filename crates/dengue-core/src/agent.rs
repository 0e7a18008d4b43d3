// Agent capability contract
//
// Every agent implements a single async `process` call returning an optional
// response message and a routing decision for the interpreter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::callbacks::StreamHandle;
use crate::error::Result;
use crate::message::Message;

/// Sentinel hint meaning "advance to the following step"
pub const NEXT_HINT: &str = "next";

/// Routing decision returned alongside an agent's response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Terminate the workflow (hint `null`)
    Stop,
    /// Advance sequentially (hint `"next"`)
    Next,
    /// Jump to the agent step with this ID
    Goto(String),
}

impl NextStep {
    pub fn from_hint(hint: Option<String>) -> Self {
        match hint {
            None => NextStep::Stop,
            Some(h) if h == NEXT_HINT => NextStep::Next,
            Some(h) => NextStep::Goto(h),
        }
    }

    /// Raw hint as it appears in trace records
    pub fn as_hint(&self) -> Option<&str> {
        match self {
            NextStep::Stop => None,
            NextStep::Next => Some(NEXT_HINT),
            NextStep::Goto(target) => Some(target),
        }
    }
}

/// Result of one `Agent::process` call
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub message: Option<Message>,
    pub next: NextStep,
}

impl AgentResponse {
    pub fn new(message: Option<Message>, next: NextStep) -> Self {
        Self { message, next }
    }

    /// Respond and advance
    pub fn next(message: Message) -> Self {
        Self::new(Some(message), NextStep::Next)
    }

    /// Respond and terminate the workflow
    pub fn stop(message: Message) -> Self {
        Self::new(Some(message), NextStep::Stop)
    }

    /// Respond and jump to another agent step
    pub fn goto(message: Message, target: impl Into<String>) -> Self {
        Self::new(Some(message), NextStep::Goto(target.into()))
    }
}

/// A unit of work in a workflow
///
/// Implementations must tolerate concurrent calls: the same cached instance is
/// shared by every run that references its ID.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    fn description(&self) -> &str {
        ""
    }

    /// Free-form role label, e.g. "safety" for compliance checkers
    fn agent_type(&self) -> &str {
        "generic"
    }

    /// Process a message. `stream` may be used any number of times for progress updates.
    async fn process(
        &self,
        message: Message,
        session_id: Option<&str>,
        stream: &StreamHandle,
    ) -> Result<AgentResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_conversion() {
        assert_eq!(NextStep::from_hint(None), NextStep::Stop);
        assert_eq!(NextStep::from_hint(Some("next".into())), NextStep::Next);
        assert_eq!(
            NextStep::from_hint(Some("writer".into())),
            NextStep::Goto("writer".into())
        );
        assert_eq!(NextStep::Goto("w".into()).as_hint(), Some("w"));
        assert_eq!(NextStep::Stop.as_hint(), None);
    }
}
