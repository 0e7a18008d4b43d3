// Workflow step types
//
// `WorkflowStep` mirrors the JSON document format: a plain string names an agent,
// `{"sub_workflow": ID}` splices another workflow, and `{"loop": {...}}` declares a
// bounded loop. Flattening turns the raw list into `FlatStep`s, which only hold
// agents and loops, so the interpreter matches exhaustively.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_MAX_ITERATIONS: usize = 3;
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Previous step returned no results.";

/// One element of a workflow document
///
/// An object step must carry exactly one of `sub_workflow` or `loop`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkflowStep {
    /// Run a single agent
    Agent(String),
    /// Inline another workflow's steps at flattening time
    SubWorkflow {
        sub_workflow: String,
    },
    /// Bounded loop, interpreted live during execution
    Loop {
        #[serde(rename = "loop")]
        spec: LoopSpec,
    },
}

impl WorkflowStep {
    pub fn agent(id: impl Into<String>) -> Self {
        WorkflowStep::Agent(id.into())
    }

    pub fn sub_workflow(id: impl Into<String>) -> Self {
        WorkflowStep::SubWorkflow {
            sub_workflow: id.into(),
        }
    }

    pub fn looped(spec: LoopSpec) -> Self {
        WorkflowStep::Loop { spec }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Agent(String),
    Directive {
        #[serde(default)]
        sub_workflow: Option<String>,
        #[serde(default, rename = "loop")]
        spec: Option<LoopSpec>,
    },
}

impl<'de> Deserialize<'de> for WorkflowStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawStep::deserialize(deserializer)? {
            RawStep::Agent(id) => Ok(WorkflowStep::Agent(id)),
            RawStep::Directive {
                sub_workflow: Some(sub_workflow),
                spec: None,
            } => Ok(WorkflowStep::SubWorkflow { sub_workflow }),
            RawStep::Directive {
                sub_workflow: None,
                spec: Some(spec),
            } => Ok(WorkflowStep::Loop { spec }),
            RawStep::Directive {
                sub_workflow: Some(_),
                spec: Some(_),
            } => Err(D::Error::custom(
                "step declares both 'sub_workflow' and 'loop'",
            )),
            RawStep::Directive { .. } => Err(D::Error::custom(
                "step object needs a 'sub_workflow' or 'loop' key",
            )),
        }
    }
}

/// Loop directive configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    pub condition_key: String,
    /// Value compared for equality against the metadata entry under `condition_key`
    #[serde(default)]
    pub condition_value: Value,
    pub steps: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_agent: Option<String>,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

impl LoopSpec {
    pub fn new(condition_key: impl Into<String>, condition_value: impl Into<Value>) -> Self {
        Self {
            condition_key: condition_key.into(),
            condition_value: condition_value.into(),
            steps: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fallback_agent: None,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_fallback(mut self, agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.fallback_agent = Some(agent_id.into());
        self.fallback_message = message.into();
        self
    }
}

/// A workflow document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    /// Definition made only of agent steps
    pub fn sequence<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(agents.into_iter().map(WorkflowStep::agent).collect())
    }
}

/// A step after sub-workflows have been inlined
#[derive(Debug, Clone, PartialEq)]
pub enum FlatStep {
    Agent(String),
    Loop(LoopSpec),
}

impl FlatStep {
    /// Agent ID if this is a plain agent step. Only these are valid routing targets.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            FlatStep::Agent(id) => Some(id),
            FlatStep::Loop(_) => None,
        }
    }
}

/// Index of the first plain agent step named `target`
pub fn find_agent_step(steps: &[FlatStep], target: &str) -> Option<usize> {
    steps.iter().position(|s| s.agent_id() == Some(target))
}
