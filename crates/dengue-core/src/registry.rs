// Agent registry
//
// Agent definitions (ID, display data, implementation kind, settings) come from a
// JSON registry file or are registered in code. Implementations are provided as
// factories keyed by kind and registered at startup. Instances are created on first
// use and cached for the lifetime of the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::{Result, WorkflowError};
use crate::traits::AgentResolver;

/// Kind recorded for agents registered as ready-made instances
pub const INSTANCE_KIND: &str = "instance";

/// Configuration of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Role label, e.g. "safety"
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// Factory key used to construct the agent
    pub kind: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Kind-specific settings passed to the factory
    #[serde(default)]
    pub settings: Value,
}

fn default_agent_type() -> String {
    "generic".to_string()
}

fn default_active() -> bool {
    true
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            agent_type: default_agent_type(),
            kind: kind.into(),
            active: true,
            capabilities: Vec::new(),
            settings: Value::Null,
        }
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(WorkflowError::config("agent definition is missing an id"));
        }
        if self.kind.trim().is_empty() {
            return Err(WorkflowError::config(format!(
                "agent definition '{}' is missing a kind",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    agents: Vec<AgentDefinition>,
}

/// Factory function type for creating agents from their definition
pub type AgentFactory = Box<dyn Fn(&AgentDefinition) -> Result<Arc<dyn Agent>> + Send + Sync>;

/// Registry of agent definitions, factories and cached instances
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
    definitions: RwLock<HashMap<String, AgentDefinition>>,
    /// Instances registered directly; survive `reload_from_file`
    pinned: RwLock<HashMap<String, Arc<dyn Agent>>>,
    /// Instances built from factories on first use
    cache: RwLock<HashMap<String, Arc<dyn Agent>>>,
    source: RwLock<Option<PathBuf>>,
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("AgentRegistry")
            .field("factories", &kinds)
            .finish_non_exhaustive()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AgentRegistry {
    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder::new()
    }

    /// Registered factory kinds, sorted
    pub fn factory_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Load definitions from a `{"agents": [...]}` file and remember it for reloads
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        let definitions = read_registry_file(&path).await?;
        let count = definitions.len();

        {
            let mut map = self.definitions.write().await;
            for definition in definitions {
                map.insert(definition.id.clone(), definition);
            }
        }
        *self.source.write().await = Some(path.clone());

        info!(path = %path.display(), count, "Agent definitions loaded");
        Ok(count)
    }

    /// Re-read the registry file, replacing file-based definitions and clearing the instance cache
    pub async fn reload_from_file(&self) -> Result<usize> {
        let Some(path) = self.source.read().await.clone() else {
            return Err(WorkflowError::config("agent registry was not loaded from a file"));
        };
        let definitions = read_registry_file(&path).await?;
        let count = definitions.len();

        {
            let mut map = self.definitions.write().await;
            map.retain(|_, d| d.kind == INSTANCE_KIND);
            for definition in definitions {
                map.insert(definition.id.clone(), definition);
            }
        }
        self.cache.write().await.clear();

        info!(path = %path.display(), count, "Agent registry reloaded");
        Ok(count)
    }

    /// Add or replace a definition. A cached instance for the same ID is dropped.
    pub async fn register_definition(&self, definition: AgentDefinition) -> Result<()> {
        definition.validate()?;
        let id = definition.id.clone();
        self.definitions.write().await.insert(id.clone(), definition);
        self.cache.write().await.remove(&id);
        debug!(agent_id = %id, "Agent definition registered");
        Ok(())
    }

    /// Register a ready-made agent instance under its own ID
    pub async fn register_instance(&self, agent: Arc<dyn Agent>) {
        let definition = AgentDefinition {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            description: agent.description().to_string(),
            agent_type: agent.agent_type().to_string(),
            kind: INSTANCE_KIND.to_string(),
            active: true,
            capabilities: Vec::new(),
            settings: Value::Null,
        };
        let id = definition.id.clone();
        self.definitions.write().await.insert(id.clone(), definition);
        self.pinned.write().await.insert(id, agent);
    }

    pub async fn definition(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.definitions.read().await.get(agent_id).cloned()
    }

    /// Definitions sorted by ID
    pub async fn list_agents(&self, active_only: bool) -> Vec<AgentDefinition> {
        let mut agents: Vec<AgentDefinition> = self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| !active_only || d.active)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Active agents declaring `capability`
    pub async fn agents_with_capability(&self, capability: &str) -> Vec<AgentDefinition> {
        self.list_agents(true)
            .await
            .into_iter()
            .filter(|d| d.capabilities.iter().any(|c| c == capability))
            .collect()
    }

    /// Enable or disable an agent. Inactive agents cannot be resolved.
    ///
    /// Disabling drops the cached instance, so re-enabling builds a fresh one.
    /// Pinned instances are kept and become resolvable again when re-enabled.
    pub async fn set_active(&self, agent_id: &str, active: bool) -> Result<()> {
        {
            let mut definitions = self.definitions.write().await;
            let definition = definitions
                .get_mut(agent_id)
                .ok_or_else(|| WorkflowError::AgentNotFound(agent_id.to_string()))?;
            definition.active = active;
        }
        if !active {
            self.cache.write().await.remove(agent_id);
        }
        info!(agent_id, active, "Agent activation changed");
        Ok(())
    }

    fn build(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>> {
        let factory = self.factories.get(&definition.kind).ok_or_else(|| {
            WorkflowError::resolution(
                &definition.id,
                format!("no factory registered for kind '{}'", definition.kind),
            )
        })?;
        factory(definition).map_err(|e| match e {
            WorkflowError::Resolution { .. } => e,
            other => WorkflowError::resolution(&definition.id, other),
        })
    }
}

async fn read_registry_file(path: &Path) -> Result<Vec<AgentDefinition>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let file: RegistryFile = serde_json::from_str(&raw)?;
    for definition in &file.agents {
        definition.validate()?;
    }
    Ok(file.agents)
}

#[async_trait]
impl AgentResolver for AgentRegistry {
    async fn get_or_create(&self, agent_id: &str) -> Result<Arc<dyn Agent>> {
        let definition = self
            .definition(agent_id)
            .await
            .ok_or_else(|| WorkflowError::AgentNotFound(agent_id.to_string()))?;
        if !definition.active {
            return Err(WorkflowError::resolution(agent_id, "agent is inactive"));
        }

        let pinned = self.pinned.read().await.get(agent_id).cloned();
        if let Some(agent) = pinned {
            return Ok(agent);
        }
        if let Some(agent) = self.cache.read().await.get(agent_id) {
            return Ok(agent.clone());
        }

        let mut cache = self.cache.write().await;
        // Another run may have built it while we waited for the lock
        if let Some(agent) = cache.get(agent_id) {
            return Ok(agent.clone());
        }
        let agent = self.build(&definition)?;
        cache.insert(agent_id.to_string(), agent.clone());
        info!(agent_id, kind = %definition.kind, "Agent instantiated");
        Ok(agent)
    }

    async fn instantiated(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents: Vec<Arc<dyn Agent>> = self.pinned.read().await.values().cloned().collect();
        agents.extend(self.cache.read().await.values().cloned());
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    async fn is_known(&self, agent_id: &str) -> bool {
        let Some(definition) = self.definition(agent_id).await else {
            return false;
        };
        definition.active
            && (self.factories.contains_key(&definition.kind)
                || self.pinned.read().await.contains_key(agent_id))
    }
}

/// Builder for AgentRegistry
#[derive(Default)]
pub struct AgentRegistryBuilder {
    factories: HashMap<String, AgentFactory>,
    definitions: HashMap<String, AgentDefinition>,
}

impl AgentRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an implementation kind
    pub fn factory<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&AgentDefinition) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    /// Add a definition. Invalid definitions are rejected at resolution time.
    pub fn definition(mut self, definition: AgentDefinition) -> Self {
        self.definitions.insert(definition.id.clone(), definition);
        self
    }

    pub fn build(self) -> AgentRegistry {
        AgentRegistry {
            factories: self.factories,
            definitions: RwLock::new(self.definitions),
            pinned: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            source: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::EchoAgent;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry(counter: Arc<AtomicUsize>) -> AgentRegistry {
        AgentRegistry::builder()
            .factory("echo", move |def| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(EchoAgent::new(&def.id)) as Arc<dyn Agent>)
            })
            .factory("broken", |_| Err(WorkflowError::config("missing model")))
            .definition(AgentDefinition::new("echo_agent", "echo").with_capabilities(["chat"]))
            .definition(AgentDefinition::new("broken_agent", "broken"))
            .definition(AgentDefinition::new("orphan_agent", "nonexistent"))
            .build()
    }

    #[tokio::test]
    async fn test_instances_are_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(counter.clone());

        let first = registry.get_or_create("echo_agent").await.unwrap();
        let second = registry.get_or_create("echo_agent").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.instantiated().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failures() {
        let registry = counting_registry(Arc::new(AtomicUsize::new(0)));

        let err = registry.get_or_create("broken_agent").await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "Failed to instantiate agent broken_agent: Configuration error: missing model"
        );

        let err = registry.get_or_create("orphan_agent").await.err().unwrap();
        assert!(matches!(err, WorkflowError::Resolution { .. }));

        let err = registry.get_or_create("ghost").await.err().unwrap();
        assert!(matches!(err, WorkflowError::AgentNotFound(_)));

        assert!(registry.is_known("echo_agent").await);
        assert!(!registry.is_known("orphan_agent").await);
        assert!(!registry.is_known("ghost").await);
    }

    #[tokio::test]
    async fn test_inactive_agents_are_not_resolved() {
        let registry = counting_registry(Arc::new(AtomicUsize::new(0)));
        registry.set_active("echo_agent", false).await.unwrap();

        assert!(registry.get_or_create("echo_agent").await.is_err());
        assert!(registry.agents_with_capability("chat").await.is_empty());
        assert_eq!(registry.list_agents(true).await.len(), 2);
        assert_eq!(registry.list_agents(false).await.len(), 3);
    }

    #[tokio::test]
    async fn test_deactivating_a_built_agent_stops_resolution() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(counter.clone());
        let first = registry.get_or_create("echo_agent").await.unwrap();

        registry.set_active("echo_agent", false).await.unwrap();
        let err = registry.get_or_create("echo_agent").await.err().unwrap();
        assert!(matches!(err, WorkflowError::Resolution { .. }));
        assert!(!registry.is_known("echo_agent").await);
        assert!(registry.instantiated().await.is_empty());

        registry.set_active("echo_agent", true).await.unwrap();
        let rebuilt = registry.get_or_create("echo_agent").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deactivating_a_pinned_instance_stops_resolution() {
        let registry = AgentRegistry::default();
        registry
            .register_instance(Arc::new(EchoAgent::new("pinned")))
            .await;
        assert!(registry.is_known("pinned").await);

        registry.set_active("pinned", false).await.unwrap();
        let err = registry.get_or_create("pinned").await.err().unwrap();
        assert!(matches!(err, WorkflowError::Resolution { .. }));
        assert!(!registry.is_known("pinned").await);

        registry.set_active("pinned", true).await.unwrap();
        assert!(registry.get_or_create("pinned").await.is_ok());
    }

    #[tokio::test]
    async fn test_load_and_reload_file_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let doc = json!({"agents": [
            {"id": "a", "name": "A", "kind": "echo", "capabilities": ["chat"]}
        ]});
        tokio::fs::write(&path, doc.to_string()).await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(counter.clone());
        registry
            .register_instance(Arc::new(EchoAgent::new("pinned")))
            .await;
        assert_eq!(registry.load_file(&path).await.unwrap(), 1);

        registry.get_or_create("a").await.unwrap();
        assert_eq!(registry.agents_with_capability("chat").await.len(), 2);

        registry.reload_from_file().await.unwrap();
        registry.get_or_create("a").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        // file-free definitions are dropped, pinned instances survive
        assert!(registry.definition("echo_agent").await.is_none());
        assert!(registry.get_or_create("pinned").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_definition_validates() {
        let registry = AgentRegistry::default();
        let err = registry
            .register_definition(AgentDefinition::new("", "echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
    }
}
