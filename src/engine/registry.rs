use crate::engine::component::{Bolt, Spout};
use crate::engine::config::Config;
use crate::engine::error::{Result, StormError};
use crate::engine::functions::{Job, builtins};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a spout instance for a job's configuration
pub type SpoutFactory =
    Arc<dyn Fn(&Config, &ComponentRegistry) -> Result<Box<dyn Spout>> + Send + Sync>;

/// Builds a bolt instance for a job's configuration
pub type BoltFactory =
    Arc<dyn Fn(&Config, &ComponentRegistry) -> Result<Box<dyn Bolt>> + Send + Sync>;

/// Capability table mapping component ids to constructors.
///
/// Topologies name their spouts, bolts and MapReduce jobs by id; every worker
/// resolves those ids against its own registry.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    spouts: HashMap<String, SpoutFactory>,
    bolts: HashMap<String, BoltFactory>,
    jobs: HashMap<String, Arc<dyn Job>>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in spouts, bolts and jobs
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_all(&mut registry);
        registry
    }

    pub fn register_spout<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config, &ComponentRegistry) -> Result<Box<dyn Spout>> + Send + Sync + 'static,
    {
        self.spouts.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn register_bolt<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config, &ComponentRegistry) -> Result<Box<dyn Bolt>> + Send + Sync + 'static,
    {
        self.bolts.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn register_job(&mut self, id: impl Into<String>, job: Arc<dyn Job>) -> &mut Self {
        self.jobs.insert(id.into(), job);
        self
    }

    pub fn create_spout(&self, id: &str, config: &Config) -> Result<Box<dyn Spout>> {
        let factory = self
            .spouts
            .get(id)
            .ok_or_else(|| StormError::ComponentNotFound(format!("spout '{}'", id)))?;
        factory(config, self)
    }

    pub fn create_bolt(&self, id: &str, config: &Config) -> Result<Box<dyn Bolt>> {
        let factory = self
            .bolts
            .get(id)
            .ok_or_else(|| StormError::ComponentNotFound(format!("bolt '{}'", id)))?;
        factory(config, self)
    }

    pub fn job(&self, id: &str) -> Result<Arc<dyn Job>> {
        self.jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StormError::ComponentNotFound(format!("job '{}'", id)))
    }

    pub fn has_spout(&self, id: &str) -> bool {
        self.spouts.contains_key(id)
    }

    pub fn has_bolt(&self, id: &str) -> bool {
        self.bolts.contains_key(id)
    }
}
