use super::Job;
use crate::engine::collector::OutputCollector;
use crate::engine::component::{Bolt, ComponentContext};
use crate::engine::config::{Config, MAP_CLASS};
use crate::engine::context::{JobPhase, TopologyContext};
use crate::engine::error::{Result, StormError};
use crate::engine::registry::ComponentRegistry;
use crate::engine::tuple::{Fields, Tuple};
use log::debug;
use std::sync::Arc;

/// Runs the configured job's `map` on every `(key, value)` tuple
pub struct MapBolt {
    job: Arc<dyn Job>,
    context: Option<Arc<TopologyContext>>,
}

impl MapBolt {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self { job, context: None }
    }

    /// Resolves the job named by `mapClass`
    pub fn from_config(config: &Config, registry: &ComponentRegistry) -> Result<Self> {
        let id = config.require(MAP_CLASS)?;
        Ok(Self::new(registry.job(id)?))
    }
}

impl Bolt for MapBolt {
    fn prepare(&mut self, ctx: &ComponentContext) -> Result<()> {
        self.context = Some(Arc::clone(&ctx.context));
        Ok(())
    }

    fn execute(&mut self, tuple: &Tuple, collector: &OutputCollector) -> Result<()> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| StormError::execution("map bolt used before prepare", None))?;
        context.set_phase(JobPhase::Mapping);
        context.inc_map_inputs();

        let key = tuple.string_by_field("key")?;
        let value = tuple.string_by_field("value")?;
        debug!("map({}, {})", key, value);
        self.job.map(&key, &value, collector)
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}
