use super::Job;
use crate::engine::collector::OutputCollector;
use crate::engine::component::{Bolt, ComponentContext};
use crate::engine::config::{Config, REDUCE_CLASS};
use crate::engine::context::{JobPhase, TopologyContext};
use crate::engine::error::{Result, StormError};
use crate::engine::registry::ComponentRegistry;
use crate::engine::tuple::{Fields, Tuple};
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Buffers values per key and runs the configured job's `reduce` once the
/// stream has ended. Keys are reduced in sorted order; values keep their
/// arrival order.
pub struct ReduceBolt {
    job: Arc<dyn Job>,
    buffer: BTreeMap<String, Vec<String>>,
    context: Option<Arc<TopologyContext>>,
}

impl ReduceBolt {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            buffer: BTreeMap::new(),
            context: None,
        }
    }

    pub fn from_config(config: &Config, registry: &ComponentRegistry) -> Result<Self> {
        let id = config.require(REDUCE_CLASS)?;
        Ok(Self::new(registry.job(id)?))
    }

    fn context(&self) -> Result<&Arc<TopologyContext>> {
        self.context
            .as_ref()
            .ok_or_else(|| StormError::execution("reduce bolt used before prepare", None))
    }
}

impl Bolt for ReduceBolt {
    fn prepare(&mut self, ctx: &ComponentContext) -> Result<()> {
        self.context = Some(Arc::clone(&ctx.context));
        Ok(())
    }

    fn execute(&mut self, tuple: &Tuple, _collector: &OutputCollector) -> Result<()> {
        let key = tuple.string_by_field("key")?;
        let value = tuple.string_by_field("value")?;
        self.buffer.entry(key).or_default().push(value);
        Ok(())
    }

    fn finish(&mut self, collector: &OutputCollector) -> Result<()> {
        let context = Arc::clone(self.context()?);
        context.set_phase(JobPhase::Reducing);
        info!(
            "Reducing {} keys for job {}",
            self.buffer.len(),
            context.job_id()
        );

        for (key, values) in std::mem::take(&mut self.buffer) {
            context.inc_reduce_inputs();
            self.job.reduce(&key, &values, collector)?;
        }
        Ok(())
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}
