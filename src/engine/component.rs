//! User-facing component traits.
//!
//! A [`Spout`] produces tuples and a [`Bolt`] consumes them. The runtime wraps
//! each instance in an executor that owns the end-of-stream state machine, so
//! implementations only deal with data.

use crate::engine::collector::OutputCollector;
use crate::engine::config::Config;
use crate::engine::context::TopologyContext;
use crate::engine::error::Result;
use crate::engine::tuple::{Fields, Tuple};
use std::sync::Arc;

/// What a component learns about its place in the running job
#[derive(Clone)]
pub struct ComponentContext {
    /// Topology node this instance belongs to
    pub node: String,
    /// Position among this worker's executors for the node
    pub task_index: usize,
    /// Executors of the node on this worker
    pub parallelism: usize,
    pub context: Arc<TopologyContext>,
}

impl ComponentContext {
    pub fn config(&self) -> &Config {
        self.context.config()
    }

    pub fn job_id(&self) -> &str {
        self.context.job_id()
    }
}

/// Source of tuples
pub trait Spout: Send {
    fn open(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// Emits zero or more tuples. Returns false once the source is exhausted.
    fn next_tuple(&mut self, collector: &OutputCollector) -> Result<bool>;

    fn close(&mut self) {}

    /// Schema of emitted tuples
    fn output_fields(&self) -> Fields;
}

/// Tuple consumer, optionally emitting downstream
pub trait Bolt: Send {
    fn prepare(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, tuple: &Tuple, collector: &OutputCollector) -> Result<()>;

    /// Called once when every upstream executor has ended its stream.
    /// Buffered state is drained here; the runtime emits end-of-stream afterwards.
    fn finish(&mut self, _collector: &OutputCollector) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}

    fn output_fields(&self) -> Fields;
}
