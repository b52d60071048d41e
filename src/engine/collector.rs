use crate::engine::context::{JobPhase, TopologyContext};
use crate::engine::error::Result;
use crate::engine::router::StreamRouter;
use crate::engine::tuple::{ExecutorId, Fields, Tuple, Value};
use parking_lot::RwLock;
use std::sync::Arc;

/// Emits an executor's output to every stream subscribed to it
pub struct OutputCollector {
    executor_id: ExecutorId,
    fields: Fields,
    routers: RwLock<Vec<Arc<StreamRouter>>>,
    context: Arc<TopologyContext>,
}

impl OutputCollector {
    pub fn new(executor_id: ExecutorId, fields: Fields, context: Arc<TopologyContext>) -> Self {
        Self {
            executor_id,
            fields,
            routers: RwLock::new(Vec::new()),
            context,
        }
    }

    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn context(&self) -> &Arc<TopologyContext> {
        &self.context
    }

    pub fn add_router(&self, router: Arc<StreamRouter>) {
        self.routers.write().push(router);
    }

    pub fn router_count(&self) -> usize {
        self.routers.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<StreamRouter>> {
        self.routers.read().clone()
    }

    /// Emits one tuple built from `values` against this executor's schema
    pub fn emit(&self, values: Vec<Value>) -> Result<()> {
        let tuple = Tuple::new(self.fields.clone(), values, self.executor_id.clone())?;
        for router in self.snapshot() {
            router.execute(&tuple)?;
        }
        Ok(())
    }

    /// Ends this executor's stream on every subscribed router
    pub fn emit_end_of_stream(&self) -> Result<()> {
        for router in self.snapshot() {
            router.execute_end_of_stream(&self.executor_id)?;
        }
        Ok(())
    }

    /// Emits a `(key, value)` pair and counts it as map or reduce output
    pub fn write(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        match self.context.phase() {
            JobPhase::Mapping => self.context.inc_map_outputs(),
            JobPhase::Reducing => self.context.inc_reduce_outputs(),
            _ => {}
        }
        self.emit(vec![Value::Str(key.into()), Value::Str(value.into())])
    }
}
