use crate::engine::collector::OutputCollector;
use crate::engine::component::{Bolt, ComponentContext};
use crate::engine::config::{OUTPUT, STORAGE_DIRECTORY};
use crate::engine::context::TopologyContext;
use crate::engine::error::{Result, StormError};
use crate::engine::tuple::{Fields, Tuple};
use log::info;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Terminal bolt: records `(key, value)` results on the job context and
/// writes them to `<storageDirectory>/<output>/output.txt` when the stream ends
#[derive(Default)]
pub struct PrintBolt {
    results: Vec<(String, String)>,
    output_dir: Option<PathBuf>,
    context: Option<Arc<TopologyContext>>,
}

impl PrintBolt {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_output(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join("output.txt");
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        for (key, value) in &self.results {
            writeln!(writer, "({}, {})", key, value)?;
        }
        writer.flush()?;
        info!("Wrote {} results to {}", self.results.len(), path.display());
        Ok(())
    }
}

impl Bolt for PrintBolt {
    fn prepare(&mut self, ctx: &ComponentContext) -> Result<()> {
        let config = ctx.config();
        if let (Some(storage), Some(output)) = (config.get(STORAGE_DIRECTORY), config.get(OUTPUT)) {
            self.output_dir = Some(PathBuf::from(storage).join(output));
        }
        self.context = Some(Arc::clone(&ctx.context));
        Ok(())
    }

    fn execute(&mut self, tuple: &Tuple, _collector: &OutputCollector) -> Result<()> {
        let key = tuple.string_by_field("key")?;
        let value = tuple.string_by_field("value")?;
        info!("({}, {})", key, value);

        let context = self
            .context
            .as_ref()
            .ok_or_else(|| StormError::execution("print bolt used before prepare", None))?;
        context.record_result(key.clone(), value.clone());
        self.results.push((key, value));
        Ok(())
    }

    fn finish(&mut self, _collector: &OutputCollector) -> Result<()> {
        match &self.output_dir {
            Some(dir) => self.write_output(dir),
            None => Ok(()),
        }
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}
