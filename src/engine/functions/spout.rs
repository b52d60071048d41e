use crate::engine::collector::OutputCollector;
use crate::engine::component::{ComponentContext, Spout};
use crate::engine::config::{Config, INPUT, INPUT_FILE, STORAGE_DIRECTORY, WORKER_INDEX};
use crate::engine::error::{Result, StormError};
use crate::engine::tuple::{Fields, Value};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Emits `(lineNumber, line)` for every line of this worker's input shard.
///
/// The shard is `inputFile` when set, otherwise the file in
/// `<storageDirectory>/<input>` whose name ends in `.<workerIndex>`. Several
/// executors of the spout on one worker split the shard by line number.
pub struct FileSpout {
    input_file: Option<String>,
    lines: Option<Lines<BufReader<File>>>,
    line_number: usize,
    task_index: usize,
    parallelism: usize,
}

impl FileSpout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_file: config.get(INPUT_FILE).map(str::to_string),
            lines: None,
            line_number: 0,
            task_index: 0,
            parallelism: 1,
        }
    }

    fn resolve(&self, config: &Config) -> Result<PathBuf> {
        let storage = config.get(STORAGE_DIRECTORY).map(PathBuf::from);

        if let Some(file) = &self.input_file {
            let path = PathBuf::from(file);
            return Ok(match storage {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            });
        }

        let dir = match (storage, config.get(INPUT)) {
            (Some(storage), Some(input)) => storage.join(input),
            (Some(storage), None) => storage,
            (None, Some(input)) => PathBuf::from(input),
            (None, None) => {
                return Err(StormError::config(
                    "file spout needs inputFile or storageDirectory/input",
                ));
            }
        };
        let index = config.require(WORKER_INDEX)?;
        find_shard(&dir, index)
    }
}

fn find_shard(dir: &Path, worker_index: &str) -> Result<PathBuf> {
    let suffix = format!(".{}", worker_index);
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.to_string_lossy().ends_with(&suffix))
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        StormError::Io(format!(
            "no input shard ending in '{}' under {}",
            suffix,
            dir.display()
        ))
    })
}

impl Spout for FileSpout {
    fn open(&mut self, ctx: &ComponentContext) -> Result<()> {
        let path = self.resolve(ctx.config())?;
        info!(
            "Spout {} [{}/{}] reading {}",
            ctx.node,
            ctx.task_index,
            ctx.parallelism,
            path.display()
        );
        self.lines = Some(BufReader::new(File::open(&path)?).lines());
        self.task_index = ctx.task_index;
        self.parallelism = ctx.parallelism.max(1);
        Ok(())
    }

    fn next_tuple(&mut self, collector: &OutputCollector) -> Result<bool> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(false);
        };

        loop {
            let Some(line) = lines.next() else {
                debug!("Spout finished after {} lines", self.line_number);
                return Ok(false);
            };
            let line = line?;
            let number = self.line_number;
            self.line_number += 1;

            if number % self.parallelism == self.task_index {
                collector.emit(vec![Value::Str(number.to_string()), Value::Str(line)])?;
                return Ok(true);
            }
        }
    }

    fn close(&mut self) {
        self.lines = None;
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}
