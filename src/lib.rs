/*!
# StormLite-rs

A small Storm-like dataflow runtime: spouts and bolts arranged in a topology,
instantiated on every worker process, with tuples routed between executors
by grouping and completion coordinated by end-of-stream consensus.

## Overview

A job is a [`Topology`] plus a flat [`Config`]. The master ships both to every
worker; each worker's [`Cluster`] creates the same executors, wires one
[`StreamRouter`] per bolt, and runs spout steps on a fixed thread pool.
Tuples for executors on the same worker are delivered by direct call, tuples
for other workers are pushed over HTTP.

A bolt finishes once it has received end-of-stream from every upstream
executor on every worker. It then drains its buffered state and sends a
single end-of-stream of its own downstream.

## Key Components

* **TopologyBuilder**: declares spouts, bolts and the grouping of each stream
* **Cluster**: per-process runtime that instantiates and runs topologies
* **StreamRouter**: routes a stream by fields, broadcast or shuffle grouping
* **ConsensusTracker**: counts distinct end-of-stream votes
* **ComponentRegistry**: maps component ids in a topology to constructors
* **Worker** / **Master**: the HTTP processes of a distributed deployment

## Built-in Components

* **file** spout: emits `(lineNumber, line)` from this worker's input shard
* **map** / **reduce** bolts: run a MapReduce [`Job`] named in the config
* **print** bolt: records results and writes `output.txt`
* **word_count** and **sum_by_key** jobs

## Usage Example

```rust,no_run
use stormlite_rs::{Cluster, ComponentRegistry, Config, RuntimeConfig, TopologyBuilder};
use std::time::Duration;

fn main() -> stormlite_rs::Result<()> {
    let mut builder = TopologyBuilder::new();
    builder.set_spout("SPOUT", "file", 1);
    builder.set_bolt("MAP", "map", 2).shuffle_grouping("SPOUT");
    builder.set_bolt("REDUCE", "reduce", 2).fields_grouping("MAP", ["key"]);
    builder.set_bolt("PRINT", "print", 1).first_grouping("REDUCE");
    let topology = builder.create_topology()?;

    let config = Config::new()
        .with("workerList", "[127.0.0.1:8001]")
        .with("workerIndex", "0")
        .with("inputFile", "words.txt")
        .with("mapClass", "word_count")
        .with("reduceClass", "word_count");

    let cluster = Cluster::with_http(ComponentRegistry::with_builtins(), RuntimeConfig::default())?;
    cluster.submit_topology("wordcount", config, topology)?;
    cluster.start_job("wordcount")?;
    cluster.await_completion("wordcount", Duration::from_secs(60))?;

    for (word, count) in cluster.context("wordcount").map(|c| c.results()).unwrap_or_default() {
        println!("{word}: {count}");
    }
    cluster.shutdown();
    Ok(())
}
```

## Extending with Custom Components

```rust,no_run
use stormlite_rs::{Bolt, ComponentRegistry, Fields, OutputCollector, Result, Tuple};

struct Uppercase;

impl Bolt for Uppercase {
    fn execute(&mut self, tuple: &Tuple, collector: &OutputCollector) -> Result<()> {
        let key = tuple.string_by_field("key")?;
        let value = tuple.string_by_field("value")?;
        collector.write(key, value.to_uppercase())
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}

let mut registry = ComponentRegistry::with_builtins();
registry.register_bolt("uppercase", |_, _| Ok(Box::new(Uppercase)));
```
*/

pub mod engine;
pub mod server;

// Re-export all public APIs for easier access
pub use engine::error::{ErrorInfo, Result, StormError};
pub use engine::{
    Bolt, Cluster, ComponentContext, ComponentRegistry, Config, ExecutorId, Fields, Grouping, Job,
    JobPhase, OutputCollector, RemoteTransport, RuntimeConfig, Spout, StreamRouter, Topology,
    TopologyBuilder, TopologyContext, Tuple, Value, WorkerJob,
};
pub use server::{Master, Worker, WorkerStatus};
