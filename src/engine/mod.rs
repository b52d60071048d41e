/*!
# Engine Module

The runtime that executes topologies on one worker process.

## Architecture

* **Topology** ([`topology`]): the declared graph of spouts and bolts, built
  with [`TopologyBuilder`] and shipped verbatim to every worker
* **Cluster** ([`cluster`]): instantiates a topology into executors, wires
  stream routers and runs spout tasks on a fixed thread pool
* **Routing** ([`router`], [`grouping`]): delivers each tuple to local
  executors directly and to peer workers through [`transport`]
* **Completion** ([`consensus`], [`executor`]): bolts finish once every
  upstream executor on every worker has ended its stream
*/

pub mod cluster;
pub mod collector;
pub mod component;
pub mod config;
pub mod consensus;
pub mod context;
pub mod error;
pub mod executor;
pub mod functions;
pub mod grouping;
pub mod registry;
pub mod retry;
pub mod router;
pub mod task;
pub mod topology;
pub mod transport;
pub mod tuple;

// Re-export key types for easier access
pub use cluster::{Cluster, JobRuntime};
pub use collector::OutputCollector;
pub use component::{Bolt, ComponentContext, Spout};
pub use config::{Config, RuntimeConfig};
pub use consensus::ConsensusTracker;
pub use context::{JobPhase, TopologyContext};
pub use error::{ErrorInfo, Result, StormError};
pub use executor::{BoltExecutor, SpoutExecutor};
pub use functions::Job;
pub use grouping::Grouping;
pub use registry::ComponentRegistry;
pub use retry::RetryConfig;
pub use router::{Route, StreamRouter};
pub use task::{Signal, Task, TaskQueue};
pub use topology::{BoltDeclarer, Topology, TopologyBuilder, map_reduce_topology};
pub use transport::{HttpTransport, RemoteTransport, SenderBolt, WorkerJob};
pub use tuple::{ExecutorId, Fields, Tuple, Value};
