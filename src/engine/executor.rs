//! # Executors
//!
//! Runtime wrappers around user components. Each wrapper owns the component
//! behind its own lock, generates the executor id, and drives the
//! end-of-stream state machine:
//!
//! * a bolt accumulates data until every expected upstream executor has voted
//!   end-of-stream, then finishes exactly once and forwards a single EOS;
//! * a spout produces until exhausted, then emits exactly one EOS.
//!
//! Data arriving at a finished bolt is a protocol violation and fails the job.

use crate::engine::collector::OutputCollector;
use crate::engine::component::{Bolt, ComponentContext, Spout};
use crate::engine::consensus::ConsensusTracker;
use crate::engine::context::TopologyContext;
use crate::engine::error::{Result, StormError};
use crate::engine::tuple::{ExecutorId, Tuple};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct BoltState {
    bolt: Box<dyn Bolt>,
    consensus: ConsensusTracker,
    finalized: bool,
}

/// Live instance of a bolt node
pub struct BoltExecutor {
    id: ExecutorId,
    node: String,
    state: Mutex<BoltState>,
    collector: OutputCollector,
    sent_eos: AtomicBool,
    context: Arc<TopologyContext>,
}

impl BoltExecutor {
    /// Wraps and prepares `bolt`.
    ///
    /// # Arguments
    /// * `bolt` - The user component
    /// * `component` - Where the instance sits in the job
    /// * `expected_votes` - Distinct upstream EOS votes needed before finishing
    pub fn new(
        mut bolt: Box<dyn Bolt>,
        component: &ComponentContext,
        expected_votes: usize,
    ) -> Result<Self> {
        let id = ExecutorId::generate();
        bolt.prepare(component)?;
        let collector = OutputCollector::new(
            id.clone(),
            bolt.output_fields(),
            Arc::clone(&component.context),
        );
        debug!(
            "Prepared bolt {} [{}] expecting {} EOS votes",
            component.node, id, expected_votes
        );
        Ok(Self {
            id,
            node: component.node.clone(),
            state: Mutex::new(BoltState {
                bolt,
                consensus: ConsensusTracker::new(expected_votes),
                finalized: false,
            }),
            collector,
            sent_eos: AtomicBool::new(false),
            context: Arc::clone(&component.context),
        })
    }

    pub fn id(&self) -> &ExecutorId {
        &self.id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn collector(&self) -> &OutputCollector {
        &self.collector
    }

    pub fn has_sent_eos(&self) -> bool {
        self.sent_eos.load(Ordering::Acquire)
    }

    /// Distinct EOS votes received and votes required
    pub fn eos_votes(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.consensus.votes(), state.consensus.expected())
    }

    /// Delivers one tuple.
    ///
    /// Returns whether the executor still expects input: `Ok(false)` once it
    /// has finalized.
    pub fn execute(&self, tuple: &Tuple) -> Result<bool> {
        let mut state = self.state.lock();

        if tuple.is_end_of_stream() {
            if state.finalized {
                return Ok(false);
            }
            if !state.consensus.vote_for_eos(tuple.source_executor()) {
                debug!(
                    "Bolt {} [{}] EOS from {} ({}/{})",
                    self.node,
                    self.id,
                    tuple.source_executor(),
                    state.consensus.votes(),
                    state.consensus.expected()
                );
                return Ok(true);
            }

            state.finalized = true;
            info!("Bolt {} [{}] reached EOS consensus", self.node, self.id);
            state.bolt.finish(&self.collector)?;
            self.collector.emit_end_of_stream()?;
            self.sent_eos.store(true, Ordering::Release);
            drop(state);
            self.context.executor_finished();
            return Ok(false);
        }

        if state.finalized {
            let err = StormError::ProtocolViolation {
                executor_id: self.id.to_string(),
                source_executor: tuple.source_executor().to_string(),
            };
            error!("Bolt {} [{}]: {}", self.node, self.id, err);
            self.context.fail(Some(self.id.as_str()), &err);
            return Err(err);
        }

        state.bolt.execute(tuple, &self.collector)?;
        Ok(true)
    }

    pub fn cleanup(&self) {
        self.state.lock().bolt.cleanup();
    }
}

struct SpoutState {
    spout: Box<dyn Spout>,
    done: bool,
}

/// Live instance of a spout node
pub struct SpoutExecutor {
    id: ExecutorId,
    node: String,
    state: Mutex<SpoutState>,
    collector: OutputCollector,
    sent_eos: AtomicBool,
    context: Arc<TopologyContext>,
}

impl SpoutExecutor {
    pub fn new(mut spout: Box<dyn Spout>, component: &ComponentContext) -> Result<Self> {
        let id = ExecutorId::generate();
        spout.open(component)?;
        let collector = OutputCollector::new(
            id.clone(),
            spout.output_fields(),
            Arc::clone(&component.context),
        );
        Ok(Self {
            id,
            node: component.node.clone(),
            state: Mutex::new(SpoutState { spout, done: false }),
            collector,
            sent_eos: AtomicBool::new(false),
            context: Arc::clone(&component.context),
        })
    }

    pub fn id(&self) -> &ExecutorId {
        &self.id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn collector(&self) -> &OutputCollector {
        &self.collector
    }

    pub fn has_sent_eos(&self) -> bool {
        self.sent_eos.load(Ordering::Acquire)
    }

    /// Runs one production step; `Ok(true)` while more tuples may follow
    pub fn step(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.done {
            return Ok(false);
        }
        if state.spout.next_tuple(&self.collector)? {
            return Ok(true);
        }

        state.done = true;
        info!("Spout {} [{}] exhausted", self.node, self.id);
        self.collector.emit_end_of_stream()?;
        self.sent_eos.store(true, Ordering::Release);
        drop(state);
        self.context.executor_finished();
        Ok(false)
    }

    pub fn close(&self) {
        self.state.lock().spout.close();
    }
}
