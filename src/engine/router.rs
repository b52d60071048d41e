use crate::engine::error::Result;
use crate::engine::executor::BoltExecutor;
use crate::engine::grouping::{Grouping, partition_for, partition_key};
use crate::engine::transport::SenderBolt;
use crate::engine::tuple::{ExecutorId, Tuple};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One destination slot of a stream
#[derive(Clone)]
pub enum Route {
    Local(Arc<BoltExecutor>),
    Remote(Arc<SenderBolt>),
}

/// Routes tuples of one stream to the executors of its destination bolt.
///
/// Slots are laid out in worker order: this worker contributes its local
/// executors, every other worker contributes its sender repeated once per
/// local executor. Every worker therefore sees the same slot count and a
/// fields-grouped key lands on the same logical executor wherever it is
/// emitted.
pub struct StreamRouter {
    stream: String,
    grouping: Grouping,
    slots: Vec<Route>,
    locals: Vec<Arc<BoltExecutor>>,
    remotes: Vec<Arc<SenderBolt>>,
    next: AtomicUsize,
}

impl StreamRouter {
    /// # Arguments
    /// * `stream` - Name of the destination bolt node
    /// * `grouping` - Partitioning strategy declared on the bolt
    /// * `locals` - This worker's executors of the bolt
    /// * `remotes` - One sender per other worker, in worker order
    /// * `local_position` - Index of this worker in the worker list
    pub fn new(
        stream: impl Into<String>,
        grouping: Grouping,
        locals: Vec<Arc<BoltExecutor>>,
        remotes: Vec<Arc<SenderBolt>>,
        local_position: usize,
    ) -> Self {
        let per_worker = locals.len();
        let workers = remotes.len() + 1;
        let local_position = local_position.min(remotes.len());
        let mut slots = Vec::with_capacity(per_worker * workers);
        let mut remote_iter = remotes.iter();

        for position in 0..workers {
            if position == local_position {
                slots.extend(locals.iter().cloned().map(Route::Local));
            } else if let Some(sender) = remote_iter.next() {
                slots.extend((0..per_worker).map(|_| Route::Remote(Arc::clone(sender))));
            }
        }

        Self {
            stream: stream.into(),
            grouping,
            slots,
            locals,
            remotes,
            next: AtomicUsize::new(0),
        }
    }

    /// Router with local destinations only, as used by a single-worker job
    pub fn local(
        stream: impl Into<String>,
        grouping: Grouping,
        locals: Vec<Arc<BoltExecutor>>,
    ) -> Self {
        Self::new(stream, grouping, locals, Vec::new(), 0)
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn slots(&self) -> &[Route] {
        &self.slots
    }

    pub fn local_executors(&self) -> &[Arc<BoltExecutor>] {
        &self.locals
    }

    /// Routing key of `tuple`, empty unless the stream is fields-grouped
    pub fn key_for(&self, tuple: &Tuple) -> String {
        match &self.grouping {
            Grouping::Fields { fields } => partition_key(fields, tuple),
            Grouping::Broadcast | Grouping::Shuffle => String::new(),
        }
    }

    /// Routes a tuple emitted on this worker over all slots, local and remote
    pub fn execute(&self, tuple: &Tuple) -> Result<()> {
        if tuple.is_end_of_stream() {
            return self.execute_end_of_stream(tuple.source_executor());
        }
        if self.slots.is_empty() {
            return Ok(());
        }

        match &self.grouping {
            Grouping::Fields { fields } => {
                let index = partition_for(&partition_key(fields, tuple), self.slots.len());
                debug!("{}: fields route to slot {}", self.stream, index);
                dispatch(&self.slots[index], tuple)
            }
            Grouping::Shuffle => {
                let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
                dispatch(&self.slots[index], tuple)
            }
            Grouping::Broadcast => self.broadcast(tuple),
        }
    }

    /// Routes a tuple that arrived from another worker among local executors only
    pub fn execute_locally(&self, tuple: &Tuple) -> Result<()> {
        if tuple.is_end_of_stream() {
            return self.execute_end_of_stream_locally(tuple.source_executor());
        }
        if self.locals.is_empty() {
            return Ok(());
        }

        match &self.grouping {
            Grouping::Fields { fields } => {
                // The sender picked slot hash % (L * W); its offset within a worker is hash % L
                let index = partition_for(&partition_key(fields, tuple), self.locals.len());
                self.locals[index].execute(tuple).map(|_| ())
            }
            Grouping::Shuffle => {
                let index = self.next.fetch_add(1, Ordering::Relaxed) % self.locals.len();
                self.locals[index].execute(tuple).map(|_| ())
            }
            Grouping::Broadcast => {
                for executor in &self.locals {
                    executor.execute(tuple)?;
                }
                Ok(())
            }
        }
    }

    /// Broadcasts end-of-stream from `source` to every destination
    pub fn execute_end_of_stream(&self, source: &ExecutorId) -> Result<()> {
        debug!("{}: EOS from {}", self.stream, source);
        self.broadcast(&Tuple::end_of_stream(source.clone()))
    }

    /// End-of-stream from a remote `source` to every local executor
    pub fn execute_end_of_stream_locally(&self, source: &ExecutorId) -> Result<()> {
        let eos = Tuple::end_of_stream(source.clone());
        for executor in &self.locals {
            executor.execute(&eos)?;
        }
        Ok(())
    }

    // Once per distinct destination: each remote worker fans out on its side
    fn broadcast(&self, tuple: &Tuple) -> Result<()> {
        for executor in &self.locals {
            executor.execute(tuple)?;
        }
        for sender in &self.remotes {
            sender.send(tuple)?;
        }
        Ok(())
    }
}

fn dispatch(route: &Route, tuple: &Tuple) -> Result<()> {
    match route {
        Route::Local(executor) => executor.execute(tuple).map(|_| ()),
        Route::Remote(sender) => sender.send(tuple),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::collector::OutputCollector;
    use crate::engine::component::{Bolt, ComponentContext};
    use crate::engine::config::Config;
    use crate::engine::context::TopologyContext;
    use crate::engine::transport::RemoteTransport;
    use crate::engine::task::Signal;
    use crate::engine::tuple::{Fields, Value};
    use parking_lot::Mutex;

    struct Sink {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Bolt for Sink {
        fn execute(&mut self, tuple: &Tuple, _collector: &OutputCollector) -> Result<()> {
            self.seen.lock().push(tuple.string_by_field("key")?);
            Ok(())
        }

        fn output_fields(&self) -> Fields {
            Fields::new(["key"])
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        pushes: Mutex<Vec<(String, Tuple)>>,
    }

    impl RemoteTransport for RecordingTransport {
        fn push(&self, address: &str, _job: &str, _stream: &str, tuple: &Tuple) -> Result<()> {
            self.pushes.lock().push((address.to_string(), tuple.clone()));
            Ok(())
        }

        fn push_batch(&self, address: &str, job: &str, stream: &str, tuples: &[Tuple]) -> Result<()> {
            for tuple in tuples {
                self.push(address, job, stream, tuple)?;
            }
            Ok(())
        }
    }

    fn component() -> ComponentContext {
        ComponentContext {
            node: "sink".to_string(),
            task_index: 0,
            parallelism: 1,
            context: Arc::new(TopologyContext::new(
                "job",
                Config::new(),
                Arc::new(Signal::new()),
            )),
        }
    }

    fn sinks(n: usize, expected: usize) -> (Vec<Arc<BoltExecutor>>, Vec<Arc<Mutex<Vec<String>>>>) {
        let ctx = component();
        let mut executors = Vec::new();
        let mut seen = Vec::new();
        for _ in 0..n {
            let log = Arc::new(Mutex::new(Vec::new()));
            let bolt = Sink {
                seen: Arc::clone(&log),
            };
            executors.push(Arc::new(BoltExecutor::new(Box::new(bolt), &ctx, expected).unwrap()));
            seen.push(log);
        }
        (executors, seen)
    }

    fn keyed(key: &str) -> Tuple {
        Tuple::new(
            Fields::new(["key"]),
            vec![Value::from(key)],
            ExecutorId::from("up"),
        )
        .unwrap()
    }

    #[test]
    fn test_slot_layout_matches_across_workers() {
        let transport: Arc<dyn RemoteTransport> = Arc::new(RecordingTransport::default());
        let (locals, _) = sinks(2, 1);
        let remote = Arc::new(SenderBolt::new("http://w1", "job", "sink", 1, transport));
        let router = StreamRouter::new("sink", Grouping::fields(["key"]), locals, vec![remote], 0);

        assert_eq!(router.slots().len(), 4);
        assert!(matches!(router.slots()[0], Route::Local(_)));
        assert!(matches!(router.slots()[1], Route::Local(_)));
        assert!(matches!(router.slots()[2], Route::Remote(_)));
        assert!(matches!(router.slots()[3], Route::Remote(_)));
    }

    #[test]
    fn test_fields_grouping_sends_key_to_one_executor() {
        let (locals, seen) = sinks(3, 1);
        let router = StreamRouter::local("sink", Grouping::fields(["key"]), locals);

        for _ in 0..5 {
            router.execute(&keyed("alpha")).unwrap();
        }
        let hits: Vec<usize> = seen.iter().map(|s| s.lock().len()).collect();
        assert_eq!(hits.iter().sum::<usize>(), 5);
        assert_eq!(hits.iter().filter(|h| **h > 0).count(), 1);
    }

    #[test]
    fn test_shuffle_round_robin() {
        let (locals, seen) = sinks(2, 1);
        let router = StreamRouter::local("sink", Grouping::Shuffle, locals);
        for key in ["a", "b", "c", "d"] {
            router.execute(&keyed(key)).unwrap();
        }
        assert_eq!(*seen[0].lock(), vec!["a", "c"]);
        assert_eq!(*seen[1].lock(), vec!["b", "d"]);
    }

    #[test]
    fn test_broadcast_reaches_every_destination_once() {
        let transport = Arc::new(RecordingTransport::default());
        let dyn_transport: Arc<dyn RemoteTransport> = transport.clone();
        let (locals, seen) = sinks(2, 1);
        let remotes = vec![
            Arc::new(SenderBolt::new("http://w0", "job", "sink", 1, Arc::clone(&dyn_transport))),
            Arc::new(SenderBolt::new("http://w2", "job", "sink", 1, Arc::clone(&dyn_transport))),
        ];
        let router = StreamRouter::new("sink", Grouping::Broadcast, locals, remotes, 1);

        router.execute(&keyed("x")).unwrap();
        for log in &seen {
            assert_eq!(*log.lock(), vec!["x"]);
        }
        let pushes = transport.pushes.lock();
        let addresses: Vec<&str> = pushes.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(addresses, vec!["http://w0", "http://w2"]);
    }

    #[test]
    fn test_eos_broadcast_regardless_of_grouping() {
        let transport = Arc::new(RecordingTransport::default());
        let dyn_transport: Arc<dyn RemoteTransport> = transport.clone();
        let (locals, _) = sinks(2, 1);
        let remote = Arc::new(SenderBolt::new("http://w1", "job", "sink", 1, dyn_transport));
        let router = StreamRouter::new(
            "sink",
            Grouping::fields(["key"]),
            locals.clone(),
            vec![remote],
            0,
        );

        router.execute_end_of_stream(&ExecutorId::from("up")).unwrap();
        assert!(locals.iter().all(|e| e.has_sent_eos()));
        let pushes = transport.pushes.lock();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].1.is_end_of_stream());
    }

    #[test]
    fn test_execute_locally_matches_sender_slot() {
        let (locals, seen) = sinks(2, 1);
        let router = StreamRouter::local("sink", Grouping::fields(["key"]), locals);
        for key in ["a", "b", "c", "d", "e"] {
            router.execute_locally(&keyed(key)).unwrap();
            // A sender with two workers picks slot hash % 4
            let global = partition_for(key, 4);
            let offset = global % 2;
            assert!(seen[offset].lock().contains(&key.to_string()));
        }
        assert_eq!(router.key_for(&keyed("k")), "k");
    }
}
