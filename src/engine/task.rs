use crate::engine::error::Result;
use crate::engine::executor::SpoutExecutor;
use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// One schedulable unit of work: a single step of a spout executor
#[derive(Clone)]
pub struct Task {
    spout: Arc<SpoutExecutor>,
}

impl Task {
    pub fn new(spout: Arc<SpoutExecutor>) -> Self {
        Self { spout }
    }

    /// Runs one step. `Ok(true)` means the task wants to be queued again.
    pub fn run(&self) -> Result<bool> {
        self.spout.step()
    }

    pub fn executor(&self) -> &Arc<SpoutExecutor> {
        &self.spout
    }
}

/// Wake-up signal shared by every task queue of a cluster and its pool threads.
///
/// A generation counter guards against lost wake-ups: a thread records the
/// generation before scanning the queues and only sleeps if nothing was
/// enqueued since.
#[derive(Default)]
pub struct Signal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub fn notify_one(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_one();
    }

    pub fn notify_all(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Blocks until the generation moves past `seen` or `timeout` elapses
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) {
        let mut generation = self.generation.lock();
        if *generation != seen {
            return;
        }
        self.condvar.wait_for(&mut generation, timeout);
    }
}

/// Lock-free FIFO of runnable tasks for one job
pub struct TaskQueue {
    tasks: SegQueue<Task>,
    signal: Arc<Signal>,
}

impl TaskQueue {
    pub fn new(signal: Arc<Signal>) -> Self {
        Self {
            tasks: SegQueue::new(),
            signal,
        }
    }

    pub fn push(&self, task: Task) {
        self.tasks.push(task);
        self.signal.notify_one();
    }

    pub fn pop(&self) -> Option<Task> {
        self.tasks.pop()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drops every queued task, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.tasks.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_returns_immediately_after_notify() {
        let signal = Signal::new();
        let seen = signal.generation();
        signal.notify_one();

        let start = Instant::now();
        signal.wait_for_change(seen, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out_without_notify() {
        let signal = Signal::new();
        let seen = signal.generation();
        let start = Instant::now();
        signal.wait_for_change(seen, Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_notify_wakes_sleeping_thread() {
        let signal = Arc::new(Signal::new());
        let seen = signal.generation();
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                signal.wait_for_change(seen, Duration::from_secs(10));
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(20));
        signal.notify_all();
        let waited = waiter.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
