use crate::engine::tuple::ExecutorId;
use std::collections::HashSet;

/// Counts distinct end-of-stream votes until the expected number is reached
#[derive(Debug)]
pub struct ConsensusTracker {
    expected: usize,
    voters: HashSet<ExecutorId>,
    reached: bool,
}

impl ConsensusTracker {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            voters: HashSet::new(),
            reached: false,
        }
    }

    /// Records a vote from `voter`.
    ///
    /// Returns true exactly once: on the vote that brings the number of
    /// distinct voters to the expected count. Repeat votes and votes after
    /// consensus return false.
    pub fn vote_for_eos(&mut self, voter: &ExecutorId) -> bool {
        if self.reached {
            return false;
        }
        if !self.voters.insert(voter.clone()) {
            return false;
        }
        if self.voters.len() >= self.expected {
            self.reached = true;
            return true;
        }
        false
    }

    pub fn has_consensus(&self) -> bool {
        self.reached
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn votes(&self) -> usize {
        self.voters.len()
    }
}
