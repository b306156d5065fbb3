//! Single-rank communicator.

use super::traits::Communicator;

/// Communicator for a group of exactly one rank. Collectives are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_sum(&self, _buf: &mut [f64]) {
        // one rank: the buffer already holds the global sum
    }

    fn barrier(&self) {}
}
