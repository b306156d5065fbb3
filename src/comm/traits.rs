//! Communicator trait used by the distributed kernels.

/// Collective communication over a fixed group of ranks.
///
/// All collectives block until every rank of the group has entered them.
/// There is no timeout: a rank that never arrives stalls the others.
///
/// No `Send`/`Sync` bound: an MPI communicator handle stays on the thread
/// that created it.
pub trait Communicator {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Element-wise sum of `buf` across all ranks, in place.
    ///
    /// Every rank must pass a buffer of the same length. On return every
    /// rank holds the global sum.
    fn allreduce_sum(&self, buf: &mut [f64]);

    /// Synchronization barrier.
    fn barrier(&self);

    /// Sum a single value across all ranks.
    fn allreduce_scalar(&self, local: f64) -> f64 {
        let mut buf = [local];
        self.allreduce_sum(&mut buf);
        buf[0]
    }

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}
