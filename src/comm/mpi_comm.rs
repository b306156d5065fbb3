//! MPI communicator.

use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives};

use super::traits::Communicator;

/// Communicator over an MPI process group.
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn allreduce_sum(&self, buf: &mut [f64]) {
        if self.size() == 1 {
            return;
        }
        let local = buf.to_vec();
        self.world
            .all_reduce_into(&local[..], buf, SystemOperation::sum());
    }

    fn barrier(&self) {
        self.world.barrier();
    }
}
