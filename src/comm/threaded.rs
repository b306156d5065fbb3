//! In-process rank group backed by OS threads.
//!
//! Every rank is a thread sharing one slot table. An allreduce deposits the
//! local buffer into the rank's slot, waits on a barrier, then each rank
//! sums the slots in ascending rank order. The reduction order is fixed, so
//! repeated runs with the same rank count give bit-identical results.
//!
//! A rank that panics poisons the group: every rank waiting in, or later
//! entering, a collective panics as well, so the whole group unwinds.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::traits::Communicator;

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: usize,
    /// Rank whose panic poisoned the group.
    failed: Option<usize>,
}

/// Reusable barrier that releases its waiters with a panic once poisoned.
struct GroupBarrier {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl GroupBarrier {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        if let Some(rank) = state.failed {
            panic!("rank {} of the group panicked", rank);
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return;
        }
        while state.generation == generation && state.failed.is_none() {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            let rank = state.failed.unwrap_or_default();
            panic!("rank {} of the group panicked", rank);
        }
    }

    fn poison(&self, rank: usize) {
        let mut state = self.state.lock();
        state.failed.get_or_insert(rank);
        self.cvar.notify_all();
    }

    fn failed_rank(&self) -> Option<usize> {
        self.state.lock().failed
    }
}

struct Shared {
    size: usize,
    slots: Mutex<Vec<Vec<f64>>>,
    barrier: GroupBarrier,
}

/// Handle of one rank in an in-process group.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create the handles of a group of `size` ranks.
    ///
    /// Each handle must be driven by its own thread; collectives on a
    /// group whose ranks share a thread deadlock. Dropping a handle while its
    /// thread unwinds poisons the group.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "rank group needs at least one rank");
        let shared = Arc::new(Shared {
            size,
            slots: Mutex::new(vec![Vec::new(); size]),
            barrier: GroupBarrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` on `size` ranks, one scoped thread per rank, and collect the
    /// results in rank order.
    ///
    /// If a rank panics, the other ranks are released from their collectives
    /// and the panic of the first failing rank is resumed on the caller.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&ThreadComm) -> T + Sync,
    {
        let comms = Self::group(size);
        let shared = Arc::clone(&comms[0].shared);
        let f = &f;
        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || f(&comm)))
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        if outcomes.iter().any(|o| o.is_err()) {
            let first = shared.barrier.failed_rank().unwrap_or_default();
            let mut payloads: Vec<_> = outcomes
                .into_iter()
                .enumerate()
                .filter_map(|(rank, o)| o.err().map(|e| (rank, e)))
                .collect();
            let pos = payloads.iter().position(|(rank, _)| *rank == first).unwrap_or(0);
            std::panic::resume_unwind(payloads.swap_remove(pos).1);
        }
        outcomes.into_iter().filter_map(Result::ok).collect()
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared.barrier.poison(self.rank);
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn allreduce_sum(&self, buf: &mut [f64]) {
        if self.shared.size == 1 {
            return;
        }
        {
            let mut slots = self.shared.slots.lock();
            let slot = &mut slots[self.rank];
            slot.clear();
            slot.extend_from_slice(buf);
        }
        self.shared.barrier.wait();
        {
            let slots = self.shared.slots.lock();
            assert!(
                slots.iter().all(|s| s.len() == buf.len()),
                "allreduce called with buffers of different lengths"
            );
            for (i, value) in buf.iter_mut().enumerate() {
                let mut acc = 0.0;
                for slot in slots.iter() {
                    acc += slot[i];
                }
                *value = acc;
            }
        }
        // slots must not be refilled before every rank has read them
        self.shared.barrier.wait();
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_ranks() {
        let ranks = ThreadComm::run(4, |comm| (comm.rank(), comm.size()));
        assert_eq!(ranks, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn test_allreduce_sum() {
        let results = ThreadComm::run(3, |comm| {
            let r = comm.rank() as f64;
            let mut buf = vec![r, 10.0 * r, 1.0];
            comm.allreduce_sum(&mut buf);
            buf
        });
        for buf in results {
            assert_eq!(buf, vec![3.0, 30.0, 3.0]);
        }
    }

    #[test]
    fn test_repeated_allreduce() {
        let results = ThreadComm::run(4, |comm| {
            (0..20)
                .map(|k| comm.allreduce_scalar((comm.rank() + k) as f64))
                .collect::<Vec<_>>()
        });
        for sums in &results {
            for (k, &s) in sums.iter().enumerate() {
                assert_eq!(s, (6 + 4 * k) as f64);
            }
        }
    }

    #[test]
    fn test_reduction_is_bit_identical_across_runs() {
        let run = || {
            ThreadComm::run(5, |comm| {
                let mut buf: Vec<f64> = (0..16)
                    .map(|i| 0.1 * (i as f64 + 1.0) / (comm.rank() as f64 + 3.0))
                    .collect();
                comm.allreduce_sum(&mut buf);
                buf
            })
        };
        let first = run();
        for _ in 0..5 {
            let again = run();
            for (a, b) in first.iter().zip(again.iter()) {
                let a: Vec<u64> = a.iter().map(|x| x.to_bits()).collect();
                let b: Vec<u64> = b.iter().map(|x| x.to_bits()).collect();
                assert_eq!(a, b);
            }
        }
        // every rank sees the same bits
        for other in &first[1..] {
            assert_eq!(&first[0], other);
        }
    }

    #[test]
    fn test_single_rank_group() {
        let out = ThreadComm::run(1, |comm| {
            let mut buf = vec![2.0];
            comm.allreduce_sum(&mut buf);
            comm.barrier();
            buf[0]
        });
        assert_eq!(out, vec![2.0]);
    }

    #[test]
    fn test_panic_before_collective_stops_group() {
        let outcome = std::panic::catch_unwind(|| {
            ThreadComm::run(2, |comm| {
                if comm.rank() == 0 {
                    panic!("rank 0 gave up");
                }
                comm.allreduce_scalar(1.0)
            })
        });
        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rank 0 gave up"));
    }

    #[test]
    fn test_panic_between_collectives_stops_group() {
        let outcome = std::panic::catch_unwind(|| {
            ThreadComm::run(3, |comm| {
                let first = comm.allreduce_scalar(1.0);
                if comm.rank() == 2 {
                    panic!("rank 2 gave up");
                }
                comm.barrier();
                first + comm.allreduce_scalar(1.0)
            })
        });
        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rank 2 gave up"));
    }

    #[test]
    fn test_repeated_barriers() {
        let out = ThreadComm::run(2, |comm| {
            for _ in 0..100 {
                comm.barrier();
            }
            comm.allreduce_scalar(0.5)
        });
        assert_eq!(out, vec![1.0, 1.0]);
    }
}
