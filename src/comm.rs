//! Collective communication between cooperating workers.
use crate::{Communicator, Real};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Barrier;

/// Communicator for a single worker. Every collective operation is the identity.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all(&self, local: bool) -> bool {
        local
    }

    fn barrier(&self) {}

    fn sum_in_place<T: Real + Send>(&self, _values: &mut [T]) {}
}

/// A group of workers running on threads of the same process.
///
/// Each worker obtains its communicator through [`ThreadGroup::communicator`] and must run on
/// its own thread, since every collective operation blocks until all workers have joined it.
pub struct ThreadGroup {
    size: usize,
    barrier: Barrier,
    flag: Mutex<bool>,
    accumulator: Mutex<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGroup").field("size", &self.size).finish()
    }
}

impl ThreadGroup {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "A thread group needs at least one worker.");
        Self {
            size,
            barrier: Barrier::new(size),
            flag: Mutex::new(true),
            accumulator: Mutex::new(None),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// # Panics
    ///
    /// Panics if `rank` is not smaller than the size of the group.
    pub fn communicator(&self, rank: usize) -> ThreadCommunicator<'_> {
        assert!(rank < self.size, "Rank must be smaller than the size of the group.");
        ThreadCommunicator { group: self, rank }
    }

    /// Waits for all workers, then lets exactly one of them reset the shared state before any
    /// worker can start the next collective operation.
    fn finish_collective(&self, reset: impl FnOnce()) {
        if self.barrier.wait().is_leader() {
            reset();
        }
        self.barrier.wait();
    }
}

/// The communicator of one worker of a [`ThreadGroup`].
#[derive(Debug, Copy, Clone)]
pub struct ThreadCommunicator<'a> {
    group: &'a ThreadGroup,
    rank: usize,
}

impl<'a> Communicator for ThreadCommunicator<'a> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all(&self, local: bool) -> bool {
        if !local {
            *self.group.flag.lock() = false;
        }
        self.group.barrier.wait();
        let result = *self.group.flag.lock();
        self.group.finish_collective(|| *self.group.flag.lock() = true);
        result
    }

    fn barrier(&self) {
        self.group.barrier.wait();
    }

    fn sum_in_place<T: Real + Send>(&self, values: &mut [T]) {
        {
            let mut accumulator = self.group.accumulator.lock();
            match accumulator
                .as_mut()
                .and_then(|sum| sum.downcast_mut::<Vec<T>>())
            {
                Some(sum) => {
                    assert_eq!(sum.len(), values.len(), "All workers must sum slices of the same length.");
                    for (s, v) in sum.iter_mut().zip(values.iter()) {
                        *s += *v;
                    }
                }
                None => *accumulator = Some(Box::new(values.to_vec())),
            }
        }
        self.group.barrier.wait();

        {
            let accumulator = self.group.accumulator.lock();
            let sum = accumulator
                .as_ref()
                .and_then(|sum| sum.downcast_ref::<Vec<T>>())
                .expect("All workers must sum slices of the same type.");
            values.copy_from_slice(sum);
        }
        self.group
            .finish_collective(|| *self.group.accumulator.lock() = None);
    }
}
