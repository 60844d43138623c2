//! Process groups over which orbital pairs are distributed and partial tensors are reduced.

use std::sync::{Barrier, Mutex};

use itertools::Itertools;
#[cfg(feature = "mpi")]
use mpi::collective::SystemOperation;
#[cfg(feature = "mpi")]
use mpi::traits::*;

use crate::zfs::ZfsError;

// =================
// Trait definitions
// =================

/// Trait for a fixed group of cooperating workers with a sum all-reduce.
///
/// Every member of the group must take part in every collective call, in the same order and with
/// buffers of the same length.
pub trait ProcessGroup {
    /// Returns the rank of this member, in `0..size`.
    fn rank(&self) -> usize;

    /// Returns the number of members in the group.
    fn size(&self) -> usize;

    /// Returns `true` if this member is the root of the group.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Replaces `buffer` on every member with the element-wise sum of the buffers of all members.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Communication`] if the reduction cannot be completed.
    fn all_reduce_sum(&self, buffer: &mut [f64]) -> Result<(), ZfsError>;
}

// ==============
// Single process
// ==============

/// The trivial group with one member.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _buffer: &mut [f64]) -> Result<(), ZfsError> {
        Ok(())
    }
}

// ============
// Thread group
// ============

/// A group of workers simulated by scoped threads in the current process.
///
/// The all-reduce adds the contributions of the members in rank order, so every member receives
/// bitwise the same sum.
#[derive(Clone, Copy, Debug)]
pub struct ThreadGroup {
    size: usize,
}

/// State shared by the members of a running [`ThreadGroup`].
struct ThreadGroupState {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Vec<f64>>>>,
}

/// One member of a running [`ThreadGroup`].
pub struct ThreadMember<'a> {
    rank: usize,
    size: usize,
    state: &'a ThreadGroupState,
}

impl ThreadGroup {
    /// Creates a thread group with `size` members.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, ZfsError> {
        if size == 0 {
            return Err(ZfsError::configuration(
                "A thread group needs at least one member.",
            ));
        }
        Ok(Self { size })
    }

    /// Returns the number of members.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` once on every member, each on its own thread, and returns the outcomes in rank
    /// order.
    ///
    /// `f` must reach the same sequence of collective calls on every member; a panic in one
    /// member is propagated after all threads have finished.
    pub fn run<F, T>(&self, f: F) -> Vec<T>
    where
        F: Fn(&ThreadMember<'_>) -> T + Sync,
        T: Send,
    {
        let state = ThreadGroupState {
            barrier: Barrier::new(self.size),
            slots: Mutex::new(vec![None; self.size]),
        };
        let size = self.size;
        std::thread::scope(|scope| {
            let handles = (0..size)
                .map(|rank| {
                    let member = ThreadMember {
                        rank,
                        size,
                        state: &state,
                    };
                    let f = &f;
                    scope.spawn(move || f(&member))
                })
                .collect_vec();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect_vec()
        })
    }
}

impl<'a> ThreadMember<'a> {
    fn reduce_slots(&self) -> Result<Vec<f64>, ZfsError> {
        let slots = self
            .state
            .slots
            .lock()
            .map_err(|_| ZfsError::Communication("the reduction buffer is poisoned".to_string()))?;
        let buffers = slots
            .iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.as_ref().ok_or_else(|| {
                    ZfsError::Communication(format!("rank {rank} did not contribute a buffer"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let len = buffers.first().map(|buffer| buffer.len()).unwrap_or(0);
        if let Some((rank, buffer)) = buffers
            .iter()
            .enumerate()
            .find(|(_, buffer)| buffer.len() != len)
        {
            return Err(ZfsError::Communication(format!(
                "rank {rank} contributed {} values, but rank 0 contributed {len}",
                buffer.len()
            )));
        }
        let mut sum = vec![0.0; len];
        for buffer in buffers {
            sum.iter_mut()
                .zip(buffer.iter())
                .for_each(|(s, x)| *s += x);
        }
        Ok(sum)
    }
}

impl<'a> ProcessGroup for ThreadMember<'a> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, buffer: &mut [f64]) -> Result<(), ZfsError> {
        // Both barriers are reached on every path so that no member is left waiting.
        let deposited = self
            .state
            .slots
            .lock()
            .map(|mut slots| slots[self.rank] = Some(buffer.to_vec()))
            .map_err(|_| ZfsError::Communication("the reduction buffer is poisoned".to_string()));
        self.state.barrier.wait();
        let reduced = deposited.and_then(|_| self.reduce_slots());
        self.state.barrier.wait();

        let reduced = reduced?;
        buffer.copy_from_slice(&reduced);
        Ok(())
    }
}

// =========
// MPI group
// =========

/// A group formed by the processes of an MPI communicator.
#[cfg(feature = "mpi")]
pub struct MpiGroup<C: Communicator> {
    comm: C,
}

#[cfg(feature = "mpi")]
impl<C: Communicator> MpiGroup<C> {
    /// Wraps an MPI communicator.
    pub fn new(comm: C) -> Self {
        Self { comm }
    }
}

#[cfg(feature = "mpi")]
impl<C: Communicator> ProcessGroup for MpiGroup<C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_reduce_sum(&self, buffer: &mut [f64]) -> Result<(), ZfsError> {
        let local = buffer.to_vec();
        self.comm
            .all_reduce_into(&local[..], buffer, SystemOperation::sum());
        Ok(())
    }
}
