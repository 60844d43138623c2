//! Distribution of same-spin orbital pairs over a process group.

use std::fmt;

use derive_builder::Builder;
use itertools::Itertools;
use log;
use serde::{Deserialize, Serialize};

use crate::target::orbital::{OrbitalSet, SpinChannel};
use crate::target::tensor::SymmetricTensor;
use crate::zfs::backend::ContractionBackend;
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::pair_density::{OrbitalPair, PairDensityBuilder};
use crate::zfs::reducer::SumMode;
use crate::zfs::ZfsError;

pub mod process_group;

pub use process_group::{ProcessGroup, SingleProcess, ThreadGroup, ThreadMember};
#[cfg(feature = "mpi")]
pub use process_group::MpiGroup;


// ================
// Enum definitions
// ================

/// An enumerated type for the ways the global pair list is split over the members of a process
/// group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionScheme {
    /// Near-equal contiguous blocks of the pair list, in rank order.
    #[default]
    Contiguous,

    /// Pair $`k`$ goes to rank $`k \bmod P`$.
    RoundRobin,
}

impl PartitionScheme {
    /// Returns the positions in the global pair list owned by one rank.
    ///
    /// # Arguments
    ///
    /// * `n_pairs` - The length of the global pair list.
    /// * `rank` - The rank whose positions are required.
    /// * `size` - The number of ranks.
    pub fn local_indices(&self, n_pairs: usize, rank: usize, size: usize) -> Vec<usize> {
        if size == 0 || rank >= size {
            return vec![];
        }
        match self {
            PartitionScheme::Contiguous => {
                let base = n_pairs / size;
                let rem = n_pairs % size;
                let start = rank * base + rank.min(rem);
                let len = base + usize::from(rank < rem);
                (start..start + len).collect_vec()
            }
            PartitionScheme::RoundRobin => (rank..n_pairs).step_by(size).collect_vec(),
        }
    }
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionScheme::Contiguous => write!(f, "contiguous blocks"),
            PartitionScheme::RoundRobin => write!(f, "round robin"),
        }
    }
}

// =========
// Functions
// =========

/// Enumerates the unordered same-spin pairs of an orbital set in the global order: spin-up pairs
/// first, then spin-down pairs, each in lexicographic order of positions.
pub fn enumerate_pairs(set: &OrbitalSet) -> Result<Vec<OrbitalPair>, ZfsError> {
    [SpinChannel::Up, SpinChannel::Down]
        .iter()
        .flat_map(|spin| {
            set.indices_of(*spin)
                .into_iter()
                .tuple_combinations::<(_, _)>()
                .collect_vec()
        })
        .map(|(i, j)| OrbitalPair::new(set, i, j))
        .collect()
}

// ==================
// Struct definitions
// ==================

/// A structure holding what one member of a process group obtains from a dispatch.
#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    /// The global sum $`\sum_{i<j} \mathbf{C}_{ij}`$, identical on every member.
    pub total: SymmetricTensor,

    /// The global pair list.
    pub pairs: Vec<OrbitalPair>,

    /// The contribution of every pair in [`Self::pairs`], if requested.
    pub pair_contributions: Option<Vec<SymmetricTensor>>,

    /// The range of the $`\mathbf{G}`$-sum used for every pair.
    pub sum_mode: SumMode,

    /// The number of pairs contracted by this member.
    pub n_local_pairs: usize,
}

/// A structure to contract every same-spin pair of an orbital set across a process group.
///
/// Each member builds and contracts the pairs it owns with its own backend, accumulating them in
/// its local order. A single sum all-reduce then gives every member the global tensor. The
/// reduction buffer carries an abort flag, so a member that fails still takes part in the
/// collective and every member returns an error.
#[derive(Builder)]
pub struct ParallelDispatcher<'a> {
    /// The dipolar kernel of the run.
    kernel: &'a DipoleKernel,

    /// The backend of this process.
    backend: &'a dyn ContractionBackend,

    /// The partition of the pair list over the process group.
    #[builder(default)]
    partition_scheme: PartitionScheme,

    /// Boolean indicating if per-pair contributions are gathered as well.
    #[builder(default = "false")]
    collect_pair_contributions: bool,

    /// Boolean indicating if the half-space $`\mathbf{G}`$-sum may be used for real-valued
    /// orbital sets.
    #[builder(default = "true")]
    allow_half_space: bool,
}

impl<'a> ParallelDispatcher<'a> {
    /// Returns a builder to construct a new [`ParallelDispatcher`].
    pub fn builder() -> ParallelDispatcherBuilder<'a> {
        ParallelDispatcherBuilder::default()
    }

    /// Returns the partition scheme.
    pub fn partition_scheme(&self) -> PartitionScheme {
        self.partition_scheme
    }

    /// Contracts the pairs of `set` owned by this member of `group` and reduces the result over
    /// the group.
    ///
    /// Every member of the group must call this with the same orbital set and settings.
    ///
    /// # Errors
    ///
    /// * [`ZfsError::Configuration`] if the kernel does not match the grid of the set or the set
    /// has no same-spin pairs, or if a pair on this member cannot be built;
    /// * [`ZfsError::Backend`] if this member's backend fails;
    /// * [`ZfsError::Communication`] if the reduction fails or another member aborted.
    pub fn dispatch(
        &self,
        set: &OrbitalSet,
        group: &dyn ProcessGroup,
    ) -> Result<DispatchOutcome, ZfsError> {
        self.kernel.check_compatible(&set.grid().fingerprint())?;
        let rank = group.rank();
        let size = group.size();
        if rank >= size {
            return Err(ZfsError::configuration(format!(
                "Rank {rank} is invalid in a group of {size}."
            )));
        }
        let pairs = enumerate_pairs(set)?;
        if pairs.is_empty() {
            return Err(ZfsError::configuration(
                "The orbital set has no same-spin orbital pairs.",
            ));
        }
        let n_pairs = pairs.len();
        let local_indices = self.partition_scheme.local_indices(n_pairs, rank, size);
        log::debug!(
            "Rank {rank}/{size}: {} of {n_pairs} pairs assigned ({}).",
            local_indices.len(),
            self.partition_scheme
        );

        let local = self.contract_local(set, &pairs, &local_indices, rank);

        let offset = 7;
        let buffer_len = if self.collect_pair_contributions {
            offset + 6 * n_pairs
        } else {
            offset
        };
        let mut buffer = vec![0.0; buffer_len];
        match &local {
            Ok((partial, contributions, _)) => {
                buffer[1..offset].copy_from_slice(partial.components());
                for (k, c) in contributions.iter() {
                    let start = offset + 6 * k;
                    buffer[start..start + 6].copy_from_slice(c.components());
                }
            }
            Err(err) => {
                log::error!("Rank {rank}: aborting the pair loop: {err}");
                buffer[0] = 1.0;
            }
        }

        let reduced = group.all_reduce_sum(&mut buffer);
        let (_, _, sum_mode) = local?;
        reduced?;
        if buffer[0] > 0.0 {
            return Err(ZfsError::Communication(format!(
                "{} peer worker(s) aborted",
                buffer[0].round()
            )));
        }

        let total = SymmetricTensor::new([
            buffer[1], buffer[2], buffer[3], buffer[4], buffer[5], buffer[6],
        ]);
        let pair_contributions = self.collect_pair_contributions.then(|| {
            buffer[offset..]
                .chunks_exact(6)
                .map(|c| SymmetricTensor::new([c[0], c[1], c[2], c[3], c[4], c[5]]))
                .collect_vec()
        });
        Ok(DispatchOutcome {
            total,
            pairs,
            pair_contributions,
            sum_mode,
            n_local_pairs: local_indices.len(),
        })
    }

    /// Chooses the range of the $`\mathbf{G}`$-sum from the first global pair, so that every
    /// member reaches the same decision.
    fn sum_mode(
        &self,
        set: &OrbitalSet,
        builder: &PairDensityBuilder,
        first: OrbitalPair,
    ) -> Result<SumMode, ZfsError> {
        if !self.allow_half_space || !set.is_real_valued() {
            return Ok(SumMode::Full);
        }
        let density = builder.build(set, first)?;
        if density.has_symmetric_magnitudes(set.grid()) {
            Ok(SumMode::HalfSpace)
        } else {
            log::debug!(
                "Pair density {first} is not Hermitian-symmetric; using the full G-sum."
            );
            Ok(SumMode::Full)
        }
    }

    #[allow(clippy::type_complexity)]
    fn contract_local(
        &self,
        set: &OrbitalSet,
        pairs: &[OrbitalPair],
        local_indices: &[usize],
        rank: usize,
    ) -> Result<(SymmetricTensor, Vec<(usize, SymmetricTensor)>, SumMode), ZfsError> {
        self.backend.prepare(self.kernel)?;
        let builder = PairDensityBuilder::new(set.grid());
        let sum_mode = self.sum_mode(set, &builder, pairs[0])?;
        log::debug!(
            "Rank {rank}: contracting with {} over the {sum_mode}.",
            self.backend.description()
        );

        let n_local = local_indices.len();
        let checkpoint = (n_local / 10).max(1);
        let mut partial = SymmetricTensor::zeros();
        let mut contributions = Vec::with_capacity(if self.collect_pair_contributions {
            n_local
        } else {
            0
        });
        for (n_done, &k) in local_indices.iter().enumerate() {
            let density = builder.build(set, pairs[k])?;
            let contribution = self.backend.contract(&density, self.kernel, sum_mode)?;
            partial += contribution;
            if self.collect_pair_contributions {
                contributions.push((k, contribution));
            }
            let n_done = n_done + 1;
            if n_done % checkpoint == 0 || n_done == n_local {
                log::debug!(
                    "Rank {rank}: {n_done}/{n_local} pairs contracted ({:.0}%).",
                    100.0 * n_done as f64 / n_local as f64
                );
            }
        }
        Ok((partial, contributions, sum_mode))
    }
}
