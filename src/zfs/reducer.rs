//! Contraction of pair densities with the dipolar kernel.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::target::tensor::SymmetricTensor;
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::pair_density::PairDensity;
use crate::zfs::ZfsError;

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod reducer_tests;

/// The default number of $`\mathbf{G}`$-vectors contracted by one task.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// An enumerated type for the range of the $`\mathbf{G}`$-sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SumMode {
    /// The sum runs over every $`\mathbf{G}`$-vector.
    Full,

    /// The sum runs over half of reciprocal space using the kernel's half-space weights. This is
    /// only valid when $`|\rho(-\mathbf{G})| = |\rho(\mathbf{G})|`$.
    HalfSpace,
}

impl fmt::Display for SumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SumMode::Full => write!(f, "full G-sphere"),
            SumMode::HalfSpace => write!(f, "half G-sphere"),
        }
    }
}

/// A structure to evaluate pair contributions
/// $`\mathbf{C}_{ij} = \sum_{\mathbf{G} \neq \mathbf{0}} |\rho_{ij}(\mathbf{G})|^2
/// \mathbf{T}(\mathbf{G})`$ on the CPU.
///
/// The $`\mathbf{G}`$-sum is split into fixed-size chunks in storage order. Chunks are contracted
/// in parallel and their partial sums are then added in chunk order, so that results are
/// reproducible bit for bit regardless of the number of threads.
#[derive(Clone, Debug)]
pub struct PairContributionReducer<'a> {
    /// The dipolar kernel.
    kernel: &'a DipoleKernel,

    /// The number of $`\mathbf{G}`$-vectors per chunk.
    chunk_size: usize,
}

impl<'a> PairContributionReducer<'a> {
    /// Creates a reducer with the default chunk size.
    pub fn new(kernel: &'a DipoleKernel) -> Self {
        Self::with_chunk_size(kernel, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a reducer with a given chunk size (at least one).
    pub fn with_chunk_size(kernel: &'a DipoleKernel, chunk_size: usize) -> Self {
        Self {
            kernel,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Returns the kernel used by this reducer.
    pub fn kernel(&self) -> &'a DipoleKernel {
        self.kernel
    }

    /// Evaluates the contribution of one pair density.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the density was built on a grid other than the
    /// kernel's.
    pub fn contribution(
        &self,
        density: &PairDensity,
        mode: SumMode,
    ) -> Result<SymmetricTensor, ZfsError> {
        self.kernel.check_compatible(density.fingerprint())?;
        let n = density.len();
        if n != self.kernel.len() {
            return Err(ZfsError::configuration(format!(
                "The pair density has {n} values, but the dipolar kernel covers {} G-vectors.",
                self.kernel.len()
            )));
        }

        let values = density.values();
        let table = self.kernel.table();
        let weights = self.kernel.weights();
        let chunk_size = self.chunk_size;
        let n_chunks = (n + chunk_size - 1) / chunk_size;

        let partials = (0..n_chunks)
            .into_par_iter()
            .map(|chunk| {
                let start = chunk * chunk_size;
                let end = (start + chunk_size).min(n);
                let mut acc = [0.0; 6];
                for k in start..end {
                    let w = match mode {
                        SumMode::Full => 1.0,
                        SumMode::HalfSpace => weights[k],
                    };
                    if w == 0.0 {
                        continue;
                    }
                    let m = w * values[k].norm_sqr();
                    acc.iter_mut()
                        .zip(table.row(k).iter())
                        .for_each(|(a, t)| *a += m * t);
                }
                SymmetricTensor::new(acc)
            })
            .collect::<Vec<_>>();

        Ok(Self::accumulate(partials))
    }

    /// Sums tensors in iteration order.
    pub fn accumulate<I>(contributions: I) -> SymmetricTensor
    where
        I: IntoIterator<Item = SymmetricTensor>,
    {
        contributions.into_iter().sum()
    }
}
