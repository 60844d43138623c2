//! Per-process numeric backends for contracting pair densities with the dipolar kernel.

use std::fmt;

use log;
use serde::{Deserialize, Serialize};

use crate::target::tensor::SymmetricTensor;
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::pair_density::PairDensity;
use crate::zfs::reducer::{PairContributionReducer, SumMode, DEFAULT_CHUNK_SIZE};
use crate::zfs::{ZfsDiagnostic, ZfsError};

#[cfg(feature = "gpu")]
pub mod gpu;


// =================
// Enum definitions
// =================

/// An enumerated type for the available contraction backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Multi-threaded CPU contraction.
    #[default]
    Standard,

    /// GPU contraction in double precision.
    Gpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Standard => write!(f, "standard"),
            BackendKind::Gpu => write!(f, "gpu"),
        }
    }
}

// =================
// Trait definitions
// =================

/// Trait for numeric backends that evaluate pair contributions
/// $`\mathbf{C}_{ij} = \sum_{\mathbf{G} \neq \mathbf{0}} |\rho_{ij}(\mathbf{G})|^2
/// \mathbf{T}(\mathbf{G})`$.
///
/// A backend is chosen once per process before the pair loop and is never changed afterwards.
pub trait ContractionBackend: Send + Sync {
    /// Returns the kind of this backend.
    fn kind(&self) -> BackendKind;

    /// Returns a short human-readable description of this backend.
    fn description(&self) -> String;

    /// Prepares the backend for contractions with `kernel`. Called once before the pair loop.
    fn prepare(&self, _kernel: &DipoleKernel) -> Result<(), ZfsError> {
        Ok(())
    }

    /// Evaluates the contribution of one pair density.
    fn contract(
        &self,
        density: &PairDensity,
        kernel: &DipoleKernel,
        mode: SumMode,
    ) -> Result<SymmetricTensor, ZfsError>;
}

// ==================
// Struct definitions
// ==================

/// The standard backend, contracting on the CPU with [`PairContributionReducer`].
#[derive(Clone, Debug)]
pub struct StandardBackend {
    /// The number of $`\mathbf{G}`$-vectors per parallel task.
    chunk_size: usize,
}

impl StandardBackend {
    /// Creates a standard backend with the default chunk size.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Creates a standard backend with a given chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for StandardBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractionBackend for StandardBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Standard
    }

    fn description(&self) -> String {
        format!(
            "CPU ({} rayon thread(s), {} G-vectors per task)",
            rayon::current_num_threads(),
            self.chunk_size
        )
    }

    fn contract(
        &self,
        density: &PairDensity,
        kernel: &DipoleKernel,
        mode: SumMode,
    ) -> Result<SymmetricTensor, ZfsError> {
        PairContributionReducer::with_chunk_size(kernel, self.chunk_size).contribution(density, mode)
    }
}

// =========
// Functions
// =========

/// Selects the backend for a process.
///
/// If the requested backend cannot be used, the standard backend is returned together with a
/// [`ZfsDiagnostic::BackendUnavailable`] explaining why.
///
/// # Arguments
///
/// * `kind` - The requested backend.
/// * `rank` - The rank of this process, used to spread processes over GPU adapters.
pub fn select_backend(
    kind: BackendKind,
    rank: usize,
) -> (Box<dyn ContractionBackend>, Option<ZfsDiagnostic>) {
    match kind {
        BackendKind::Standard => (Box::new(StandardBackend::new()), None),
        BackendKind::Gpu => match gpu_backend(rank) {
            Ok(backend) => {
                log::debug!("Rank {rank}: GPU backend selected ({}).", backend.description());
                (backend, None)
            }
            Err(reason) => {
                log::info!(
                    "Rank {rank}: GPU backend unavailable ({reason}); using the standard backend."
                );
                (
                    Box::new(StandardBackend::new()),
                    Some(ZfsDiagnostic::BackendUnavailable {
                        requested: kind.to_string(),
                        reason,
                    }),
                )
            }
        },
    }
}

#[cfg(feature = "gpu")]
fn gpu_backend(rank: usize) -> Result<Box<dyn ContractionBackend>, String> {
    gpu::GpuBackend::new(rank).map(|backend| Box::new(backend) as Box<dyn ContractionBackend>)
}

#[cfg(not(feature = "gpu"))]
fn gpu_backend(_rank: usize) -> Result<Box<dyn ContractionBackend>, String> {
    Err("this build does not include the `gpu` feature".to_string())
}
