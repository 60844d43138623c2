//! The spin–spin zero-field-splitting tensor engine.
//!
//! The engine evaluates
//! ```math
//! \mathbf{D} = p(\Omega) \sum_{\sigma} \sum_{i < j \in \sigma} \sum_{\mathbf{G} \neq \mathbf{0}}
//!     |\rho_{ij}(\mathbf{G})|^2 \, \mathbf{T}(\mathbf{G}),
//! ```
//! where $`\rho_{ij}`$ are the pair densities of same-spin occupied orbitals and
//! $`\mathbf{T}(\mathbf{G})`$ is the reciprocal-space dipolar kernel. The sum over pairs is
//! distributed over a process group and contracted by a per-process numeric backend.

pub mod backend;
pub mod dipole_kernel;
pub mod dispatch;
mod error;
pub mod finaliser;
pub mod pair_density;
pub mod reducer;

pub use error::{ZfsDiagnostic, ZfsError};
