//! # QZFS: Spin-Spin Zero-Field Splitting from Plane-Wave Orbitals
//!
//! QZFS is a program for computing the spin-spin contribution to the zero-field-splitting (ZFS)
//! tensor of high-spin systems from Kohn-Sham orbitals sampled on a periodic real-space grid,
//! written in Rust. Its capabilities include:
//! - evaluation of the dipolar spin-spin tensor
//!   ```math
//!   \mathbf{D} = p(\Omega) \sum_{\sigma} \sum_{i < j \in \sigma} \sum_{\mathbf{G} \neq \mathbf{0}}
//!       |\rho_{ij}(\mathbf{G})|^2 \, \mathbf{T}(\mathbf{G})
//!   ```
//!   over all same-spin pairs of occupied orbitals,
//! - distribution of the pair sum over a process group (threads or MPI ranks) with a single
//!   collective reduction,
//! - optional GPU contraction of pair densities in double precision, and
//! - diagonalisation of the traceless tensor into the axial and rhombic parameters $`D`$ and $`E`$,
//!   reported in Hartree, MHz and cm⁻¹.
//!
//! This documentation details the public API of the `qzfs` crate.
//!
//! ## Getting started
//!
//! To use QZFS in your Rust project, simply add this crate to your project's `Cargo.toml`. The
//! available features defined by this crate are:
//!
//! ### Acceleration
//! - `gpu`: Enables the GPU contraction backend via [`wgpu`](https://docs.rs/wgpu). The backend
//!   requires an adapter supporting 64-bit floating-point shaders; otherwise the standard backend is
//!   used and a diagnostic is recorded.
//!
//! ### Distribution
//! - `mpi`: Enables distribution of orbital pairs over MPI ranks. This requires an MPI
//!   implementation to be installed in the system.
//!
//! ### Composite
//! - `full`: Enables the `gpu` and `mpi` features
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. For usage of the compiled `qzfs` binary, run `qzfs --help` and consult the input
//! files under `tests/input`.
//!
//! ## Units
//!
//! All quantities are in Hartree atomic units unless stated otherwise. Conversions for reporting
//! are collected in [`units`].

pub mod auxiliary;
pub mod drivers;
pub mod interfaces;
pub mod io;
pub mod target;
pub mod units;
pub mod zfs;
