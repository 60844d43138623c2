use std::f64::consts::PI;

use approx;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use num_complex::Complex;

use crate::auxiliary::grid::GridGeometry;
use crate::target::orbital::{MemoryMode, Orbital, OrbitalSet, Representation, SpinChannel};
use crate::target::tensor::SymmetricTensor;
use crate::zfs::backend::StandardBackend;
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::dispatch::{ParallelDispatcher, SingleProcess};
use crate::zfs::finaliser::{dipolar_prefactor, TensorFinaliser};
use crate::zfs::reducer::SumMode;
use crate::zfs::{ZfsDiagnostic, ZfsError};

type C128 = Complex<f64>;

#[test]
fn test_finaliser_symmetric_traceless() {
    let raw = SymmetricTensor::new([0.3, -1.2, 0.4, 2.1, 0.05, -0.7]);
    let result = TensorFinaliser::new(1.0).unwrap().finalise_raw(&raw).unwrap();
    let t = result.tensor().to_matrix();
    assert_eq!(t, t.transpose());
    approx::assert_relative_eq!(t.trace(), 0.0, epsilon = 1e-14);

    // The eigensystem reproduces the tensor.
    let v = result.eigenvectors();
    let lambda = Matrix3::from_diagonal(&Vector3::from(*result.eigenvalues()));
    approx::assert_relative_eq!(v * lambda * v.transpose(), t, epsilon = 1e-12);
    approx::assert_relative_eq!(v.transpose() * v, Matrix3::identity(), epsilon = 1e-12);

    let [x, y, z] = *result.eigenvalues();
    assert!(z.abs() >= x.abs() && x.abs() >= y.abs());
    approx::assert_relative_eq!(result.d(), 1.5 * z);
    approx::assert_relative_eq!(result.e(), 0.5 * (x - y));
}

#[test]
fn test_finaliser_idempotent() {
    let finaliser = TensorFinaliser::default();
    let raw = SymmetricTensor::new([-0.4, 0.25, -0.1, 0.9, 0.3, -0.5]);
    let first = finaliser.finalise_raw(&raw).unwrap();
    let second = finaliser.finalise_raw(first.tensor()).unwrap();
    approx::assert_relative_eq!(first.tensor(), second.tensor(), epsilon = 1e-15);
    approx::assert_relative_eq!(first.d(), second.d(), epsilon = 1e-14);
    approx::assert_relative_eq!(first.e(), second.e(), epsilon = 1e-14);
    assert!(second.diagnostics().is_empty());
}

#[test]
fn test_finaliser_axial() {
    let raw = SymmetricTensor::new([-1.0, 0.0, 0.0, -1.0, 0.0, 2.0]);
    let result = TensorFinaliser::default().finalise_raw(&raw).unwrap();
    approx::assert_relative_eq!(result.d(), 3.0, epsilon = 1e-14);
    approx::assert_relative_eq!(result.e(), 0.0, epsilon = 1e-14);
    approx::assert_relative_eq!(
        result.eigenvector(2).z.abs(),
        1.0,
        epsilon = 1e-14
    );
    assert_eq!(result.trace_residual(), 0.0);
    assert!(result.diagnostics().is_empty());
}

#[test]
fn test_finaliser_numerical_warning() {
    let raw = SymmetricTensor::new([1.0, 0.0, 0.0, 1.2, 0.0, 1.1]);
    let result = TensorFinaliser::default().finalise_raw(&raw).unwrap();
    approx::assert_relative_eq!(result.tensor().trace(), 0.0, epsilon = 1e-14);
    assert!(result.trace_residual() > 1.0);
    assert!(matches!(
        result.diagnostics(),
        [ZfsDiagnostic::NumericalWarning { .. }]
    ));

    let relaxed = TensorFinaliser::new(10.0).unwrap().finalise_raw(&raw).unwrap();
    assert!(relaxed.diagnostics().is_empty());
}

#[test]
fn test_finaliser_prefactor() {
    approx::assert_relative_eq!(
        dipolar_prefactor(640.0),
        -8.733452863780426e-08,
        max_relative = 1e-12
    );
    let raw = SymmetricTensor::new([-1.0, 0.0, 0.0, -1.0, 0.0, 2.0]);
    let result = TensorFinaliser::default().finalise(&raw, 640.0).unwrap();
    approx::assert_relative_eq!(result.prefactor(), dipolar_prefactor(640.0));
    approx::assert_relative_eq!(
        result.d(),
        3.0 * dipolar_prefactor(640.0),
        max_relative = 1e-12
    );
    assert_eq!(result.raw(), &raw);
}

#[test]
fn test_finaliser_invalid() {
    assert!(matches!(
        TensorFinaliser::new(-1.0),
        Err(ZfsError::Configuration(_))
    ));
    let raw = SymmetricTensor::new([1.0, 0.0, 0.0, 1.0, 0.0, -2.0]);
    let finaliser = TensorFinaliser::default();
    assert!(matches!(
        finaliser.finalise(&raw, 0.0),
        Err(ZfsError::Configuration(_))
    ));
    let nan = SymmetricTensor::new([f64::NAN, 0.0, 0.0, 1.0, 0.0, -2.0]);
    assert!(matches!(
        finaliser.finalise_raw(&nan),
        Err(ZfsError::Configuration(_))
    ));
}

/// Two spin-up orbitals on an 8 × 8 × 10 bohr cell: a constant orbital and a mixture of cosine
/// waves along x and z with weights 0.3 and 0.7. The pair density lives on ±b1 and ±b3 only.
#[test]
fn test_finaliser_two_orbital_regression() {
    let grid = GridGeometry::new(Matrix3::new(8.0, 0.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 10.0), [4, 4, 6])
        .unwrap();
    let kernel = DipoleKernel::new(&grid);
    let [n1, _, n3] = grid.shape();
    let constant = Array3::from_elem((4, 4, 6), C128::new(1.0, 0.0));
    let mixed = Array3::from_shape_fn((4, 4, 6), |(i, _, k)| {
        let x = (2.0 * PI * i as f64 / n1 as f64).cos();
        let z = (2.0 * PI * k as f64 / n3 as f64).cos();
        C128::new(0.3f64.sqrt() * x + 0.7f64.sqrt() * z, 0.0)
    });
    let orbitals = vec![
        Orbital::new(SpinChannel::Up, 0, 1.0, Representation::RealSpace, constant).unwrap(),
        Orbital::new(SpinChannel::Up, 1, 1.0, Representation::RealSpace, mixed).unwrap(),
    ];
    let set = OrbitalSet::new(&grid, orbitals, MemoryMode::High, 0.8).unwrap();
    let backend = StandardBackend::new();
    let outcome = ParallelDispatcher::builder()
        .kernel(&kernel)
        .backend(&backend)
        .build()
        .unwrap()
        .dispatch(&set, &SingleProcess)
        .unwrap();
    assert_eq!(outcome.sum_mode, SumMode::HalfSpace);
    approx::assert_relative_eq!(
        outcome.total,
        SymmetricTensor::new([-0.1, 0.0, 0.0, -1.0, 0.0, 1.1]),
        epsilon = 1e-12
    );

    let result = TensorFinaliser::default()
        .finalise(&outcome.total, grid.volume())
        .unwrap();
    approx::assert_relative_eq!(result.d(), -1.4410197225237702e-07, max_relative = 1e-9);
    approx::assert_relative_eq!(result.e(), 3.930053788701192e-08, max_relative = 1e-9);
    approx::assert_relative_eq!(result.eigenvector(2).z.abs(), 1.0, epsilon = 1e-10);
    approx::assert_relative_eq!(result.eigenvector(0).y.abs(), 1.0, epsilon = 1e-10);
    assert!(result.diagnostics().is_empty());
}
