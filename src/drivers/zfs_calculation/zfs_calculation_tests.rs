use std::f64::consts::PI;

use approx;
use env_logger;
use nalgebra::Matrix3;
use ndarray::Array3;
use num_complex::Complex;
use tempfile::tempdir;

use crate::auxiliary::grid::GridGeometry;
use crate::drivers::zfs_calculation::{
    PairContribution, ZfsCalculationDriver, ZfsCalculationParams, ZfsReport,
};
use crate::drivers::QZfsDriver;
use crate::io::{read_qzfs_binary, read_qzfs_yaml, QZfsFileType};
use crate::target::orbital::{MemoryMode, Orbital, OrbitalSet, Representation, SpinChannel};
use crate::target::tensor::SymmetricTensor;
use crate::zfs::backend::BackendKind;
use crate::zfs::dispatch::{PartitionScheme, ThreadGroup};
use crate::zfs::reducer::SumMode;

type C128 = Complex<f64>;

fn regression_grid() -> GridGeometry {
    GridGeometry::new(
        Matrix3::new(8.0, 0.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 10.0),
        [4, 4, 6],
    )
    .unwrap()
}

fn regression_orbitals() -> Vec<Orbital> {
    let constant = Array3::from_elem((4, 4, 6), C128::new(1.0, 0.0));
    let mixed = Array3::from_shape_fn((4, 4, 6), |(i, _, k)| {
        let x = (2.0 * PI * i as f64 / 4.0).cos();
        let z = (2.0 * PI * k as f64 / 6.0).cos();
        C128::new(0.3f64.sqrt() * x + 0.7f64.sqrt() * z, 0.0)
    });
    vec![
        Orbital::new(SpinChannel::Up, 3, 1.0, Representation::RealSpace, constant).unwrap(),
        Orbital::new(SpinChannel::Up, 4, 1.0, Representation::RealSpace, mixed).unwrap(),
    ]
}

#[test]
fn test_drivers_zfs_calculation_params() {
    let params = ZfsCalculationParams::builder().build().unwrap();
    assert_eq!(params.backend, BackendKind::Standard);
    assert_eq!(params.partition_scheme, PartitionScheme::Contiguous);
    assert_eq!(params.memory_mode, MemoryMode::High);
    approx::assert_relative_eq!(params.occupation_threshold, 0.8);
    approx::assert_relative_eq!(params.trace_tolerance, 1e-6);
    assert!(params.use_half_space);
    assert!(!params.write_pair_contributions);
    assert!(params.result_save_name.is_none());

    assert!(ZfsCalculationParams::builder()
        .trace_tolerance(-1.0)
        .build()
        .is_err());
    assert!(ZfsCalculationParams::builder()
        .occupation_threshold(f64::NAN)
        .build()
        .is_err());

    // Missing keys take their default values.
    let params: ZfsCalculationParams =
        serde_yaml::from_str("backend: Gpu\npartition_scheme: RoundRobin\n").unwrap();
    assert_eq!(params.backend, BackendKind::Gpu);
    assert_eq!(params.partition_scheme, PartitionScheme::RoundRobin);
    approx::assert_relative_eq!(params.occupation_threshold, 0.8);
    assert!(params.use_half_space);
}

#[test]
fn test_drivers_zfs_calculation_regression() {
    let _ = env_logger::builder().is_test(true).try_init();
    let grid = regression_grid();
    let set = OrbitalSet::new(&grid, regression_orbitals(), MemoryMode::High, 0.8).unwrap();
    let params = ZfsCalculationParams::builder()
        .write_pair_contributions(true)
        .build()
        .unwrap();
    let mut driver = ZfsCalculationDriver::builder()
        .parameters(&params)
        .orbital_set(&set)
        .build()
        .unwrap();
    assert!(driver.result().is_err());
    assert!(driver.run().is_ok());
    assert!(driver.kernel().is_some());

    let result = driver.result().unwrap();
    assert_eq!(result.n_processes, 1);
    assert_eq!(result.n_pairs, 1);
    assert_eq!(result.sum_mode, SumMode::HalfSpace);
    approx::assert_relative_eq!(result.volume, 640.0, max_relative = 1e-12);
    approx::assert_relative_eq!(result.net_spin, 1.0);
    approx::assert_relative_eq!(
        result.tensor.d(),
        -1.4410197225237702e-07,
        max_relative = 1e-9
    );
    approx::assert_relative_eq!(
        result.tensor.e(),
        3.930053788701192e-08,
        max_relative = 1e-9
    );

    let pairs = result.pair_contributions.as_ref().unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].spin, SpinChannel::Up);
    assert_eq!(pairs[0].bands, (3, 4));
    approx::assert_relative_eq!(
        pairs[0].tensor,
        SymmetricTensor::new([-0.1, 0.0, 0.0, -1.0, 0.0, 1.1]),
        epsilon = 1e-12
    );

    let report = result.report();
    approx::assert_relative_eq!(report.d_mhz, -948.1454297415904, max_relative = 1e-8);
    approx::assert_relative_eq!(report.e_mhz, 258.585117202252, max_relative = 1e-8);
    approx::assert_relative_eq!(
        report.eigenvalues_mhz[2] * 1.5,
        report.d_mhz,
        max_relative = 1e-12
    );
    assert!(report.diagnostics.is_empty());

    let text = result.to_string();
    assert!(text.contains("D = -948.145 MHz"));
    assert!(text.contains("E = +258.585 MHz"));
}

#[test]
fn test_drivers_zfs_calculation_thread_group() {
    let _ = env_logger::builder().is_test(true).try_init();
    let grid = regression_grid();
    let set = OrbitalSet::new(&grid, regression_orbitals(), MemoryMode::Low, 0.8).unwrap();
    let params = ZfsCalculationParams::builder()
        .partition_scheme(PartitionScheme::RoundRobin)
        .memory_mode(MemoryMode::Low)
        .build()
        .unwrap();

    let group = ThreadGroup::new(3).unwrap();
    let results = group.run(|member| {
        let mut driver = ZfsCalculationDriver::builder()
            .parameters(&params)
            .orbital_set(&set)
            .process_group(member)
            .build()
            .unwrap();
        driver.run().unwrap();
        driver.result().unwrap().clone()
    });
    assert_eq!(results.len(), 3);
    for result in results.iter() {
        assert_eq!(result.n_processes, 3);
        approx::assert_relative_eq!(
            result.tensor.d(),
            -1.4410197225237702e-07,
            max_relative = 1e-9
        );
        approx::assert_relative_eq!(
            result.tensor.tensor(),
            results[0].tensor.tensor(),
            epsilon = 1e-20
        );
    }
}

#[test]
fn test_drivers_zfs_calculation_save() {
    let dir = tempdir().unwrap();
    let name = dir.path().join("two_orbitals");
    let grid = regression_grid();
    let set = OrbitalSet::new(&grid, regression_orbitals(), MemoryMode::Critical, 0.8).unwrap();
    let params = ZfsCalculationParams::builder()
        .memory_mode(MemoryMode::Critical)
        .write_pair_contributions(true)
        .result_save_name(Some(name.clone()))
        .build()
        .unwrap();
    let mut driver = ZfsCalculationDriver::builder()
        .parameters(&params)
        .orbital_set(&set)
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();

    let report: ZfsReport = read_qzfs_yaml(QZfsFileType::Report.path(&name)).unwrap();
    assert_eq!(report, result.report());
    assert_eq!(report.n_pairs, 1);

    let pairs: Vec<PairContribution> = read_qzfs_binary(&name, QZfsFileType::Pairs).unwrap();
    assert_eq!(&pairs, result.pair_contributions.as_ref().unwrap());
}

#[test]
fn test_drivers_zfs_calculation_no_pairs() {
    let grid = regression_grid();
    let mut orbitals = regression_orbitals();
    orbitals.truncate(1);
    let set = OrbitalSet::new(&grid, orbitals, MemoryMode::High, 0.8).unwrap();
    let params = ZfsCalculationParams::default();
    let mut driver = ZfsCalculationDriver::builder()
        .parameters(&params)
        .orbital_set(&set)
        .build()
        .unwrap();
    assert!(driver.run().is_err());
    assert!(driver.result().is_err());
}
