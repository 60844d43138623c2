use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use approx;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use num_complex::Complex;
use tempfile::tempdir;

use crate::drivers::zfs_calculation::ZfsCalculationParams;
use crate::interfaces::input::WavefunctionSourceHandle;
use crate::target::orbital::{Representation, SpinChannel};
use crate::units::BOHR_TO_ANGSTROM;
use crate::zfs::dispatch::SingleProcess;

use super::{BinariesOrbitalEntry, BinariesWavefunctionSource, ByteOrder, LengthUnit};

type C128 = Complex<f64>;

fn write_orbital<P: AsRef<Path>>(path: P, values: &[C128], byte_order: ByteOrder) {
    let mut writer = BufWriter::new(File::create(path).unwrap());
    for v in values {
        match byte_order {
            ByteOrder::LittleEndian => {
                writer.write_f64::<LittleEndian>(v.re).unwrap();
                writer.write_f64::<LittleEndian>(v.im).unwrap();
            }
            ByteOrder::BigEndian => {
                writer.write_f64::<BigEndian>(v.re).unwrap();
                writer.write_f64::<BigEndian>(v.im).unwrap();
            }
        }
    }
    writer.flush().unwrap();
}

fn two_orbital_values() -> (Vec<C128>, Vec<C128>) {
    let constant = vec![C128::new(1.0, 0.0); 4 * 4 * 6];
    let mut mixed = Vec::with_capacity(4 * 4 * 6);
    for i in 0..4 {
        for _ in 0..4 {
            for k in 0..6 {
                let x = (2.0 * PI * i as f64 / 4.0).cos();
                let z = (2.0 * PI * k as f64 / 6.0).cos();
                mixed.push(C128::new(0.3f64.sqrt() * x + 0.7f64.sqrt() * z, 0.0));
            }
        }
    }
    (constant, mixed)
}

#[test]
fn test_interfaces_binaries_read_orbitals() {
    let dir = tempdir().unwrap();
    let values = (0..24)
        .map(|i| C128::new(i as f64, -(i as f64) * 0.5))
        .collect::<Vec<_>>();
    let path = dir.path().join("up_7");
    write_orbital(&path, &values, ByteOrder::BigEndian);

    let source = BinariesWavefunctionSource::builder()
        .cell([[6.0, 0.0, 0.0], [0.0, 6.0, 0.0], [0.0, 0.0, 6.0]])
        .shape([2, 3, 4])
        .byte_order(ByteOrder::BigEndian)
        .orbitals(vec![BinariesOrbitalEntry::builder()
            .spin(SpinChannel::Up)
            .band(7)
            .path(path.clone())
            .build()
            .unwrap()])
        .build()
        .unwrap();
    assert_eq!(source.representation, Representation::RealSpace);

    let orbitals = source.orbitals(0.8).unwrap();
    assert_eq!(orbitals.len(), 1);
    assert_eq!(orbitals[0].band(), 7);
    approx::assert_relative_eq!(orbitals[0].occupation(), 1.0);
    let coefficients = orbitals[0].coefficients();
    assert_eq!(coefficients.shape(), &[2, 3, 4]);

    // Coefficients are normalised on the grid but keep their row-major layout.
    let ratio = coefficients[[1, 2, 3]] / coefficients[[0, 0, 1]];
    approx::assert_relative_eq!(ratio.re, 23.0, epsilon = 1e-12);
    approx::assert_relative_eq!(ratio.im, 0.0, epsilon = 1e-12);

    // Reading with the wrong byte order or the wrong shape fails.
    let mut wrong_shape = source.clone();
    wrong_shape.shape = [2, 3, 5];
    assert!(wrong_shape.orbitals(0.8).is_err());
    let mut missing = source.clone();
    missing.orbitals[0].path = dir.path().join("missing");
    assert!(missing.orbitals(0.8).is_err());
}

#[test]
fn test_interfaces_binaries_cell_units() {
    let source = BinariesWavefunctionSource::builder()
        .cell([[BOHR_TO_ANGSTROM, 0.0, 0.0], [0.0, 2.0 * BOHR_TO_ANGSTROM, 0.0], [0.0, 0.0, 1.0]])
        .length_unit(LengthUnit::Angstrom)
        .shape([2, 2, 2])
        .orbitals(vec![BinariesOrbitalEntry::builder()
            .spin(SpinChannel::Down)
            .band(0)
            .path("unused".into())
            .build()
            .unwrap()])
        .build()
        .unwrap();
    let cell = source.cell_in_bohr();
    approx::assert_relative_eq!(cell[(0, 0)], 1.0, epsilon = 1e-12);
    approx::assert_relative_eq!(cell[(1, 1)], 2.0, epsilon = 1e-12);
    approx::assert_relative_eq!(cell[(2, 2)], 1.0 / BOHR_TO_ANGSTROM, epsilon = 1e-12);
    approx::assert_relative_eq!(
        source.grid().unwrap().volume(),
        2.0 / BOHR_TO_ANGSTROM,
        epsilon = 1e-10
    );

    assert!(BinariesWavefunctionSource::builder()
        .cell([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
        .shape([2, 0, 2])
        .orbitals(vec![])
        .build()
        .is_err());
}

#[test]
fn test_interfaces_binaries_two_orbitals() {
    let dir = tempdir().unwrap();
    let (constant, mixed) = two_orbital_values();
    let constant_path = dir.path().join("up_0");
    let mixed_path = dir.path().join("up_1");
    let empty_path = dir.path().join("up_2");
    write_orbital(&constant_path, &constant, ByteOrder::LittleEndian);
    write_orbital(&mixed_path, &mixed, ByteOrder::LittleEndian);
    // Unoccupied bands are never read, so a zero-norm or absent file does not matter.
    write_orbital(&empty_path, &vec![C128::new(0.0, 0.0); 4 * 4 * 6], ByteOrder::LittleEndian);
    let absent_path = dir.path().join("up_3");

    let entry = |band: usize, occupation: f64, path: &Path| {
        BinariesOrbitalEntry::builder()
            .spin(SpinChannel::Up)
            .band(band)
            .occupation(occupation)
            .path(path.to_path_buf())
            .build()
            .unwrap()
    };
    let source = BinariesWavefunctionSource::builder()
        .cell([[8.0, 0.0, 0.0], [0.0, 8.0, 0.0], [0.0, 0.0, 10.0]])
        .shape([4, 4, 6])
        .orbitals(vec![
            entry(0, 1.0, &constant_path),
            entry(1, 1.0, &mixed_path),
            entry(2, 0.0, &empty_path),
            entry(3, 0.5, &absent_path),
        ])
        .build()
        .unwrap();

    assert_eq!(source.orbitals(0.8).unwrap().len(), 2);
    assert!(source.orbitals(0.0).is_err());

    let params = ZfsCalculationParams::default();
    let result = source
        .wavefunction_source_handle(&params, &SingleProcess)
        .unwrap();
    assert_eq!(result.n_pairs, 1);
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
}
