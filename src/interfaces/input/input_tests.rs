use std::path::PathBuf;

use tempfile::tempdir;

use crate::interfaces::binaries::{ByteOrder, LengthUnit};
use crate::io::{read_qzfs_yaml, write_qzfs_yaml, QZfsFileType};
use crate::target::orbital::{MemoryMode, Representation, SpinChannel};
use crate::zfs::backend::BackendKind;
use crate::zfs::dispatch::PartitionScheme;

use super::{Input, WavefunctionSource};

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[test]
fn test_interfaces_input_binaries() {
    let name = format!("{ROOT}/tests/input/test_input_binaries.yml");
    let inp = read_qzfs_yaml::<Input, _>(&name).unwrap();

    let WavefunctionSource::Binaries(source) = &inp.wavefunction;
    assert_eq!(source.length_unit, LengthUnit::Angstrom);
    assert_eq!(source.shape, [48, 48, 48]);
    assert_eq!(source.representation, Representation::ReciprocalSpace);
    assert_eq!(source.byte_order, ByteOrder::BigEndian);
    assert_eq!(source.orbitals.len(), 3);
    assert_eq!(source.orbitals[1].band, 127);
    assert_eq!(source.orbitals[1].occupation, 1.0);
    assert_eq!(source.orbitals[2].spin, SpinChannel::Down);
    assert_eq!(source.orbitals[2].path, PathBuf::from("nv/down_125"));

    let zfs = &inp.zfs;
    assert_eq!(zfs.backend, BackendKind::Gpu);
    assert_eq!(zfs.partition_scheme, PartitionScheme::RoundRobin);
    assert_eq!(zfs.memory_mode, MemoryMode::Critical);
    assert_eq!(zfs.occupation_threshold, 0.5);
    assert_eq!(zfs.trace_tolerance, 1e-5);
    assert!(!zfs.use_half_space);
    assert!(zfs.write_pair_contributions);
    assert_eq!(zfs.result_save_name, Some(PathBuf::from("nv_minus")));
}

#[test]
fn test_interfaces_input_binaries_defaults() {
    let name = format!("{ROOT}/tests/input/test_input_binaries_defaults.yml");
    let inp = read_qzfs_yaml::<Input, _>(&name).unwrap();

    let WavefunctionSource::Binaries(source) = &inp.wavefunction;
    assert_eq!(source.length_unit, LengthUnit::Bohr);
    assert_eq!(source.representation, Representation::RealSpace);
    assert_eq!(source.byte_order, ByteOrder::LittleEndian);
    assert_eq!(source.orbitals[0].occupation, 1.0);

    let zfs = &inp.zfs;
    assert_eq!(zfs.backend, BackendKind::Standard);
    assert_eq!(zfs.partition_scheme, PartitionScheme::Contiguous);
    assert_eq!(zfs.memory_mode, MemoryMode::High);
    assert_eq!(zfs.occupation_threshold, 0.8);
    assert!(zfs.use_half_space);
    assert!(!zfs.write_pair_contributions);
    assert!(zfs.result_save_name.is_none());
}

#[test]
fn test_interfaces_input_default_written() {
    let dir = tempdir().unwrap();
    let name = dir.path().join("template");
    write_qzfs_yaml(&name, QZfsFileType::Report, &Input::default()).unwrap();
    let inp = read_qzfs_yaml::<Input, _>(QZfsFileType::Report.path(&name)).unwrap();

    let WavefunctionSource::Binaries(source) = &inp.wavefunction;
    assert_eq!(source.shape, [32, 32, 32]);
    assert_eq!(source.orbitals.len(), 2);
    assert_eq!(inp.zfs.backend, BackendKind::Standard);
}
