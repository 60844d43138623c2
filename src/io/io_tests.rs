use std::path::PathBuf;

use tempfile::tempdir;

use crate::io::{
    read_qzfs_binary, read_qzfs_yaml, write_qzfs_binary, write_qzfs_yaml, QZfsFileType,
};
use crate::target::tensor::SymmetricTensor;

#[test]
fn test_io_file_type_path() {
    assert_eq!(
        QZfsFileType::Pairs.path("runs/nv.minus"),
        PathBuf::from("runs/nv.minus.qzfs.pairs")
    );
    assert_eq!(
        QZfsFileType::Report.path("nv"),
        PathBuf::from("nv.qzfs.yml")
    );
}

#[test]
fn test_io_binary_and_yaml() {
    let dir = tempdir().unwrap();
    let name = dir.path().join("pairs");
    let tensors = vec![
        SymmetricTensor::new([1.0, 0.5, 0.0, -2.0, 0.25, 1.0]),
        SymmetricTensor::new([-0.125, 0.0, 3.0, 0.0, 0.0, 0.125]),
    ];

    write_qzfs_binary(&name, QZfsFileType::Pairs, &tensors).unwrap();
    let read: Vec<SymmetricTensor> = read_qzfs_binary(&name, QZfsFileType::Pairs).unwrap();
    assert_eq!(read, tensors);

    write_qzfs_yaml(&name, QZfsFileType::Report, &tensors).unwrap();
    let read: Vec<SymmetricTensor> =
        read_qzfs_yaml(QZfsFileType::Report.path(&name)).unwrap();
    assert_eq!(read, tensors);

    assert!(read_qzfs_binary::<Vec<SymmetricTensor>, _>(
        dir.path().join("missing"),
        QZfsFileType::Pairs
    )
    .is_err());
}
