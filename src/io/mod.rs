//! Reading and writing of QZFS files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{self, format_err};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;
pub(crate) mod numeric;

#[cfg(test)]
#[path = "io_tests.rs"]
mod io_tests;

/// An enumerated type for `QZFS` file types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QZfsFileType {
    /// Variant for YAML files containing zero-field-splitting reports.
    Report,

    /// Variant for binary files containing per-pair tensor contributions.
    Pairs,
}

impl QZfsFileType {
    /// Returns the extension of the file type.
    pub fn ext(&self) -> String {
        match self {
            QZfsFileType::Report => "qzfs.yml".to_string(),
            QZfsFileType::Pairs => "qzfs.pairs".to_string(),
        }
    }

    /// Returns the path of a file of this type with a given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the file (without `QZFS`-specific extensions).
    pub fn path<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        let mut path = name.as_ref().as_os_str().to_owned();
        path.push(".");
        path.push(self.ext());
        PathBuf::from(path)
    }
}

/// Reads a `QZFS` binary file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (without `QZFS`-specific extensions).
/// * `file_type` - The type of the `QZFS` file to be read in.
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_qzfs_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: QZfsFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let path = file_type.path(name);
    let mut reader = BufReader::new(File::open(path).map_err(|err| format_err!(err))?);
    bincode::deserialize_from(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into a `QZFS` binary file.
///
/// # Arguments
///
/// * `name` - The name of the file to be written (without `QZFS`-specific extensions).
/// * `file_type` - The type of the `QZFS` file to be written.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_qzfs_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: QZfsFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let path = file_type.path(name);
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value).map_err(|err| format_err!(err))
}

/// Reads a YAML file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (with its `.yml` or `.yaml` extension).
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_qzfs_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(name).map_err(|err| format_err!(err))?);
    serde_yaml::from_reader(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into a `QZFS` YAML file.
///
/// # Arguments
///
/// * `name` - The name of the YAML file to be written (without `QZFS`-specific extensions).
/// * `file_type` - The type of the `QZFS` file to be written.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_qzfs_yaml<T, P: AsRef<Path>>(
    name: P,
    file_type: QZfsFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let path = file_type.path(name);
    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, value).map_err(|err| format_err!(err))
}
