//! QZFS interface with raw binary wavefunction files.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, Context};
use byteorder::{BigEndian, LittleEndian};
use derive_builder::Builder;
use log;
use nalgebra::Matrix3;
use ndarray::Array3;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::grid::GridGeometry;
use crate::drivers::zfs_calculation::{
    ZfsCalculationDriver, ZfsCalculationParams, ZfsCalculationResult,
};
use crate::drivers::QZfsDriver;
use crate::interfaces::input::WavefunctionSourceHandle;
use crate::io::numeric::read_complex_grid;
use crate::target::orbital::{Orbital, OrbitalSet, Representation, SpinChannel};
use crate::units::angstrom_to_bohr;
use crate::zfs::dispatch::ProcessGroup;

#[cfg(test)]
#[path = "binaries_tests.rs"]
mod binaries_tests;

type C128 = Complex<f64>;

// ================
// Enum definitions
// ================

/// Enumerated type indicating the byte order of numerical values in binary files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

/// Enumerated type indicating the unit in which cell vectors are given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    #[default]
    Bohr,
    Angstrom,
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthUnit::Bohr => write!(f, "bohr"),
            LengthUnit::Angstrom => write!(f, "Å"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// Serialisable/deserialisable structure describing one orbital stored in a raw binary file.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinariesOrbitalEntry {
    /// The spin channel of the orbital.
    pub spin: SpinChannel,

    /// The band index of the orbital.
    pub band: usize,

    /// The occupation of the orbital.
    #[builder(default = "1.0")]
    #[serde(default = "default_occupation")]
    pub occupation: f64,

    /// Path to a binary file containing the complex coefficients of the orbital, each as a real
    /// part followed by an imaginary part, row-major over the grid.
    pub path: PathBuf,
}

impl BinariesOrbitalEntry {
    /// Returns a builder to construct a [`BinariesOrbitalEntry`].
    pub fn builder() -> BinariesOrbitalEntryBuilder {
        BinariesOrbitalEntryBuilder::default()
    }
}

fn default_occupation() -> f64 {
    1.0
}

/// Serialisable/deserialisable structure containing control parameters for acquiring
/// Kohn-Sham orbitals sampled on a periodic grid from raw binary files.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct BinariesWavefunctionSource {
    /// The three cell vectors, one per row.
    pub cell: [[f64; 3]; 3],

    /// The unit of the cell vectors.
    #[builder(default)]
    #[serde(default)]
    pub length_unit: LengthUnit,

    /// The number of grid points along each cell vector.
    pub shape: [usize; 3],

    /// The representation in which the coefficients are stored.
    #[builder(default = "Representation::RealSpace")]
    #[serde(default = "default_representation")]
    pub representation: Representation,

    /// Specification of the byte order numerical values are stored in binary files.
    #[builder(default)]
    #[serde(default)]
    pub byte_order: ByteOrder,

    /// The orbitals to be read in.
    pub orbitals: Vec<BinariesOrbitalEntry>,
}

fn default_representation() -> Representation {
    Representation::RealSpace
}

impl BinariesWavefunctionSourceBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(shape) = self.shape {
            if shape.iter().any(|&n| n == 0) {
                return Err(format!("Invalid grid shape: {shape:?}."));
            }
        }
        if let Some(orbitals) = self.orbitals.as_ref() {
            if orbitals.is_empty() {
                return Err("No orbitals specified.".to_string());
            }
        }
        Ok(())
    }
}

impl BinariesWavefunctionSource {
    /// Returns a builder to construct a structure for handling binaries wavefunction source.
    pub fn builder() -> BinariesWavefunctionSourceBuilder {
        BinariesWavefunctionSourceBuilder::default()
    }

    /// Returns the cell vectors as rows, in bohr.
    pub fn cell_in_bohr(&self) -> Matrix3<f64> {
        let cell = Matrix3::from_fn(|i, j| self.cell[i][j]);
        match self.length_unit {
            LengthUnit::Bohr => cell,
            LengthUnit::Angstrom => cell.map(angstrom_to_bohr),
        }
    }

    /// Constructs the grid geometry described by this source.
    pub fn grid(&self) -> Result<GridGeometry, anyhow::Error> {
        GridGeometry::new(self.cell_in_bohr(), self.shape).with_context(|| {
            "Unable to construct the grid geometry when handling binaries wavefunction source"
        })
    }

    /// Reads in the orbitals of this source whose occupations exceed a threshold.
    ///
    /// Entries at or below the threshold are skipped without their files being read.
    ///
    /// # Arguments
    ///
    /// * `occupation_threshold` - The occupation above which an orbital is read in.
    pub fn orbitals(&self, occupation_threshold: f64) -> Result<Vec<Orbital>, anyhow::Error> {
        let n_skipped = self
            .orbitals
            .iter()
            .filter(|entry| entry.occupation <= occupation_threshold)
            .count();
        if n_skipped > 0 {
            log::debug!(
                "{n_skipped} orbital file(s) with occupations at or below {occupation_threshold} skipped."
            );
        }
        self.orbitals
            .iter()
            .filter(|entry| entry.occupation > occupation_threshold)
            .map(|entry| {
                let coefficients = self.read_coefficients(&entry.path).with_context(|| {
                    format!(
                        "Unable to read orbital {}{} from `{}` when handling binaries wavefunction source",
                        entry.spin,
                        entry.band,
                        entry.path.display()
                    )
                })?;
                Orbital::new(
                    entry.spin,
                    entry.band,
                    entry.occupation,
                    self.representation,
                    coefficients,
                )
                .map_err(anyhow::Error::from)
            })
            .collect::<Result<Vec<_>, _>>()
    }

    fn read_coefficients(&self, path: &Path) -> Result<Array3<C128>, anyhow::Error> {
        match self.byte_order {
            ByteOrder::LittleEndian => read_complex_grid::<LittleEndian, _>(path, self.shape),
            ByteOrder::BigEndian => read_complex_grid::<BigEndian, _>(path, self.shape),
        }
    }
}

impl WavefunctionSourceHandle for BinariesWavefunctionSource {
    type Outcome = ZfsCalculationResult;

    fn wavefunction_source_handle(
        &self,
        zfs_params: &ZfsCalculationParams,
        process_group: &dyn ProcessGroup,
    ) -> Result<Self::Outcome, anyhow::Error> {
        let grid = self.grid()?;
        let orbitals = self.orbitals(zfs_params.occupation_threshold)?;
        let set = OrbitalSet::new(
            &grid,
            orbitals,
            zfs_params.memory_mode,
            zfs_params.occupation_threshold,
        )
        .with_context(|| "Unable to construct an orbital set when handling binaries wavefunction source")?;

        let mut zfs_driver = ZfsCalculationDriver::builder()
            .parameters(zfs_params)
            .orbital_set(&set)
            .process_group(process_group)
            .build()
            .with_context(|| {
                "Unable to construct a ZFS calculation driver when handling binaries wavefunction source"
            })?;
        zfs_driver.run().with_context(|| {
            "Unable to execute the ZFS calculation driver successfully when handling binaries wavefunction source"
        })?;
        zfs_driver
            .result()
            .with_context(|| {
                "Unable to retrieve the ZFS calculation result when handling binaries wavefunction source"
            })
            .cloned()
    }
}
