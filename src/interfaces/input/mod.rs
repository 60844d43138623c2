//! YAML input files for QZFS.

use std::path::PathBuf;

use anyhow::{self, Context};
use serde::{Deserialize, Serialize};

use crate::drivers::zfs_calculation::ZfsCalculationParams;
use crate::interfaces::binaries::{
    BinariesOrbitalEntry, BinariesWavefunctionSource, ByteOrder, LengthUnit,
};
use crate::interfaces::InputHandle;
use crate::target::orbital::{Representation, SpinChannel};
use crate::zfs::dispatch::ProcessGroup;

#[cfg(test)]
#[path = "input_tests.rs"]
mod input_tests;

// ==================
// Wavefunction input
// ==================

/// A trait for handling of wavefunction input sources.
pub trait WavefunctionSourceHandle {
    type Outcome;

    /// Handles the wavefunction input source and runs the zero-field-splitting calculation on it.
    ///
    /// # Arguments
    ///
    /// * `zfs_params` - The control parameters for the calculation.
    /// * `process_group` - The process group over which orbital pairs are distributed.
    fn wavefunction_source_handle(
        &self,
        zfs_params: &ZfsCalculationParams,
        process_group: &dyn ProcessGroup,
    ) -> Result<Self::Outcome, anyhow::Error>;
}

/// A serialisable/deserialisable enumerated type representing possible sources of Kohn-Sham
/// orbitals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WavefunctionSource {
    /// Variant representing orbitals stored in raw binary files.
    Binaries(BinariesWavefunctionSource),
}

impl Default for WavefunctionSource {
    fn default() -> Self {
        let entry = |band: usize| BinariesOrbitalEntry {
            spin: SpinChannel::Up,
            band,
            occupation: 1.0,
            path: PathBuf::from(format!("path/to/orbital/up/{band}")),
        };
        WavefunctionSource::Binaries(BinariesWavefunctionSource {
            cell: [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
            length_unit: LengthUnit::Bohr,
            shape: [32, 32, 32],
            representation: Representation::RealSpace,
            byte_order: ByteOrder::LittleEndian,
            orbitals: vec![entry(0), entry(1)],
        })
    }
}

// =====
// Input
// =====

/// A structure containing QZFS input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Specification of the source of the Kohn-Sham orbitals.
    pub wavefunction: WavefunctionSource,

    /// Control parameters for the zero-field-splitting calculation.
    ///
    /// # Default
    ///
    /// If not specified, [`ZfsCalculationParams::default`] will be used.
    #[serde(default)]
    pub zfs: ZfsCalculationParams,
}

impl Default for Input {
    fn default() -> Self {
        Input {
            wavefunction: WavefunctionSource::default(),
            zfs: ZfsCalculationParams::default(),
        }
    }
}

impl InputHandle for Input {
    fn handle(&self, process_group: &dyn ProcessGroup) -> Result<(), anyhow::Error> {
        match &self.wavefunction {
            WavefunctionSource::Binaries(binaries_source) => {
                binaries_source
                    .wavefunction_source_handle(&self.zfs, process_group)
                    .with_context(|| "Unable to handle the binaries wavefunction source")?;
            }
        }
        Ok(())
    }
}
