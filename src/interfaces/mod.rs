//! Interfaces between QZFS and other software.

use anyhow;

use crate::zfs::dispatch::ProcessGroup;

pub mod binaries;
pub mod cli;
pub mod input;

/// Trait for handling an input specification.
pub trait InputHandle {
    /// Handles the input section and runs appropriate calculations.
    ///
    /// # Arguments
    ///
    /// * `process_group` - The process group this process belongs to.
    fn handle(&self, process_group: &dyn ProcessGroup) -> Result<(), anyhow::Error>;
}
