//! Driver for spin-spin zero-field-splitting calculations.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{self, format_err, Context};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::drivers::QZfsDriver;
use crate::io::format::{
    log_section, log_subtitle, log_title, nice_bool, nice_bytes, nice_energy, qzfs_output,
    qzfs_warn, write_subtitle, QZfsOutput, SectionBoundary,
};
use crate::io::{write_qzfs_binary, write_qzfs_yaml, QZfsFileType};
use crate::target::orbital::{MemoryMode, OrbitalSet, SpinChannel, DEFAULT_OCCUPATION_THRESHOLD};
use crate::target::tensor::SymmetricTensor;
use crate::units::EnergyUnit;
use crate::zfs::backend::{select_backend, BackendKind};
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::dispatch::{ParallelDispatcher, PartitionScheme, ProcessGroup, SingleProcess};
use crate::zfs::finaliser::{TensorFinaliser, ZfsTensorResult, DEFAULT_TRACE_TOLERANCE};
use crate::zfs::reducer::SumMode;
use crate::zfs::ZfsDiagnostic;

#[cfg(test)]
#[path = "zfs_calculation_tests.rs"]
mod zfs_calculation_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for zero-field-splitting calculations.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ZfsCalculationParams {
    /// The backend used to contract pair densities with the dipolar kernel.
    #[builder(default)]
    pub backend: BackendKind,

    /// The partition of orbital pairs over the process group.
    #[builder(default)]
    pub partition_scheme: PartitionScheme,

    /// The memory strategy for holding orbitals.
    #[builder(default)]
    pub memory_mode: MemoryMode,

    /// The occupation above which an orbital is considered occupied.
    #[builder(default = "DEFAULT_OCCUPATION_THRESHOLD")]
    pub occupation_threshold: f64,

    /// The tolerance on the relative trace residual of the accumulated tensor.
    #[builder(default = "DEFAULT_TRACE_TOLERANCE")]
    pub trace_tolerance: f64,

    /// Boolean indicating if the half-space $`\mathbf{G}`$-sum may be used for real-valued
    /// orbitals.
    #[builder(default = "true")]
    pub use_half_space: bool,

    /// Boolean indicating if per-pair contributions are to be gathered and saved.
    #[builder(default = "false")]
    pub write_pair_contributions: bool,

    /// Optional name for saving the report as a YAML file of type [`QZfsFileType::Report`] and,
    /// if requested, the per-pair contributions as a binary file of type
    /// [`QZfsFileType::Pairs`]. If `None`, nothing will be saved.
    #[builder(default = "None")]
    pub result_save_name: Option<PathBuf>,
}

impl ZfsCalculationParams {
    /// Returns a builder to construct a [`ZfsCalculationParams`] structure.
    pub fn builder() -> ZfsCalculationParamsBuilder {
        ZfsCalculationParamsBuilder::default()
    }
}

impl ZfsCalculationParamsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(thresh) = self.occupation_threshold {
            if !thresh.is_finite() || thresh < 0.0 {
                return Err(format!("Invalid occupation threshold: {thresh}."));
            }
        }
        if let Some(tol) = self.trace_tolerance {
            if !tol.is_finite() || tol < 0.0 {
                return Err(format!("Invalid trace tolerance: {tol}."));
            }
        }
        Ok(())
    }
}

impl Default for ZfsCalculationParams {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            partition_scheme: PartitionScheme::default(),
            memory_mode: MemoryMode::default(),
            occupation_threshold: DEFAULT_OCCUPATION_THRESHOLD,
            trace_tolerance: DEFAULT_TRACE_TOLERANCE,
            use_half_space: true,
            write_pair_contributions: false,
            result_save_name: None,
        }
    }
}

impl fmt::Display for ZfsCalculationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Contraction backend: {}", self.backend)?;
        writeln!(f, "Pair partition: {}", self.partition_scheme)?;
        writeln!(f, "Memory mode: {}", self.memory_mode)?;
        writeln!(f, "Occupation threshold: {:.3}", self.occupation_threshold)?;
        writeln!(f, "Trace tolerance: {:.3e}", self.trace_tolerance)?;
        writeln!(
            f,
            "Half-space G-sum allowed: {}",
            nice_bool(self.use_half_space)
        )?;
        writeln!(
            f,
            "Per-pair contributions saved: {}",
            nice_bool(self.write_pair_contributions)
        )?;
        writeln!(
            f,
            "Result save name: {}",
            self.result_save_name
                .as_ref()
                .map(|name| name.display().to_string())
                .unwrap_or_else(|| "--".to_string())
        )?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure holding the contribution $`\mathbf{C}_{ij}`$ of one orbital pair, before the
/// prefactor is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairContribution {
    /// The common spin channel of the pair.
    pub spin: SpinChannel,

    /// The band indices of the two orbitals.
    pub bands: (usize, usize),

    /// The contribution of the pair.
    pub tensor: SymmetricTensor,
}

/// A structure to contain zero-field-splitting calculation results.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct ZfsCalculationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: ZfsCalculationParams,

    /// The number of processes over which the pairs were distributed.
    pub n_processes: usize,

    /// A description of the backend used on the root process.
    pub backend: String,

    /// The range of the $`\mathbf{G}`$-sum.
    pub sum_mode: SumMode,

    /// The net spin of the orbital set.
    pub net_spin: f64,

    /// The number of same-spin orbital pairs.
    pub n_pairs: usize,

    /// The cell volume in bohr³.
    pub volume: f64,

    /// The finalised tensor.
    pub tensor: ZfsTensorResult,

    /// The per-pair contributions, if requested.
    #[builder(default = "None")]
    pub pair_contributions: Option<Vec<PairContribution>>,
}

impl ZfsCalculationResult {
    /// Returns a builder to construct a [`ZfsCalculationResult`] structure.
    fn builder() -> ZfsCalculationResultBuilder {
        ZfsCalculationResultBuilder::default()
    }

    /// Returns a plain summary of this result for persistence.
    pub fn report(&self) -> ZfsReport {
        ZfsReport::from(self)
    }
}

impl fmt::Display for ZfsCalculationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mhz = EnergyUnit::MHz;
        let wavenumber = EnergyUnit::Wavenumber;
        let tensor = &self.tensor;

        write_subtitle(f, "Spin-spin zero-field-splitting tensor")?;
        writeln!(f)?;
        writeln!(f, "Same-spin pairs: {}", self.n_pairs)?;
        writeln!(f, "Net spin S: {:.1}", self.net_spin)?;
        writeln!(f, "G-sum: {}", self.sum_mode)?;
        writeln!(f, "Prefactor: {:+.7e} Eh", tensor.prefactor())?;
        writeln!(f)?;

        writeln!(f, "Tensor ({mhz}):")?;
        write!(f, "{:.3}", tensor.tensor().scale(mhz.per_hartree()))?;
        writeln!(f)?;

        let labels = ["x", "y", "z"];
        writeln!(f, "Principal axes (|Dz| ≥ |Dx| ≥ |Dy|):")?;
        writeln!(
            f,
            "  {:>2}  {:>14}  {:>14}  {:>30}",
            "",
            format!("D_k ({mhz})"),
            format!("D_k ({wavenumber})"),
            "Axis"
        )?;
        for (k, label) in labels.iter().enumerate() {
            let lambda = tensor.eigenvalues()[k];
            let axis = tensor.eigenvector(k);
            writeln!(
                f,
                "  {:>2}  {:>+14.3}  {:>+14.6}  {:>30}",
                label,
                mhz.from_hartree(lambda),
                wavenumber.from_hartree(lambda),
                format!("({:+.4}, {:+.4}, {:+.4})", axis.x, axis.y, axis.z)
            )?;
        }
        writeln!(f)?;

        writeln!(f, "D = {}", nice_energy(tensor.d()))?;
        writeln!(f, "E = {}", nice_energy(tensor.e()))?;
        writeln!(f, "Relative trace residual: {:.3e}", tensor.trace_residual())?;
        if !tensor.diagnostics().is_empty() {
            writeln!(f)?;
            writeln!(f, "Diagnostics:")?;
            for diagnostic in tensor.diagnostics() {
                writeln!(f, "  {diagnostic}")?;
            }
        }
        Ok(())
    }
}

/// A plain summary of a zero-field-splitting calculation, written as a YAML report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZfsReport {
    /// $`D`$ in Hartree.
    pub d: f64,

    /// $`E`$ in Hartree.
    pub e: f64,

    /// $`D`$ in MHz.
    pub d_mhz: f64,

    /// $`E`$ in MHz.
    pub e_mhz: f64,

    /// $`D`$ in cm⁻¹.
    pub d_wavenumber: f64,

    /// $`E`$ in cm⁻¹.
    pub e_wavenumber: f64,

    /// The traceless tensor in MHz, row by row.
    pub tensor_mhz: [[f64; 3]; 3],

    /// The ordered eigenvalues $`(D_x, D_y, D_z)`$ in MHz.
    pub eigenvalues_mhz: [f64; 3],

    /// The principal axes belonging to [`Self::eigenvalues_mhz`].
    pub principal_axes: [[f64; 3]; 3],

    /// The relative trace residual before trace removal.
    pub trace_residual: f64,

    /// The net spin of the orbital set.
    pub net_spin: f64,

    /// The number of same-spin orbital pairs.
    pub n_pairs: usize,

    /// The number of processes.
    pub n_processes: usize,

    /// The backend used on the root process.
    pub backend: String,

    /// The range of the $`\mathbf{G}`$-sum.
    pub sum_mode: SumMode,

    /// The diagnostics raised during the calculation.
    pub diagnostics: Vec<ZfsDiagnostic>,
}

impl From<&ZfsCalculationResult> for ZfsReport {
    fn from(result: &ZfsCalculationResult) -> Self {
        let mhz = EnergyUnit::MHz;
        let wavenumber = EnergyUnit::Wavenumber;
        let tensor = &result.tensor;
        let tensor_mhz = tensor.tensor().scale(mhz.per_hartree());
        Self {
            d: tensor.d(),
            e: tensor.e(),
            d_mhz: mhz.from_hartree(tensor.d()),
            e_mhz: mhz.from_hartree(tensor.e()),
            d_wavenumber: wavenumber.from_hartree(tensor.d()),
            e_wavenumber: wavenumber.from_hartree(tensor.e()),
            tensor_mhz: [0, 1, 2].map(|a| [0, 1, 2].map(|b| tensor_mhz.get(a, b))),
            eigenvalues_mhz: (*tensor.eigenvalues()).map(|lambda| mhz.from_hartree(lambda)),
            principal_axes: [0, 1, 2].map(|k| {
                let axis = tensor.eigenvector(k);
                [axis.x, axis.y, axis.z]
            }),
            trace_residual: tensor.trace_residual(),
            net_spin: result.net_spin,
            n_pairs: result.n_pairs,
            n_processes: result.n_processes,
            backend: result.backend.clone(),
            sum_mode: result.sum_mode,
            diagnostics: tensor.diagnostics().to_vec(),
        }
    }
}

// ------
// Driver
// ------

/// A driver for spin-spin zero-field-splitting calculations.
///
/// The driver owns the dipolar kernel of its run. Every member of the process group runs its own
/// driver on the same orbital set; only the root logs the main output and saves files.
#[derive(Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ZfsCalculationDriver<'a> {
    /// The control parameters for the calculation.
    parameters: &'a ZfsCalculationParams,

    /// The occupied orbitals.
    orbital_set: &'a OrbitalSet<'a>,

    /// The process group over which orbital pairs are distributed.
    #[builder(default = "&SingleProcess as &dyn ProcessGroup")]
    process_group: &'a dyn ProcessGroup,

    /// The dipolar kernel built for the run.
    #[builder(setter(skip), default = "None")]
    kernel: Option<DipoleKernel>,

    /// The result of the calculation.
    #[builder(setter(skip), default = "None")]
    result: Option<ZfsCalculationResult>,
}

impl<'a> ZfsCalculationDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or_else(|| "No ZFS calculation parameters found.".to_string())?;
        let set = self
            .orbital_set
            .ok_or_else(|| "No orbital set found.".to_string())?;
        if let Some(group) = self.process_group {
            if group.rank() >= group.size() {
                return Err(format!(
                    "Rank {} is invalid in a process group of size {}.",
                    group.rank(),
                    group.size()
                ));
            }
        }
        if (set.occupation_threshold() - params.occupation_threshold).abs() > f64::EPSILON {
            log::warn!(
                "The orbital set was filtered with occupation threshold {}, but the parameters specify {}.",
                set.occupation_threshold(),
                params.occupation_threshold
            );
        }
        Ok(())
    }
}

impl<'a> ZfsCalculationDriver<'a> {
    /// Returns a builder to construct a [`ZfsCalculationDriver`] structure.
    pub fn builder() -> ZfsCalculationDriverBuilder<'a> {
        ZfsCalculationDriverBuilder::default()
    }

    /// Returns the dipolar kernel of the last run, if any.
    pub fn kernel(&self) -> Option<&DipoleKernel> {
        self.kernel.as_ref()
    }

    /// Executes the zero-field-splitting calculation.
    fn calculate(&mut self) -> Result<(), anyhow::Error> {
        let start = Instant::now();
        let params = self.parameters;
        let set = self.orbital_set;
        let group = self.process_group;
        let grid = set.grid();
        let root = group.is_root();

        if root {
            log_title("Spin-Spin Zero-Field Splitting");
            qzfs_output!("");
            params.log_output_display();
            qzfs_output!("");
            log_subtitle("Grid");
            qzfs_output!("");
            grid.log_output_display();
            qzfs_output!("");
            log_subtitle("Orbitals");
            qzfs_output!("");
            set.log_output_display();
            qzfs_output!("");
        }

        let kernel = DipoleKernel::new(grid);
        if root {
            log_subtitle("Memory footprint per process");
            qzfs_output!("");
            qzfs_output!("Orbitals      : {}", nice_bytes(set.n_bytes()));
            qzfs_output!("Dipolar kernel: {}", nice_bytes(kernel.n_bytes()));
            qzfs_output!(
                "Pair density  : {}",
                nice_bytes(grid.n_points() * std::mem::size_of::<Complex<f64>>())
            );
            qzfs_output!("");
        }

        let (backend, backend_diagnostic) = select_backend(params.backend, group.rank());
        if root {
            if let Some(diagnostic) = backend_diagnostic.as_ref() {
                qzfs_warn!("{diagnostic}");
            }
        }
        let dispatcher = ParallelDispatcher::builder()
            .kernel(&kernel)
            .backend(backend.as_ref())
            .partition_scheme(params.partition_scheme)
            .collect_pair_contributions(params.write_pair_contributions)
            .allow_half_space(params.use_half_space)
            .build()
            .with_context(|| "Unable to construct a pair dispatcher")?;

        if root {
            log_section("Pair contraction", SectionBoundary::Begin);
            qzfs_output!("");
            qzfs_output!("Backend  : {}", backend.description());
            qzfs_output!("Processes: {}", group.size());
        }
        let outcome = dispatcher
            .dispatch(set, group)
            .with_context(|| format!("Pair contraction failed on rank {}", group.rank()))?;
        if root {
            qzfs_output!("Pairs    : {}", outcome.pairs.len());
            qzfs_output!("G-sum    : {}", outcome.sum_mode);
            qzfs_output!("");
            log_section("Pair contraction", SectionBoundary::End);
            qzfs_output!("");
        }

        let finaliser = TensorFinaliser::new(params.trace_tolerance)?;
        let mut tensor = finaliser
            .finalise(&outcome.total, grid.volume())
            .with_context(|| "Unable to finalise the accumulated tensor")?;
        if let Some(diagnostic) = backend_diagnostic {
            tensor.push_diagnostic(diagnostic);
        }

        let orbitals = set.orbitals();
        let pair_contributions = outcome.pair_contributions.map(|contributions| {
            outcome
                .pairs
                .iter()
                .zip(contributions)
                .map(|(pair, contribution)| PairContribution {
                    spin: pair.spin,
                    bands: (orbitals[pair.first].band(), orbitals[pair.second].band()),
                    tensor: contribution,
                })
                .collect_vec()
        });

        let result = ZfsCalculationResult::builder()
            .parameters(params.clone())
            .n_processes(group.size())
            .backend(backend.description())
            .sum_mode(outcome.sum_mode)
            .net_spin(set.net_spin())
            .n_pairs(outcome.pairs.len())
            .volume(grid.volume())
            .tensor(tensor)
            .pair_contributions(pair_contributions)
            .build()
            .with_context(|| "Unable to construct a ZFS calculation result")?;

        if root {
            result.log_output_display();
            qzfs_output!("");
            result
                .tensor
                .diagnostics()
                .iter()
                .filter(|diagnostic| matches!(diagnostic, ZfsDiagnostic::NumericalWarning { .. }))
                .for_each(|diagnostic| {
                    qzfs_warn!("{diagnostic}");
                });

            if let Some(name) = params.result_save_name.as_ref() {
                write_qzfs_yaml(name, QZfsFileType::Report, &result.report())
                    .with_context(|| "Unable to save the ZFS report")?;
                qzfs_output!(
                    "Report saved as {}.",
                    QZfsFileType::Report.path(name).display()
                );
                if let Some(contributions) = result.pair_contributions.as_ref() {
                    write_qzfs_binary(name, QZfsFileType::Pairs, contributions)
                        .with_context(|| "Unable to save the per-pair contributions")?;
                    qzfs_output!(
                        "Per-pair contributions saved as {}.",
                        QZfsFileType::Pairs.path(name).display()
                    );
                }
                qzfs_output!("");
            }
            qzfs_output!(
                "Time elapsed for the calculation: {:.3} s",
                start.elapsed().as_secs_f64()
            );
            qzfs_output!("");
        }
        log::debug!("Rank {}: ZFS calculation finished.", group.rank());

        self.kernel = Some(kernel);
        self.result = Some(result);
        Ok(())
    }
}

impl<'a> QZfsDriver for ZfsCalculationDriver<'a> {
    type Params = ZfsCalculationParams;

    type Outcome = ZfsCalculationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No ZFS calculation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.calculate()
    }
}
