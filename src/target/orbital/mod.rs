//! Occupied Kohn–Sham orbitals sampled on a periodic grid.

use std::borrow::Cow;
use std::fmt;

use derive_builder::Builder;
use itertools::Itertools;
use log;
use ndarray::Array3;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::grid::GridGeometry;
use crate::zfs::ZfsError;


type C128 = Complex<f64>;

/// The default occupation above which an orbital is considered occupied.
pub const DEFAULT_OCCUPATION_THRESHOLD: f64 = 0.8;

/// The relative tolerance below which imaginary parts (or violations of Hermitian symmetry) are
/// taken to vanish when deciding whether an orbital is real-valued.
const REAL_VALUED_TOLERANCE: f64 = 1e-10;

// =================
// Enum definitions
// =================

/// An enumerated type for the two spin channels of a collinear calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpinChannel {
    /// The majority spin channel.
    Up,

    /// The minority spin channel.
    Down,
}

impl fmt::Display for SpinChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpinChannel::Up => write!(f, "α"),
            SpinChannel::Down => write!(f, "β"),
        }
    }
}

/// An enumerated type for the representation in which orbital coefficients are given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
    /// Values $`\psi(\mathbf{r})`$ on the real-space grid points.
    RealSpace,

    /// Plane-wave coefficients $`c(\mathbf{G})`$ in FFT storage order.
    ReciprocalSpace,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::RealSpace => write!(f, "real space"),
            Representation::ReciprocalSpace => write!(f, "reciprocal space"),
        }
    }
}

/// An enumerated type for the memory strategy used to hold orbitals during a calculation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryMode {
    /// Real-space forms of all orbitals are cached alongside the supplied coefficients.
    #[default]
    High,

    /// All orbitals are converted to real space once and the supplied reciprocal-space
    /// coefficients are dropped.
    Low,

    /// Only the supplied coefficients are kept; real-space forms are recomputed for every pair.
    Critical,
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryMode::High => write!(f, "high"),
            MemoryMode::Low => write!(f, "low"),
            MemoryMode::Critical => write!(f, "critical"),
        }
    }
}

// ==================
// Struct definitions
// ==================

// -------
// Orbital
// -------

/// A structure holding one orbital on the grid.
///
/// Orbitals are normalised on the grid on construction, *i.e.*
/// $`\sum_{\mathbf{r}} |\psi(\mathbf{r})|^2 = 1`$. Since the grid Fourier transform is unitary the
/// same condition holds for the reciprocal-space coefficients.
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Orbital {
    /// The spin channel of this orbital.
    spin: SpinChannel,

    /// The band index, unique within a spin channel.
    band: usize,

    /// The occupation number.
    occupation: f64,

    /// The representation in which [`Self::coefficients`] are given.
    representation: Representation,

    /// The coefficients on the grid.
    coefficients: Array3<C128>,
}

impl OrbitalBuilder {
    fn validate(&self) -> Result<(), String> {
        let occupation = self
            .occupation
            .ok_or("No occupation found.".to_string())?;
        if !occupation.is_finite() || occupation < 0.0 {
            return Err(format!("Invalid occupation {occupation}."));
        }
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or("No coefficients found.".to_string())?;
        if coefficients.is_empty() {
            return Err("The coefficient array is empty.".to_string());
        }
        if coefficients.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
            return Err("The coefficient array contains non-finite values.".to_string());
        }
        Ok(())
    }
}

impl Orbital {
    /// Returns a builder to construct a new [`Orbital`].
    pub fn builder() -> OrbitalBuilder {
        OrbitalBuilder::default()
    }

    /// Constructs a new normalised orbital.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the occupation is negative, if the coefficients
    /// are empty or non-finite, or if the coefficients have zero norm.
    pub fn new(
        spin: SpinChannel,
        band: usize,
        occupation: f64,
        representation: Representation,
        coefficients: Array3<C128>,
    ) -> Result<Self, ZfsError> {
        let mut orbital = Self::builder()
            .spin(spin)
            .band(band)
            .occupation(occupation)
            .representation(representation)
            .coefficients(coefficients)
            .build()
            .map_err(|err| {
                ZfsError::configuration(format!("Orbital {spin}{band}: {err}"))
            })?;
        orbital.normalise()?;
        Ok(orbital)
    }

    fn normalise(&mut self) -> Result<(), ZfsError> {
        let norm = self.coefficients.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Err(ZfsError::configuration(format!(
                "Orbital {}{} has zero norm.",
                self.spin, self.band
            )));
        }
        log::debug!(
            "Orbital {}{}: norm {:.12} on the grid before normalisation.",
            self.spin,
            self.band,
            norm
        );
        self.coefficients.mapv_inplace(|c| c / norm);
        Ok(())
    }

    /// Returns the spin channel.
    pub fn spin(&self) -> SpinChannel {
        self.spin
    }

    /// Returns the band index.
    pub fn band(&self) -> usize {
        self.band
    }

    /// Returns the occupation number.
    pub fn occupation(&self) -> f64 {
        self.occupation
    }

    /// Returns the representation of the stored coefficients.
    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Returns the stored coefficients.
    pub fn coefficients(&self) -> &Array3<C128> {
        &self.coefficients
    }

    /// Returns the size in bytes of the stored coefficients.
    pub fn n_bytes(&self) -> usize {
        self.coefficients.len() * std::mem::size_of::<C128>()
    }

    /// Checks if this orbital is real-valued in real space, up to a global constant.
    ///
    /// In real space the imaginary parts must vanish relative to the largest magnitude; in
    /// reciprocal space the coefficients must satisfy $`c(-\mathbf{G}) = c(\mathbf{G})^*`$.
    fn is_real_valued(&self, grid: &GridGeometry) -> bool {
        let scale = self
            .coefficients
            .iter()
            .map(|c| c.norm())
            .fold(0.0_f64, f64::max);
        let thresh = REAL_VALUED_TOLERANCE * scale;
        match self.representation {
            Representation::RealSpace => self.coefficients.iter().all(|c| c.im.abs() <= thresh),
            Representation::ReciprocalSpace => {
                let flat = self.coefficients.as_slice();
                match flat {
                    Some(flat) => (0..flat.len()).all(|k| {
                        let k_neg = grid.index_of_negative(k);
                        (flat[k_neg] - flat[k].conj()).norm() <= thresh
                    }),
                    None => false,
                }
            }
        }
    }
}

// ----------
// OrbitalSet
// ----------

/// A structure holding the occupied orbitals of an open-shell system, all sampled on the same grid.
///
/// The orbitals are ordered by spin channel ([`SpinChannel::Up`] first) and then by band index.
/// Only orbitals whose occupations exceed [`Self::occupation_threshold`] are retained.
#[derive(Builder, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OrbitalSet<'a> {
    /// The grid on which all orbitals are sampled.
    grid: &'a GridGeometry,

    /// The orbitals.
    orbitals: Vec<Orbital>,

    /// The strategy for holding real-space orbitals.
    #[builder(default = "MemoryMode::High")]
    memory_mode: MemoryMode,

    /// The occupation above which an orbital is retained.
    #[builder(default = "DEFAULT_OCCUPATION_THRESHOLD")]
    occupation_threshold: f64,

    /// Cached real-space orbitals, present in [`MemoryMode::High`] only.
    #[builder(setter(skip), default = "None")]
    real_space_cache: Option<Vec<Array3<C128>>>,

    /// Boolean indicating if all orbitals are real-valued in real space.
    #[builder(setter(skip), default = "false")]
    real_valued: bool,

    /// The number of supplied orbitals discarded by the occupation threshold.
    #[builder(setter(skip), default = "0")]
    n_discarded: usize,
}

impl<'a> OrbitalSetBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let grid = self.grid.ok_or("No grid geometry found.".to_string())?;
        let orbitals = self
            .orbitals
            .as_ref()
            .ok_or("No orbitals found.".to_string())?;
        if orbitals.is_empty() {
            return Err("The orbital set is empty.".to_string());
        }
        let shape = grid.shape();
        if let Some(orbital) = orbitals
            .iter()
            .find(|orbital| orbital.coefficients.shape() != &shape[..])
        {
            return Err(format!(
                "Orbital {}{} has shape {:?}, but the grid has shape {:?}.",
                orbital.spin,
                orbital.band,
                orbital.coefficients.shape(),
                shape
            ));
        }
        if let Some(((spin, band), _)) = orbitals
            .iter()
            .map(|orbital| (orbital.spin, orbital.band))
            .counts()
            .into_iter()
            .find(|(_, count)| *count > 1)
        {
            return Err(format!(
                "Orbital {spin}{band} is specified more than once."
            ));
        }
        if let Some(thresh) = self.occupation_threshold {
            if !thresh.is_finite() || thresh < 0.0 {
                return Err(format!("Invalid occupation threshold {thresh}."));
            }
        }
        Ok(())
    }
}

impl<'a> OrbitalSet<'a> {
    /// Returns a builder to construct a new [`OrbitalSet`].
    fn builder() -> OrbitalSetBuilder<'a> {
        OrbitalSetBuilder::default()
    }

    /// Constructs a new orbital set.
    ///
    /// # Arguments
    ///
    /// * `grid` - The grid on which all orbitals are sampled.
    /// * `orbitals` - The supplied orbitals, occupied or not.
    /// * `memory_mode` - The strategy for holding real-space orbitals.
    /// * `occupation_threshold` - The occupation above which an orbital is retained.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the orbitals are empty, live on a grid of
    /// another shape, carry duplicated labels, if none of them is occupied, or if more orbitals
    /// are occupied in the [`SpinChannel::Down`] channel than in the [`SpinChannel::Up`] one.
    pub fn new(
        grid: &'a GridGeometry,
        orbitals: Vec<Orbital>,
        memory_mode: MemoryMode,
        occupation_threshold: f64,
    ) -> Result<Self, ZfsError> {
        let mut set = Self::builder()
            .grid(grid)
            .orbitals(orbitals)
            .memory_mode(memory_mode)
            .occupation_threshold(occupation_threshold)
            .build()
            .map_err(|err| ZfsError::configuration(err.to_string()))?;
        set.prepare()?;
        Ok(set)
    }

    /// Filters out unoccupied orbitals, sorts the rest and applies the memory mode.
    fn prepare(&mut self) -> Result<(), ZfsError> {
        let n_supplied = self.orbitals.len();
        let thresh = self.occupation_threshold;
        self.orbitals.retain(|orbital| orbital.occupation > thresh);
        self.orbitals
            .sort_by_key(|orbital| (orbital.spin, orbital.band));
        self.n_discarded = n_supplied - self.orbitals.len();
        if self.orbitals.is_empty() {
            return Err(ZfsError::configuration(format!(
                "None of the {n_supplied} supplied orbitals has an occupation above {thresh}."
            )));
        }
        let n_up = self.n_orbitals(SpinChannel::Up);
        let n_down = self.n_orbitals(SpinChannel::Down);
        if n_down > n_up {
            return Err(ZfsError::configuration(format!(
                "The minority channel holds {n_down} occupied orbital(s), more than the {n_up} of the majority channel."
            )));
        }
        if self.n_discarded > 0 {
            log::debug!(
                "{} orbital(s) with occupations at or below {} discarded.",
                self.n_discarded,
                thresh
            );
        }

        self.real_valued = self
            .orbitals
            .iter()
            .all(|orbital| orbital.is_real_valued(self.grid));

        let fft = self.grid.fft();
        match self.memory_mode {
            MemoryMode::High => {
                let cache = self
                    .orbitals
                    .iter()
                    .map(|orbital| match orbital.representation {
                        Representation::RealSpace => orbital.coefficients.clone(),
                        Representation::ReciprocalSpace => {
                            fft.to_real_space(&orbital.coefficients)
                        }
                    })
                    .collect_vec();
                self.real_space_cache = Some(cache);
            }
            MemoryMode::Low => {
                self.orbitals.iter_mut().for_each(|orbital| {
                    if orbital.representation == Representation::ReciprocalSpace {
                        orbital.coefficients = fft.to_real_space(&orbital.coefficients);
                        orbital.representation = Representation::RealSpace;
                    }
                });
            }
            MemoryMode::Critical => {}
        }
        Ok(())
    }

    /// Returns the grid on which the orbitals are sampled.
    pub fn grid(&self) -> &'a GridGeometry {
        self.grid
    }

    /// Returns the retained orbitals, ordered by spin channel and band index.
    pub fn orbitals(&self) -> &[Orbital] {
        &self.orbitals
    }

    /// Returns the number of retained orbitals.
    pub fn len(&self) -> usize {
        self.orbitals.len()
    }

    /// Returns `true` if no orbitals are retained.
    pub fn is_empty(&self) -> bool {
        self.orbitals.is_empty()
    }

    /// Returns the memory mode.
    pub fn memory_mode(&self) -> MemoryMode {
        self.memory_mode
    }

    /// Returns the occupation threshold.
    pub fn occupation_threshold(&self) -> f64 {
        self.occupation_threshold
    }

    /// Returns the number of supplied orbitals discarded by the occupation threshold.
    pub fn n_discarded(&self) -> usize {
        self.n_discarded
    }

    /// Returns the indices of the orbitals in a given spin channel.
    pub fn indices_of(&self, spin: SpinChannel) -> Vec<usize> {
        self.orbitals
            .iter()
            .enumerate()
            .filter_map(|(k, orbital)| (orbital.spin == spin).then_some(k))
            .collect_vec()
    }

    /// Returns the number of orbitals in a given spin channel.
    pub fn n_orbitals(&self, spin: SpinChannel) -> usize {
        self.orbitals
            .iter()
            .filter(|orbital| orbital.spin == spin)
            .count()
    }

    /// Returns the net spin $`S = (n_\alpha - n_\beta)/2`$.
    pub fn net_spin(&self) -> f64 {
        (self.n_orbitals(SpinChannel::Up) as f64 - self.n_orbitals(SpinChannel::Down) as f64) / 2.0
    }

    /// Returns the number of unordered same-spin orbital pairs.
    pub fn n_same_spin_pairs(&self) -> usize {
        [SpinChannel::Up, SpinChannel::Down]
            .iter()
            .map(|spin| {
                let n = self.n_orbitals(*spin);
                n * n.saturating_sub(1) / 2
            })
            .sum()
    }

    /// Returns `true` if all orbitals are real-valued in real space.
    pub fn is_real_valued(&self) -> bool {
        self.real_valued
    }

    /// Returns the real-space form of the `k`-th orbital.
    ///
    /// The form is borrowed when it is already held in memory and computed on demand otherwise.
    pub fn real_space(&self, k: usize) -> Cow<'_, Array3<C128>> {
        if let Some(cache) = self.real_space_cache.as_ref() {
            return Cow::Borrowed(&cache[k]);
        }
        let orbital = &self.orbitals[k];
        match orbital.representation {
            Representation::RealSpace => Cow::Borrowed(&orbital.coefficients),
            Representation::ReciprocalSpace => {
                Cow::Owned(self.grid.fft().to_real_space(&orbital.coefficients))
            }
        }
    }

    /// Returns an estimate of the memory held by this set in bytes.
    pub fn n_bytes(&self) -> usize {
        let orbitals = self.orbitals.iter().map(Orbital::n_bytes).sum::<usize>();
        let cache = self
            .real_space_cache
            .as_ref()
            .map(|cache| {
                cache
                    .iter()
                    .map(|values| values.len() * std::mem::size_of::<C128>())
                    .sum::<usize>()
            })
            .unwrap_or(0);
        orbitals + cache
    }
}

impl<'a> fmt::Debug for OrbitalSet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbitalSet")
            .field("grid_shape", &self.grid.shape())
            .field(
                "orbitals",
                &self
                    .orbitals
                    .iter()
                    .map(|orbital| format!("{}{}", orbital.spin, orbital.band))
                    .collect_vec(),
            )
            .field("memory_mode", &self.memory_mode)
            .field("real_valued", &self.real_valued)
            .finish()
    }
}

impl<'a> fmt::Display for OrbitalSet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Occupied orbitals (occupation > {}):", self.occupation_threshold)?;
        for spin in [SpinChannel::Up, SpinChannel::Down] {
            let bands = self
                .orbitals
                .iter()
                .filter(|orbital| orbital.spin == spin)
                .map(|orbital| orbital.band.to_string())
                .join(", ");
            writeln!(
                f,
                "  Spin {spin}: {} orbital(s){}",
                self.n_orbitals(spin),
                if bands.is_empty() {
                    String::new()
                } else {
                    format!(" [{bands}]")
                }
            )?;
        }
        writeln!(f, "Discarded orbitals: {}", self.n_discarded)?;
        writeln!(f, "Net spin S: {:.1}", self.net_spin())?;
        writeln!(f, "Same-spin orbital pairs: {}", self.n_same_spin_pairs())?;
        writeln!(f, "Memory mode: {}", self.memory_mode)?;
        writeln!(
            f,
            "Real-valued orbitals: {}",
            crate::io::format::nice_bool(self.real_valued)
        )?;
        Ok(())
    }
}
