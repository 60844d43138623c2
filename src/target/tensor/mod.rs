//! Real symmetric rank-2 tensors in three dimensions.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use approx::{AbsDiffEq, RelativeEq};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};


/// The Cartesian index pairs of the six independent components, in storage order.
pub const COMPONENT_INDICES: [(usize, usize); 6] =
    [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// The labels of the six independent components, in storage order.
pub const COMPONENT_LABELS: [&str; 6] = ["xx", "xy", "xz", "yy", "yz", "zz"];

/// Returns the storage position of the component $`ab`$ (in either order).
pub fn component_position(a: usize, b: usize) -> usize {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    match (a, b) {
        (0, 0) => 0,
        (0, 1) => 1,
        (0, 2) => 2,
        (1, 1) => 3,
        (1, 2) => 4,
        (2, 2) => 5,
        _ => panic!("Cartesian indices ({a}, {b}) are out of range."),
    }
}

/// A structure storing a real symmetric $`3 \times 3`$ tensor by its six independent components
/// $`(xx, xy, xz, yy, yz, zz)`$.
///
/// Tensors of this kind are accumulated over orbital pairs, so the structure supports addition,
/// scaling and summation over iterators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymmetricTensor {
    components: [f64; 6],
}

impl SymmetricTensor {
    /// Constructs a tensor from its six independent components in storage order.
    pub fn new(components: [f64; 6]) -> Self {
        Self { components }
    }

    /// Returns the zero tensor.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Constructs a tensor from the symmetric part $`(\mathbf{M} + \mathbf{M}^{\mathsf{T}})/2`$
    /// of a matrix.
    pub fn from_matrix(matrix: &Matrix3<f64>) -> Self {
        let mut components = [0.0; 6];
        for (c, (a, b)) in components.iter_mut().zip(COMPONENT_INDICES.iter()) {
            *c = 0.5 * (matrix[(*a, *b)] + matrix[(*b, *a)]);
        }
        Self { components }
    }

    /// Returns the six independent components in storage order.
    pub fn components(&self) -> &[f64; 6] {
        &self.components
    }

    /// Returns a mutable reference to the six independent components in storage order.
    pub fn components_mut(&mut self) -> &mut [f64; 6] {
        &mut self.components
    }

    /// Returns the component $`T_{ab}`$.
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.components[component_position(a, b)]
    }

    /// Returns the full matrix representation.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|a, b| self.get(a, b))
    }

    /// Returns the trace.
    pub fn trace(&self) -> f64 {
        self.components[0] + self.components[3] + self.components[5]
    }

    /// Returns the Frobenius norm of the full matrix.
    pub fn norm(&self) -> f64 {
        let c = &self.components;
        (c[0] * c[0]
            + c[3] * c[3]
            + c[5] * c[5]
            + 2.0 * (c[1] * c[1] + c[2] * c[2] + c[4] * c[4]))
            .sqrt()
    }

    /// Returns a copy of this tensor with the isotropic part removed.
    pub fn traceless(&self) -> Self {
        let third = self.trace() / 3.0;
        let mut components = self.components;
        components[0] -= third;
        components[3] -= third;
        components[5] -= third;
        Self { components }
    }

    /// Returns this tensor multiplied by a scalar.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            components: self.components.map(|c| c * factor),
        }
    }
}

impl Add for SymmetricTensor {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for SymmetricTensor {
    fn add_assign(&mut self, rhs: Self) {
        self.components
            .iter_mut()
            .zip(rhs.components.iter())
            .for_each(|(a, b)| *a += *b);
    }
}

impl Sub for SymmetricTensor {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + rhs.scale(-1.0)
    }
}

impl Mul<f64> for SymmetricTensor {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scale(rhs)
    }
}

impl Sum for SymmetricTensor {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zeros(), |acc, t| acc + t)
    }
}

impl AbsDiffEq for SymmetricTensor {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        <f64 as AbsDiffEq>::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl RelativeEq for SymmetricTensor {
    fn default_max_relative() -> Self::Epsilon {
        <f64 as RelativeEq>::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

impl fmt::Display for SymmetricTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(7);
        for a in 0..3 {
            writeln!(
                f,
                "  [{:>+w$.prec$}  {:>+w$.prec$}  {:>+w$.prec$}]",
                self.get(a, 0),
                self.get(a, 1),
                self.get(a, 2),
                w = prec + 8,
            )?;
        }
        Ok(())
    }
}
