//! Three-dimensional discrete Fourier transforms on periodic grids.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array3, Axis};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

#[cfg(test)]
#[path = "fft_tests.rs"]
mod fft_tests;

type C128 = Complex<f64>;

/// A structure holding the one-dimensional FFT plans needed to transform complex arrays on a
/// three-dimensional grid.
///
/// Conventions:
/// - [`Self::forward`]: $`X(\mathbf{G}) = \sum_{\mathbf{r}} x(\mathbf{r}) e^{-i\mathbf{G}\cdot\mathbf{r}}`$
///   (unnormalised).
/// - [`Self::backward`]: $`x(\mathbf{r}) = \sum_{\mathbf{G}} X(\mathbf{G}) e^{+i\mathbf{G}\cdot\mathbf{r}}`$
///   (unnormalised).
/// - [`Self::to_real_space`] and [`Self::to_reciprocal_space`] are the unitary pair, each carrying
///   a factor $`N^{-1/2}`$.
///
/// The plans are immutable once created and can be shared across threads.
#[derive(Clone)]
pub struct FourierTransform {
    /// The grid shape.
    shape: [usize; 3],

    /// The forward plans, one per axis.
    forward_plans: [Arc<dyn Fft<f64>>; 3],

    /// The backward plans, one per axis.
    backward_plans: [Arc<dyn Fft<f64>>; 3],
}

impl FourierTransform {
    /// Plans the transforms for a grid of the given shape.
    pub fn new(shape: [usize; 3]) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward_plans = [
            planner.plan_fft_forward(shape[0]),
            planner.plan_fft_forward(shape[1]),
            planner.plan_fft_forward(shape[2]),
        ];
        let backward_plans = [
            planner.plan_fft_inverse(shape[0]),
            planner.plan_fft_inverse(shape[1]),
            planner.plan_fft_inverse(shape[2]),
        ];
        Self {
            shape,
            forward_plans,
            backward_plans,
        }
    }

    /// Returns the grid shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Returns the number of grid points.
    pub fn n_points(&self) -> usize {
        self.shape.iter().product()
    }

    /// Applies the unnormalised forward transform in place.
    ///
    /// # Panics
    ///
    /// Panics if the shape of `data` differs from the planned shape.
    pub fn forward(&self, data: &mut Array3<C128>) {
        self.transform(data, &self.forward_plans);
    }

    /// Applies the unnormalised backward transform in place.
    ///
    /// # Panics
    ///
    /// Panics if the shape of `data` differs from the planned shape.
    pub fn backward(&self, data: &mut Array3<C128>) {
        self.transform(data, &self.backward_plans);
    }

    /// Returns the real-space values $`\psi(\mathbf{r}) = N^{-1/2} \sum_{\mathbf{G}} c(\mathbf{G})
    /// e^{i\mathbf{G}\cdot\mathbf{r}}`$ of a set of reciprocal-space coefficients.
    pub fn to_real_space(&self, coefficients: &Array3<C128>) -> Array3<C128> {
        let mut data = coefficients.clone();
        self.backward(&mut data);
        let scale = 1.0 / (self.n_points() as f64).sqrt();
        data.mapv_inplace(|x| x * scale);
        data
    }

    /// Returns the reciprocal-space coefficients $`c(\mathbf{G}) = N^{-1/2} \sum_{\mathbf{r}}
    /// \psi(\mathbf{r}) e^{-i\mathbf{G}\cdot\mathbf{r}}`$ of a set of real-space values.
    pub fn to_reciprocal_space(&self, values: &Array3<C128>) -> Array3<C128> {
        let mut data = values.clone();
        self.forward(&mut data);
        let scale = 1.0 / (self.n_points() as f64).sqrt();
        data.mapv_inplace(|x| x * scale);
        data
    }

    fn transform(&self, data: &mut Array3<C128>, plans: &[Arc<dyn Fft<f64>>; 3]) {
        assert_eq!(
            data.shape(),
            &self.shape[..],
            "Array shape {:?} does not match the planned FFT shape {:?}.",
            data.shape(),
            self.shape
        );
        for (axis, plan) in plans.iter().enumerate() {
            let n = self.shape[axis];
            if n == 1 {
                continue;
            }
            let mut buffer = vec![C128::new(0.0, 0.0); n];
            let mut scratch = vec![C128::new(0.0, 0.0); plan.get_inplace_scratch_len()];
            for mut lane in data.lanes_mut(Axis(axis)) {
                buffer
                    .iter_mut()
                    .zip(lane.iter())
                    .for_each(|(b, x)| *b = *x);
                plan.process_with_scratch(&mut buffer, &mut scratch);
                lane.iter_mut().zip(buffer.iter()).for_each(|(x, b)| *x = *b);
            }
        }
    }
}

impl fmt::Debug for FourierTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FourierTransform {{ shape: {:?} }}",
            self.shape
        )
    }
}
