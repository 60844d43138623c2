//! Readers for raw binary files of complex orbital coefficients.

use std::fs;
use std::path::Path;

use anyhow::{self, ensure, Context};
use byteorder::ByteOrder;
use ndarray::Array3;
use num_complex::Complex;

#[cfg(test)]
#[path = "numeric_tests.rs"]
mod numeric_tests;

type C128 = Complex<f64>;

/// The number of bytes in one complex double-precision value stored as a real part followed by an
/// imaginary part.
pub(crate) const C128_BYTES: usize = 2 * std::mem::size_of::<f64>();

/// Decodes a byte buffer holding consecutive `(re, im)` pairs of `f64` in byte order `B`.
///
/// # Errors
///
/// Errors if the buffer does not hold a whole number of complex values.
pub(crate) fn decode_complex<B: ByteOrder>(bytes: &[u8]) -> Result<Vec<C128>, anyhow::Error> {
    ensure!(
        bytes.len() % C128_BYTES == 0,
        "{} bytes do not make up a whole number of {C128_BYTES}-byte complex values.",
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(C128_BYTES)
        .map(|chunk| C128::new(B::read_f64(&chunk[..8]), B::read_f64(&chunk[8..])))
        .collect())
}

/// Reads the complex values of one orbital sampled on a grid of a given shape from a raw binary
/// file, in row-major order with the last index running fastest.
///
/// # Arguments
///
/// * `path` - The path to the binary file.
/// * `shape` - The grid shape.
///
/// # Errors
///
/// Errors if the file cannot be read or if its size does not match the grid exactly.
pub(crate) fn read_complex_grid<B: ByteOrder, P: AsRef<Path>>(
    path: P,
    shape: [usize; 3],
) -> Result<Array3<C128>, anyhow::Error> {
    let path = path.as_ref();
    let [n1, n2, n3] = shape;
    let n_points = n1 * n2 * n3;
    ensure!(n_points > 0, "Invalid grid shape: {shape:?}.");
    let bytes =
        fs::read(path).with_context(|| format!("Unable to read `{}`", path.display()))?;
    ensure!(
        bytes.len() == n_points * C128_BYTES,
        "`{}` holds {} bytes, but a {n1}×{n2}×{n3} grid of complex values needs {}.",
        path.display(),
        bytes.len(),
        n_points * C128_BYTES
    );
    let values = decode_complex::<B>(&bytes)?;
    Ok(Array3::from_shape_vec((n1, n2, n3), values)?)
}
