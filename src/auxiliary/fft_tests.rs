use approx;
use ndarray::Array3;
use num_complex::Complex;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::auxiliary::fft::FourierTransform;

type C128 = Complex<f64>;

fn random_array(shape: [usize; 3], seed: u64) -> Array3<C128> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |_| {
        C128::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

#[test]
fn test_fft_delta_function() {
    let ft = FourierTransform::new([4, 3, 5]);
    let mut data = Array3::<C128>::zeros((4, 3, 5));
    data[(0, 0, 0)] = C128::new(1.0, 0.0);
    ft.forward(&mut data);
    for x in data.iter() {
        approx::assert_relative_eq!(x.re, 1.0, epsilon = 1e-12);
        approx::assert_relative_eq!(x.im, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_fft_plane_wave() {
    let shape = [4, 6, 5];
    let ft = FourierTransform::new(shape);
    let n = ft.n_points() as f64;
    // exp(iG.r) with G = b2 (Miller index (0, 1, 0)).
    let mut data = Array3::from_shape_fn((4, 6, 5), |(_, i2, _)| {
        C128::from_polar(1.0, 2.0 * std::f64::consts::PI * i2 as f64 / 6.0)
    });
    ft.forward(&mut data);
    for ((i1, i2, i3), x) in data.indexed_iter() {
        if (i1, i2, i3) == (0, 1, 0) {
            approx::assert_relative_eq!(x.re, n, epsilon = 1e-10);
            approx::assert_relative_eq!(x.im, 0.0, epsilon = 1e-10);
        } else {
            approx::assert_relative_eq!(x.norm(), 0.0, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_fft_unitary_pair() {
    let shape = [6, 4, 3];
    let ft = FourierTransform::new(shape);
    let coefficients = random_array(shape, 7);
    let values = ft.to_real_space(&coefficients);
    let recovered = ft.to_reciprocal_space(&values);
    for (a, b) in coefficients.iter().zip(recovered.iter()) {
        approx::assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
        approx::assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
    }

    // Parseval: the unitary pair preserves the norm.
    let norm_c = coefficients.iter().map(|x| x.norm_sqr()).sum::<f64>();
    let norm_v = values.iter().map(|x| x.norm_sqr()).sum::<f64>();
    approx::assert_relative_eq!(norm_c, norm_v, max_relative = 1e-12);
}

#[test]
fn test_fft_degenerate_axis() {
    let shape = [1, 4, 1];
    let ft = FourierTransform::new(shape);
    let mut data = random_array(shape, 11);
    let original = data.clone();
    ft.forward(&mut data);
    ft.backward(&mut data);
    for (a, b) in original.iter().zip(data.iter()) {
        approx::assert_relative_eq!(a.re * 4.0, b.re, epsilon = 1e-12);
        approx::assert_relative_eq!(a.im * 4.0, b.im, epsilon = 1e-12);
    }
}
