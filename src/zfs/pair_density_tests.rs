use approx;
use nalgebra::Matrix3;
use ndarray::Array3;
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::auxiliary::grid::GridGeometry;
use crate::target::orbital::{MemoryMode, Orbital, OrbitalSet, Representation, SpinChannel};
use crate::zfs::pair_density::{OrbitalPair, PairDensityBuilder};
use crate::zfs::ZfsError;

type C128 = Complex<f64>;

fn random_orbital(
    shape: [usize; 3],
    spin: SpinChannel,
    band: usize,
    real: bool,
    rng: &mut StdRng,
) -> Orbital {
    let values = Array3::from_shape_fn((shape[0], shape[1], shape[2]), |_| {
        let im = if real { 0.0 } else { rng.gen_range(-1.0..1.0) };
        C128::new(rng.gen_range(-1.0..1.0), im)
    });
    Orbital::new(spin, band, 1.0, Representation::RealSpace, values).unwrap()
}

#[test]
fn test_pair_density_basic_properties() {
    let grid = GridGeometry::new(Matrix3::from_diagonal_element(9.0), [4, 6, 5]).unwrap();
    let mut rng = StdRng::seed_from_u64(10);
    let a = random_orbital(grid.shape(), SpinChannel::Up, 0, false, &mut rng);
    let b = random_orbital(grid.shape(), SpinChannel::Up, 1, false, &mut rng);

    let builder = PairDensityBuilder::new(&grid);
    let rho_ab = builder.build_from_orbitals(&a, &b).unwrap();
    assert_eq!(rho_ab.len(), grid.n_points());
    assert_eq!(rho_ab.bands(), (0, 1));
    assert_eq!(rho_ab.spin(), SpinChannel::Up);

    // ρ(G = 0) is the grid overlap of the two orbitals.
    let overlap = a
        .coefficients()
        .iter()
        .zip(b.coefficients().iter())
        .map(|(x, y)| x.conj() * y)
        .sum::<C128>();
    let rho0 = rho_ab.values()[grid.zero_index()];
    approx::assert_relative_eq!(rho0.re, overlap.re, epsilon = 1e-12);
    approx::assert_relative_eq!(rho0.im, overlap.im, epsilon = 1e-12);

    // ρ_ba(G) = ρ_ab(-G)*.
    let rho_ba = builder.build_from_orbitals(&b, &a).unwrap();
    for k in 0..grid.n_points() {
        let k_neg = grid.index_of_negative(k);
        let lhs = rho_ba.values()[k];
        let rhs = rho_ab.values()[k_neg].conj();
        approx::assert_relative_eq!(lhs.re, rhs.re, epsilon = 1e-12);
        approx::assert_relative_eq!(lhs.im, rhs.im, epsilon = 1e-12);
    }

    // Parseval for the unnormalised forward transform.
    let lhs = rho_ab.values().iter().map(|x| x.norm_sqr()).sum::<f64>();
    let rhs = a
        .coefficients()
        .iter()
        .zip(b.coefficients().iter())
        .map(|(x, y)| (x.conj() * y).norm_sqr())
        .sum::<f64>()
        * grid.n_points() as f64;
    approx::assert_relative_eq!(lhs, rhs, max_relative = 1e-10);

    // Complex orbitals generally break the ±G magnitude symmetry.
    assert!(!rho_ab.has_symmetric_magnitudes(&grid));
}

#[test]
fn test_pair_density_real_orbitals_symmetric() {
    let grid = GridGeometry::new(Matrix3::from_diagonal_element(7.0), [4, 4, 6]).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let a = random_orbital(grid.shape(), SpinChannel::Down, 3, true, &mut rng);
    let b = random_orbital(grid.shape(), SpinChannel::Down, 5, true, &mut rng);
    let rho = PairDensityBuilder::new(&grid)
        .build_from_orbitals(&a, &b)
        .unwrap();
    assert!(rho.has_symmetric_magnitudes(&grid));
}

#[test]
fn test_pair_density_representations_agree() {
    let grid = GridGeometry::new(Matrix3::from_diagonal_element(7.0), [3, 4, 5]).unwrap();
    let mut rng = StdRng::seed_from_u64(12);
    let a = random_orbital(grid.shape(), SpinChannel::Up, 0, false, &mut rng);
    let b = random_orbital(grid.shape(), SpinChannel::Up, 1, false, &mut rng);
    let b_recip = Orbital::new(
        SpinChannel::Up,
        1,
        1.0,
        Representation::ReciprocalSpace,
        grid.fft().to_reciprocal_space(b.coefficients()),
    )
    .unwrap();
    let builder = PairDensityBuilder::new(&grid);
    let rho_real = builder.build_from_orbitals(&a, &b).unwrap();
    let rho_mixed = builder.build_from_orbitals(&a, &b_recip).unwrap();
    for (x, y) in rho_real.values().iter().zip(rho_mixed.values().iter()) {
        approx::assert_relative_eq!(x.re, y.re, epsilon = 1e-12);
        approx::assert_relative_eq!(x.im, y.im, epsilon = 1e-12);
    }
}

#[test]
fn test_pair_density_invalid() {
    let grid = GridGeometry::new(Matrix3::from_diagonal_element(7.0), [4, 4, 4]).unwrap();
    let other_grid = GridGeometry::new(Matrix3::from_diagonal_element(7.5), [4, 4, 4]).unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    let up0 = random_orbital(grid.shape(), SpinChannel::Up, 0, true, &mut rng);
    let up1 = random_orbital(grid.shape(), SpinChannel::Up, 1, true, &mut rng);
    let down0 = random_orbital(grid.shape(), SpinChannel::Down, 0, true, &mut rng);
    let small = random_orbital([4, 4, 2], SpinChannel::Up, 2, true, &mut rng);

    let builder = PairDensityBuilder::new(&grid);
    assert!(matches!(
        builder.build_from_orbitals(&up0, &down0),
        Err(ZfsError::Configuration(_))
    ));
    assert!(matches!(
        builder.build_from_orbitals(&up0, &small),
        Err(ZfsError::Configuration(_))
    ));

    let set = OrbitalSet::new(
        &grid,
        vec![up0, up1, down0],
        MemoryMode::High,
        0.8,
    )
    .unwrap();
    assert!(matches!(
        OrbitalPair::new(&set, 0, 2),
        Err(ZfsError::Configuration(_))
    ));
    assert!(matches!(
        OrbitalPair::new(&set, 1, 1),
        Err(ZfsError::Configuration(_))
    ));
    assert!(OrbitalPair::new(&set, 1, 5).is_err());

    let pair = OrbitalPair::new(&set, 1, 0).unwrap();
    assert_eq!((pair.first, pair.second), (0, 1));
    assert!(builder.build(&set, pair).is_ok());

    // A builder on a different grid refuses densities of this set.
    let other_builder = PairDensityBuilder::new(&other_grid);
    assert!(matches!(
        other_builder.build(&set, pair),
        Err(ZfsError::Configuration(_))
    ));
}
