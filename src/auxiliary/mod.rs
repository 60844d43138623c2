//! Helper items describing the periodic grids on which wavefunctions are sampled.

pub mod fft;
pub mod grid;
