//! Shared numeric types.

pub use rustfft::num_complex::Complex64;

/// Complex sample type used throughout the pipeline
pub type Complex = Complex64;

/// Boltzmann's constant [J/K]
pub const BOLTZMANN: f64 = 1.380649e-23;
